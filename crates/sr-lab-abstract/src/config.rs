use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Channel and workload parameters for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Number of generated application messages (0 disables the generator)
    pub message_count: u32,
    /// Average gap between generated messages
    pub mean_interval: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 1,
            max_latency: 10,
            seed: 0,
            message_count: 0,
            mean_interval: 10,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("loss_rate", self.loss_rate)?;
        check_probability("corrupt_rate", self.corrupt_rate)?;
        if self.min_latency > self.max_latency {
            return Err(ConfigError::InvertedLatency {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

/// Selective-repeat constants, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub window_size: usize,
    pub seq_space: i32,
    /// Retransmission timeout
    pub rtt: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            seq_space: 12,
            rtt: 16,
        }
    }
}

impl ProtocolConfig {
    /// Window of `window_size` slots over a sequence space of twice that size.
    pub fn with_window(window_size: usize) -> Result<Self, ConfigError> {
        let seq_space = window_size
            .checked_mul(2)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or(ConfigError::WindowTooLarge(window_size))?;
        Ok(Self {
            window_size,
            seq_space,
            ..Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if (self.seq_space as i64) < 2 * self.window_size as i64 {
            return Err(ConfigError::SeqSpaceTooSmall {
                window_size: self.window_size,
                seq_space: self.seq_space,
            });
        }
        if self.rtt == 0 {
            return Err(ConfigError::InvalidRtt(self.rtt));
        }
        Ok(())
    }
}
