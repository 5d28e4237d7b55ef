use thiserror::Error;

/// Rejected session configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,

    #[error("window size {0} does not fit the sequence number field")]
    WindowTooLarge(usize),

    #[error("sequence space {seq_space} is smaller than twice the window size {window_size}")]
    SeqSpaceTooSmall { window_size: usize, seq_space: i32 },

    #[error("retransmission interval must be positive, got {0}")]
    InvalidRtt(u64),

    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("latency range is inverted: min {min} > max {max}")]
    InvertedLatency { min: u64, max: u64 },
}

/// Application data that cannot be carried in a single message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message of {len} bytes exceeds the {max}-byte payload")]
    TooLong { len: usize, max: usize },
}
