use serde::Serialize;
use sr_lab_abstract::SimConfig;
use std::collections::HashMap;

use crate::engine::{ChannelStats, LinkEventSummary};

/// End-of-run counters, the figures a grader or a human reads first.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunSummary {
    pub messages_submitted: usize,
    pub messages_delivered: usize,
    pub channel: ChannelStats,
    pub window_full: u32,
    /// Original data transmissions by A
    pub packets_sent: u32,
    pub retransmissions: u32,
    pub acks_total: u32,
    pub acks_new: u32,
    pub acks_duplicate: u32,
    pub acks_corrupted: u32,
    /// Uncorrupted packets received by B
    pub packets_received: u32,
    pub packets_corrupted: u32,
    pub out_of_window: u32,
    pub acks_sent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: u64,
    pub summary: RunSummary,
    pub delivered_data: Vec<String>,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}
