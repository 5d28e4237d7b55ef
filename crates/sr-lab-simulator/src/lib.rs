pub mod engine;
pub mod scenario_runner;
pub mod trace;

pub use engine::{ChannelStats, Event, LinkEventSummary, NodeId, Simulator};
pub use trace::{RunSummary, SimulationReport};
