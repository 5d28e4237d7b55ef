//! Selective-repeat ARQ entities for the simplex A→B data path.
//!
//! [`SrSender`] and [`SrReceiver`] implement [`TransportProtocol`] and never
//! perform I/O themselves: every transmission, timer operation and delivery
//! goes through the [`sr_lab_abstract::SystemContext`] they are handed.

pub mod receiver;
pub mod ring;
pub mod sender;
pub mod seqnum;

#[cfg(test)]
mod testing;

pub use receiver::{ReceiveOutcome, ReceiverSnapshot, ReceiverStats, SrReceiver};
pub use sender::{AckOutcome, SenderStats, SrSender, SubmitOutcome, WindowSnapshot, WindowState};
pub use seqnum::SeqSpace;

use sr_lab_abstract::{ConfigError, ProtocolConfig, TransportProtocol};

/// Sender and receiver sharing one validated configuration, boxed for the simulator.
pub fn sr_pair(
    config: &ProtocolConfig,
) -> Result<(Box<dyn TransportProtocol>, Box<dyn TransportProtocol>), ConfigError> {
    let sender: Box<dyn TransportProtocol> = Box::new(SrSender::new(config)?);
    let receiver: Box<dyn TransportProtocol> = Box::new(SrReceiver::new(config)?);
    Ok((sender, receiver))
}
