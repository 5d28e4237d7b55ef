use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::error::MessageError;

/// Number of payload bytes carried by every message and packet.
pub const PAYLOAD_SIZE: usize = 20;

/// Filler for header fields that a packet does not use.
pub const NOT_IN_USE: i32 = -1;

/// Application-layer unit: exactly [`PAYLOAD_SIZE`] bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Message {
    pub data: [u8; PAYLOAD_SIZE],
}

impl Message {
    pub fn new(data: [u8; PAYLOAD_SIZE]) -> Self {
        Self { data }
    }

    /// Build a message from arbitrary application bytes, zero-padding short input.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() > PAYLOAD_SIZE {
            return Err(MessageError::TooLong {
                len: bytes.len(),
                max: PAYLOAD_SIZE,
            });
        }
        let mut data = [0u8; PAYLOAD_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { data })
    }

    /// A message made of one repeated byte, the shape the traffic generator produces.
    pub fn filled(byte: u8) -> Self {
        Self {
            data: [byte; PAYLOAD_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number of a data packet, [`NOT_IN_USE`] on a pure ACK
    pub seqnum: i32,
    /// Acknowledged sequence number, [`NOT_IN_USE`] on a pure data packet
    pub acknum: i32,
    pub checksum: i32,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Create a data packet carrying `message`, with its checksum filled in.
    pub fn new_data(seqnum: i32, message: &Message) -> Self {
        let mut packet = Self {
            seqnum,
            acknum: NOT_IN_USE,
            checksum: 0,
            payload: message.data,
        };
        packet.checksum = checksum::compute(&packet);
        packet
    }

    /// Create a pure ACK for `acknum`, with its checksum filled in.
    pub fn new_ack(acknum: i32) -> Self {
        let mut packet = Self {
            seqnum: NOT_IN_USE,
            acknum,
            checksum: 0,
            payload: [0u8; PAYLOAD_SIZE],
        };
        packet.checksum = checksum::compute(&packet);
        packet
    }

    pub fn is_ack(&self) -> bool {
        self.seqnum == NOT_IN_USE && self.acknum != NOT_IN_USE
    }

    pub fn is_data(&self) -> bool {
        self.acknum == NOT_IN_USE && self.seqnum != NOT_IN_USE
    }

    pub fn message(&self) -> Message {
        Message::new(self.payload)
    }
}
