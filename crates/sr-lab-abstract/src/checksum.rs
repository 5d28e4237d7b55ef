//! Packet integrity check shared by both entities.
//!
//! The checksum is the plain sum of the header fields and every payload byte.
//! The channel never rewrites the checksum field itself, so any mutation of
//! the summed fields makes [`is_corrupted`] report the packet.

use crate::packet::Packet;

pub fn compute(packet: &Packet) -> i32 {
    packet
        .payload
        .iter()
        .fold(packet.seqnum.wrapping_add(packet.acknum), |sum, &b| {
            sum.wrapping_add(b as i32)
        })
}

pub fn is_corrupted(packet: &Packet) -> bool {
    compute(packet) != packet.checksum
}
