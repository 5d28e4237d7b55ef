//! Selective-repeat receiving entity (B).
//!
//! Every intact data packet is acknowledged individually, including packets
//! outside the window, so a sender that already slid past them can make
//! progress. Packets inside the window are buffered once and handed to the
//! application as soon as they are accepted.

use sr_lab_abstract::checksum;
use sr_lab_abstract::{
    ConfigError, Message, Packet, ProtocolConfig, SystemContext, TransportProtocol,
};

use crate::ring::SlotRing;
use crate::seqnum::SeqSpace;

/// What an inbound data packet did to the receiver window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Dropped without an ACK.
    Corrupted,
    /// ACKed, not buffered.
    OutOfWindow,
    /// ACKed, already buffered, not delivered again.
    Duplicate,
    /// ACKed, buffered and delivered; `slid` is how far the window moved.
    Accepted { slid: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverSnapshot {
    pub base: i32,
    /// Furthest slot holding a packet, if any
    pub high_water: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Uncorrupted packets received
    pub packets_received: u32,
    pub corrupted: u32,
    pub duplicates: u32,
    pub out_of_window: u32,
    pub delivered: u32,
    pub acks_sent: u32,
}

pub struct SrReceiver {
    seq: SeqSpace,
    base: i32,
    buffer: SlotRing<Packet>,
    high_water: Option<usize>,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            seq: SeqSpace::new(config),
            base: 0,
            buffer: SlotRing::new(config.window_size),
            high_water: None,
            stats: ReceiverStats::default(),
        })
    }

    pub fn snapshot(&self) -> ReceiverSnapshot {
        ReceiverSnapshot {
            base: self.base,
            high_water: self.high_water,
        }
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.buffer.clear();
        self.high_water = None;
        self.stats = ReceiverStats::default();
    }

    pub fn on_packet_received(
        &mut self,
        ctx: &mut dyn SystemContext,
        packet: &Packet,
    ) -> ReceiveOutcome {
        if checksum::is_corrupted(packet) {
            self.stats.corrupted += 1;
            ctx.log("B: packet corrupted, no ACK sent");
            ctx.record_metric("packets_corrupted", self.stats.corrupted as f64);
            return ReceiveOutcome::Corrupted;
        }

        let seqnum = packet.seqnum;
        self.stats.packets_received += 1;
        ctx.log(&format!("B: packet {seqnum} is correctly received, send ACK"));
        ctx.send_packet(Packet::new_ack(seqnum));
        self.stats.acks_sent += 1;
        ctx.record_metric("packets_received", self.stats.packets_received as f64);
        ctx.record_metric("acks_sent", self.stats.acks_sent as f64);

        if !self.seq.contains(self.base, seqnum) {
            self.stats.out_of_window += 1;
            ctx.record_metric("out_of_window", self.stats.out_of_window as f64);
            return ReceiveOutcome::OutOfWindow;
        }

        let index = self.seq.offset(self.base, seqnum);
        if self.buffer.is_occupied(index) {
            self.stats.duplicates += 1;
            ctx.log(&format!("B: packet {seqnum} already buffered"));
            ctx.record_metric("duplicates", self.stats.duplicates as f64);
            return ReceiveOutcome::Duplicate;
        }

        self.buffer.insert(index, *packet);
        self.high_water = Some(self.high_water.map_or(index, |hw| hw.max(index)));

        ctx.deliver_data(&packet.message());
        self.stats.delivered += 1;
        ctx.record_metric("delivered", self.stats.delivered as f64);

        let mut slid = 0;
        if seqnum == self.base {
            slid = self.buffer.leading_run(|_| true);
            self.base = self.seq.advance(self.base, slid);
            self.buffer.shift(slid);
            self.high_water = self.high_water.and_then(|hw| hw.checked_sub(slid));
            ctx.record_metric("receiver_base", self.base as f64);
        }

        ReceiveOutcome::Accepted { slid }
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "B: selective repeat receiver ready (window {}, seq space {})",
            self.seq.window(),
            self.seq.size()
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_packet_received(ctx, &packet);
    }

    // Simplex transfer: B has no timer and no outbound data.
    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {}

    fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _message: Message) {}
}
