//! Selective-repeat sending entity (A).
//!
//! [`SrSender`] keeps up to `window_size` data packets outstanding. Each
//! buffered packet carries its own ACK flag, so acknowledgements may arrive in
//! any order. The window only slides when the oldest packet is acknowledged,
//! and a timeout retransmits that oldest packet alone.
//!
//! ```text
//!  base             next
//!   │                 │
//!   ▼                 ▼
//!  [ 0 ][ 1 ][ 2 ][ 3 ][   ][   ]     buffer slots, slot = (seq - base) mod S
//!   unacked / acked     free
//! ```

use sr_lab_abstract::checksum;
use sr_lab_abstract::{
    ConfigError, Message, Packet, ProtocolConfig, SystemContext, TransportProtocol,
};

use crate::ring::SlotRing;
use crate::seqnum::SeqSpace;

#[derive(Debug, Clone, Copy)]
struct SentSlot {
    packet: Packet,
    acked: bool,
}

/// Result of offering a message to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The message went out with this sequence number.
    Sent { seqnum: i32 },
    /// The window is full; the message was dropped and should be offered again later.
    WindowFull,
}

/// What an inbound packet did to the sender window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Corrupted,
    /// Stale, out-of-window or for a sequence number never sent.
    Ignored,
    Duplicate,
    /// First ACK for a buffered packet; `slid` is how far the window moved.
    New { slid: usize },
}

/// Sender state by outstanding (unacknowledged) packets: none, some, or `window_size`.
///
/// A `Partial` sender may still reject new messages: the window only slides
/// when `base` is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub base: i32,
    pub next: i32,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages dropped because the window was full
    pub window_full: u32,
    /// Original transmissions
    pub packets_sent: u32,
    pub retransmissions: u32,
    /// Uncorrupted ACKs received
    pub acks_total: u32,
    pub acks_new: u32,
    pub acks_duplicate: u32,
    pub acks_corrupted: u32,
}

pub struct SrSender {
    seq: SeqSpace,
    rtt: u64,
    /// Oldest unacknowledged sequence number
    base: i32,
    /// Sequence number for the next new packet
    next: i32,
    /// Packets sent but not yet acknowledged
    count: usize,
    buffer: SlotRing<SentSlot>,
    stats: SenderStats,
}

impl SrSender {
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            seq: SeqSpace::new(config),
            rtt: config.rtt,
            base: 0,
            next: 0,
            count: 0,
            buffer: SlotRing::new(config.window_size),
            stats: SenderStats::default(),
        })
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            base: self.base,
            next: self.next,
            count: self.count,
        }
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn state(&self) -> WindowState {
        match self.count {
            0 => WindowState::Empty,
            n if n >= self.seq.window() => WindowState::Full,
            _ => WindowState::Partial,
        }
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.next = 0;
        self.count = 0;
        self.buffer.clear();
        self.stats = SenderStats::default();
    }

    /// Send `message` if the window has room. A full window drops the message.
    pub fn submit(&mut self, ctx: &mut dyn SystemContext, message: Message) -> SubmitOutcome {
        if !self.seq.contains(self.base, self.next) {
            self.stats.window_full += 1;
            ctx.log("A: send window is full, dropping message");
            ctx.record_metric("window_full", self.stats.window_full as f64);
            return SubmitOutcome::WindowFull;
        }

        let seqnum = self.next;
        let packet = Packet::new_data(seqnum, &message);
        let index = self.seq.offset(self.base, seqnum);
        self.buffer.insert(
            index,
            SentSlot {
                packet,
                acked: false,
            },
        );
        self.count += 1;

        ctx.log(&format!("A: sending packet {seqnum}"));
        ctx.send_packet(packet);
        self.stats.packets_sent += 1;
        ctx.record_metric("packets_sent", self.stats.packets_sent as f64);

        if seqnum == self.base {
            ctx.start_timer(self.rtt);
        }
        self.next = self.seq.advance(seqnum, 1);

        ctx.record_metric("outstanding", self.count as f64);
        SubmitOutcome::Sent { seqnum }
    }

    pub fn on_ack_received(&mut self, ctx: &mut dyn SystemContext, packet: &Packet) -> AckOutcome {
        if checksum::is_corrupted(packet) {
            self.stats.acks_corrupted += 1;
            ctx.log("A: corrupted ACK received, ignoring");
            ctx.record_metric("acks_corrupted", self.stats.acks_corrupted as f64);
            return AckOutcome::Corrupted;
        }

        self.stats.acks_total += 1;
        ctx.record_metric("acks_total", self.stats.acks_total as f64);
        let acknum = packet.acknum;

        if !self.seq.contains(self.base, acknum) {
            ctx.log(&format!("A: ACK {acknum} outside window, ignoring"));
            return AckOutcome::Ignored;
        }

        let index = self.seq.offset(self.base, acknum);
        let Some(slot) = self.buffer.get_mut(index) else {
            ctx.log(&format!("A: ACK {acknum} for unsent packet, ignoring"));
            return AckOutcome::Ignored;
        };

        if slot.acked {
            self.stats.acks_duplicate += 1;
            ctx.log(&format!("A: duplicate ACK {acknum}, do nothing"));
            ctx.record_metric("acks_duplicate", self.stats.acks_duplicate as f64);
            return AckOutcome::Duplicate;
        }

        slot.acked = true;
        self.count -= 1;
        self.stats.acks_new += 1;
        ctx.log(&format!("A: ACK {acknum} is not a duplicate"));
        ctx.record_metric("acks_new", self.stats.acks_new as f64);

        let mut slid = 0;
        if acknum == self.base {
            slid = self.buffer.leading_run(|slot| slot.acked);
            self.base = self.seq.advance(self.base, slid);
            self.buffer.shift(slid);

            ctx.stop_timer();
            if self.count > 0 {
                ctx.start_timer(self.rtt);
            }
            ctx.record_metric("sender_base", self.base as f64);
        }
        ctx.record_metric("outstanding", self.count as f64);

        AckOutcome::New { slid }
    }

    /// Retransmit the oldest outstanding packet, and only that one.
    pub fn on_timeout(&mut self, ctx: &mut dyn SystemContext) -> Option<i32> {
        let Some(slot) = self.buffer.get(0) else {
            ctx.log("A: timeout with nothing outstanding");
            return None;
        };
        let packet = slot.packet;

        ctx.log(&format!("A: timeout, resending packet {}", packet.seqnum));
        ctx.send_packet(packet);
        self.stats.retransmissions += 1;
        ctx.start_timer(self.rtt);
        ctx.record_metric("retransmissions", self.stats.retransmissions as f64);

        Some(packet.seqnum)
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "A: selective repeat sender ready (window {}, seq space {}, rtt {})",
            self.seq.window(),
            self.seq.size(),
            self.rtt
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_ack_received(ctx, &packet);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        self.on_timeout(ctx);
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        self.submit(ctx, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContext;

    fn sender(window: usize) -> SrSender {
        SrSender::new(&ProtocolConfig::with_window(window).unwrap()).unwrap()
    }

    fn msg(i: u8) -> Message {
        Message::filled(b'a' + i)
    }

    fn corrupt(mut packet: Packet) -> Packet {
        packet.acknum = 999_999;
        packet
    }

    #[test]
    fn fills_window_then_rejects() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();

        for i in 0..6 {
            assert_eq!(
                a.submit(&mut ctx, msg(i)),
                SubmitOutcome::Sent { seqnum: i as i32 }
            );
        }
        assert_eq!(a.state(), WindowState::Full);
        assert_eq!(a.snapshot().count, 6);

        assert_eq!(a.submit(&mut ctx, msg(6)), SubmitOutcome::WindowFull);
        assert_eq!(a.stats().window_full, 1);
        assert_eq!(ctx.sent.len(), 6);
        assert_eq!(a.snapshot(), WindowSnapshot { base: 0, next: 6, count: 6 });
    }

    #[test]
    fn out_of_order_ack_on_full_window_is_partial_but_still_rejects() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        for i in 0..6 {
            a.submit(&mut ctx, msg(i));
        }

        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(3)),
            AckOutcome::New { slid: 0 }
        );
        assert_eq!(a.snapshot().count, 5);
        assert_eq!(a.state(), WindowState::Partial);

        // base 0 is still unacked, so seq 6 is outside the window
        assert_eq!(a.submit(&mut ctx, msg(6)), SubmitOutcome::WindowFull);
        assert_eq!(a.snapshot(), WindowSnapshot { base: 0, next: 6, count: 5 });
    }

    #[test]
    fn timer_starts_only_for_first_outstanding_packet() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();

        a.submit(&mut ctx, msg(0));
        a.submit(&mut ctx, msg(1));
        a.submit(&mut ctx, msg(2));
        assert_eq!(ctx.timer_starts, vec![16]);
        assert_eq!(ctx.misuse, 0);
    }

    #[test]
    fn out_of_order_ack_slides_only_contiguous_run() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        for i in 0..3 {
            a.submit(&mut ctx, msg(i));
        }

        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(2)),
            AckOutcome::New { slid: 0 }
        );
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(0)),
            AckOutcome::New { slid: 1 }
        );
        assert_eq!(a.snapshot(), WindowSnapshot { base: 1, next: 3, count: 1 });

        // timer was restarted for packet 1, still outstanding
        assert!(ctx.timer_running);
        ctx.fire_timer();
        assert_eq!(a.on_timeout(&mut ctx), Some(1));

        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(1)),
            AckOutcome::New { slid: 2 }
        );
        assert_eq!(a.snapshot(), WindowSnapshot { base: 3, next: 3, count: 0 });
        assert_eq!(a.state(), WindowState::Empty);
        assert!(!ctx.timer_running);
        assert_eq!(ctx.misuse, 0);
    }

    #[test]
    fn duplicate_ack_changes_nothing() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        for i in 0..3 {
            a.submit(&mut ctx, msg(i));
        }
        a.on_ack_received(&mut ctx, &Packet::new_ack(1));
        let before = a.snapshot();

        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(1)),
            AckOutcome::Duplicate
        );
        assert_eq!(a.snapshot(), before);
        assert_eq!(a.stats().acks_duplicate, 1);
        assert_eq!(a.stats().acks_total, 2);
    }

    #[test]
    fn corrupted_ack_leaves_state_untouched() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        a.submit(&mut ctx, msg(0));
        a.submit(&mut ctx, msg(1));
        let before = a.snapshot();
        let timers = ctx.timer_starts.len();

        assert_eq!(
            a.on_ack_received(&mut ctx, &corrupt(Packet::new_ack(0))),
            AckOutcome::Corrupted
        );
        assert_eq!(a.snapshot(), before);
        assert_eq!(ctx.timer_starts.len(), timers);
        assert_eq!(ctx.timer_stops, 0);
        assert_eq!(a.stats().acks_total, 0);
        assert_eq!(a.stats().acks_corrupted, 1);
        assert_eq!(ctx.metrics.last(), Some(&("acks_corrupted".to_string(), 1.0)));
    }

    #[test]
    fn stale_and_unsent_acks_are_ignored() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        a.submit(&mut ctx, msg(0));
        a.on_ack_received(&mut ctx, &Packet::new_ack(0));
        a.submit(&mut ctx, msg(1));

        // 0 already slid past, 4 is in window but was never sent, 9 is beyond the window
        for ack in [0, 4, 9] {
            assert_eq!(
                a.on_ack_received(&mut ctx, &Packet::new_ack(ack)),
                AckOutcome::Ignored
            );
        }
        assert_eq!(a.snapshot(), WindowSnapshot { base: 1, next: 2, count: 1 });
    }

    #[test]
    fn timeout_resends_only_oldest_packet() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        for i in 0..4 {
            a.submit(&mut ctx, msg(i));
        }
        ctx.fire_timer();
        ctx.sent.clear();

        assert_eq!(a.on_timeout(&mut ctx), Some(0));
        assert_eq!(ctx.sent.len(), 1);
        assert_eq!(ctx.sent[0].seqnum, 0);
        assert_eq!(ctx.sent[0].payload, msg(0).data);
        assert!(ctx.timer_running);
        assert_eq!(a.stats().retransmissions, 1);
    }

    #[test]
    fn timeout_with_empty_window_sends_nothing() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        assert_eq!(a.on_timeout(&mut ctx), None);
        assert!(ctx.sent.is_empty());
        assert!(ctx.timer_starts.is_empty());
    }

    #[test]
    fn sequence_numbers_wrap_around_space() {
        let mut a = sender(2);
        let mut ctx = RecordingContext::default();

        for i in 0..6u8 {
            let outcome = a.submit(&mut ctx, msg(i));
            let seqnum = i as i32 % 4;
            assert_eq!(outcome, SubmitOutcome::Sent { seqnum });
            a.on_ack_received(&mut ctx, &Packet::new_ack(seqnum));
        }
        assert_eq!(a.snapshot(), WindowSnapshot { base: 2, next: 2, count: 0 });
        assert_eq!(ctx.misuse, 0);
    }

    #[test]
    fn out_of_order_acks_across_wrap_point() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        for i in 0..10 {
            a.submit(&mut ctx, msg(i));
            a.on_ack_received(&mut ctx, &Packet::new_ack(i as i32));
        }
        assert_eq!(a.snapshot(), WindowSnapshot { base: 10, next: 10, count: 0 });

        // 10, 11, 0, 1 occupy slots 0..4
        for (i, expected) in [10, 11, 0, 1].into_iter().enumerate() {
            assert_eq!(
                a.submit(&mut ctx, msg(i as u8)),
                SubmitOutcome::Sent { seqnum: expected }
            );
        }

        // 9 lies just behind base and is stale
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(9)),
            AckOutcome::Ignored
        );
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(1)),
            AckOutcome::New { slid: 0 }
        );
        // same slot (index 3) is found again
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(1)),
            AckOutcome::Duplicate
        );
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(0)),
            AckOutcome::New { slid: 0 }
        );
        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(10)),
            AckOutcome::New { slid: 1 }
        );
        assert_eq!(a.snapshot(), WindowSnapshot { base: 11, next: 2, count: 1 });

        ctx.fire_timer();
        assert_eq!(a.on_timeout(&mut ctx), Some(11));

        assert_eq!(
            a.on_ack_received(&mut ctx, &Packet::new_ack(11)),
            AckOutcome::New { slid: 3 }
        );
        assert_eq!(a.snapshot(), WindowSnapshot { base: 2, next: 2, count: 0 });
        assert_eq!(a.state(), WindowState::Empty);
        assert!(!ctx.timer_running);
        assert_eq!(ctx.misuse, 0);
    }

    #[test]
    fn init_resets_window() {
        let mut a = sender(6);
        let mut ctx = RecordingContext::default();
        a.submit(&mut ctx, msg(0));
        a.submit(&mut ctx, msg(1));

        a.init(&mut ctx);
        assert_eq!(a.snapshot(), WindowSnapshot { base: 0, next: 0, count: 0 });
        assert_eq!(a.state(), WindowState::Empty);
        assert_eq!(a.stats(), SenderStats::default());
    }

    #[test]
    fn count_stays_within_window_under_mixed_traffic() {
        let mut a = sender(3);
        let mut ctx = RecordingContext::default();
        let acks = [1, 0, 5, 2, 2, 3, 4, 0, 5, 1];

        for (i, ack) in acks.iter().enumerate() {
            a.submit(&mut ctx, msg(i as u8));
            a.submit(&mut ctx, msg(i as u8));
            a.on_ack_received(&mut ctx, &Packet::new_ack(*ack));

            let snap = a.snapshot();
            assert!(snap.count <= 3);
            assert!((0..6).contains(&snap.base));
            assert!((0..6).contains(&snap.next));
        }
    }
}
