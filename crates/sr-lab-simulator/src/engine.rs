use crate::trace::{RunSummary, SimulationReport};
use rand::Rng;
use serde::Serialize;
use sr_lab_abstract::{Message, Packet, SimConfig};
use sr_lab_abstract::{SystemContext, TransportProtocol};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, info, warn};

/// Value the channel writes into a corrupted header field.
const CORRUPT_FIELD: i32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }

    fn index(&self) -> usize {
        match self {
            NodeId::Sender => 0,
            NodeId::Receiver => 1,
        }
    }
}

#[derive(Debug)]
pub enum Event {
    MessageSubmitted { message: Message },
    PacketArrived { to: NodeId, packet: Packet },
    TimerFired { node: NodeId, generation: u64 },
}

#[derive(Debug)]
struct Scheduled {
    time: u64,
    event: Event,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

/// Packet counters kept by the channel.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChannelStats {
    pub from_sender: u32,
    pub from_receiver: u32,
    pub lost: u32,
    pub corrupted: u32,
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start(u64),
    Stop,
}

#[derive(Debug, Default, Clone, Copy)]
struct TimerState {
    running: bool,
    generation: u64,
}

/// Actions buffered during a protocol handler call
#[derive(Default)]
struct ActionBuffer {
    outgoing_packets: Vec<Packet>,
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    delivered_data: Vec<Message>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to the protocol entity
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.outgoing_packets.push(packet);
    }

    fn start_timer(&mut self, delay: u64) {
        self.buffer.timer_ops.push(TimerOp::Start(delay));
    }

    fn stop_timer(&mut self) {
        self.buffer.timer_ops.push(TimerOp::Stop);
    }

    fn deliver_data(&mut self, message: &Message) {
        self.buffer.delivered_data.push(*message);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// Single-threaded discrete-event simulation of one sender, one receiver and
/// the unreliable channel between them.
pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Scheduled>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    /// Messages handed to the sender, in submission order
    pub submitted: Vec<Message>,
    /// Messages the receiver delivered, in delivery order
    pub delivered_data: Vec<Message>,
    pub channel_stats: ChannelStats,

    /// Arbitrary time-series metrics recorded via `SystemContext::record_metric`
    /// Key: metric name (e.g., "retransmissions"), Value: Vec<(time, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection, each entry consumed by the first matching packet
    drop_sender_seq_once: Vec<i32>,
    drop_receiver_ack_once: Vec<i32>,
    corrupt_sender_seq_once: Vec<i32>,
    corrupt_receiver_ack_once: Vec<i32>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    timers: [TimerState; 2],
    /// Latest scheduled arrival per direction, indexed by source node
    last_arrival: [u64; 2],
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            submitted: Vec::new(),
            delivered_data: Vec::new(),
            channel_stats: ChannelStats::default(),
            metrics: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            corrupt_sender_seq_once: Vec::new(),
            corrupt_receiver_ack_once: Vec::new(),
            link_events: Vec::new(),
            timers: [TimerState::default(); 2],
            last_arrival: [0; 2],
        }
    }

    /// Register a deterministic fault: drop the first packet sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: i32) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: i32) {
        self.drop_receiver_ack_once.push(ack);
    }

    /// Register a deterministic fault: corrupt the first packet sent by Sender whose seq equals `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: i32) {
        self.corrupt_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: corrupt the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: i32) {
        self.corrupt_receiver_ack_once.push(ack);
    }

    /// Return a slice of (time, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Most recent sample of a counter metric, 0 when never recorded.
    pub fn metric_last(&self, name: &str) -> u32 {
        self.metric_series(name)
            .and_then(|series| series.last())
            .map_or(0, |(_, value)| *value as u32)
    }

    fn push_event(&mut self, time: u64, event: Event) {
        self.event_queue.push(Scheduled {
            time,
            event,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, message: Message) {
        self.push_event(time, Event::MessageSubmitted { message });
    }

    /// Schedule `message_count` generated messages, spaced by a random gap in
    /// `[0, 2 * mean_interval]`. Message `i` is twenty copies of letter `i mod 26`.
    pub fn schedule_generated_messages(&mut self) {
        let mut at = self.time;
        for i in 0..self.config.message_count {
            at += self.rng.random_range(0..=2 * self.config.mean_interval);
            let message = Message::filled(b'a' + (i % 26) as u8);
            self.schedule_app_send(at, message);
        }
    }

    pub fn init(&mut self) {
        for node in [NodeId::Sender, NodeId::Receiver] {
            let mut buffer = ActionBuffer::default();
            {
                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                };
                match node {
                    NodeId::Sender => self.sender.init(&mut ctx),
                    NodeId::Receiver => self.receiver.init(&mut ctx),
                }
            }
            self.process_actions(node, buffer);
        }
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let scheduled = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = scheduled.time;
        debug!("Processing event at {}: {:?}", self.time, scheduled.event);

        let mut buffer = ActionBuffer::default();
        let node = match scheduled.event {
            Event::MessageSubmitted { message } => {
                self.submitted.push(message);
                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                };
                self.sender.on_app_data(&mut ctx, message);
                NodeId::Sender
            }
            Event::PacketArrived { to, packet } => {
                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                };
                match to {
                    NodeId::Sender => self.sender.on_packet(&mut ctx, packet),
                    NodeId::Receiver => self.receiver.on_packet(&mut ctx, packet),
                }
                to
            }
            Event::TimerFired { node, generation } => {
                let timer = &mut self.timers[node.index()];
                if !timer.running || timer.generation != generation {
                    debug!("Skipping stopped timer event for {:?}", node);
                    return true; // Event processed (by being ignored)
                }
                timer.running = false;

                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                };
                match node {
                    NodeId::Sender => self.sender.on_timer(&mut ctx),
                    NodeId::Receiver => self.receiver.on_timer(&mut ctx),
                }
                node
            }
        };
        self.process_actions(node, buffer);
        true
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            summary: self.summary(),
            delivered_data: self
                .delivered_data
                .iter()
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                .collect(),
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            messages_submitted: self.submitted.len(),
            messages_delivered: self.delivered_data.len(),
            channel: self.channel_stats,
            window_full: self.metric_last("window_full"),
            packets_sent: self.metric_last("packets_sent"),
            retransmissions: self.metric_last("retransmissions"),
            acks_total: self.metric_last("acks_total"),
            acks_new: self.metric_last("acks_new"),
            acks_duplicate: self.metric_last("acks_duplicate"),
            acks_corrupted: self.metric_last("acks_corrupted"),
            packets_received: self.metric_last("packets_received"),
            packets_corrupted: self.metric_last("packets_corrupted"),
            out_of_window: self.metric_last("out_of_window"),
            acks_sent: self.metric_last("acks_sent"),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for message in buffer.delivered_data {
            info!(
                "[{:?}] DELIVERED DATA: {}",
                source_node,
                String::from_utf8_lossy(message.as_bytes())
            );
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!("[{:?}] DELIVERED to application", source_node),
            });
            self.delivered_data.push(message);
        }

        for op in buffer.timer_ops {
            self.apply_timer_op(source_node, op);
        }

        for packet in buffer.outgoing_packets {
            self.transmit(source_node, packet);
        }
    }

    fn apply_timer_op(&mut self, node: NodeId, op: TimerOp) {
        let timer = &mut self.timers[node.index()];
        match op {
            TimerOp::Start(delay) => {
                if timer.running {
                    warn!("[{:?}] attempt to start a timer that is already running", node);
                    return;
                }
                timer.running = true;
                let generation = timer.generation;
                self.push_event(self.time + delay, Event::TimerFired { node, generation });
            }
            TimerOp::Stop => {
                if !timer.running {
                    warn!("[{:?}] unable to stop timer: it was not running", node);
                    return;
                }
                // Bumping the generation invalidates the pending expiry event
                timer.running = false;
                timer.generation += 1;
            }
        }
    }

    // Channel: deterministic faults, then random loss, corruption and latency
    fn transmit(&mut self, source_node: NodeId, mut packet: Packet) {
        let target_node = source_node.peer();
        // Faults match on the field that identifies the packet in its direction
        let (key, drops, corrupts) = match source_node {
            NodeId::Sender => {
                self.channel_stats.from_sender += 1;
                (
                    packet.seqnum,
                    &mut self.drop_sender_seq_once,
                    &mut self.corrupt_sender_seq_once,
                )
            }
            NodeId::Receiver => {
                self.channel_stats.from_receiver += 1;
                (
                    packet.acknum,
                    &mut self.drop_receiver_ack_once,
                    &mut self.corrupt_receiver_ack_once,
                )
            }
        };
        let deterministic_drop = take_once(drops, key);
        let deterministic_corrupt = !deterministic_drop && take_once(corrupts, key);

        if deterministic_drop || self.rng.random::<f64>() < self.config.loss_rate {
            self.channel_stats.lost += 1;
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] DROP{} seq={} ack={}",
                    source_node,
                    target_node,
                    if deterministic_drop { " (deterministic)" } else { "" },
                    packet.seqnum,
                    packet.acknum
                ),
            });
            debug!("Packet lost in channel");
            return;
        }

        if deterministic_corrupt || self.rng.random::<f64>() < self.config.corrupt_rate {
            self.channel_stats.corrupted += 1;
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] CORRUPT seq={} ack={}",
                    source_node, target_node, packet.seqnum, packet.acknum
                ),
            });
            debug!("Packet corrupted in channel");
            self.corrupt(&mut packet);
        }

        // Order-preserving: never arrive before an earlier packet in the same direction
        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let direction = source_node.index();
        let arrival_time = self.last_arrival[direction].max(self.time) + latency;
        self.last_arrival[direction] = arrival_time;

        self.link_events.push(LinkEventSummary {
            time: self.time,
            description: format!(
                "[{:?}->{:?}] SEND seq={} ack={} (arrives at {})",
                source_node, target_node, packet.seqnum, packet.acknum, arrival_time
            ),
        });

        self.push_event(
            arrival_time,
            Event::PacketArrived {
                to: target_node,
                packet,
            },
        );
    }

    // Mutates a summed field and leaves the checksum alone, so the receiver can detect it
    fn corrupt(&mut self, packet: &mut Packet) {
        let x: f64 = self.rng.random();
        if x < 0.75 {
            packet.payload[0] = b'Z';
        } else if x < 0.875 {
            packet.seqnum = CORRUPT_FIELD;
        } else {
            packet.acknum = CORRUPT_FIELD;
        }
    }
}

fn take_once(pending: &mut Vec<i32>, value: i32) -> bool {
    match pending.iter().position(|v| *v == value) {
        Some(pos) => {
            pending.remove(pos);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeId, Simulator};
    use sr_lab_abstract::{Message, Packet, SimConfig, SystemContext, TransportProtocol};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Trace {
        timer_fired: u32,
        received: Vec<Packet>,
    }

    /// Starts its timer on every message and stops it on the first packet it hears.
    struct TracingNode {
        trace: Rc<RefCell<Trace>>,
        echo: bool,
    }

    impl TransportProtocol for TracingNode {
        fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
            self.trace.borrow_mut().received.push(packet);
            if self.echo {
                ctx.send_packet(Packet::new_ack(packet.seqnum));
            } else {
                ctx.stop_timer();
            }
        }

        fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {
            self.trace.borrow_mut().timer_fired += 1;
        }

        fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
            ctx.send_packet(Packet::new_data(0, &message));
            ctx.start_timer(100);
        }
    }

    fn traced_pair(config: SimConfig) -> (Simulator, Rc<RefCell<Trace>>, Rc<RefCell<Trace>>) {
        let a = Rc::new(RefCell::new(Trace::default()));
        let b = Rc::new(RefCell::new(Trace::default()));
        let sender = Box::new(TracingNode {
            trace: a.clone(),
            echo: false,
        });
        let receiver = Box::new(TracingNode {
            trace: b.clone(),
            echo: true,
        });
        (Simulator::new(config, sender, receiver), a, b)
    }

    #[test]
    fn stopped_timer_does_not_fire() {
        let (mut sim, a, _) = traced_pair(SimConfig::default());
        sim.schedule_app_send(0, Message::filled(b'a'));
        sim.run_until_complete();

        assert_eq!(a.borrow().received.len(), 1);
        assert_eq!(a.borrow().timer_fired, 0);
    }

    #[test]
    fn timer_fires_when_ack_is_lost() {
        let (mut sim, a, _) = traced_pair(SimConfig::default());
        sim.add_drop_receiver_ack_once(0);
        sim.schedule_app_send(0, Message::filled(b'a'));
        sim.run_until_complete();

        assert_eq!(a.borrow().timer_fired, 1);
        assert_eq!(sim.channel_stats.lost, 1);
    }

    #[test]
    fn channel_preserves_order_per_direction() {
        let config = SimConfig {
            min_latency: 1,
            max_latency: 50,
            seed: 7,
            ..Default::default()
        };
        let (mut sim, _, b) = traced_pair(config);
        for i in 0..20u8 {
            sim.schedule_app_send(i as u64, Message::filled(b'a' + i));
        }
        sim.run_until_complete();

        let order: Vec<u8> = b.borrow().received.iter().map(|p| p.payload[0]).collect();
        let expected: Vec<u8> = (0..20).map(|i| b'a' + i).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn corruption_is_detectable_by_checksum() {
        let config = SimConfig {
            corrupt_rate: 1.0,
            seed: 3,
            ..Default::default()
        };
        let (mut sim, _, b) = traced_pair(config);
        for i in 0..10u8 {
            sim.schedule_app_send(i as u64 * 5, Message::filled(b'a' + i));
        }
        sim.run_until_complete();

        let trace = b.borrow();
        let received = &trace.received;
        assert_eq!(received.len(), 10);
        assert!(received.iter().all(sr_lab_abstract::checksum::is_corrupted));
        assert_eq!(sim.channel_stats.corrupted, 20);
    }

    #[test]
    fn generated_messages_cycle_through_letters() {
        let config = SimConfig {
            message_count: 28,
            mean_interval: 4,
            ..Default::default()
        };
        let (mut sim, _, _) = traced_pair(config);
        sim.schedule_generated_messages();
        sim.run_until_complete();

        assert_eq!(sim.submitted.len(), 28);
        assert_eq!(sim.submitted[0], Message::filled(b'a'));
        assert_eq!(sim.submitted[25], Message::filled(b'z'));
        assert_eq!(sim.submitted[26], Message::filled(b'a'));
        assert_eq!(NodeId::Sender.peer(), NodeId::Receiver);
    }
}
