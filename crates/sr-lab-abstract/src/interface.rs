use crate::packet::{Message, Packet};

/// The capability provided by the simulator to a protocol entity.
/// Entities call these methods to reach the channel, their timer and the application layer.
pub trait SystemContext {
    /// Hand a packet to the unreliable channel. Fire-and-forget.
    fn send_packet(&mut self, packet: Packet);

    /// Start this entity's single retransmission timer.
    /// Starting a timer that is already running is a caller bug: stop it first.
    fn start_timer(&mut self, delay: u64);

    /// Stop this entity's timer.
    fn stop_timer(&mut self);

    /// Deliver a payload to the application layer.
    fn deliver_data(&mut self, message: &Message);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation time.
    fn now(&self) -> u64;

    /// Record a numeric metric sample (counters, window edges) for the report.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// A protocol entity driven by the simulator's event loop.
pub trait TransportProtocol {
    /// Called once when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the channel.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when this entity's timer expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext);

    /// Called when the application layer has a message to send.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message);
}
