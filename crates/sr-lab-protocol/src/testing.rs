use sr_lab_abstract::{Message, Packet, SystemContext};

/// Context double that records every action an entity takes.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub delivered: Vec<Message>,
    pub timer_starts: Vec<u64>,
    pub timer_stops: usize,
    pub timer_running: bool,
    /// Starts while running plus stops while idle
    pub misuse: usize,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub now: u64,
}

impl RecordingContext {
    /// Simulate the timer expiring, as the event loop does before calling `on_timer`.
    pub fn fire_timer(&mut self) {
        self.timer_running = false;
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, delay: u64) {
        if self.timer_running {
            self.misuse += 1;
        }
        self.timer_running = true;
        self.timer_starts.push(delay);
    }

    fn stop_timer(&mut self) {
        if !self.timer_running {
            self.misuse += 1;
        }
        self.timer_running = false;
        self.timer_stops += 1;
    }

    fn deliver_data(&mut self, message: &Message) {
        self.delivered.push(*message);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
