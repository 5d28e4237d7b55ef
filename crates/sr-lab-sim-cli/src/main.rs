use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info};

use sr_lab_abstract::{ConfigError, ProtocolConfig, SimConfig};
use sr_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-repeat ARQ simulator")]
struct Args {
    /// Run a TOML scenario and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of messages to simulate.
    #[arg(long, default_value_t = 20)]
    messages: u32,

    /// Packet loss probability.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Packet corruption probability.
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// Average time between messages from the application layer.
    #[arg(long, default_value_t = 10)]
    mean_interval: u64,

    #[arg(long, default_value_t = 1)]
    min_latency: u64,
    #[arg(long, default_value_t = 10)]
    max_latency: u64,

    /// Sender and receiver window size; the sequence space is twice this.
    #[arg(long, default_value_t = 6)]
    window_size: usize,

    /// Retransmission timeout.
    #[arg(long, default_value_t = 16)]
    rtt: u64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Log every simulator event.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("sr-lab-sim starting…");

    let report = match &args.scenario {
        Some(path) => scenario_runner::run_scenario(path)?,
        None => run_generated(&args)?,
    };
    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
            seed: self.seed,
            message_count: self.messages,
            mean_interval: self.mean_interval,
        }
    }

    fn protocol_config(&self) -> Result<ProtocolConfig, ConfigError> {
        Ok(ProtocolConfig {
            rtt: self.rtt,
            ..ProtocolConfig::with_window(self.window_size)?
        })
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn run_generated(args: &Args) -> Result<SimulationReport> {
    let config = args.sim_config();
    config.validate().context("Invalid channel configuration")?;
    let protocol = args
        .protocol_config()
        .context("Invalid protocol configuration")?;
    let (sender, receiver) =
        sr_lab_protocol::sr_pair(&protocol).context("Invalid protocol configuration")?;

    let mut sim = Simulator::new(config, sender, receiver);
    sim.schedule_generated_messages();
    info!(
        "Simulating {} messages (window {}, rtt {}, loss {}, corrupt {})",
        args.messages, protocol.window_size, protocol.rtt, args.loss, args.corrupt
    );
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

fn log_summary(report: &SimulationReport) {
    let s = &report.summary;
    info!(
        "Simulation duration: {} | messages submitted: {} | delivered: {} | window full: {}",
        report.duration, s.messages_submitted, s.messages_delivered, s.window_full
    );
    info!(
        "Packets from A: {} ({} original, {} retransmitted) | ACKs received: {} (new {}, duplicate {}, corrupted {})",
        s.channel.from_sender,
        s.packets_sent,
        s.retransmissions,
        s.acks_total,
        s.acks_new,
        s.acks_duplicate,
        s.acks_corrupted
    );
    info!(
        "B correctly received: {} | corrupted: {} | outside window: {} | ACKs sent: {}",
        s.packets_received, s.packets_corrupted, s.out_of_window, s.acks_sent
    );
    info!(
        "Channel: {} lost, {} corrupted",
        s.channel.lost, s.channel.corrupted
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
