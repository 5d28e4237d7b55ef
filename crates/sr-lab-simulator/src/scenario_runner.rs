use anyhow::{Context, anyhow};
use sr_lab_abstract::{
    Message, ProtocolConfig, SimConfig, TestAction, TestAssertion, TestScenario, TransportProtocol,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

/// Upper bound on simulated time when a scenario names no `max_duration`.
const DEFAULT_MAX_DURATION: u64 = 100_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

/// Load a scenario and run it against the selective-repeat pair it configures.
pub fn run_scenario(scenario_path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(scenario_path)?;
    let mut protocol = ProtocolConfig::default();
    scenario
        .protocol
        .apply_to(&mut protocol)
        .context("Invalid protocol configuration")?;
    let (sender, receiver) =
        sr_lab_protocol::sr_pair(&protocol).context("Invalid protocol configuration")?;
    run_with(&scenario, sender, receiver)
}

/// Run `scenario` with the given entities and check its assertions.
pub fn run_with(
    scenario: &TestScenario,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    config.validate().context("Invalid channel configuration")?;

    let mut sim = Simulator::new(config, sender, receiver);
    configure_actions(&mut sim, &scenario.actions)?;
    sim.schedule_generated_messages();

    // Call init after we've configured the simulator
    sim.init();

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let TestAssertion::MaxDuration { time } = a {
                Some(*time)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_MAX_DURATION);

    while sim.step() {
        if sim.current_time() > max_duration {
            return Err(anyhow!(
                "Test timed out after {} time units with {} events still pending",
                max_duration,
                sim.remaining_events()
            ));
        }
    }

    check_assertions(&sim, &scenario.assertions)?;

    info!("Test Scenario Passed!");
    Ok(sim.export_report())
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) -> anyhow::Result<()> {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                let message = Message::from_slice(data.as_bytes())
                    .with_context(|| format!("Cannot send {data:?}"))?;
                sim.schedule_app_send(*time, message);
            }
            TestAction::DropNextFromSenderSeq { seq } => sim.add_drop_sender_seq_once(*seq),
            TestAction::DropNextFromReceiverAck { ack } => sim.add_drop_receiver_ack_once(*ack),
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq)
            }
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack)
            }
        }
    }
    Ok(())
}

pub fn check_assertions(sim: &Simulator, assertions: &[TestAssertion]) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let expected = Message::from_slice(data.as_bytes())?;
                if !sim.delivered_data.contains(&expected) {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::DeliveredCount { count } => {
                if sim.delivered_data.len() != *count {
                    return Err(anyhow!(
                        "Assertion Failed: {} messages delivered, expected {}",
                        sim.delivered_data.len(),
                        count
                    ));
                }
            }
            TestAssertion::AllDeliveredOnce => check_delivered_once(sim)?,
            TestAssertion::SenderPacketCount { min, max } => {
                check_range("Sender packets", sim.channel_stats.from_sender, *min, *max)?;
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range(
                    "Retransmissions",
                    sim.metric_last("retransmissions"),
                    *min,
                    *max,
                )?;
            }
            TestAssertion::WindowFull { min, max } => {
                check_range("Window-full drops", sim.metric_last("window_full"), *min, *max)?;
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}

// Every message the sender accepted arrives exactly once; rejected ones never do.
fn check_delivered_once(sim: &Simulator) -> anyhow::Result<()> {
    let mut outstanding: HashMap<Message, i64> = HashMap::new();
    for message in &sim.submitted {
        *outstanding.entry(*message).or_default() += 1;
    }
    for message in &sim.delivered_data {
        let left = outstanding.entry(*message).or_default();
        *left -= 1;
        if *left < 0 {
            return Err(anyhow!(
                "Assertion Failed: {:?} delivered more often than it was sent",
                String::from_utf8_lossy(message.as_bytes())
            ));
        }
    }

    let accepted = sim
        .submitted
        .len()
        .saturating_sub(sim.metric_last("window_full") as usize);
    if sim.delivered_data.len() != accepted {
        return Err(anyhow!(
            "Assertion Failed: {} of {} accepted messages delivered",
            sim.delivered_data.len(),
            accepted
        ));
    }
    Ok(())
}

fn check_range(what: &str, value: u32, min: u32, max: Option<u32>) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected min {}",
            what,
            value,
            min
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected max {}",
            what,
            value,
            max
        ));
    }
    Ok(())
}
