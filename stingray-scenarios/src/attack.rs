//! The three pre-built attack scenarios.

use std::cell::RefCell;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use stingray_core::sim::{duration_from_secs, DeterministicRng};
use stingray_core::{
    FlowMonitor, InterceptRelay, Network, OnOffGenerator, PacketSink, Result, Scheduler,
    StingrayError, ThroughputSampler, TrafficProfile,
};
use tracing::info;

use crate::topology::Topology;
use crate::{Scenario, ScenarioConfig};

/// Port flooded during the denial-of-service attack.
pub const ATTACK_PORT: u16 = 4321;
/// Port the intercepted terminal is lured into sending to.
pub const INTERCEPT_PORT: u16 = 1234;
/// Port the relay forwards intercepted traffic to.
pub const RELAY_PORT: u16 = 5678;
/// Downlink port of the eavesdropped stream.
pub const ECHO_PORT: u16 = 9;

const EPHEMERAL_BASE: u16 = 49153;

/// Applications start one second in, as in the reference runs.
const APP_START: Duration = Duration::from_secs(1);

struct Harness {
    scheduler: Scheduler,
    network: Network,
    monitor: Rc<RefCell<FlowMonitor>>,
    topology: Topology,
    horizon: Duration,
}

fn harness(config: &ScenarioConfig) -> Result<Harness> {
    let horizon = duration_from_secs(config.sim_time_secs)?;
    let mut rng = DeterministicRng::from_seed(config.seed);
    let topology = Topology::build(config, &mut rng);

    let network = Network::new(
        config.core.links.radio(),
        config.seed.wrapping_add(1),
    );
    topology.apply_links(&network, &config.core.links);

    let monitor = Rc::new(RefCell::new(FlowMonitor::new()));
    network.install_monitor(monitor.clone());

    Ok(Harness {
        scheduler: Scheduler::new(),
        network,
        monitor,
        topology,
        horizon,
    })
}

fn require(count: usize, what: &str) -> Result<()> {
    if count == 0 {
        return Err(StingrayError::Scenario {
            reason: format!("scenario requires at least one {what}"),
        });
    }
    Ok(())
}

/// Denial-of-service flood: every adversary runs a high-rate constant
/// source at the gateway's attack port, where the target sink measures the
/// absorbed load.
///
/// # Errors
///
/// Configuration errors (`InvalidTrafficProfile`, `BindConflict`,
/// `InvalidDelay`, empty topology) surface here, before the run begins.
pub fn dos_flood(config: &ScenarioConfig) -> Result<Scenario> {
    require(config.num_attackers, "attacker")?;
    let mut harness = harness(config)?;

    let target = SocketAddrV4::new(harness.topology.gateway, ATTACK_PORT);
    let sink = PacketSink::install(
        &harness.network,
        &mut harness.scheduler,
        target,
        Duration::ZERO,
        harness.horizon,
    )?;
    let sampler = ThroughputSampler::install(
        &mut harness.scheduler,
        sink.clone(),
        config.core.sampler.interval,
    )?;

    let mut generators = Vec::with_capacity(config.num_attackers);
    for (index, attacker) in harness.topology.attackers.iter().enumerate() {
        let local = SocketAddrV4::new(attacker.address, EPHEMERAL_BASE + index as u16);
        let profile =
            TrafficProfile::constant_rate(target, config.attack_rate_bps, config.attack_packet_size);
        generators.push(OnOffGenerator::install(
            &harness.network,
            &mut harness.scheduler,
            local,
            profile,
            APP_START,
            harness.horizon,
        )?);
    }
    info!(attackers = generators.len(), %target, "flood configured");

    Ok(Scenario {
        name: "dos-flood",
        scheduler: harness.scheduler,
        network: harness.network,
        monitor: harness.monitor,
        topology: harness.topology,
        horizon: harness.horizon,
        report_config: config.core.report.clone(),
        sink,
        generators,
        sampler: Some(sampler),
        relay: None,
    })
}

/// Man-in-the-middle relay: a terminal is lured into streaming to the
/// adversary, whose relay logs every intercepted packet and re-emits it
/// toward the gateway, where the sink receives the relayed leg.
///
/// # Errors
///
/// Configuration errors surface here, before the run begins.
pub fn mitm_relay(config: &ScenarioConfig) -> Result<Scenario> {
    require(config.num_ue, "terminal")?;
    require(config.num_attackers, "attacker")?;
    let mut harness = harness(config)?;

    let attacker = harness.topology.attackers[0];
    let terminal = harness.topology.ues[0];
    let intercept = SocketAddrV4::new(attacker.address, INTERCEPT_PORT);
    let relay_target = SocketAddrV4::new(harness.topology.gateway, RELAY_PORT);

    let relay = InterceptRelay::bind(
        &harness.network,
        &mut harness.scheduler,
        intercept,
        Some(relay_target),
        Duration::ZERO,
        harness.horizon,
    )?;
    let sink = PacketSink::install(
        &harness.network,
        &mut harness.scheduler,
        relay_target,
        Duration::ZERO,
        harness.horizon,
    )?;
    let sampler = ThroughputSampler::install(
        &mut harness.scheduler,
        sink.clone(),
        config.core.sampler.interval,
    )?;

    let profile = TrafficProfile::constant_rate(
        intercept,
        config.stream_rate_bps,
        config.stream_packet_size,
    );
    let generator = OnOffGenerator::install(
        &harness.network,
        &mut harness.scheduler,
        SocketAddrV4::new(terminal.address, EPHEMERAL_BASE),
        profile,
        APP_START,
        harness.horizon,
    )?;
    info!(%intercept, %relay_target, "interception path configured");

    Ok(Scenario {
        name: "mitm-relay",
        scheduler: harness.scheduler,
        network: harness.network,
        monitor: harness.monitor,
        topology: harness.topology,
        horizon: harness.horizon,
        report_config: config.core.report.clone(),
        sink,
        generators: vec![generator],
        sampler: Some(sampler),
        relay: Some(relay),
    })
}

/// Eavesdropping: a fixed-interval downlink stream from the base station to
/// a terminal's sink, with a passive tap subscribed to the same endpoint
/// recording everything it overhears.
///
/// # Errors
///
/// Configuration errors surface here, before the run begins.
pub fn eavesdrop(config: &ScenarioConfig) -> Result<Scenario> {
    require(config.num_enb, "base station")?;
    require(config.num_ue, "terminal")?;
    let mut harness = harness(config)?;

    let enb = harness.topology.enbs[0];
    let terminal = harness.topology.ues[0];
    let downlink = SocketAddrV4::new(terminal.address, ECHO_PORT);

    let sink = PacketSink::install(
        &harness.network,
        &mut harness.scheduler,
        downlink,
        APP_START,
        harness.horizon,
    )?;
    // The eavesdropper listens from the start, alongside the legitimate sink.
    let tap = InterceptRelay::tap(
        &harness.network,
        &mut harness.scheduler,
        downlink,
        Duration::ZERO,
        harness.horizon,
    )?;

    let profile = TrafficProfile::fixed_interval(
        downlink,
        config.client_interval,
        config.client_packet_size,
        config.client_max_packets,
    );
    let generator = OnOffGenerator::install(
        &harness.network,
        &mut harness.scheduler,
        SocketAddrV4::new(enb.address, EPHEMERAL_BASE),
        profile,
        APP_START,
        harness.horizon,
    )?;
    info!(%downlink, "eavesdropped stream configured");

    Ok(Scenario {
        name: "eavesdrop",
        scheduler: harness.scheduler,
        network: harness.network,
        monitor: harness.monitor,
        topology: harness.topology,
        horizon: harness.horizon,
        report_config: config.core.report.clone(),
        sink,
        generators: vec![generator],
        sampler: None,
        relay: Some(tap),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> ScenarioConfig {
        let mut config = ScenarioConfig {
            sim_time_secs: 2.0,
            num_attackers: 2,
            attack_rate_bps: 1_000_000, // keep test runs small
            ..ScenarioConfig::default()
        };
        config.core.links = stingray_core::config::LinkConfig::lossless();
        config
    }

    #[test]
    fn dos_flood_reaches_the_target_sink() {
        let mut scenario = dos_flood(&quick_config()).unwrap();
        let report = scenario.run();

        assert!(report.completed);
        // One flow per attacker, all toward the same attack port.
        assert_eq!(report.flows.len(), 2);
        assert!(scenario.sink.borrow().total_received_bytes() > 0);
        for generator in &scenario.generators {
            assert_eq!(generator.borrow().sent_packets(), 89);
        }
    }

    #[test]
    fn dos_flood_without_attackers_is_rejected() {
        let config = ScenarioConfig {
            num_attackers: 0,
            ..quick_config()
        };
        assert!(matches!(
            dos_flood(&config),
            Err(StingrayError::Scenario { .. })
        ));
    }

    #[test]
    fn mitm_relay_intercepts_and_forwards() {
        let mut scenario = mitm_relay(&quick_config()).unwrap();
        let report = scenario.run();

        assert!(report.completed);
        let relay = scenario.relay.as_ref().unwrap().borrow();
        assert_eq!(relay.intercepted().len(), 89);
        // The final relayed packet is still in flight when the horizon
        // lands, so the gateway sink sees one fewer.
        assert_eq!(scenario.sink.borrow().total_received_packets(), 88);
        // Two flows: terminal -> attacker and attacker -> gateway.
        assert_eq!(report.flows.len(), 2);
    }

    #[test]
    fn eavesdrop_tap_sees_the_downlink_stream() {
        let mut scenario = eavesdrop(&quick_config()).unwrap();
        let report = scenario.run();

        assert!(report.completed);
        let tap = scenario.relay.as_ref().unwrap().borrow();
        // Client emits every 100 ms from 1 s; nine packets fit before the
        // 2 s horizon stops it.
        assert_eq!(tap.intercepted().len(), 9);
        assert!(tap.intercepted().iter().all(|size| *size == 1024));
        assert_eq!(scenario.sink.borrow().total_received_packets(), 9);
        assert_eq!(report.flows.len(), 1);
    }
}
