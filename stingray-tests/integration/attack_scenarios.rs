//! End-to-end runs of the pre-built attack scenarios.

use std::net::SocketAddrV4;
use std::time::Duration;

use bytes::Bytes;
use stingray_core::config::LinkConfig;
use stingray_core::net::LinkProfile;
use stingray_core::{InterceptRelay, Network, Packet, Scheduler, StingrayError};
use stingray_scenarios::{dos_flood, eavesdrop, mitm_relay, ScenarioConfig, ATTACK_PORT};

fn quick_config() -> ScenarioConfig {
    let mut config = ScenarioConfig {
        sim_time_secs: 2.0,
        num_attackers: 3,
        attack_rate_bps: 2_000_000, // scaled down from the 1 Gb/s reference
        ..ScenarioConfig::default()
    };
    config.core.links = LinkConfig::lossless();
    config
}

#[test]
fn relay_sees_sizes_in_delivery_order() {
    let network = Network::new(
        LinkProfile {
            delay: Duration::from_millis(1),
            loss_rate: 0.0,
        },
        42,
    );
    let mut sched = Scheduler::new();
    let listen = "10.1.1.1:1234".parse::<SocketAddrV4>().unwrap();
    let relay = InterceptRelay::bind(
        &network,
        &mut sched,
        listen,
        None,
        Duration::ZERO,
        Duration::from_secs(10),
    )
    .unwrap();

    for size in [100usize, 200, 300] {
        let packet = Packet::udp(
            "7.0.0.2:49153".parse().unwrap(),
            listen,
            Bytes::from(vec![0u8; size]),
        );
        network.send(&mut sched, listen, packet).unwrap();
    }
    sched.run_until(Duration::from_secs(1)).unwrap();

    assert_eq!(relay.borrow().intercepted(), &[100, 200, 300]);
}

#[test]
fn dos_flood_report_accounts_every_attacker() {
    let config = quick_config();
    let mut scenario = dos_flood(&config).unwrap();
    let report = scenario.run();

    assert!(report.completed);
    assert_eq!(report.flows.len(), config.num_attackers);
    // Lossless links, so the flood is fully absorbed by the target.
    for record in &report.flows {
        assert!(record.tx_bytes > 0);
        assert!(!record.anomalous);
    }
    assert!(scenario.sink.borrow().total_received_bytes() > 0);

    // The sampler observed the flood once it started at t=1.
    let sampler = scenario.sampler.as_ref().unwrap().borrow();
    assert_eq!(sampler.samples().len(), 2);
    assert_eq!(sampler.samples()[0].bits, 0);
    assert!(sampler.samples()[1].bits > 0);
}

#[test]
fn dos_flood_loses_packets_on_lossy_radio_links() {
    let mut config = quick_config();
    config.core.links.radio_loss_rate = 0.25;
    let mut scenario = dos_flood(&config).unwrap();
    let report = scenario.run();

    assert!(report.completed);
    let lost: i64 = report.flows.iter().map(|record| record.lost_bytes).sum();
    assert!(lost > 0, "a 25% lossy radio link must show flow loss");
}

#[test]
fn mitm_relay_report_shows_both_legs() {
    let mut scenario = mitm_relay(&quick_config()).unwrap();
    let report = scenario.run();

    assert!(report.completed);
    assert_eq!(report.flows.len(), 2);

    let relay = scenario.relay.as_ref().unwrap().borrow();
    assert!(!relay.intercepted().is_empty());
    assert!(relay.intercepted().iter().all(|size| *size == 1400));

    // The relayed leg reaches the gateway sink packet for packet, minus
    // whatever is still in flight at the horizon.
    let received = scenario.sink.borrow().total_received_packets();
    assert!(received >= relay.intercepted().len() as u64 - 1);
}

#[test]
fn eavesdrop_tap_and_sink_observe_the_same_stream() {
    let mut scenario = eavesdrop(&quick_config()).unwrap();
    let report = scenario.run();

    assert!(report.completed);
    let tap = scenario.relay.as_ref().unwrap().borrow();
    assert_eq!(
        tap.intercepted().len() as u64,
        scenario.sink.borrow().total_received_packets()
    );
    assert!(tap.intercepted().iter().all(|size| *size == 1024));
    assert_eq!(report.flows.len(), 1);
}

#[test]
fn scenario_reports_serialize_to_json() {
    let mut scenario = eavesdrop(&quick_config()).unwrap();
    let report = scenario.run();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"completed\":true"));
    assert!(json.contains("\"flows\""));
}

#[test]
fn conflicting_binds_surface_before_the_run() {
    let config = quick_config();
    let scenario = dos_flood(&config).unwrap();

    // The attack port on the gateway is taken by the scenario's sink.
    let gateway_attack_port =
        SocketAddrV4::new(scenario.topology.gateway, ATTACK_PORT);
    let mut sched = Scheduler::new();
    let result = InterceptRelay::bind(
        &scenario.network,
        &mut sched,
        gateway_attack_port,
        None,
        Duration::ZERO,
        Duration::from_secs(1),
    );
    assert!(matches!(result, Err(StingrayError::BindConflict { .. })));
}
