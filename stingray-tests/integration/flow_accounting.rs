//! Flow classification and loss accounting across the transport tap.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use stingray_core::config::ReportConfig;
use stingray_core::net::LinkProfile;
use stingray_core::{
    Direction, FlowKey, FlowMonitor, FlowReport, Network, OnOffGenerator, Packet, PacketSink,
    Scheduler, StingrayError, TrafficProfile,
};

fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, last_octet), port)
}

fn monitored_network(loss_rate: f64) -> (Network, Rc<RefCell<FlowMonitor>>) {
    let network = Network::new(
        LinkProfile {
            delay: Duration::from_millis(1),
            loss_rate,
        },
        42,
    );
    let monitor = Rc::new(RefCell::new(FlowMonitor::new()));
    network.install_monitor(monitor.clone());
    (network, monitor)
}

#[test]
fn closed_system_never_reports_negative_loss() {
    // Lossy link, but every observed packet is both sent and (maybe)
    // delivered within the window: rx <= tx for every flow.
    let (network, monitor) = monitored_network(0.2);
    let mut sched = Scheduler::new();
    let target = endpoint(1, 4321);
    PacketSink::install(
        &network,
        &mut sched,
        target,
        Duration::ZERO,
        Duration::from_secs(60),
    )
    .unwrap();

    OnOffGenerator::install(
        &network,
        &mut sched,
        endpoint(2, 49153),
        TrafficProfile::constant_rate(target, 1_000_000, 1400),
        Duration::from_secs(1),
        Duration::from_secs(3),
    )
    .unwrap();

    sched.run_until(Duration::from_secs(5)).unwrap();

    let snapshot = monitor.borrow().snapshot();
    assert_eq!(snapshot.len(), 1);
    for stats in snapshot.values() {
        assert!(stats.rx_bytes <= stats.tx_bytes);
        assert!(stats.lost_bytes() >= 0);
        assert!(stats.tx_packets > 0);
    }
}

#[test]
fn identical_tuples_except_destination_port_are_distinct_flows() {
    let (network, monitor) = monitored_network(0.0);
    let mut sched = Scheduler::new();

    for port in [4321u16, 4322] {
        let target = endpoint(1, port);
        OnOffGenerator::install(
            &network,
            &mut sched,
            endpoint(2, 49153),
            TrafficProfile::constant_rate(target, 1_000_000, 1400),
            Duration::ZERO,
            Duration::from_secs(1),
        )
        .unwrap();
    }
    sched.run_until(Duration::from_secs(2)).unwrap();

    let snapshot = monitor.borrow().snapshot();
    assert_eq!(snapshot.len(), 2);
    let ports: Vec<u16> = snapshot.keys().map(|key| key.dst_port).collect();
    assert!(ports.contains(&4321) && ports.contains(&4322));
}

#[test]
fn unclassifiable_traffic_lands_on_the_reserved_key() {
    let (network, monitor) = monitored_network(0.0);
    let mut sched = Scheduler::new();
    let somewhere = endpoint(1, 9);

    network
        .send(
            &mut sched,
            somewhere,
            Packet::opaque(Bytes::from_static(&[0u8; 333])),
        )
        .unwrap();
    sched.run_until(Duration::from_secs(1)).unwrap();

    let monitor = monitor.borrow();
    // Observed at Tx and again at Rx.
    assert_eq!(monitor.unclassified_packets(), 2);
    let snapshot = monitor.snapshot();
    let stats = snapshot.get(&FlowKey::UNCLASSIFIED).unwrap();
    assert_eq!(stats.tx_bytes, 333);
    assert_eq!(stats.rx_bytes, 333);
}

#[test]
fn aborted_runs_keep_partial_statistics_inspectable() {
    let (network, monitor) = monitored_network(0.0);
    let mut sched = Scheduler::new();
    let target = endpoint(1, 4321);
    PacketSink::install(
        &network,
        &mut sched,
        target,
        Duration::ZERO,
        Duration::from_secs(60),
    )
    .unwrap();
    OnOffGenerator::install(
        &network,
        &mut sched,
        endpoint(2, 49153),
        TrafficProfile::constant_rate(target, 1_000_000, 1400),
        Duration::ZERO,
        Duration::from_secs(10),
    )
    .unwrap();

    // Fails mid-run, after traffic has been flowing for two seconds.
    sched
        .schedule_in(
            Duration::from_secs(2),
            Box::new(|_| {
                Err(StingrayError::Scenario {
                    reason: "mid-run fault".to_string(),
                })
            }),
        )
        .unwrap();

    let error = match sched.run_until(Duration::from_secs(10)) {
        Err(error) => error,
        Ok(_) => panic!("run should have aborted"),
    };

    // Partial statistics survive the abort and the report says so.
    let snapshot = monitor.borrow().snapshot();
    assert!(!snapshot.is_empty());
    let report = FlowReport::aborted(
        &snapshot,
        sched.now(),
        sched.events_dispatched(),
        &error,
        &ReportConfig::default(),
    );
    assert!(!report.completed);
    assert!(report.summary().contains("INCOMPLETE"));
    assert!(report.flows[0].tx_bytes > 0);
}

#[test]
fn out_of_window_arrivals_flag_negative_loss_in_the_report() {
    let (network, monitor) = monitored_network(0.0);
    let mut sched = Scheduler::new();

    // Tx observed for one flow, while a second flow's packets are conjured
    // at the sink without ever being sent: cross-flow contamination.
    let sent = Packet::udp(
        endpoint(2, 49153),
        endpoint(1, 4321),
        Bytes::from(vec![0u8; 1400]),
    );
    network.send(&mut sched, endpoint(1, 4321), sent).unwrap();

    let injected = Packet::udp(
        endpoint(3, 49153),
        endpoint(1, 5678),
        Bytes::from(vec![0u8; 1400]),
    );
    monitor.borrow_mut().observe(&injected, Direction::Rx);

    sched.run_until(Duration::from_secs(1)).unwrap();

    let summary = stingray_core::sim::RunSummary {
        events_dispatched: sched.events_dispatched(),
        elapsed: sched.now(),
        queue_drained: true,
    };
    let report = FlowReport::completed(
        &monitor.borrow().snapshot(),
        &summary,
        &ReportConfig::default(),
    );

    let anomalous: Vec<_> = report.flows.iter().filter(|record| record.anomalous).collect();
    assert_eq!(anomalous.len(), 1);
    assert_eq!(anomalous[0].lost_bytes, -1400);
    assert!(report.summary().contains("negative loss"));
}
