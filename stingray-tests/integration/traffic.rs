//! Traffic generation and throughput sampling contracts.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use stingray_core::net::LinkProfile;
use stingray_core::{
    AppState, Network, OnOffGenerator, Packet, PacketHandler, PacketSink, Result, Scheduler,
    ThroughputSampler, TrafficProfile,
};

fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, last_octet), port)
}

fn lossless(delay: Duration) -> Network {
    Network::new(
        LinkProfile {
            delay,
            loss_rate: 0.0,
        },
        42,
    )
}

/// Records arrival times and sizes of everything delivered to an endpoint.
struct ArrivalLog {
    arrivals: Vec<(Duration, usize)>,
}

impl PacketHandler for ArrivalLog {
    fn on_receive(&mut self, sched: &mut Scheduler, packet: &Packet) -> Result<()> {
        self.arrivals.push((sched.now(), packet.size()));
        Ok(())
    }
}

#[test]
fn reference_generator_emits_89_evenly_spaced_packets() {
    // 1,000,000 bits/sec, 1400-byte packets, started at t=1.0, stopped at
    // t=2.0: floor(1.0 / (1400*8/1_000_000)) emissions, 11.2 ms apart.
    let network = lossless(Duration::from_millis(1));
    let mut sched = Scheduler::new();
    let target = endpoint(1, 4321);

    let log = Rc::new(RefCell::new(ArrivalLog {
        arrivals: Vec::new(),
    }));
    network.bind(target, log.clone()).unwrap();

    let generator = OnOffGenerator::install(
        &network,
        &mut sched,
        endpoint(2, 49153),
        TrafficProfile::constant_rate(target, 1_000_000, 1400),
        Duration::from_secs(1),
        Duration::from_secs(2),
    )
    .unwrap();

    sched.run_until(Duration::from_secs(3)).unwrap();

    assert_eq!(generator.borrow().sent_packets(), 89);
    assert_eq!(generator.borrow().state(), AppState::Stopped);

    let log = log.borrow();
    assert_eq!(log.arrivals.len(), 89);
    // First arrival one interval after start, plus the link delay.
    let interval = Duration::from_micros(11200);
    assert_eq!(
        log.arrivals[0].0,
        Duration::from_secs(1) + interval + Duration::from_millis(1)
    );
    // Constant link delay preserves the exact inter-packet spacing.
    for pair in log.arrivals.windows(2) {
        assert_eq!(pair[1].0 - pair[0].0, interval);
        assert_eq!(pair[1].1, 1400);
    }
}

#[test]
fn sampler_reports_8b_over_n_for_an_even_spread() {
    let network = lossless(Duration::from_millis(1));
    let mut sched = Scheduler::new();
    let target = endpoint(1, 9);

    let sink = PacketSink::install(
        &network,
        &mut sched,
        target,
        Duration::ZERO,
        Duration::from_secs(60),
    )
    .unwrap();
    let sampler =
        ThroughputSampler::install(&mut sched, sink.clone(), Duration::from_secs(1)).unwrap();

    // B = 7200 bytes spread evenly across N = 6 intervals.
    let (total_bytes, intervals) = (7200usize, 6u64);
    let per_interval = total_bytes / intervals as usize;
    for k in 0..intervals {
        let network = network.clone();
        sched
            .schedule_at(
                Duration::from_millis(k * 1000 + 300),
                Box::new(move |s| {
                    let packet = Packet::udp(
                        endpoint(2, 49153),
                        target,
                        Bytes::from(vec![0u8; per_interval]),
                    );
                    network.send(s, target, packet)
                }),
            )
            .unwrap();
    }

    sched.run_until(Duration::from_secs(6)).unwrap();

    let sampler = sampler.borrow();
    assert_eq!(sampler.samples().len(), 6);
    for sample in sampler.samples() {
        assert_eq!(sample.bits as usize, 8 * total_bytes / intervals as usize);
    }
    assert_eq!(
        sink.borrow().total_received_bytes(),
        total_bytes as u64
    );
}

#[test]
fn sink_counter_is_monotone_across_samples() {
    let network = lossless(Duration::from_millis(1));
    let mut sched = Scheduler::new();
    let target = endpoint(1, 9);
    let sink = PacketSink::install(
        &network,
        &mut sched,
        target,
        Duration::ZERO,
        Duration::from_secs(60),
    )
    .unwrap();

    let observed = Rc::new(RefCell::new(Vec::new()));
    for k in 1..=10u64 {
        let sink = sink.clone();
        let observed = observed.clone();
        let network = network.clone();
        sched
            .schedule_at(
                Duration::from_millis(k * 100),
                Box::new(move |s| {
                    observed
                        .borrow_mut()
                        .push(sink.borrow().total_received_bytes());
                    // Burst sizes vary; the cumulative counter must not dip.
                    let size = (k % 3) as usize * 200;
                    if size > 0 {
                        let packet =
                            Packet::udp(endpoint(2, 49153), target, Bytes::from(vec![0u8; size]));
                        network.send(s, target, packet)?;
                    }
                    Ok(())
                }),
            )
            .unwrap();
    }

    sched.run_until(Duration::from_secs(2)).unwrap();
    let observed = observed.borrow();
    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
}
