//! Passive packet receiver with cumulative counters.

use std::cell::RefCell;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use super::{AppState, Lifecycle};
use crate::net::{Network, PacketHandler};
use crate::sim::Scheduler;
use crate::{Packet, Result};

/// Passive receiver that counts everything delivered to its endpoint.
///
/// `total_received_bytes` is monotonically non-decreasing for the sink's
/// lifetime; the throughput sampler differentiates it.
pub struct PacketSink {
    lifecycle: Lifecycle,
    total_bytes: u64,
    total_packets: u64,
}

impl PacketSink {
    /// Binds the sink to its endpoint and registers its lifecycle events.
    ///
    /// # Errors
    ///
    /// - `StingrayError::BindConflict` - The endpoint is already bound
    /// - `StingrayError::InvalidLifetime` - Stop-time before start-time
    pub fn install(
        network: &Network,
        sched: &mut Scheduler,
        local: SocketAddrV4,
        start: Duration,
        stop: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        let sink = Rc::new(RefCell::new(Self {
            lifecycle: Lifecycle::new(local, start, stop)?,
            total_bytes: 0,
            total_packets: 0,
        }));
        network.bind(local, sink.clone())?;

        let on_start = sink.clone();
        sched.schedule_at(
            start,
            Box::new(move |_| {
                on_start.borrow_mut().lifecycle.state = AppState::Active;
                Ok(())
            }),
        )?;
        let on_stop = sink.clone();
        sched.schedule_at(
            stop,
            Box::new(move |_| {
                on_stop.borrow_mut().lifecycle.state = AppState::Stopped;
                Ok(())
            }),
        )?;

        debug!(%local, "sink installed");
        Ok(sink)
    }

    /// Cumulative bytes received while active.
    pub fn total_received_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Cumulative packets received while active.
    pub fn total_received_packets(&self) -> u64 {
        self.total_packets
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        self.lifecycle.state
    }
}

impl PacketHandler for PacketSink {
    fn on_receive(&mut self, _sched: &mut Scheduler, packet: &Packet) -> Result<()> {
        if !self.lifecycle.is_active() {
            trace!(local = %self.lifecycle.local, "packet ignored outside active window");
            return Ok(());
        }
        self.total_bytes += packet.size() as u64;
        self.total_packets += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use bytes::Bytes;

    use super::*;
    use crate::net::LinkProfile;
    use crate::StingrayError;

    fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, last_octet), port)
    }

    #[test]
    fn counters_grow_with_deliveries() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let sink = PacketSink::install(
            &network,
            &mut sched,
            endpoint(1, 9),
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        for size in [100usize, 200, 300] {
            let packet = Packet::udp(
                endpoint(2, 49153),
                endpoint(1, 9),
                Bytes::from(vec![0u8; size]),
            );
            network.send(&mut sched, endpoint(1, 9), packet).unwrap();
        }
        sched.run_until(Duration::from_secs(1)).unwrap();

        let sink = sink.borrow();
        assert_eq!(sink.total_received_bytes(), 600);
        assert_eq!(sink.total_received_packets(), 3);
    }

    #[test]
    fn packets_outside_the_active_window_are_ignored() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let sink = PacketSink::install(
            &network,
            &mut sched,
            endpoint(1, 9),
            Duration::from_secs(5),
            Duration::from_secs(10),
        )
        .unwrap();

        // Delivered around t=1ms, before the sink starts.
        let packet = Packet::udp(
            endpoint(2, 49153),
            endpoint(1, 9),
            Bytes::from(vec![0u8; 64]),
        );
        network.send(&mut sched, endpoint(1, 9), packet).unwrap();
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(sink.borrow().total_received_bytes(), 0);
    }

    #[test]
    fn second_sink_on_the_same_endpoint_conflicts() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        PacketSink::install(
            &network,
            &mut sched,
            endpoint(1, 9),
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        let result = PacketSink::install(
            &network,
            &mut sched,
            endpoint(1, 9),
            Duration::ZERO,
            Duration::from_secs(10),
        );
        assert!(matches!(result, Err(StingrayError::BindConflict { .. })));
    }
}
