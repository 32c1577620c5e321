//! Interception relay for MITM and eavesdropping scenarios.

use std::cell::RefCell;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info};

use super::{AppState, Lifecycle};
use crate::net::{Network, PacketHandler};
use crate::sim::Scheduler;
use crate::{Packet, Result};

/// Receive-triggered handler positioned to observe traffic meant for
/// another party.
///
/// Invoked once per delivered packet, in delivery order, with no buffering
/// beyond what the transport provides. It logs each intercepted size;
/// forwarding toward a second endpoint is a configuration option, not part
/// of interception itself.
pub struct InterceptRelay {
    lifecycle: Lifecycle,
    forward_to: Option<SocketAddrV4>,
    network: Network,
    intercepted: Vec<usize>,
}

impl InterceptRelay {
    /// Exclusively binds the relay to its listening endpoint.
    ///
    /// # Errors
    ///
    /// - `StingrayError::BindConflict` - Port already bound; surfaced here
    ///   at setup time, never at first packet arrival
    /// - `StingrayError::InvalidLifetime` - Stop-time before start-time
    pub fn bind(
        network: &Network,
        sched: &mut Scheduler,
        local: SocketAddrV4,
        forward_to: Option<SocketAddrV4>,
        start: Duration,
        stop: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        let relay = Self::build(network, sched, local, forward_to, start, stop)?;
        network.bind(local, relay.clone())?;
        debug!(%local, ?forward_to, "relay bound");
        Ok(relay)
    }

    /// Attaches the relay as a passive tap on an endpoint someone else
    /// owns: the eavesdropper's variant, which never forwards.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidLifetime` - Stop-time before start-time
    pub fn tap(
        network: &Network,
        sched: &mut Scheduler,
        endpoint: SocketAddrV4,
        start: Duration,
        stop: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        let relay = Self::build(network, sched, endpoint, None, start, stop)?;
        network.subscribe(endpoint, relay.clone());
        debug!(%endpoint, "tap subscribed");
        Ok(relay)
    }

    fn build(
        network: &Network,
        sched: &mut Scheduler,
        local: SocketAddrV4,
        forward_to: Option<SocketAddrV4>,
        start: Duration,
        stop: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        let relay = Rc::new(RefCell::new(Self {
            lifecycle: Lifecycle::new(local, start, stop)?,
            forward_to,
            network: network.clone(),
            intercepted: Vec::new(),
        }));

        let on_start = relay.clone();
        sched.schedule_at(
            start,
            Box::new(move |_| {
                on_start.borrow_mut().lifecycle.state = AppState::Active;
                Ok(())
            }),
        )?;
        let on_stop = relay.clone();
        sched.schedule_at(
            stop,
            Box::new(move |_| {
                on_stop.borrow_mut().lifecycle.state = AppState::Stopped;
                Ok(())
            }),
        )?;
        Ok(relay)
    }

    /// Sizes of intercepted packets, in delivery order.
    pub fn intercepted(&self) -> &[usize] {
        &self.intercepted
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        self.lifecycle.state
    }
}

impl PacketHandler for InterceptRelay {
    fn on_receive(&mut self, sched: &mut Scheduler, packet: &Packet) -> Result<()> {
        if !self.lifecycle.is_active() {
            return Ok(());
        }

        info!(size = packet.size(), "intercepted packet");
        self.intercepted.push(packet.size());

        if let Some(target) = self.forward_to {
            let forwarded = Packet::udp(self.lifecycle.local, target, packet.payload.clone());
            self.network.send(sched, target, forwarded)?;
        }
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
        SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, last_octet), port)
    }

    fn send_sized(network: &Network, sched: &mut Scheduler, to: SocketAddrV4, size: usize) {
        let packet = Packet::udp(endpoint(9, 49153), to, Bytes::from(vec![0u8; size]));
        network.send(sched, to, packet).unwrap();
    }

    #[test]
    fn intercepts_in_delivery_order_with_exact_sizes() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let relay = InterceptRelay::bind(
            &network,
            &mut sched,
            endpoint(1, 1234),
            None,
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        for size in [100usize, 200, 300] {
            send_sized(&network, &mut sched, endpoint(1, 1234), size);
        }
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(relay.borrow().intercepted(), &[100, 200, 300]);
    }

    #[test]
    fn bind_conflict_surfaces_at_setup() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        InterceptRelay::bind(
            &network,
            &mut sched,
            endpoint(1, 1234),
            None,
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        let result = InterceptRelay::bind(
            &network,
            &mut sched,
            endpoint(1, 1234),
            None,
            Duration::ZERO,
            Duration::from_secs(10),
        );
        assert!(matches!(result, Err(StingrayError::BindConflict { .. })));
    }

    #[test]
    fn forwarding_re_emits_toward_the_target() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let target = endpoint(2, 5678);
        let relay = InterceptRelay::bind(
            &network,
            &mut sched,
            endpoint(1, 1234),
            Some(target),
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();
        let downstream = InterceptRelay::bind(
            &network,
            &mut sched,
            target,
            None,
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        send_sized(&network, &mut sched, endpoint(1, 1234), 1400);
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(relay.borrow().intercepted(), &[1400]);
        assert_eq!(downstream.borrow().intercepted(), &[1400]);
    }
}
