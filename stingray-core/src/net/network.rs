//! Endpoint table, link profiles, and scheduled packet delivery.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::flow::{Direction, FlowMonitor};
use crate::sim::{DeterministicRng, Scheduler};
use crate::{Packet, Result, StingrayError};

/// Delay and loss characteristics of the link toward a destination.
#[derive(Debug, Clone, Copy)]
pub struct LinkProfile {
    pub delay: Duration,
    /// Probability in [0, 1] that a packet is dropped in flight
    pub loss_rate: f64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1),
            loss_rate: 0.0,
        }
    }
}

/// Receive-side observer attached to a listening endpoint.
///
/// Handlers run as scheduler callbacks: once per delivered packet, in
/// delivery order, never concurrently.
pub trait PacketHandler {
    /// Handles one delivered packet.
    ///
    /// # Errors
    ///
    /// An error aborts the run (`CallbackFailure` at the scheduler).
    fn on_receive(&mut self, sched: &mut Scheduler, packet: &Packet) -> Result<()>;
}

struct Binding {
    owned: bool,
    subscribers: Vec<Rc<RefCell<dyn PacketHandler>>>,
}

impl Binding {
    fn empty() -> Self {
        Self {
            owned: false,
            subscribers: Vec::new(),
        }
    }
}

struct NetworkState {
    bindings: HashMap<SocketAddrV4, Binding>,
    links: HashMap<Ipv4Addr, LinkProfile>,
    default_link: LinkProfile,
    monitor: Option<Rc<RefCell<FlowMonitor>>>,
    rng: DeterministicRng,
}

/// Simulated transport connecting application endpoints.
///
/// Each listening endpoint carries a subscriber list, so several independent
/// observers (a sink and an eavesdropping tap, say) can watch the same
/// endpoint. `bind` claims an endpoint exclusively; `subscribe` attaches an
/// additional observer without claiming it. Sends are delivered through the
/// scheduler after the destination link's delay, or silently dropped by its
/// loss draw; an installed flow monitor observes every send and delivery.
#[derive(Clone)]
pub struct Network {
    state: Rc<RefCell<NetworkState>>,
}

impl Network {
    /// Creates a network with the given default link profile and loss seed.
    pub fn new(default_link: LinkProfile, seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(NetworkState {
                bindings: HashMap::new(),
                links: HashMap::new(),
                default_link,
                monitor: None,
                rng: DeterministicRng::from_seed(seed),
            })),
        }
    }

    /// Overrides the link profile toward one destination address.
    pub fn set_link(&self, addr: Ipv4Addr, profile: LinkProfile) {
        self.state.borrow_mut().links.insert(addr, profile);
    }

    /// Installs the flow monitor as a transport-level tap observing every
    /// send (Tx) and every delivery (Rx).
    pub fn install_monitor(&self, monitor: Rc<RefCell<FlowMonitor>>) {
        self.state.borrow_mut().monitor = Some(monitor);
    }

    /// Exclusively binds a handler to a listening endpoint.
    ///
    /// # Errors
    ///
    /// - `StingrayError::BindConflict` - The endpoint is already bound
    pub fn bind(
        &self,
        endpoint: SocketAddrV4,
        handler: Rc<RefCell<dyn PacketHandler>>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let binding = state.bindings.entry(endpoint).or_insert_with(Binding::empty);
        if binding.owned {
            return Err(StingrayError::BindConflict { endpoint });
        }
        binding.owned = true;
        binding.subscribers.push(handler);
        debug!(%endpoint, "endpoint bound");
        Ok(())
    }

    /// Attaches an additional observer to an endpoint without claiming it.
    pub fn subscribe(&self, endpoint: SocketAddrV4, handler: Rc<RefCell<dyn PacketHandler>>) {
        let mut state = self.state.borrow_mut();
        state
            .bindings
            .entry(endpoint)
            .or_insert_with(Binding::empty)
            .subscribers
            .push(handler);
        debug!(%endpoint, "observer subscribed");
    }

    /// Sends a packet toward an endpoint.
    ///
    /// The send is observed as Tx immediately; delivery is scheduled after
    /// the destination link's delay unless the loss draw drops the packet.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidDelay` - The delivery time overflows the clock
    pub fn send(&self, sched: &mut Scheduler, to: SocketAddrV4, packet: Packet) -> Result<()> {
        let (profile, dropped, monitor) = {
            let mut state = self.state.borrow_mut();
            let profile = state
                .links
                .get(to.ip())
                .copied()
                .unwrap_or(state.default_link);
            let dropped = profile.loss_rate > 0.0 && state.rng.random_bool(profile.loss_rate);
            (profile, dropped, state.monitor.clone())
        };

        if let Some(monitor) = monitor {
            monitor.borrow_mut().observe(&packet, Direction::Tx);
        }

        if dropped {
            trace!(%to, size = packet.size(), "packet lost in flight");
            return Ok(());
        }

        let network = self.clone();
        sched.schedule_in(
            profile.delay,
            Box::new(move |s| network.deliver(s, to, packet)),
        )?;
        Ok(())
    }

    fn deliver(&self, sched: &mut Scheduler, to: SocketAddrV4, packet: Packet) -> Result<()> {
        let monitor = self.state.borrow().monitor.clone();
        if let Some(monitor) = monitor {
            monitor.borrow_mut().observe(&packet, Direction::Rx);
        }

        // Handlers are cloned out so a handler can use the network (forward,
        // re-send) without re-entering this borrow.
        let subscribers: Vec<Rc<RefCell<dyn PacketHandler>>> =
            match self.state.borrow().bindings.get(&to) {
                Some(binding) => binding.subscribers.clone(),
                None => {
                    trace!(%to, "packet arrived at an unbound endpoint");
                    return Ok(());
                }
            };

        for handler in subscribers {
            handler.borrow_mut().on_receive(sched, &packet)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    struct CountingHandler {
        received: Vec<(Duration, usize)>,
    }

    impl PacketHandler for CountingHandler {
        fn on_receive(&mut self, sched: &mut Scheduler, packet: &Packet) -> Result<()> {
            self.received.push((sched.now(), packet.size()));
            Ok(())
        }
    }

    fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last_octet), port)
    }

    #[test]
    fn delivery_happens_after_link_delay() {
        let network = Network::new(
            LinkProfile {
                delay: Duration::from_millis(10),
                loss_rate: 0.0,
            },
            42,
        );
        let mut sched = Scheduler::new();
        let handler = Rc::new(RefCell::new(CountingHandler {
            received: Vec::new(),
        }));
        network.bind(endpoint(1, 9), handler.clone()).unwrap();

        let packet = Packet::udp(endpoint(2, 49153), endpoint(1, 9), Bytes::from(vec![0u8; 100]));
        network.send(&mut sched, endpoint(1, 9), packet).unwrap();
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(
            handler.borrow().received,
            vec![(Duration::from_millis(10), 100)]
        );
    }

    #[test]
    fn double_bind_is_a_conflict() {
        let network = Network::new(LinkProfile::default(), 42);
        let handler = Rc::new(RefCell::new(CountingHandler {
            received: Vec::new(),
        }));

        network.bind(endpoint(1, 9), handler.clone()).unwrap();
        let result = network.bind(endpoint(1, 9), handler.clone());
        assert!(matches!(
            result,
            Err(StingrayError::BindConflict { endpoint: e }) if e == endpoint(1, 9)
        ));

        // A different port on the same address is fine.
        network.bind(endpoint(1, 10), handler).unwrap();
    }

    #[test]
    fn subscribers_observe_alongside_the_owner() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let owner = Rc::new(RefCell::new(CountingHandler {
            received: Vec::new(),
        }));
        let tap = Rc::new(RefCell::new(CountingHandler {
            received: Vec::new(),
        }));

        network.bind(endpoint(1, 9), owner.clone()).unwrap();
        network.subscribe(endpoint(1, 9), tap.clone());

        let packet = Packet::udp(endpoint(2, 49153), endpoint(1, 9), Bytes::from(vec![0u8; 50]));
        network.send(&mut sched, endpoint(1, 9), packet).unwrap();
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(owner.borrow().received.len(), 1);
        assert_eq!(tap.borrow().received.len(), 1);
    }

    #[test]
    fn full_loss_drops_every_packet() {
        let network = Network::new(
            LinkProfile {
                delay: Duration::from_millis(1),
                loss_rate: 1.0,
            },
            42,
        );
        let mut sched = Scheduler::new();
        let handler = Rc::new(RefCell::new(CountingHandler {
            received: Vec::new(),
        }));
        network.bind(endpoint(1, 9), handler.clone()).unwrap();

        for _ in 0..20 {
            let packet =
                Packet::udp(endpoint(2, 49153), endpoint(1, 9), Bytes::from(vec![0u8; 10]));
            network.send(&mut sched, endpoint(1, 9), packet).unwrap();
        }
        sched.run_until(Duration::from_secs(1)).unwrap();

        assert!(handler.borrow().received.is_empty());
    }
}
