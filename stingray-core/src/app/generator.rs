//! On/Off traffic source.

use std::cell::RefCell;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{AppState, Lifecycle};
use crate::net::Network;
use crate::sim::Scheduler;
use crate::{Packet, Result, StingrayError};

/// Traffic shape of an On/Off source.
///
/// With `on_period` unset the source degenerates to a constant-rate client;
/// `max_packets` caps total emissions for fixed-count clients.
#[derive(Debug, Clone, Copy)]
pub struct TrafficProfile {
    pub peer: SocketAddrV4,
    pub data_rate_bps: u64,
    pub packet_size: usize,
    pub on_period: Option<Duration>,
    pub off_period: Duration,
    pub max_packets: Option<u64>,
}

impl TrafficProfile {
    /// Constant-rate profile: always on, no emission cap.
    pub fn constant_rate(peer: SocketAddrV4, data_rate_bps: u64, packet_size: usize) -> Self {
        Self {
            peer,
            data_rate_bps,
            packet_size,
            on_period: None,
            off_period: Duration::ZERO,
            max_packets: None,
        }
    }

    /// Fixed-interval client profile: one `packet_size` packet every
    /// `interval`, up to `max_packets` emissions.
    pub fn fixed_interval(
        peer: SocketAddrV4,
        interval: Duration,
        packet_size: usize,
        max_packets: u64,
    ) -> Self {
        let interval_nanos = interval.as_nanos().max(1);
        let data_rate_bps = ((packet_size as u128 * 8 * 1_000_000_000) / interval_nanos) as u64;
        Self {
            peer,
            data_rate_bps,
            packet_size,
            on_period: None,
            off_period: Duration::ZERO,
            max_packets: Some(max_packets),
        }
    }

    /// Validates the profile at configuration time.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidTrafficProfile` - Zero rate or packet size,
    ///   a rate too high to schedule distinct emissions, or a zero on-period
    pub fn validate(&self) -> Result<()> {
        if self.data_rate_bps == 0 {
            return Err(StingrayError::InvalidTrafficProfile {
                reason: "data rate must be positive".to_string(),
            });
        }
        if self.packet_size == 0 {
            return Err(StingrayError::InvalidTrafficProfile {
                reason: "packet size must be positive".to_string(),
            });
        }
        if self.emission_interval().is_zero() {
            return Err(StingrayError::InvalidTrafficProfile {
                reason: format!(
                    "data rate {} bps leaves no time between {}-byte packets",
                    self.data_rate_bps, self.packet_size
                ),
            });
        }
        if self.on_period.is_some_and(|on| on.is_zero()) {
            return Err(StingrayError::InvalidTrafficProfile {
                reason: "on-period must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Time between consecutive emissions at the configured rate.
    pub fn emission_interval(&self) -> Duration {
        let nanos = (self.packet_size as u128 * 8 * 1_000_000_000) / self.data_rate_bps as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Traffic generator alternating between sending and idle periods.
///
/// On activation it schedules its first emission one interval after the
/// start-time; each emission hands a packet to the transport and schedules
/// its successor, until the successor would land past the stop-time, the
/// emission cap is reached, or the explicit stop event fires first.
pub struct OnOffGenerator {
    lifecycle: Lifecycle,
    profile: TrafficProfile,
    network: Network,
    payload: Bytes,
    sending: bool,
    /// Bumped on every pause so emissions scheduled before an off-period
    /// cannot leak into the next on-window.
    epoch: u64,
    sent_packets: u64,
}

impl OnOffGenerator {
    /// Validates the configuration, registers the lifecycle events, and
    /// returns the installed generator.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidTrafficProfile` - Unusable rate or size
    /// - `StingrayError::InvalidLifetime` - Stop-time before start-time
    pub fn install(
        network: &Network,
        sched: &mut Scheduler,
        local: SocketAddrV4,
        profile: TrafficProfile,
        start: Duration,
        stop: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        profile.validate()?;
        let lifecycle = Lifecycle::new(local, start, stop)?;
        let payload = Bytes::from(vec![0u8; profile.packet_size]);
        let generator = Rc::new(RefCell::new(Self {
            lifecycle,
            profile,
            network: network.clone(),
            payload,
            sending: false,
            epoch: 0,
            sent_packets: 0,
        }));

        let on_start = generator.clone();
        sched.schedule_at(start, Box::new(move |s| Self::activate(&on_start, s)))?;
        let on_stop = generator.clone();
        sched.schedule_at(
            stop,
            Box::new(move |_| {
                on_stop.borrow_mut().lifecycle.state = AppState::Stopped;
                Ok(())
            }),
        )?;

        debug!(%local, peer = %profile.peer, rate_bps = profile.data_rate_bps, "generator installed");
        Ok(generator)
    }

    /// Packets emitted so far.
    pub fn sent_packets(&self) -> u64 {
        self.sent_packets
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        self.lifecycle.state
    }

    fn activate(generator: &Rc<RefCell<Self>>, sched: &mut Scheduler) -> Result<()> {
        let (interval, on_period, epoch) = {
            let mut generator_ref = generator.borrow_mut();
            if generator_ref.lifecycle.state != AppState::Idle {
                return Ok(());
            }
            generator_ref.lifecycle.state = AppState::Active;
            generator_ref.sending = true;
            (
                generator_ref.profile.emission_interval(),
                generator_ref.profile.on_period,
                generator_ref.epoch,
            )
        };

        let on_emit = generator.clone();
        sched.schedule_in(interval, Box::new(move |s| Self::emit(&on_emit, s, epoch)))?;
        if let Some(on) = on_period {
            let on_pause = generator.clone();
            sched.schedule_in(on, Box::new(move |s| Self::pause(&on_pause, s)))?;
        }
        Ok(())
    }

    fn emit(generator: &Rc<RefCell<Self>>, sched: &mut Scheduler, epoch: u64) -> Result<()> {
        let (network, peer, packet) = {
            let generator_ref = generator.borrow();
            if generator_ref.lifecycle.state != AppState::Active
                || !generator_ref.sending
                || generator_ref.epoch != epoch
            {
                return Ok(());
            }
            let packet = Packet::udp(
                generator_ref.lifecycle.local,
                generator_ref.profile.peer,
                generator_ref.payload.clone(),
            );
            (
                generator_ref.network.clone(),
                generator_ref.profile.peer,
                packet,
            )
        };

        network.send(sched, peer, packet)?;
        trace!(%peer, at_secs = sched.now().as_secs_f64(), "packet emitted");

        let mut generator_ref = generator.borrow_mut();
        generator_ref.sent_packets += 1;
        if generator_ref
            .profile
            .max_packets
            .is_some_and(|max| generator_ref.sent_packets >= max)
        {
            generator_ref.lifecycle.state = AppState::Stopped;
            return Ok(());
        }

        let next = sched.now() + generator_ref.profile.emission_interval();
        if next > generator_ref.lifecycle.stop {
            generator_ref.lifecycle.state = AppState::Stopped;
            return Ok(());
        }
        drop(generator_ref);

        let on_emit = generator.clone();
        sched.schedule_at(next, Box::new(move |s| Self::emit(&on_emit, s, epoch)))?;
        Ok(())
    }

    fn pause(generator: &Rc<RefCell<Self>>, sched: &mut Scheduler) -> Result<()> {
        let (resume_at, stop) = {
            let mut generator_ref = generator.borrow_mut();
            if generator_ref.lifecycle.state != AppState::Active {
                return Ok(());
            }
            generator_ref.sending = false;
            generator_ref.epoch += 1;
            (
                sched.now() + generator_ref.profile.off_period,
                generator_ref.lifecycle.stop,
            )
        };

        if resume_at < stop {
            let on_resume = generator.clone();
            sched.schedule_at(resume_at, Box::new(move |s| Self::resume(&on_resume, s)))?;
        }
        Ok(())
    }

    fn resume(generator: &Rc<RefCell<Self>>, sched: &mut Scheduler) -> Result<()> {
        let (interval, on_period, epoch) = {
            let mut generator_ref = generator.borrow_mut();
            if generator_ref.lifecycle.state != AppState::Active {
                return Ok(());
            }
            generator_ref.sending = true;
            (
                generator_ref.profile.emission_interval(),
                generator_ref.profile.on_period,
                generator_ref.epoch,
            )
        };

        let on_emit = generator.clone();
        sched.schedule_in(interval, Box::new(move |s| Self::emit(&on_emit, s, epoch)))?;
        if let Some(on) = on_period {
            let on_pause = generator.clone();
            sched.schedule_in(on, Box::new(move |s| Self::pause(&on_pause, s)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::net::LinkProfile;

    fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, last_octet), port)
    }

    #[test]
    fn zero_rate_is_rejected() {
        let profile = TrafficProfile::constant_rate(endpoint(1, 4321), 0, 1400);
        assert!(matches!(
            profile.validate(),
            Err(StingrayError::InvalidTrafficProfile { .. })
        ));
    }

    #[test]
    fn zero_packet_size_is_rejected() {
        let profile = TrafficProfile::constant_rate(endpoint(1, 4321), 1_000_000, 0);
        assert!(matches!(
            profile.validate(),
            Err(StingrayError::InvalidTrafficProfile { .. })
        ));
    }

    #[test]
    fn emission_interval_is_exact_for_the_reference_profile() {
        // 1400-byte packets at 1 Mb/s: 11.2 ms between emissions.
        let profile = TrafficProfile::constant_rate(endpoint(1, 4321), 1_000_000, 1400);
        assert_eq!(profile.emission_interval(), Duration::from_micros(11200));
    }

    #[test]
    fn fixed_interval_round_trips() {
        let profile =
            TrafficProfile::fixed_interval(endpoint(1, 9), Duration::from_millis(100), 1024, 1000);
        assert_eq!(profile.emission_interval(), Duration::from_millis(100));
        assert_eq!(profile.max_packets, Some(1000));
    }

    #[test]
    fn generator_respects_stop_time() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let profile = TrafficProfile::constant_rate(endpoint(1, 4321), 1_000_000, 1400);
        let generator = OnOffGenerator::install(
            &network,
            &mut sched,
            endpoint(2, 49153),
            profile,
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .unwrap();

        sched.run_until(Duration::from_secs(5)).unwrap();

        // floor(1.0 / 0.0112) emissions fit between start and stop.
        assert_eq!(generator.borrow().sent_packets(), 89);
        assert_eq!(generator.borrow().state(), AppState::Stopped);
    }

    #[test]
    fn max_packet_cap_stops_the_generator() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        let profile =
            TrafficProfile::fixed_interval(endpoint(1, 9), Duration::from_millis(100), 1024, 3);
        let generator = OnOffGenerator::install(
            &network,
            &mut sched,
            endpoint(2, 49153),
            profile,
            Duration::ZERO,
            Duration::from_secs(10),
        )
        .unwrap();

        sched.run_until(Duration::from_secs(10)).unwrap();
        assert_eq!(generator.borrow().sent_packets(), 3);
        assert_eq!(generator.borrow().state(), AppState::Stopped);
    }

    #[test]
    fn off_periods_suppress_emissions() {
        let network = Network::new(LinkProfile::default(), 42);
        let mut sched = Scheduler::new();
        // 100 ms between packets, on for 1 s, off for 1 s.
        let mut profile =
            TrafficProfile::constant_rate(endpoint(1, 4321), 1024 * 8 * 10, 1024);
        profile.on_period = Some(Duration::from_secs(1));
        profile.off_period = Duration::from_secs(1);

        let generator = OnOffGenerator::install(
            &network,
            &mut sched,
            endpoint(2, 49153),
            profile,
            Duration::ZERO,
            Duration::from_secs(4),
        )
        .unwrap();

        sched.run_until(Duration::from_secs(4)).unwrap();

        // Two on-windows (0-1 s and 2-3 s), nine emissions each: the first
        // emission of a window lands one interval in, and the emission that
        // coincides with the pause loses the FIFO tie-break to it.
        let sent = generator.borrow().sent_packets();
        assert_eq!(sent, 18);
    }
}
