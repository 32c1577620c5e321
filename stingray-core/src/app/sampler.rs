//! Periodic throughput sampling of a packet sink.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::PacketSink;
use crate::sim::{EventHandle, Scheduler};
use crate::{Result, StingrayError};

/// Instantaneous bit-rate observed over one sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThroughputSample {
    /// Virtual time the sample was taken
    pub at: Duration,
    /// Bits received since the previous sample
    pub bits: u64,
}

/// Periodic task differentiating a sink's cumulative byte counter.
///
/// Each firing reports the bits received over the elapsed interval and
/// re-schedules itself, continuing until the simulation horizon or an
/// explicit [`cancel`](ThroughputSampler::cancel). The last-observed
/// counter is owned by the sampler instance, bound explicitly to one sink.
pub struct ThroughputSampler {
    sink: Rc<RefCell<PacketSink>>,
    interval: Duration,
    last_total: u64,
    samples: Vec<ThroughputSample>,
    pending: Option<EventHandle>,
}

impl ThroughputSampler {
    /// Installs the sampler; the first sample fires one interval from now.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidDelay` - Zero sampling interval
    pub fn install(
        sched: &mut Scheduler,
        sink: Rc<RefCell<PacketSink>>,
        interval: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        if interval.is_zero() {
            return Err(StingrayError::InvalidDelay {
                reason: "sampling interval must be positive".to_string(),
            });
        }

        let sampler = Rc::new(RefCell::new(Self {
            sink,
            interval,
            last_total: 0,
            samples: Vec::new(),
            pending: None,
        }));
        let on_tick = sampler.clone();
        let handle = sched.schedule_in(interval, Box::new(move |s| Self::tick(&on_tick, s)))?;
        sampler.borrow_mut().pending = Some(handle);
        Ok(sampler)
    }

    /// Stops the periodic task by cancelling its pending firing.
    pub fn cancel(&mut self, sched: &mut Scheduler) {
        if let Some(handle) = self.pending.take() {
            sched.cancel(handle);
        }
    }

    /// Samples collected so far, in time order.
    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    fn tick(sampler: &Rc<RefCell<Self>>, sched: &mut Scheduler) -> Result<()> {
        let mut sampler_ref = sampler.borrow_mut();
        let total = sampler_ref.sink.borrow().total_received_bytes();
        let bits = (total - sampler_ref.last_total) * 8;
        sampler_ref.last_total = total;

        info!(
            at_secs = sched.now().as_secs_f64(),
            throughput_bps = bits,
            "throughput sample"
        );
        sampler_ref.samples.push(ThroughputSample {
            at: sched.now(),
            bits,
        });

        let interval = sampler_ref.interval;
        let on_tick = sampler.clone();
        let handle = sched.schedule_in(interval, Box::new(move |s| Self::tick(&on_tick, s)))?;
        sampler_ref.pending = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use bytes::Bytes;

    use super::*;
    use crate::net::{LinkProfile, Network};
    use crate::Packet;

    fn endpoint(last_octet: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, last_octet), port)
    }

    fn sink_with_network(sched: &mut Scheduler) -> (Network, Rc<RefCell<PacketSink>>) {
        let network = Network::new(
            LinkProfile {
                delay: Duration::from_millis(1),
                loss_rate: 0.0,
            },
            42,
        );
        let sink = PacketSink::install(
            &network,
            sched,
            endpoint(1, 9),
            Duration::ZERO,
            Duration::from_secs(60),
        )
        .unwrap();
        (network, sink)
    }

    #[test]
    fn evenly_spread_bytes_sample_evenly() {
        let mut sched = Scheduler::new();
        let (network, sink) = sink_with_network(&mut sched);
        let sampler =
            ThroughputSampler::install(&mut sched, sink, Duration::from_secs(1)).unwrap();

        // 4000 bytes over 4 intervals: one 1000-byte packet mid-interval.
        for k in 0..4u64 {
            let at = Duration::from_millis(k * 1000 + 500);
            let network = network.clone();
            sched
                .schedule_at(
                    at,
                    Box::new(move |s| {
                        let packet = Packet::udp(
                            endpoint(2, 49153),
                            endpoint(1, 9),
                            Bytes::from(vec![0u8; 1000]),
                        );
                        network.send(s, endpoint(1, 9), packet)
                    }),
                )
                .unwrap();
        }

        sched.run_until(Duration::from_secs(4)).unwrap();

        let sampler = sampler.borrow();
        let bits: Vec<u64> = sampler.samples().iter().map(|sample| sample.bits).collect();
        assert_eq!(bits, vec![8000, 8000, 8000, 8000]);
    }

    #[test]
    fn cancellation_stops_the_periodic_task() {
        let mut sched = Scheduler::new();
        let (_network, sink) = sink_with_network(&mut sched);
        let sampler =
            ThroughputSampler::install(&mut sched, sink, Duration::from_secs(1)).unwrap();

        sched.run_until(Duration::from_millis(2500)).unwrap();
        assert_eq!(sampler.borrow().samples().len(), 2);

        sampler.borrow_mut().cancel(&mut sched);
        sched.run_until(Duration::from_secs(10)).unwrap();
        assert_eq!(sampler.borrow().samples().len(), 2);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut sched = Scheduler::new();
        let (_network, sink) = sink_with_network(&mut sched);
        let result = ThroughputSampler::install(&mut sched, sink, Duration::ZERO);
        assert!(matches!(result, Err(StingrayError::InvalidDelay { .. })));
    }
}
