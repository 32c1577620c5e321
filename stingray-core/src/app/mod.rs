//! Application state machines driven by the scheduler.
//!
//! Every application follows the same lifecycle: created Idle by the
//! scenario builder, Active at its start-time, Stopped at its stop-time,
//! with both transitions fired as scheduler events. Higher-level stop
//! semantics are implemented by scheduling the stop event, never by
//! pre-emptively halting in-flight callbacks.

mod generator;
mod relay;
mod sampler;
mod sink;

use std::net::SocketAddrV4;
use std::time::Duration;

pub use generator::{OnOffGenerator, TrafficProfile};
pub use relay::InterceptRelay;
pub use sampler::{ThroughputSample, ThroughputSampler};
pub use sink::PacketSink;

use crate::{Result, StingrayError};

/// Lifecycle state of an application endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Active,
    Stopped,
}

/// An application's bound endpoint and scheduled lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    pub local: SocketAddrV4,
    pub start: Duration,
    pub stop: Duration,
    pub state: AppState,
}

impl Lifecycle {
    /// Creates an Idle lifecycle.
    ///
    /// # Errors
    ///
    /// - `StingrayError::InvalidLifetime` - If `stop` precedes `start`
    pub fn new(local: SocketAddrV4, start: Duration, stop: Duration) -> Result<Self> {
        if stop < start {
            return Err(StingrayError::InvalidLifetime {
                reason: format!("stop {stop:?} precedes start {start:?} for {local}"),
            });
        }
        Ok(Self {
            local,
            start,
            stop,
            state: AppState::Idle,
        })
    }

    /// Whether the application is currently accepting/producing traffic.
    pub fn is_active(&self) -> bool {
        self.state == AppState::Active
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn stop_before_start_is_rejected() {
        let local = SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, 2), 9);
        let result = Lifecycle::new(local, Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(result, Err(StingrayError::InvalidLifetime { .. })));

        // Zero-length lifetimes are allowed.
        assert!(Lifecycle::new(local, Duration::from_secs(5), Duration::from_secs(5)).is_ok());
    }
}
