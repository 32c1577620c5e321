//! Stingray Core - Discrete-event simulation engine for attack scenarios
//!
//! This crate provides the simulation core that the attack-scenario harness
//! runs on: a strictly time-ordered event scheduler, a header-based flow
//! classifier with per-flow statistics, a simulated transport with
//! per-endpoint subscriber lists, and the application state machines that
//! generate, receive, sample, and intercept traffic.

pub mod app;
pub mod config;
pub mod flow;
pub mod net;
pub mod report;
pub mod sim;
pub mod tracing_setup;

use std::net::SocketAddrV4;
use std::time::Duration;

// Re-export main types for convenient access
pub use app::{
    AppState, InterceptRelay, Lifecycle, OnOffGenerator, PacketSink, ThroughputSampler,
    TrafficProfile,
};
pub use config::StingrayConfig;
pub use flow::{Direction, FlowKey, FlowMonitor, FlowStats};
pub use net::{LinkProfile, Network, Packet, PacketHandler, PacketHeader, Protocol};
pub use report::FlowReport;
pub use sim::{EventHandle, RunSummary, Scheduler};

/// Errors that can occur while configuring or running a simulation.
///
/// Configuration errors (`InvalidTrafficProfile`, `InvalidLifetime`,
/// `BindConflict`) surface at setup time, before the scheduler starts.
/// `InvalidDelay` is rejected at the call site of `schedule`.
/// `CallbackFailure` aborts a run and carries the failing callback's error.
#[derive(Debug, thiserror::Error)]
pub enum StingrayError {
    /// Event fire-time behind the virtual clock, or an unusable delay value
    #[error("invalid delay: {reason}")]
    InvalidDelay {
        /// Why the delay was rejected
        reason: String,
    },

    /// Traffic generator configured with an unusable rate or packet size
    #[error("invalid traffic profile: {reason}")]
    InvalidTrafficProfile {
        /// Why the profile was rejected
        reason: String,
    },

    /// Application configured with a stop-time before its start-time
    #[error("invalid application lifetime: {reason}")]
    InvalidLifetime {
        /// Why the lifetime was rejected
        reason: String,
    },

    /// Listening endpoint is already exclusively bound
    #[error("endpoint {endpoint} is already bound")]
    BindConflict {
        /// The contested endpoint
        endpoint: SocketAddrV4,
    },

    /// A dispatched callback returned an error, aborting the run
    #[error("callback failed at {at:?}: {source}")]
    CallbackFailure {
        /// Virtual time at which the callback fired
        at: Duration,
        /// The error the callback returned
        #[source]
        source: Box<StingrayError>,
    },

    /// Scenario construction failed outside the taxonomy above
    #[error("scenario error: {reason}")]
    Scenario {
        /// Why the scenario could not be built
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, StingrayError>;
