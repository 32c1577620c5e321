//! Virtual time and event scheduling.
//!
//! The scheduler is the only source of concurrency in the harness: all
//! component logic runs as non-preemptible callbacks dispatched strictly in
//! fire-time order, and "suspension" is expressed only as scheduling a
//! future event and returning.

mod clock;
mod scheduler;

pub use clock::{duration_from_secs, DeterministicRng, VirtualClock};
pub use scheduler::{EventCallback, EventHandle, RunSummary, Scheduler};
