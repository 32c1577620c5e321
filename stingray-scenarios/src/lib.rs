//! Stingray Scenarios - Pre-built attack scenarios for the simulation core.
//!
//! Constructs virtual topologies of base stations, mobile terminals, and
//! adversary nodes, wires traffic generators, sinks, samplers, and relays
//! onto them, and hands control to the event scheduler. Three scenarios are
//! provided: a denial-of-service flood against the gateway, a
//! man-in-the-middle relay between a terminal and the gateway, and a
//! passive eavesdropper on a downlink stream.

mod attack;
pub mod topology;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use stingray_core::config::{ReportConfig, StingrayConfig};
use stingray_core::{
    FlowMonitor, FlowReport, InterceptRelay, Network, OnOffGenerator, PacketSink, Scheduler,
    ThroughputSampler,
};
use tracing::{error, info};

pub use attack::{
    dos_flood, eavesdrop, mitm_relay, ATTACK_PORT, ECHO_PORT, INTERCEPT_PORT, RELAY_PORT,
};
pub use topology::{Node, NodeRole, Position, Topology};

/// Knobs shared by all scenarios, defaulting to the reference parameters.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Number of base stations
    pub num_enb: usize,
    /// Number of mobile terminals
    pub num_ue: usize,
    /// Number of adversary nodes
    pub num_attackers: usize,
    /// Total simulated duration in seconds
    pub sim_time_secs: f64,
    /// Seed for terminal placement and link-loss draws
    pub seed: u64,
    /// Minimum terminal distance from the base station
    pub min_distance: f64,
    /// Maximum terminal distance from the base station
    pub max_distance: f64,
    /// Flood rate per attacker in bits per second
    pub attack_rate_bps: u64,
    /// Flood packet size in bytes
    pub attack_packet_size: usize,
    /// Streaming rate of the intercepted terminal in bits per second
    pub stream_rate_bps: u64,
    /// Streaming packet size in bytes
    pub stream_packet_size: usize,
    /// Inter-packet interval of the downlink client
    pub client_interval: Duration,
    /// Downlink client packet size in bytes
    pub client_packet_size: usize,
    /// Emission cap of the downlink client
    pub client_max_packets: u64,
    /// Core component configuration
    pub core: StingrayConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            num_enb: 1,
            num_ue: 1,
            num_attackers: 5,
            sim_time_secs: 10.0,
            seed: 42,
            min_distance: 10.0,
            max_distance: 150.0,
            attack_rate_bps: 1_000_000_000, // 1 Gb/s per attacker
            attack_packet_size: 1400,
            stream_rate_bps: 1_000_000, // 1 Mb/s
            stream_packet_size: 1400,
            client_interval: Duration::from_millis(100),
            client_packet_size: 1024,
            client_max_packets: 1000,
            core: StingrayConfig::default(),
        }
    }
}

/// A fully wired scenario, ready to run to its horizon.
pub struct Scenario {
    pub name: &'static str,
    pub scheduler: Scheduler,
    pub network: Network,
    pub monitor: Rc<RefCell<FlowMonitor>>,
    pub topology: Topology,
    pub horizon: Duration,
    pub report_config: ReportConfig,
    pub sink: Rc<RefCell<PacketSink>>,
    pub generators: Vec<Rc<RefCell<OnOffGenerator>>>,
    pub sampler: Option<Rc<RefCell<ThroughputSampler>>>,
    pub relay: Option<Rc<RefCell<InterceptRelay>>>,
}

impl Scenario {
    /// Runs the scenario to its horizon and builds the flow report.
    ///
    /// A mid-run failure aborts the dispatch loop; the report is then
    /// explicitly marked incomplete but still carries every statistic
    /// collected up to the failure.
    pub fn run(&mut self) -> FlowReport {
        info!(
            scenario = self.name,
            horizon_secs = self.horizon.as_secs_f64(),
            "scenario started"
        );

        match self.scheduler.run_until(self.horizon) {
            Ok(summary) => {
                info!(
                    scenario = self.name,
                    events = summary.events_dispatched,
                    "scenario completed"
                );
                FlowReport::completed(
                    &self.monitor.borrow().snapshot(),
                    &summary,
                    &self.report_config,
                )
            }
            Err(failure) => {
                error!(scenario = self.name, %failure, "scenario aborted");
                FlowReport::aborted(
                    &self.monitor.borrow().snapshot(),
                    self.scheduler.now(),
                    self.scheduler.events_dispatched(),
                    &failure,
                    &self.report_config,
                )
            }
        }
    }
}
