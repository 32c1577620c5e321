//! End-of-run flow report.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::config::ReportConfig;
use crate::flow::{FlowKey, FlowStats};
use crate::sim::RunSummary;
use crate::StingrayError;

/// Per-flow row of the final report.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    /// Human-readable flow identifier (5-tuple or "unclassified")
    pub flow: String,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_bytes: i64,
    pub lost_packets: i64,
    /// Negative loss: arrivals from outside the accounted window
    pub anomalous: bool,
}

/// Final per-flow statistics of a run.
///
/// Always distinguishes a completed run (reached the horizon) from an
/// aborted one; an aborted run's report is explicitly marked incomplete
/// but still carries the statistics collected up to the failure.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub completed: bool,
    /// Failure description for aborted runs
    pub failure: Option<String>,
    /// Virtual time covered by the run, in seconds
    pub sim_time_secs: f64,
    pub events_dispatched: u64,
    pub flows: Vec<FlowRecord>,
}

impl FlowReport {
    /// Builds the report for a run that reached its horizon.
    pub fn completed(
        snapshot: &HashMap<FlowKey, FlowStats>,
        summary: &RunSummary,
        config: &ReportConfig,
    ) -> Self {
        Self {
            completed: true,
            failure: None,
            sim_time_secs: summary.elapsed.as_secs_f64(),
            events_dispatched: summary.events_dispatched,
            flows: Self::records(snapshot, config),
        }
    }

    /// Builds the incomplete report for a run aborted mid-flight.
    pub fn aborted(
        snapshot: &HashMap<FlowKey, FlowStats>,
        at: Duration,
        events_dispatched: u64,
        error: &StingrayError,
        config: &ReportConfig,
    ) -> Self {
        Self {
            completed: false,
            failure: Some(error.to_string()),
            sim_time_secs: at.as_secs_f64(),
            events_dispatched,
            flows: Self::records(snapshot, config),
        }
    }

    fn records(snapshot: &HashMap<FlowKey, FlowStats>, config: &ReportConfig) -> Vec<FlowRecord> {
        let mut keys: Vec<&FlowKey> = snapshot.keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let stats = snapshot[key];
                let lost_bytes = stats.lost_bytes();
                FlowRecord {
                    flow: key.to_string(),
                    tx_bytes: stats.tx_bytes,
                    rx_bytes: stats.rx_bytes,
                    tx_packets: stats.tx_packets,
                    rx_packets: stats.rx_packets,
                    lost_bytes,
                    lost_packets: stats.lost_packets(config.nominal_packet_size),
                    anomalous: lost_bytes < 0,
                }
            })
            .collect()
    }

    /// Generates a human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        if self.completed {
            let _ = writeln!(
                summary,
                "Flow report ({:.1}s simulated, {} events)",
                self.sim_time_secs, self.events_dispatched
            );
        } else {
            let _ = writeln!(
                summary,
                "Flow report - INCOMPLETE, aborted at {:.3}s: {}",
                self.sim_time_secs,
                self.failure.as_deref().unwrap_or("unknown failure")
            );
        }

        if self.flows.is_empty() {
            summary.push_str("  no flows observed\n");
        }
        for record in &self.flows {
            let _ = writeln!(
                summary,
                "  {} - transmitted: {} bytes, received: {} bytes, lost: {} bytes, lost packets: {}{}",
                record.flow,
                record.tx_bytes,
                record.rx_bytes,
                record.lost_bytes,
                record.lost_packets,
                if record.anomalous {
                    " [negative loss: out-of-window arrivals]"
                } else {
                    ""
                }
            );
        }
        summary
    }
}
