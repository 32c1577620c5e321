//! Centralized configuration for Stingray.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::net::LinkProfile;

/// Central configuration for all Stingray components.
///
/// Groups related settings into logical sections; scenario builders pass
/// this through to the core components they construct.
#[derive(Debug, Clone, Default)]
pub struct StingrayConfig {
    pub links: LinkConfig,
    pub sampler: SamplerConfig,
    pub report: ReportConfig,
}

/// Link characteristics for the simulated access network.
///
/// Radio links carry UE/eNB/attacker traffic; the backhaul carries the
/// core-network side (PGW, remote host, gateway addresses).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// One-way delay on radio links
    pub radio_delay: Duration,
    /// Packet loss probability on radio links (0.0 to 1.0)
    pub radio_loss_rate: f64,
    /// One-way delay on the point-to-point backhaul
    pub backhaul_delay: Duration,
    /// Packet loss probability on the backhaul
    pub backhaul_loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            radio_delay: Duration::from_millis(2),
            radio_loss_rate: 0.01, // 1% packet loss
            backhaul_delay: Duration::from_millis(10),
            backhaul_loss_rate: 0.0,
        }
    }
}

impl LinkConfig {
    /// Radio-side link profile.
    pub fn radio(&self) -> LinkProfile {
        LinkProfile {
            delay: self.radio_delay,
            loss_rate: self.radio_loss_rate,
        }
    }

    /// Backhaul-side link profile.
    pub fn backhaul(&self) -> LinkProfile {
        LinkProfile {
            delay: self.backhaul_delay,
            loss_rate: self.backhaul_loss_rate,
        }
    }

    /// Lossless variant used by tests that assert exact packet counts.
    pub fn lossless() -> Self {
        Self {
            radio_loss_rate: 0.0,
            backhaul_loss_rate: 0.0,
            ..Self::default()
        }
    }
}

/// Throughput sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Interval between throughput samples
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Flow report configuration.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Packet size used to express lost bytes as lost packets
    pub nominal_packet_size: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            nominal_packet_size: 1400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossless_links_keep_their_delays() {
        let config = LinkConfig::lossless();
        assert_eq!(config.radio().loss_rate, 0.0);
        assert_eq!(config.backhaul().loss_rate, 0.0);
        assert_eq!(config.radio().delay, LinkConfig::default().radio_delay);
    }
}
