//! Virtual topology: node roles, addressing, and placement.
//!
//! Addresses are assigned in fixed per-role blocks and treated as opaque
//! configuration by the core. Placement mirrors the reference layout:
//! base stations at the origin, terminals at a uniformly drawn distance,
//! adversaries on a row-first grid.

use std::net::Ipv4Addr;

use stingray_core::config::LinkConfig;
use stingray_core::sim::DeterministicRng;
use stingray_core::Network;
use tracing::debug;

use crate::ScenarioConfig;

/// Role of a node in the access network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Base station
    Enb,
    /// Mobile terminal
    Ue,
    /// Adversary node
    Attacker,
    /// Packet gateway of the core network
    Pgw,
    /// Host on the far side of the backhaul
    RemoteHost,
}

/// Planar position of a node, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node of the virtual topology.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub role: NodeRole,
    pub address: Ipv4Addr,
    pub position: Position,
}

/// Grid layout used for adversary placement (row-first).
const GRID_WIDTH: usize = 5;
const GRID_SPACING: f64 = 10.0;

fn block_address(base: [u8; 3], index: usize) -> Ipv4Addr {
    Ipv4Addr::new(base[0], base[1], base[2], (index + 1) as u8)
}

/// The built topology: every node with its role, address, and position.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Default gateway address the terminals route through
    pub gateway: Ipv4Addr,
    pub pgw: Node,
    pub remote_host: Node,
    pub enbs: Vec<Node>,
    pub ues: Vec<Node>,
    pub attackers: Vec<Node>,
}

impl Topology {
    /// Builds the topology for a scenario configuration.
    ///
    /// Terminal distances are drawn from the seeded RNG, so the same seed
    /// reproduces the same layout.
    pub fn build(config: &ScenarioConfig, rng: &mut DeterministicRng) -> Self {
        let gateway = Ipv4Addr::new(7, 0, 0, 1);

        let pgw = Node {
            role: NodeRole::Pgw,
            address: block_address([1, 0, 0], 0),
            position: Position { x: 0.0, y: 0.0 },
        };
        let remote_host = Node {
            role: NodeRole::RemoteHost,
            address: block_address([1, 0, 0], 1),
            position: Position { x: 0.0, y: 0.0 },
        };

        let enbs = (0..config.num_enb)
            .map(|i| Node {
                role: NodeRole::Enb,
                address: block_address([10, 0, 0], i),
                position: Position { x: 0.0, y: 0.0 },
            })
            .collect();

        let ues = (0..config.num_ue)
            .map(|i| Node {
                role: NodeRole::Ue,
                // 7.0.0.1 is the gateway, terminals start at .2
                address: block_address([7, 0, 0], i + 1),
                position: Position {
                    x: rng.random_range(config.min_distance, config.max_distance),
                    y: 0.0,
                },
            })
            .collect();

        let attackers = (0..config.num_attackers)
            .map(|i| Node {
                role: NodeRole::Attacker,
                address: block_address([10, 1, 1], i),
                position: Position {
                    x: (i % GRID_WIDTH) as f64 * GRID_SPACING,
                    y: (i / GRID_WIDTH) as f64 * GRID_SPACING,
                },
            })
            .collect();

        let topology = Self {
            gateway,
            pgw,
            remote_host,
            enbs,
            ues,
            attackers,
        };
        debug!(
            enbs = topology.enbs.len(),
            ues = topology.ues.len(),
            attackers = topology.attackers.len(),
            "topology built"
        );
        topology
    }

    /// Applies link profiles to the network: radio toward access-side
    /// addresses (terminals, base stations, adversaries, and the gateway
    /// they reach over the air), backhaul toward the core network.
    pub fn apply_links(&self, network: &Network, links: &LinkConfig) {
        let radio = links.radio();
        let backhaul = links.backhaul();

        network.set_link(self.gateway, radio);
        network.set_link(self.pgw.address, backhaul);
        network.set_link(self.remote_host.address, backhaul);
        for node in self.enbs.iter().chain(&self.ues).chain(&self.attackers) {
            network.set_link(node.address, radio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressing_follows_the_role_blocks() {
        let config = ScenarioConfig {
            num_enb: 2,
            num_ue: 3,
            num_attackers: 7,
            ..ScenarioConfig::default()
        };
        let mut rng = DeterministicRng::from_seed(config.seed);
        let topology = Topology::build(&config, &mut rng);

        assert_eq!(topology.gateway, Ipv4Addr::new(7, 0, 0, 1));
        assert_eq!(topology.ues[0].address, Ipv4Addr::new(7, 0, 0, 2));
        assert_eq!(topology.ues[2].address, Ipv4Addr::new(7, 0, 0, 4));
        assert_eq!(topology.enbs[1].address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(topology.attackers[0].address, Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(topology.pgw.address, Ipv4Addr::new(1, 0, 0, 1));
        assert_eq!(topology.remote_host.address, Ipv4Addr::new(1, 0, 0, 2));
    }

    #[test]
    fn terminal_placement_is_seeded() {
        let config = ScenarioConfig {
            num_ue: 5,
            ..ScenarioConfig::default()
        };
        let mut rng1 = DeterministicRng::from_seed(7);
        let mut rng2 = DeterministicRng::from_seed(7);

        let first = Topology::build(&config, &mut rng1);
        let second = Topology::build(&config, &mut rng2);

        for (a, b) in first.ues.iter().zip(&second.ues) {
            assert_eq!(a.position, b.position);
            assert!(a.position.x >= config.min_distance);
            assert!(a.position.x < config.max_distance);
        }
    }

    #[test]
    fn adversaries_fill_the_grid_row_first() {
        let config = ScenarioConfig {
            num_attackers: 7,
            ..ScenarioConfig::default()
        };
        let mut rng = DeterministicRng::from_seed(1);
        let topology = Topology::build(&config, &mut rng);

        assert_eq!(topology.attackers[0].position, Position { x: 0.0, y: 0.0 });
        assert_eq!(topology.attackers[4].position, Position { x: 40.0, y: 0.0 });
        assert_eq!(topology.attackers[5].position, Position { x: 0.0, y: 10.0 });
    }
}
