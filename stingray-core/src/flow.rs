//! Header-based flow classification and per-flow statistics.
//!
//! Classification is independent of which generator or sink a packet
//! belongs to: in attack scenarios the number of logical senders can exceed
//! the number of declared sinks and traffic may be deliberately mis-routed,
//! so flow identity is recovered purely from packet headers.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::trace;

use crate::net::{Packet, Protocol};

/// Direction of a packet observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Unique identifier of a flow: the 5-tuple derived from a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl FlowKey {
    /// Reserved key for packets whose header cannot be classified, so lost
    /// classification capacity shows up in the statistics instead of
    /// disappearing silently.
    pub const UNCLASSIFIED: FlowKey = FlowKey {
        src: Ipv4Addr::UNSPECIFIED,
        dst: Ipv4Addr::UNSPECIFIED,
        src_port: 0,
        dst_port: 0,
        protocol: Protocol::Other(0),
    };

    /// Whether this is the reserved unclassified key.
    pub fn is_unclassified(&self) -> bool {
        *self == Self::UNCLASSIFIED
    }

    /// Derives a flow key from a packet, if its header is classifiable.
    ///
    /// Only UDP and TCP are in the monitored set; anything else (including
    /// headerless packets) classifies to `None`.
    pub fn classify(packet: &Packet) -> Option<FlowKey> {
        let header = packet.header?;
        match header.protocol {
            Protocol::Udp | Protocol::Tcp => Some(FlowKey {
                src: *header.src.ip(),
                dst: *header.dst.ip(),
                src_port: header.src.port(),
                dst_port: header.dst.port(),
                protocol: header.protocol,
            }),
            Protocol::Other(_) => None,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unclassified() {
            write!(f, "unclassified")
        } else {
            write!(
                f,
                "{}:{} -> {}:{}/{}",
                self.src, self.src_port, self.dst, self.dst_port, self.protocol
            )
        }
    }
}

/// Byte and packet counters for one flow.
///
/// Loss is derived, not stored: `transmitted - received`, kept signed so
/// that out-of-window arrivals (cross-flow contamination in MITM scenarios)
/// surface as negative loss instead of being clamped away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
}

impl FlowStats {
    /// Bytes lost in flight; negative under boundary conditions (§ report).
    pub fn lost_bytes(&self) -> i64 {
        self.tx_bytes as i64 - self.rx_bytes as i64
    }

    /// Lost bytes expressed in packets of the given nominal size, rounded
    /// toward zero.
    pub fn lost_packets(&self, nominal_packet_size: u32) -> i64 {
        if nominal_packet_size == 0 {
            return 0;
        }
        self.lost_bytes() / i64::from(nominal_packet_size)
    }
}

/// Classifies observed packets into flows and accumulates their statistics.
///
/// The statistics map is mutated by every generator and sink through the
/// transport tap; the scheduler's run-to-completion dispatch is the sole
/// synchronization mechanism, so no locking is involved.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    flows: HashMap<FlowKey, FlowStats>,
}

impl FlowMonitor {
    /// Creates an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one packet observation in the given direction.
    ///
    /// Packets that cannot be classified are counted against the reserved
    /// unclassified key rather than discarded.
    pub fn observe(&mut self, packet: &Packet, direction: Direction) {
        let key = FlowKey::classify(packet).unwrap_or(FlowKey::UNCLASSIFIED);
        if key.is_unclassified() {
            trace!(size = packet.size(), ?direction, "unclassifiable packet observed");
        }

        let stats = self.flows.entry(key).or_default();
        match direction {
            Direction::Tx => {
                stats.tx_bytes += packet.size() as u64;
                stats.tx_packets += 1;
            }
            Direction::Rx => {
                stats.rx_bytes += packet.size() as u64;
                stats.rx_packets += 1;
            }
        }
    }

    /// Returns a read-only copy of all flows observed so far.
    ///
    /// Callable at any point of a run, including after an aborted one.
    pub fn snapshot(&self) -> HashMap<FlowKey, FlowStats> {
        self.flows.clone()
    }

    /// Packets observed under the reserved unclassified key.
    pub fn unclassified_packets(&self) -> u64 {
        self.flows
            .get(&FlowKey::UNCLASSIFIED)
            .map(|stats| stats.tx_packets + stats.rx_packets)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddrV4;

    use bytes::Bytes;

    use super::*;

    fn udp_packet(src_port: u16, dst_port: u16, size: usize) -> Packet {
        Packet::udp(
            SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, 2), src_port),
            SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, 1), dst_port),
            Bytes::from(vec![0u8; size]),
        )
    }

    #[test]
    fn tx_and_rx_accumulate_per_flow() {
        let mut monitor = FlowMonitor::new();
        let packet = udp_packet(49153, 4321, 1400);

        monitor.observe(&packet, Direction::Tx);
        monitor.observe(&packet, Direction::Tx);
        monitor.observe(&packet, Direction::Rx);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 1);
        let stats = snapshot.values().next().unwrap();
        assert_eq!(stats.tx_bytes, 2800);
        assert_eq!(stats.rx_bytes, 1400);
        assert_eq!(stats.lost_bytes(), 1400);
        assert_eq!(stats.lost_packets(1400), 1);
    }

    #[test]
    fn destination_port_distinguishes_flows() {
        let mut monitor = FlowMonitor::new();
        monitor.observe(&udp_packet(49153, 4321, 100), Direction::Tx);
        monitor.observe(&udp_packet(49153, 4322, 100), Direction::Tx);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        for stats in snapshot.values() {
            assert_eq!(stats.tx_packets, 1);
        }
    }

    #[test]
    fn unclassifiable_packets_hit_the_reserved_key() {
        let mut monitor = FlowMonitor::new();
        monitor.observe(&Packet::opaque(Bytes::from_static(b"mystery")), Direction::Rx);

        let other = Packet {
            header: Some(crate::net::PacketHeader {
                src: SocketAddrV4::new(Ipv4Addr::new(1, 0, 0, 2), 1),
                dst: SocketAddrV4::new(Ipv4Addr::new(1, 0, 0, 1), 2),
                protocol: Protocol::Other(89),
            }),
            payload: Bytes::from_static(&[0u8; 20]),
        };
        monitor.observe(&other, Direction::Tx);

        assert_eq!(monitor.unclassified_packets(), 2);
        let snapshot = monitor.snapshot();
        let stats = snapshot.get(&FlowKey::UNCLASSIFIED).unwrap();
        assert_eq!(stats.rx_bytes, 7);
        assert_eq!(stats.tx_bytes, 20);
    }

    #[test]
    fn negative_loss_is_reported_not_clamped() {
        let mut monitor = FlowMonitor::new();
        let packet = udp_packet(49153, 4321, 500);

        // Rx without a matching Tx: arrival from outside the accounted window.
        monitor.observe(&packet, Direction::Rx);

        let snapshot = monitor.snapshot();
        let stats = snapshot.values().next().unwrap();
        assert_eq!(stats.lost_bytes(), -500);
        assert_eq!(stats.lost_packets(500), -1);
    }
}
