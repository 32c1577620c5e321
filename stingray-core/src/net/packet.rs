//! Packet and header abstractions.

use std::fmt;
use std::net::SocketAddrV4;

use bytes::Bytes;

/// Transport protocol carried in a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
    /// Anything outside the monitored set, by IP protocol number
    Other(u8),
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Other(number) => write!(f, "proto-{number}"),
        }
    }
}

/// Parsable packet header: the 5-tuple a flow is classified from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub protocol: Protocol,
}

/// A simulated packet: an optional parsable header and an opaque payload.
///
/// Packets without a header (or with a protocol outside the monitored set)
/// still flow through the transport; the monitor accounts them under its
/// reserved unclassified key.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Option<PacketHeader>,
    pub payload: Bytes,
}

impl Packet {
    /// Creates a UDP packet between two endpoints.
    pub fn udp(src: SocketAddrV4, dst: SocketAddrV4, payload: Bytes) -> Self {
        Self {
            header: Some(PacketHeader {
                src,
                dst,
                protocol: Protocol::Udp,
            }),
            payload,
        }
    }

    /// Creates a packet whose header cannot be classified.
    pub fn opaque(payload: Bytes) -> Self {
        Self {
            header: None,
            payload,
        }
    }

    /// Returns the packet size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn udp_packet_carries_its_five_tuple() {
        let src = SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, 2), 49153);
        let dst = SocketAddrV4::new(Ipv4Addr::new(7, 0, 0, 1), 4321);
        let packet = Packet::udp(src, dst, Bytes::from_static(&[0u8; 64]));

        let header = packet.header.unwrap();
        assert_eq!(header.src, src);
        assert_eq!(header.dst, dst);
        assert_eq!(header.protocol, Protocol::Udp);
        assert_eq!(packet.size(), 64);
    }

    #[test]
    fn opaque_packet_has_no_header() {
        let packet = Packet::opaque(Bytes::from_static(b"noise"));
        assert!(packet.header.is_none());
        assert_eq!(packet.size(), 5);
    }
}
