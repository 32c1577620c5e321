//! Simulated transport: packets, endpoints, links, and delivery.

mod network;
mod packet;

pub use network::{LinkProfile, Network, PacketHandler};
pub use packet::{Packet, PacketHeader, Protocol};
