//! Wire formats the router speaks: Ethernet II framing, IPv4, UDP and the
//! RIPv2 advertisement message.

pub mod ethernet;
pub mod ipv4;
pub mod rip;
pub mod udp;

pub use ethernet::{ETHERTYPE_IPV4, EthernetFrame, MacAddr};
pub use ipv4::{Ipv4Packet, PROTOCOL_UDP};
pub use rip::{COMMAND_REQUEST, COMMAND_RESPONSE, RipEntry, RipMessage};
pub use udp::UdpDatagram;
