//! Per-datagram forwarding pipeline: validate, age, look up, resolve,
//! rewrite. Every drop is silent.

use bytes::Bytes;
use log::trace;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::INFINITY_METRIC;
use crate::arp::ArpCache;
use crate::device::Interface;
use crate::protocol::ethernet::{ETHERTYPE_IPV4, EthernetFrame};
use crate::protocol::ipv4::Ipv4Packet;
use crate::table::RouteTable;

/// The data plane of the router.
pub struct Forwarder {
    interfaces: Vec<Interface>,
    table: Arc<RwLock<RouteTable>>,
    arp: Arc<ArpCache>,
    /// Learned-table mode: refuse to bounce a datagram out its ingress.
    dynamic: bool,
}

impl Forwarder {
    pub fn new(
        interfaces: Vec<Interface>,
        table: Arc<RwLock<RouteTable>>,
        arp: Arc<ArpCache>,
        dynamic: bool,
    ) -> Self {
        Self {
            interfaces,
            table,
            arp,
            dynamic,
        }
    }

    /// Runs one IPv4 datagram through the pipeline. Returns the egress
    /// interface name and the rewritten frame, or `None` for any drop.
    pub async fn process(&self, ingress: &Interface, mut packet: Ipv4Packet) -> Option<(String, Bytes)> {
        if !packet.verify() {
            trace!("dropping datagram with bad header checksum");
            return None;
        }
        if packet.ttl <= 1 {
            trace!("ttl expired for {}", packet.dst);
            return None;
        }
        packet.ttl -= 1;

        // Datagrams addressed to the router itself terminate here.
        if self.interfaces.iter().any(|iface| iface.ip == packet.dst) {
            return None;
        }

        let (egress_name, gateway) = {
            let table = self.table.read().await;
            let entry = table.lookup(packet.dst)?;
            if entry.metric >= INFINITY_METRIC {
                return None;
            }
            if self.dynamic && entry.iface == ingress.name {
                return None;
            }
            (entry.iface.clone(), entry.gateway)
        };
        let egress = self.interfaces.iter().find(|iface| iface.name == egress_name)?;

        let next_hop = if gateway.is_unspecified() {
            packet.dst
        } else {
            gateway
        };
        let dst_mac = self.arp.resolve(next_hop)?;

        packet.fill_checksum();
        let frame = EthernetFrame {
            dst: dst_mac,
            src: egress.mac,
            ethertype: ETHERTYPE_IPV4,
            payload: packet.encode(),
        };
        trace!("forwarding {} via {next_hop} on {egress_name}", frame.payload.len());
        Some((egress_name, frame.encode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::MacAddr;
    use crate::protocol::ipv4::PROTOCOL_UDP;
    use std::net::Ipv4Addr;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn iface(name: &str, addr: &str, last_mac: u8) -> Interface {
        Interface {
            name: name.to_string(),
            ip: ip(addr),
            mask: ip("255.255.255.0"),
            mac: MacAddr([0x02, 0, 0, 0, 0, last_mac]),
        }
    }

    fn packet(dst: &str, ttl: u8) -> Ipv4Packet {
        let mut packet = Ipv4Packet::new(
            ip("10.0.1.9"),
            ip(dst),
            PROTOCOL_UDP,
            ttl,
            Bytes::from_static(b"data"),
        );
        packet.fill_checksum();
        packet
    }

    async fn forwarder(dynamic: bool) -> (Forwarder, Interface) {
        let eth0 = iface("eth0", "10.0.1.1", 1);
        let eth1 = iface("eth1", "10.0.2.1", 2);
        let mut table = RouteTable::new();
        table.insert(ip("10.0.1.0"), ip("255.255.255.0"), Ipv4Addr::UNSPECIFIED, "eth0", 0, true);
        table.insert(ip("10.0.2.0"), ip("255.255.255.0"), Ipv4Addr::UNSPECIFIED, "eth1", 0, true);
        table.insert(ip("10.0.3.0"), ip("255.255.255.0"), ip("10.0.2.2"), "eth1", 1, false);
        table.insert(ip("10.0.4.0"), ip("255.255.255.0"), ip("10.0.2.3"), "eth1", INFINITY_METRIC, false);

        let arp = ArpCache::new();
        arp.insert(ip("10.0.2.9"), MacAddr([0x02, 0, 0, 0, 0, 0x29]));
        arp.insert(ip("10.0.2.2"), MacAddr([0x02, 0, 0, 0, 0, 0x22]));

        let forwarder = Forwarder::new(
            vec![eth0.clone(), eth1],
            Arc::new(RwLock::new(table)),
            Arc::new(arp),
            dynamic,
        );
        (forwarder, eth0)
    }

    #[tokio::test]
    async fn forwards_with_mac_rewrite_and_fresh_checksum() {
        let (forwarder, eth0) = forwarder(true).await;
        let (egress, raw) = forwarder.process(&eth0, packet("10.0.2.9", 64)).await.unwrap();
        assert_eq!(egress, "eth1");

        let mut cursor = raw;
        let frame = EthernetFrame::decode(&mut cursor).unwrap();
        assert_eq!(frame.dst, MacAddr([0x02, 0, 0, 0, 0, 0x29]));
        assert_eq!(frame.src, MacAddr([0x02, 0, 0, 0, 0, 2]));
        let mut body = frame.payload.clone();
        let out = Ipv4Packet::decode(&mut body).unwrap();
        assert_eq!(out.ttl, 63);
        assert!(out.verify());
    }

    #[tokio::test]
    async fn gateway_routes_resolve_the_gateway_not_the_destination() {
        let (forwarder, eth0) = forwarder(true).await;
        let (egress, raw) = forwarder.process(&eth0, packet("10.0.3.7", 64)).await.unwrap();
        assert_eq!(egress, "eth1");
        let mut cursor = raw;
        let frame = EthernetFrame::decode(&mut cursor).unwrap();
        assert_eq!(frame.dst, MacAddr([0x02, 0, 0, 0, 0, 0x22]));
    }

    #[tokio::test]
    async fn drops_everything_the_pipeline_rejects() {
        let (forwarder, eth0) = forwarder(true).await;

        let mut bent = packet("10.0.2.9", 64);
        bent.checksum ^= 0x0101;
        assert!(forwarder.process(&eth0, bent).await.is_none());

        assert!(forwarder.process(&eth0, packet("10.0.2.9", 1)).await.is_none());
        // Addressed to the router itself.
        assert!(forwarder.process(&eth0, packet("10.0.2.1", 64)).await.is_none());
        // No route.
        assert!(forwarder.process(&eth0, packet("172.16.0.1", 64)).await.is_none());
        // Route pinned at infinity.
        assert!(forwarder.process(&eth0, packet("10.0.4.7", 64)).await.is_none());
        // Next hop missing from the ARP cache.
        assert!(forwarder.process(&eth0, packet("10.0.2.123", 64)).await.is_none());
        // Would egress the ingress interface.
        assert!(forwarder.process(&eth0, packet("10.0.1.33", 64)).await.is_none());
    }

    #[tokio::test]
    async fn static_configuration_may_bounce_out_the_ingress() {
        let (forwarder, eth0) = forwarder(false).await;
        let arp = &forwarder.arp;
        arp.insert(ip("10.0.1.33"), MacAddr([0x02, 0, 0, 0, 0, 0x33]));
        let result = forwarder.process(&eth0, packet("10.0.1.33", 64)).await;
        assert!(result.is_some(), "hairpin allowed outside dynamic mode");
    }
}
