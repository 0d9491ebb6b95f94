//! The distance-vector control plane: seeds direct routes, solicits and
//! answers full-table exchanges, processes advertisements with the +1 hop
//! rule, and ages out silent neighbors' routes.

use log::{debug, trace};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::device::{DataLink, Interface};
use crate::error::Result;
use crate::protocol::ethernet::{ETHERTYPE_IPV4, EthernetFrame, MacAddr};
use crate::protocol::ipv4::{Ipv4Packet, PROTOCOL_UDP};
use crate::protocol::rip::{COMMAND_REQUEST, COMMAND_RESPONSE, RipMessage};
use crate::protocol::udp::UdpDatagram;
use crate::table::{Merge, RouteTable, apply_mask};
use crate::{INFINITY_METRIC, RIP_MULTICAST, RIP_PORT, ROUTE_TIMEOUT};

/// Routing engine attached to one router's interfaces and shared table.
pub struct RipEngine<L: DataLink> {
    link: Arc<L>,
    interfaces: Vec<Interface>,
    table: Arc<RwLock<RouteTable>>,
}

impl<L: DataLink> RipEngine<L> {
    pub fn new(link: Arc<L>, interfaces: Vec<Interface>, table: Arc<RwLock<RouteTable>>) -> Self {
        Self {
            link,
            interfaces,
            table,
        }
    }

    /// Seeds one direct route per attached interface: destination
    /// `ip & mask`, no gateway, metric 0, immune to aging.
    pub async fn seed_direct(&self) {
        let mut table = self.table.write().await;
        for iface in &self.interfaces {
            table.insert(
                iface.network(),
                iface.mask,
                Ipv4Addr::UNSPECIFIED,
                &iface.name,
                0,
                true,
            );
            debug!("direct route {} via {}", iface.network(), iface.name);
        }
    }

    /// Broadcasts a full-table request on every interface at startup.
    pub async fn solicit(&self) -> Result<()> {
        let request = RipMessage::request();
        for iface in &self.interfaces {
            self.send_rip(iface, &request, RIP_MULTICAST, MacAddr::BROADCAST)
                .await?;
        }
        Ok(())
    }

    /// Unsolicited full-table advertisement on every interface.
    pub async fn advertise_all(&self) -> Result<()> {
        let entries = self.table.read().await.export();
        let response = RipMessage::response(entries);
        for iface in &self.interfaces {
            self.send_rip(iface, &response, RIP_MULTICAST, MacAddr::BROADCAST)
                .await?;
        }
        Ok(())
    }

    /// Retires learned routes that have gone stale.
    pub async fn sweep(&self) {
        let removed = self.table.write().await.expire(ROUTE_TIMEOUT, Instant::now());
        if removed > 0 {
            debug!("expired {removed} stale route(s)");
        }
    }

    /// Digests one RIP datagram that arrived on `ingress`. `src_mac` and
    /// `src_ip` identify the neighbor for unicast replies and as the
    /// gateway of anything it advertises.
    pub async fn handle(
        &self,
        ingress: &Interface,
        src_mac: MacAddr,
        src_ip: Ipv4Addr,
        datagram: UdpDatagram,
    ) -> Result<()> {
        // Suppress our own multicasts reflected back at us.
        if self.interfaces.iter().any(|iface| iface.ip == src_ip) {
            return Ok(());
        }
        if datagram.dst_port != RIP_PORT {
            return Ok(());
        }
        let mut cursor = datagram.payload;
        let message = match RipMessage::decode(&mut cursor) {
            Ok(message) => message,
            Err(e) => {
                debug!("undecodable RIP payload from {src_ip}: {e}");
                return Ok(());
            }
        };

        match message.command {
            COMMAND_REQUEST => {
                trace!("request from {src_ip} on {}", ingress.name);
                let entries = self.table.read().await.export();
                self.send_rip(ingress, &RipMessage::response(entries), src_ip, src_mac)
                    .await
            }
            COMMAND_RESPONSE => {
                let mut changed = false;
                {
                    let mut table = self.table.write().await;
                    for entry in &message.entries {
                        let metric = u32::min(INFINITY_METRIC, entry.metric + 1);
                        let destination = apply_mask(entry.address, entry.mask);
                        if metric < INFINITY_METRIC {
                            match table.merge(destination, entry.mask, src_ip, &ingress.name, metric)
                            {
                                Merge::Installed | Merge::Replaced => changed = true,
                                Merge::Refreshed | Merge::Ignored => {}
                            }
                        } else {
                            table.mark_unreachable(destination, entry.mask, src_ip, &ingress.name);
                        }
                    }
                }
                if changed {
                    debug!("table changed, triggered update on {}", ingress.name);
                    let entries = self.table.read().await.export();
                    self.send_rip(
                        ingress,
                        &RipMessage::response(entries),
                        RIP_MULTICAST,
                        MacAddr::BROADCAST,
                    )
                    .await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Wraps `message` in UDP/IPv4/Ethernet and transmits it on `iface`.
    async fn send_rip(
        &self,
        iface: &Interface,
        message: &RipMessage,
        dst_ip: Ipv4Addr,
        dst_mac: MacAddr,
    ) -> Result<()> {
        let datagram = UdpDatagram {
            src_port: RIP_PORT,
            dst_port: RIP_PORT,
            payload: message.encode(),
        };
        let mut packet = Ipv4Packet::new(iface.ip, dst_ip, PROTOCOL_UDP, 1, datagram.encode());
        packet.fill_checksum();
        let frame = EthernetFrame {
            dst: dst_mac,
            src: iface.mac,
            ethertype: ETHERTYPE_IPV4,
            payload: packet.encode(),
        };
        self.link.transmit(&iface.name, &frame.encode()).await?;
        Ok(())
    }
}
