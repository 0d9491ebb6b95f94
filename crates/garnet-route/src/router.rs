//! The router event loop: one task multiplexing frame arrivals with the
//! advertisement and expiry timers, feeding the control plane and the
//! forwarding plane.

use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Instant, interval_at};

use crate::arp::ArpCache;
use crate::device::{DataLink, Interface};
use crate::error::Result;
use crate::forward::Forwarder;
use crate::protocol::ethernet::{ETHERTYPE_IPV4, EthernetFrame};
use crate::protocol::ipv4::{Ipv4Packet, PROTOCOL_UDP};
use crate::protocol::udp::UdpDatagram;
use crate::rip::RipEngine;
use crate::table::RouteTable;
use crate::{RIP_PORT, SWEEP_INTERVAL, UPDATE_INTERVAL};

/// One virtual router: shared table, data plane, and (in dynamic mode) the
/// distance-vector control plane.
pub struct Router<L: DataLink> {
    link: Arc<L>,
    interfaces: Vec<Interface>,
    table: Arc<RwLock<RouteTable>>,
    forwarder: Forwarder,
    rip: Option<RipEngine<L>>,
}

impl<L: DataLink> Router<L> {
    /// A router that learns its table over RIP.
    pub fn dynamic(link: Arc<L>, interfaces: Vec<Interface>, arp: Arc<ArpCache>) -> Self {
        let table = Arc::new(RwLock::new(RouteTable::new()));
        let forwarder = Forwarder::new(
            interfaces.clone(),
            Arc::clone(&table),
            Arc::clone(&arp),
            true,
        );
        let rip = RipEngine::new(Arc::clone(&link), interfaces.clone(), Arc::clone(&table));
        Self {
            link,
            interfaces,
            table,
            forwarder,
            rip: Some(rip),
        }
    }

    /// A router running a fixed, preloaded table; no control plane.
    pub fn fixed(
        link: Arc<L>,
        interfaces: Vec<Interface>,
        arp: Arc<ArpCache>,
        table: RouteTable,
    ) -> Self {
        let table = Arc::new(RwLock::new(table));
        let forwarder = Forwarder::new(
            interfaces.clone(),
            Arc::clone(&table),
            Arc::clone(&arp),
            false,
        );
        Self {
            link,
            interfaces,
            table,
            forwarder,
            rip: None,
        }
    }

    /// Shared handle to the live table (snapshots for inspection).
    pub fn table(&self) -> Arc<RwLock<RouteTable>> {
        Arc::clone(&self.table)
    }

    /// Runs the router until the link dies.
    pub async fn run(&self) -> Result<()> {
        if let Some(rip) = &self.rip {
            rip.seed_direct().await;
            rip.solicit().await?;
            info!("distance-vector routing on {} interface(s)", self.interfaces.len());
        } else {
            info!("static routing on {} interface(s)", self.interfaces.len());
        }

        let mut advertise = interval_at(Instant::now() + UPDATE_INTERVAL, UPDATE_INTERVAL);
        let mut sweep = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
        loop {
            tokio::select! {
                inbound = self.link.receive() => {
                    match inbound {
                        Ok((iface, frame)) => self.handle_frame(&iface, frame).await,
                        Err(e) => {
                            error!("link receive failed: {e}");
                            return Err(e.into());
                        }
                    }
                }
                _ = advertise.tick(), if self.rip.is_some() => {
                    if let Some(rip) = &self.rip {
                        if let Err(e) = rip.advertise_all().await {
                            warn!("periodic advertisement failed: {e}");
                        }
                    }
                }
                _ = sweep.tick(), if self.rip.is_some() => {
                    if let Some(rip) = &self.rip {
                        rip.sweep().await;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, iface_name: &str, raw: Bytes) {
        let Some(ingress) = self.interfaces.iter().find(|i| i.name == iface_name) else {
            debug!("frame on unknown interface {iface_name}");
            return;
        };
        let mut cursor = raw;
        let Ok(frame) = EthernetFrame::decode(&mut cursor) else {
            return;
        };
        if frame.ethertype != ETHERTYPE_IPV4 {
            return;
        }
        let mut body = frame.payload.clone();
        let Ok(packet) = Ipv4Packet::decode(&mut body) else {
            return;
        };

        if let Some(rip) = &self.rip {
            if packet.protocol == PROTOCOL_UDP {
                let mut udp_body = packet.payload.clone();
                if let Ok(datagram) = UdpDatagram::decode(&mut udp_body) {
                    if datagram.dst_port == RIP_PORT {
                        if let Err(e) = rip.handle(ingress, frame.src, packet.src, datagram).await {
                            warn!("control-plane handling failed: {e}");
                        }
                        return;
                    }
                }
            }
        }

        if let Some((egress, out)) = self.forwarder.process(ingress, packet).await {
            if let Err(e) = self.link.transmit(&egress, &out).await {
                warn!("transmit on {egress} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::MacAddr;
    use std::future::Future;
    use std::io;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// One end of a point-to-point wire. Frames transmitted on `local`
    /// pop out of the peer's receive queue tagged with the peer's
    /// interface name; transmissions on any other interface go nowhere.
    struct WireEnd {
        local: String,
        peer_iface: String,
        tx: mpsc::UnboundedSender<(String, Bytes)>,
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(String, Bytes)>>,
    }

    fn wire(a_iface: &str, b_iface: &str) -> (Arc<WireEnd>, Arc<WireEnd>) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Arc::new(WireEnd {
            local: a_iface.to_string(),
            peer_iface: b_iface.to_string(),
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
        });
        let b = Arc::new(WireEnd {
            local: b_iface.to_string(),
            peer_iface: a_iface.to_string(),
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
        });
        (a, b)
    }

    impl DataLink for WireEnd {
        fn transmit(
            &self,
            iface: &str,
            frame: &[u8],
        ) -> impl Future<Output = io::Result<()>> + Send {
            if iface == self.local {
                let _ = self
                    .tx
                    .send((self.peer_iface.clone(), Bytes::copy_from_slice(frame)));
            }
            async move { Ok(()) }
        }

        fn receive(&self) -> impl Future<Output = io::Result<(String, Bytes)>> + Send {
            async move {
                self.rx
                    .lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "wire cut"))
            }
        }
    }

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

    async fn has_route(
        table: &Arc<RwLock<RouteTable>>,
        prefix: &str,
        gateway: &str,
        metric: u32,
    ) -> bool {
        let table = table.read().await;
        table.entries().iter().any(|e| {
            e.destination == ip(prefix) && e.gateway == ip(gateway) && e.metric == metric
        })
    }

    #[tokio::test(start_paused = true)]
    async fn two_routers_learn_each_others_stub_prefixes() {
        let (wire_a, wire_b) = wire("eth0", "eth0");

        // Each router has the shared wire plus one stub LAN.
        let r1_ifaces = vec![iface("eth0", "192.168.0.1", 1), iface("lan0", "10.0.1.1", 2)];
        let r2_ifaces = vec![iface("eth0", "192.168.0.2", 3), iface("lan0", "10.0.2.1", 4)];

        let r1 = Router::dynamic(wire_a, r1_ifaces, Arc::new(ArpCache::new()));
        let r2 = Router::dynamic(wire_b, r2_ifaces, Arc::new(ArpCache::new()));
        let t1 = r1.table();
        let t2 = r2.table();

        let run1 = tokio::spawn(async move { r1.run().await });
        let run2 = tokio::spawn(async move { r2.run().await });

        let mut converged = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if has_route(&t1, "10.0.2.0", "192.168.0.2", 1).await
                && has_route(&t2, "10.0.1.0", "192.168.0.1", 1).await
            {
                converged = true;
                break;
            }
        }
        assert!(converged, "both routers learn the far stub prefix at metric 1");

        // Shared-wire prefixes stay direct, never replaced by the neighbor.
        assert!(has_route(&t1, "192.168.0.0", "0.0.0.0", 0).await);
        assert!(has_route(&t2, "192.168.0.0", "0.0.0.0", 0).await);

        run1.abort();
        run2.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_neighbor_routes_expire_but_directs_remain() {
        let (wire_a, wire_b) = wire("eth0", "eth0");
        let r1 = Router::dynamic(
            wire_a,
            vec![iface("eth0", "192.168.0.1", 1), iface("lan0", "10.0.1.1", 2)],
            Arc::new(ArpCache::new()),
        );
        let r2 = Router::dynamic(
            wire_b,
            vec![iface("eth0", "192.168.0.2", 3), iface("lan0", "10.0.2.1", 4)],
            Arc::new(ArpCache::new()),
        );
        let t1 = r1.table();

        let run1 = tokio::spawn(async move { r1.run().await });
        let run2 = tokio::spawn(async move { r2.run().await });

        let mut learned = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if has_route(&t1, "10.0.2.0", "192.168.0.2", 1).await {
                learned = true;
                break;
            }
        }
        assert!(learned);

        // Silence the neighbor; its routes must age out within the timeout
        // plus one sweep, while r1's own prefixes survive.
        run2.abort();
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert!(!has_route(&t1, "10.0.2.0", "192.168.0.2", 1).await);
        assert!(has_route(&t1, "10.0.1.0", "0.0.0.0", 0).await);
        assert!(has_route(&t1, "192.168.0.0", "0.0.0.0", 0).await);

        run1.abort();
    }
}
