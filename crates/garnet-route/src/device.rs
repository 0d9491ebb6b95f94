//! Interfaces and the frame-level link the router runs on.

use bytes::Bytes;
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::protocol::ethernet::MacAddr;
use crate::table::apply_mask;

/// Largest frame a virtual link will carry.
const MAX_FRAME: usize = 65_535;

/// One attached network interface, injected by the host program.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddr,
}

impl Interface {
    /// The directly attached prefix: `ip & mask`.
    pub fn network(&self) -> Ipv4Addr {
        apply_mask(self.ip, self.mask)
    }
}

/// Frame-level send/receive over a set of named interfaces. Received
/// frames are tagged with the ingress interface.
pub trait DataLink: Send + Sync + 'static {
    fn transmit(&self, iface: &str, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn receive(&self) -> impl Future<Output = io::Result<(String, Bytes)>> + Send;
}

/// Virtual wires for the lab topology: each interface is a UDP socket with
/// a fixed far endpoint, and Ethernet frames travel as UDP payloads.
pub struct UdpDataLink {
    ports: HashMap<String, (Arc<UdpSocket>, SocketAddr)>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<(String, Bytes)>>,
}

impl UdpDataLink {
    /// Binds one socket per `(interface, local bind, far endpoint)` triple
    /// and starts a reader task for each.
    pub async fn open(endpoints: &[(String, SocketAddr, SocketAddr)]) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut ports = HashMap::new();
        for (name, bind, peer) in endpoints {
            let socket = Arc::new(UdpSocket::bind(bind).await?);
            debug!("interface {name}: {bind} <-> {peer}");
            ports.insert(name.clone(), (Arc::clone(&socket), *peer));

            let reader_tx = tx.clone();
            let reader_name = name.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; MAX_FRAME];
                loop {
                    match socket.recv_from(&mut buf).await {
                        Ok((len, _)) => {
                            let frame = Bytes::copy_from_slice(&buf[..len]);
                            if reader_tx.send((reader_name.clone(), frame)).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("receive on {reader_name} failed: {e}");
                            return;
                        }
                    }
                }
            });
        }
        Ok(Self {
            ports,
            inbound: tokio::sync::Mutex::new(rx),
        })
    }
}

impl DataLink for UdpDataLink {
    fn transmit(&self, iface: &str, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let Some((socket, peer)) = self.ports.get(iface) else {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such interface: {iface}"),
                ));
            };
            socket.send_to(frame, peer).await?;
            Ok(())
        }
    }

    fn receive(&self) -> impl Future<Output = io::Result<(String, Bytes)>> + Send {
        async move {
            self.inbound
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "all links closed"))
        }
    }
}
