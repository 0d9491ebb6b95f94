//! The unreliable datagram channel the transport runs on.

use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::UdpSocket;

/// Largest datagram the transport will read at once.
const MAX_DATAGRAM: usize = 65_535;

/// An unreliable, unordered datagram channel.
///
/// The state machines only ever send whole datagrams and receive whole
/// datagrams; everything about sockets stays behind this seam.
pub trait Link: Send + Sync + 'static {
    /// Sends one datagram.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Receives the next datagram.
    fn recv(&self) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// [`Link`] over a UDP socket.
///
/// The sending side fixes its peer up front; the receiving side learns the
/// peer from the first inbound datagram and replies there for the rest of
/// the transfer.
pub struct UdpLink {
    socket: UdpSocket,
    peer: OnceLock<SocketAddr>,
}

impl UdpLink {
    /// Binds `local_port` with a fixed remote peer (sender side).
    pub async fn connect(local_port: u16, peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        let link = Self {
            socket,
            peer: OnceLock::new(),
        };
        let _ = link.peer.set(peer);
        Ok(link)
    }

    /// Binds `local_port` and waits to learn the peer (receiver side).
    pub async fn bind(local_port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        Ok(Self {
            socket,
            peer: OnceLock::new(),
        })
    }
}

impl Link for UdpLink {
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let Some(peer) = self.peer.get() else {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no peer learned yet",
                ));
            };
            self.socket.send_to(datagram, peer).await?;
            Ok(())
        }
    }

    fn recv(&self) -> impl Future<Output = io::Result<Bytes>> + Send {
        async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let _ = self.peer.set(from);
            buf.truncate(len);
            Ok(Bytes::from(buf))
        }
    }
}
