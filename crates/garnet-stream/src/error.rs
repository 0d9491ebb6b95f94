use garnet_binary::BinaryError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the transport state machines.
#[derive(Error, Debug)]
pub enum StreamError {
    /// An I/O error on the underlying datagram link.
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),

    /// A wire unit could not be serialized or parsed.
    #[error("wire format error: {0}")]
    Binary(#[from] BinaryError),

    /// The peer never answered the opening handshake.
    #[error("no handshake reply within the timeout")]
    HandshakeTimeout,

    /// A segment was retransmitted too many times; the transfer is dead.
    #[error("segment {seq} exceeded the retransmission limit")]
    RetransmitLimit { seq: u32 },
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, StreamError>;
