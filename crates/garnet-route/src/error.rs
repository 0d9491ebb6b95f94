use garnet_binary::BinaryError;
use std::io;
use thiserror::Error;

/// Errors that can occur in the routing and forwarding planes.
#[derive(Error, Debug)]
pub enum RouteError {
    /// An I/O error on a virtual link.
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame or datagram could not be parsed or serialized.
    #[error("wire format error: {0}")]
    Binary(#[from] BinaryError),

    /// A MAC address string did not parse.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// A frame referenced an interface this router does not own.
    #[error("unknown interface: {0}")]
    UnknownInterface(String),
}

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, RouteError>;
