//! # Garnet Binary Utilities
//!
//! Checked reading of network-order (big-endian) wire data on top of the
//! `bytes` crate, shared by the transport and routing protocol crates, plus
//! the one's-complement checksum both wire formats use.

pub mod checksum;
pub mod error;
pub mod wire;

pub use checksum::internet_checksum;
pub use error::{BinaryError, Result};
pub use wire::BinaryReader;
