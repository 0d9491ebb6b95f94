//! Extension trait for checked reads from a [`bytes::Buf`].
//!
//! All multi-byte integers are network order (big-endian). Writing goes
//! through `BufMut` directly since `BytesMut` grows on demand and cannot
//! fail; reading is where a truncated datagram has to surface as an error
//! instead of a panic.

use crate::error::{BinaryError, Result};
use bytes::{Buf, Bytes};
use std::net::Ipv4Addr;

macro_rules! check_remaining {
    ($buf:expr, $len:expr) => {
        let needed = $len;
        let remaining = $buf.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
    };
}

/// Extension trait over [`Buf`] providing bounds-checked network-order reads.
pub trait BinaryReader: Buf {
    /// Reads a single `u8`.
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    /// Reads a `u16` in network order.
    #[inline]
    fn read_u16(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16())
    }

    /// Reads a `u32` in network order.
    #[inline]
    fn read_u32(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32())
    }

    /// Reads a `u64` in network order.
    #[inline]
    fn read_u64(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64())
    }

    /// Reads an `i64` in network order.
    #[inline]
    fn read_i64(&mut self) -> Result<i64> {
        check_remaining!(self, 8);
        Ok(self.get_i64())
    }

    /// Reads an IPv4 address (4 bytes, network order).
    #[inline]
    fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        check_remaining!(self, 4);
        Ok(Ipv4Addr::from(self.get_u32()))
    }

    /// Fills `dst` from the buffer.
    #[inline]
    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        check_remaining!(self, dst.len());
        self.copy_to_slice(dst);
        Ok(())
    }

    /// Reads `len` bytes out of the buffer.
    #[inline]
    fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        check_remaining!(self, len);
        Ok(self.copy_to_bytes(len))
    }
}

impl<B: Buf + ?Sized> BinaryReader for B {}
