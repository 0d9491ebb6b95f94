//! Ethernet II framing and hardware addresses.

use crate::error::RouteError;
use bytes::{BufMut, Bytes, BytesMut};
use garnet_binary::{BinaryReader, Result};
use std::fmt;

/// Ethertype for IPv4 payloads; everything else is rejected at ingress.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Serialized header size: two addresses and the ethertype.
pub const HEADER_LEN: usize = 14;

/// A 48-bit hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Parses `aa:bb:cc:dd:ee:ff` (colons optional).
    pub fn parse(s: &str) -> std::result::Result<Self, RouteError> {
        let compact: String = s.split(':').collect();
        let raw = hex::decode(&compact).map_err(|_| RouteError::InvalidMac(s.to_string()))?;
        let octets: [u8; 6] = raw
            .try_into()
            .map_err(|_| RouteError::InvalidMac(s.to_string()))?;
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One Ethernet II frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Bytes,
}

impl EthernetFrame {
    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        let mut dst = [0u8; 6];
        reader.read_exact(&mut dst)?;
        let mut src = [0u8; 6];
        reader.read_exact(&mut src)?;
        let ethertype = reader.read_u16()?;
        let len = reader.len();
        let payload = reader.read_bytes(len)?;
        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype,
            payload,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&self.dst.0);
        buf.put_slice(&self.src.0);
        buf.put_u16(self.ethertype);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
