//! RIPv2 message codec: a 4-byte preamble followed by 20-byte route
//! entries (address family, route tag, address, mask, next hop, metric).

use bytes::{BufMut, Bytes, BytesMut};
use garnet_binary::{BinaryError, BinaryReader, Result};
use std::net::Ipv4Addr;

pub const COMMAND_REQUEST: u8 = 1;
pub const COMMAND_RESPONSE: u8 = 2;
pub const VERSION: u8 = 2;

const AF_INET: u16 = 2;
const ENTRY_LEN: usize = 20;

/// One advertised prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipEntry {
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

/// A request for the full table or a response carrying (part of) one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipMessage {
    pub command: u8,
    pub entries: Vec<RipEntry>,
}

impl RipMessage {
    /// A full-table request.
    pub fn request() -> Self {
        Self {
            command: COMMAND_REQUEST,
            entries: Vec::new(),
        }
    }

    pub fn response(entries: Vec<RipEntry>) -> Self {
        Self {
            command: COMMAND_RESPONSE,
            entries,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.entries.len() * ENTRY_LEN);
        buf.put_u8(self.command);
        buf.put_u8(VERSION);
        buf.put_u16(0);
        for entry in &self.entries {
            buf.put_u16(AF_INET);
            buf.put_u16(0);
            buf.put_u32(u32::from(entry.address));
            buf.put_u32(u32::from(entry.mask));
            buf.put_u32(u32::from(entry.next_hop));
            buf.put_u32(entry.metric);
        }
        buf.freeze()
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        let command = reader.read_u8()?;
        if command != COMMAND_REQUEST && command != COMMAND_RESPONSE {
            return Err(BinaryError::InvalidData(format!(
                "unknown RIP command {command}"
            )));
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(BinaryError::InvalidData(format!(
                "unsupported RIP version {version}"
            )));
        }
        let _reserved = reader.read_u16()?;

        let mut entries = Vec::new();
        while reader.len() > 0 {
            let _family = reader.read_u16()?;
            let _route_tag = reader.read_u16()?;
            let address = reader.read_ipv4()?;
            let mask = reader.read_ipv4()?;
            let next_hop = reader.read_ipv4()?;
            let metric = reader.read_u32()?;
            entries.push(RipEntry {
                address,
                mask,
                next_hop,
                metric,
            });
        }
        Ok(Self { command, entries })
    }
}
