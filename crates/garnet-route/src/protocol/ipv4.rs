//! IPv4 packets with the fixed 20-byte header (options are not carried on
//! this network and are rejected at decode).

use bytes::{BufMut, Bytes, BytesMut};
use garnet_binary::{BinaryError, BinaryReader, Result, internet_checksum};
use std::net::Ipv4Addr;

pub const HEADER_LEN: usize = 20;
pub const PROTOCOL_UDP: u8 = 17;

const VERSION_IHL: u8 = 0x45;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub tos: u8,
    pub ident: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    /// Stored header checksum; zero until [`Ipv4Packet::fill_checksum`].
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Bytes,
}

impl Ipv4Packet {
    /// Builds a packet with untouched type-of-service, identification and
    /// fragmentation fields; the checksum still has to be filled in.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ttl: u8, payload: Bytes) -> Self {
        Self {
            tos: 0,
            ident: 0,
            flags_fragment: 0,
            ttl,
            protocol,
            checksum: 0,
            src,
            dst,
            payload,
        }
    }

    fn put_header(&self, buf: &mut BytesMut, checksum: u16) {
        buf.put_u8(VERSION_IHL);
        buf.put_u8(self.tos);
        buf.put_u16((HEADER_LEN + self.payload.len()) as u16);
        buf.put_u16(self.ident);
        buf.put_u16(self.flags_fragment);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        buf.put_u16(checksum);
        buf.put_u32(u32::from(self.src));
        buf.put_u32(u32::from(self.dst));
    }

    /// Checksum of the header as it currently stands, field zeroed.
    pub fn header_checksum(&self) -> u16 {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        self.put_header(&mut buf, 0);
        internet_checksum(&buf)
    }

    pub fn fill_checksum(&mut self) {
        self.checksum = self.header_checksum();
    }

    /// Recomputes the header checksum with the field zeroed and compares
    /// it to the stored value.
    pub fn verify(&self) -> bool {
        self.header_checksum() == self.checksum
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.put_header(&mut buf, self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        let version_ihl = reader.read_u8()?;
        if version_ihl >> 4 != 4 {
            return Err(BinaryError::InvalidData(format!(
                "not an IPv4 packet: version {}",
                version_ihl >> 4
            )));
        }
        if version_ihl & 0x0f != 5 {
            return Err(BinaryError::InvalidData(
                "IPv4 options are not supported".to_string(),
            ));
        }
        let tos = reader.read_u8()?;
        let total_len = reader.read_u16()? as usize;
        let ident = reader.read_u16()?;
        let flags_fragment = reader.read_u16()?;
        let ttl = reader.read_u8()?;
        let protocol = reader.read_u8()?;
        let checksum = reader.read_u16()?;
        let src = reader.read_ipv4()?;
        let dst = reader.read_ipv4()?;

        let Some(body_len) = total_len.checked_sub(HEADER_LEN) else {
            return Err(BinaryError::InvalidData(format!(
                "total length {total_len} shorter than the header"
            )));
        };
        // Trailing link-layer padding past the declared length is legal.
        let payload = reader.read_bytes(body_len)?;

        Ok(Self {
            tos,
            ident,
            flags_fragment,
            ttl,
            protocol,
            checksum,
            src,
            dst,
            payload,
        })
    }
}
