//! UDP datagrams. The transport checksum is optional over IPv4 and this
//! network leaves it zero; integrity rides on the IPv4 header checksum.

use bytes::{BufMut, Bytes, BytesMut};
use garnet_binary::{BinaryError, BinaryReader, Result};

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Bytes,
}

impl UdpDatagram {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u16((HEADER_LEN + self.payload.len()) as u16);
        buf.put_u16(0);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        let src_port = reader.read_u16()?;
        let dst_port = reader.read_u16()?;
        let length = reader.read_u16()? as usize;
        let _checksum = reader.read_u16()?;
        let Some(body_len) = length.checked_sub(HEADER_LEN) else {
            return Err(BinaryError::InvalidData(format!(
                "UDP length {length} shorter than the header"
            )));
        };
        let payload = reader.read_bytes(body_len)?;
        Ok(Self {
            src_port,
            dst_port,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let datagram = UdpDatagram {
            src_port: 520,
            dst_port: 520,
            payload: Bytes::from_static(&[1, 2, 3, 4, 5]),
        };
        let mut raw = datagram.encode();
        assert_eq!(UdpDatagram::decode(&mut raw).unwrap(), datagram);
    }

    #[test]
    fn rejects_bad_length() {
        let mut raw = Bytes::from_static(&[0, 1, 0, 2, 0, 3, 0, 0]);
        assert!(UdpDatagram::decode(&mut raw).is_err());
    }
}
