//! Wire unit of the transport: a fixed 22-byte header followed by payload.
//!
//! All fields are network order. The length-and-flags word packs the payload
//! length into bits 31..3 and the S|F|A flag triplet into bits 2..0, so
//! encoders have to touch both halves together. The checksum is the RFC 1071
//! one's-complement sum over the whole serialized unit with the checksum
//! field zeroed.

use bytes::{BufMut, Bytes, BytesMut};
use garnet_binary::{BinaryError, BinaryReader, Result, internet_checksum};

/// Serialized header size in bytes.
pub const HEADER_LEN: usize = 22;

/// Synchronize: opens a connection.
pub const FLAG_SYN: u8 = 0b100;
/// Finish: closes a connection.
pub const FLAG_FIN: u8 = 0b010;
/// The acknowledgment number is meaningful.
pub const FLAG_ACK: u8 = 0b001;

const FLAG_MASK: u32 = 0b111;
const LENGTH_SHIFT: u32 = 3;

/// Largest payload the 29-bit length field can describe.
pub const MAX_PAYLOAD: usize = (u32::MAX >> LENGTH_SHIFT) as usize;

/// One transport segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte index of the first payload byte (0 for SYN, len+1 for FIN).
    pub seq: u32,
    /// Cumulative acknowledgment: the next byte expected from the peer.
    pub ack: u32,
    /// Transmit timestamp in nanoseconds on the sender's monotonic clock.
    /// Acknowledgments echo the timestamp of the unit that caused them.
    pub timestamp: i64,
    /// S|F|A flag bits (see the `FLAG_*` constants).
    pub flags: u8,
    /// Stored checksum; zero until [`Segment::fill_checksum`] runs.
    pub checksum: u16,
    pub payload: Bytes,
}

impl Segment {
    /// Builds a payload-free segment (handshake, acknowledgment, teardown).
    pub fn control(flags: u8, seq: u32, ack: u32, timestamp: i64) -> Self {
        Self {
            seq,
            ack,
            timestamp,
            flags,
            checksum: 0,
            payload: Bytes::new(),
        }
    }

    /// Builds a data segment. Data always carries the A flag.
    pub fn data(seq: u32, payload: Bytes, timestamp: i64) -> Self {
        Self {
            seq,
            ack: 0,
            timestamp,
            flags: FLAG_ACK,
            checksum: 0,
            payload,
        }
    }

    #[inline]
    pub fn is_syn(&self) -> bool {
        self.flags & FLAG_SYN != 0
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        self.flags & FLAG_ACK != 0
    }

    fn length_and_flags(&self) -> u32 {
        ((self.payload.len() as u32) << LENGTH_SHIFT) | (self.flags as u32 & FLAG_MASK)
    }

    /// Serializes the segment as it currently stands.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_i64(self.timestamp);
        buf.put_u32(self.length_and_flags());
        buf.put_u16(self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Computes and stores the checksum over the zero-checksum serialization.
    pub fn fill_checksum(&mut self) {
        self.checksum = 0;
        self.checksum = internet_checksum(&self.encode());
    }

    /// Recomputes the checksum with the field zeroed and compares it to the
    /// stored value.
    pub fn verify(&self) -> bool {
        let mut scratch = self.clone();
        scratch.checksum = 0;
        internet_checksum(&scratch.encode()) == self.checksum
    }

    /// Parses one segment out of `reader`.
    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        let seq = reader.read_u32()?;
        let ack = reader.read_u32()?;
        let timestamp = reader.read_i64()?;
        let word = reader.read_u32()?;
        let checksum = reader.read_u16()?;

        let length = (word >> LENGTH_SHIFT) as usize;
        let flags = (word & FLAG_MASK) as u8;
        if length > reader.len() {
            return Err(BinaryError::InvalidData(format!(
                "declared payload length {} exceeds remaining {} bytes",
                length,
                reader.len()
            )));
        }
        let payload = reader.read_bytes(length)?;

        Ok(Self {
            seq,
            ack,
            timestamp,
            flags,
            checksum,
            payload,
        })
    }
}
