//! Transfer counters and the per-packet trace line.

use crate::segment::Segment;
use log::info;
use std::fmt;
use std::time::Duration;

/// Counters reported when a transfer terminates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub out_of_sequence: u64,
    pub checksum_failures: u64,
    pub retransmissions: u64,
    pub duplicate_acks: u64,
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bytes transferred:      {}", self.bytes)?;
        writeln!(f, "packets sent:           {}", self.packets_sent)?;
        writeln!(f, "packets received:       {}", self.packets_received)?;
        writeln!(f, "out-of-sequence drops:  {}", self.out_of_sequence)?;
        writeln!(f, "checksum drops:         {}", self.checksum_failures)?;
        writeln!(f, "retransmissions:        {}", self.retransmissions)?;
        write!(f, "duplicate acks:         {}", self.duplicate_acks)
    }
}

impl TransferStats {
    /// Emits the statistics block through the logger, one counter per line.
    pub fn log_summary(&self) {
        for line in self.to_string().lines() {
            info!("{line}");
        }
    }
}

/// Direction tag for trace lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    fn token(self) -> &'static str {
        match self {
            Direction::Send => "snd",
            Direction::Receive => "rcv",
        }
    }
}

/// Logs one send/receive event in the fixed column format
/// `<dir> <t_sec.mmm> <S|-> <A|-> <F|-> <D|-> <seq> <bytes> <ack>`,
/// where `D` marks a non-empty payload and time counts from transfer start.
pub fn trace_segment(dir: Direction, elapsed: Duration, segment: &Segment) {
    info!(
        "{} {}.{:03} {} {} {} {} {} {} {}",
        dir.token(),
        elapsed.as_secs(),
        elapsed.subsec_millis(),
        if segment.is_syn() { "S" } else { "-" },
        if segment.is_ack() { "A" } else { "-" },
        if segment.is_fin() { "F" } else { "-" },
        if segment.payload.is_empty() { "-" } else { "D" },
        segment.seq,
        segment.payload.len(),
        segment.ack,
    );
}
