//! Receiving state machine: in-order delivery with out-of-order buffering
//! and cumulative acknowledgments.

use bytes::Bytes;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::Result;
use crate::link::Link;
use crate::segment::{FLAG_ACK, FLAG_FIN, FLAG_SYN, Segment};
use crate::stats::{Direction, TransferStats, trace_segment};

/// Connection phase of the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Listen,
    Established,
    Closed,
}

/// Receiving endpoint of one file transfer. Delivered bytes are contiguous
/// from the start of the stream; anything ahead of the delivery pointer
/// waits in the reorder buffer.
pub struct Receiver<L: Link> {
    link: Arc<L>,
    epoch: Instant,
    state: ReceiverState,
    /// Next in-order byte expected from the peer.
    expected: u32,
    /// Out-of-order payloads keyed by sequence number; every key is ahead
    /// of `expected`.
    pending: BTreeMap<u32, Bytes>,
    stats: TransferStats,
}

impl<L: Link> Receiver<L> {
    pub fn new(link: Arc<L>) -> Self {
        Self {
            link,
            epoch: Instant::now(),
            state: ReceiverState::Listen,
            expected: 0,
            pending: BTreeMap::new(),
            stats: TransferStats::default(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Accepts one connection, streams the delivered bytes into `sink` and
    /// returns the final counters once the peer closes.
    pub async fn run<W>(mut self, sink: &mut W) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin,
    {
        self.listen().await?;
        self.serve(sink).await?;
        Ok(self.stats)
    }

    /// Receives the next datagram that decodes and passes its checksum.
    /// Checksum failures are counted before any state is inspected.
    async fn recv_valid(&mut self) -> Result<Option<Segment>> {
        let raw = self.link.recv().await?;
        let mut cursor = raw;
        let Ok(segment) = Segment::decode(&mut cursor) else {
            return Ok(None);
        };
        if !segment.verify() {
            self.stats.checksum_failures += 1;
            return Ok(None);
        }
        self.stats.packets_received += 1;
        trace_segment(Direction::Receive, self.epoch.elapsed(), &segment);
        Ok(Some(segment))
    }

    /// Waits for the opening SYN and answers it, echoing its timestamp.
    async fn listen(&mut self) -> Result<()> {
        loop {
            let Some(segment) = self.recv_valid().await? else {
                continue;
            };
            if segment.is_syn() && segment.seq == 0 {
                self.expected = 1;
                let mut reply = Segment::control(FLAG_SYN | FLAG_ACK, 0, 1, segment.timestamp);
                reply.fill_checksum();
                self.transmit(&reply).await?;
                self.state = ReceiverState::Established;
                debug!("connection established");
                return Ok(());
            }
        }
    }

    async fn serve<W>(&mut self, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let Some(segment) = self.recv_valid().await? else {
                continue;
            };

            if segment.is_fin() {
                let mut reply =
                    Segment::control(FLAG_FIN | FLAG_ACK, 0, segment.seq + 1, segment.timestamp);
                reply.fill_checksum();
                self.transmit(&reply).await?;
                sink.flush().await?;
                self.state = ReceiverState::Closed;
                info!("transfer closed, {} bytes delivered", self.stats.bytes);
                self.stats.log_summary();
                return Ok(());
            }
            if segment.payload.is_empty() {
                // Bare acknowledgments (and handshake repeats) carry no data.
                continue;
            }

            if segment.seq == self.expected {
                self.deliver(sink, segment.payload.clone()).await?;
                while self
                    .pending
                    .first_key_value()
                    .is_some_and(|(seq, _)| *seq == self.expected)
                {
                    if let Some((_, payload)) = self.pending.pop_first() {
                        self.deliver(sink, payload).await?;
                    }
                }
            } else if segment.seq > self.expected {
                self.pending
                    .entry(segment.seq)
                    .or_insert_with(|| segment.payload.clone());
            } else {
                self.stats.out_of_sequence += 1;
            }

            let mut ack = Segment::control(FLAG_ACK, 0, self.expected, segment.timestamp);
            ack.fill_checksum();
            self.transmit(&ack).await?;
        }
    }

    async fn deliver<W>(&mut self, sink: &mut W, payload: Bytes) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        sink.write_all(&payload).await?;
        self.stats.bytes += payload.len() as u64;
        self.expected += payload.len() as u32;
        Ok(())
    }

    async fn transmit(&mut self, segment: &Segment) -> Result<()> {
        self.link.send(&segment.encode()).await?;
        self.stats.packets_sent += 1;
        trace_segment(Direction::Send, self.epoch.elapsed(), segment);
        Ok(())
    }
}
