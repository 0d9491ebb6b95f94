//! Sending state machine: handshake, windowed transmission, adaptive
//! retransmission, fast retransmit, teardown.

use bytes::Bytes;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, timeout};

use crate::error::{Result, StreamError};
use crate::link::Link;
use crate::rtt::RttEstimator;
use crate::segment::{FLAG_ACK, FLAG_FIN, FLAG_SYN, Segment};
use crate::stats::{Direction, TransferStats, trace_segment};
use crate::window::{DUP_ACK_TRIGGER, InFlight, MAX_RETRANSMITS, SendWindow};
use crate::{HANDSHAKE_TIMEOUT, RECV_POLL};

/// Transfer parameters supplied by the caller.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum payload bytes per segment (equal to the configured MTU).
    pub mss: usize,
    /// Maximum number of outstanding segments.
    pub window: usize,
}

/// Connection phase of the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Closed,
    SynSent,
    Established,
    FinSent,
    Done,
    /// A segment ran out of retransmission attempts; the transfer is dead.
    Failed,
}

/// State shared between the acknowledgment path and the timer tasks.
/// Everything in here is touched under one lock so a timer firing and an
/// ack arriving for the same sequence can never interleave.
struct Flight {
    window: SendWindow,
    rtt: RttEstimator,
    stats: TransferStats,
    /// Sequence number that exhausted its retransmission budget, if any.
    failed: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Retransmit {
    Timeout,
    FastPath,
}

/// Sending endpoint of one file transfer.
pub struct Sender<L: Link> {
    link: Arc<L>,
    config: SenderConfig,
    epoch: Instant,
    state: SenderState,
    flight: Arc<Mutex<Flight>>,
}

impl<L: Link> Sender<L> {
    pub fn new(link: Arc<L>, config: SenderConfig) -> Self {
        Self {
            link,
            epoch: Instant::now(),
            state: SenderState::Closed,
            flight: Arc::new(Mutex::new(Flight {
                window: SendWindow::new(config.window),
                rtt: RttEstimator::new(),
                stats: TransferStats::default(),
                failed: None,
            })),
            config,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Snapshot of the transfer counters, also meaningful after a failure.
    pub async fn stats(&self) -> TransferStats {
        self.flight.lock().await.stats.clone()
    }

    fn now_ns(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    /// Runs one complete transfer of `file` to the peer.
    pub async fn run(&mut self, file: Bytes) -> Result<TransferStats> {
        self.handshake().await?;
        match self.pump(&file).await {
            Ok(()) => {
                self.teardown(file.len() as u32).await?;
                self.state = SenderState::Done;
                Ok(self.stats().await)
            }
            Err(e) => {
                self.state = SenderState::Failed;
                self.flight.lock().await.window.shutdown();
                Err(e)
            }
        }
    }

    /// Sends SYN and waits up to the handshake timeout for a valid S|A.
    async fn handshake(&mut self) -> Result<()> {
        let mut syn = Segment::control(FLAG_SYN, 0, 0, self.now_ns());
        syn.fill_checksum();
        self.transmit(&syn).await?;
        self.state = SenderState::SynSent;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StreamError::HandshakeTimeout);
            }
            let raw = match timeout(remaining, self.link.recv()).await {
                Err(_) => return Err(StreamError::HandshakeTimeout),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(raw)) => raw,
            };
            let mut cursor = raw;
            let Ok(reply) = Segment::decode(&mut cursor) else {
                continue;
            };
            if !reply.verify() {
                self.flight.lock().await.stats.checksum_failures += 1;
                continue;
            }
            if !(reply.is_syn() && reply.is_ack()) {
                continue;
            }

            let sample = self.now_ns() - reply.timestamp;
            {
                let mut flight = self.flight.lock().await;
                flight.stats.packets_received += 1;
                flight.rtt.sample(sample, true);
            }
            trace_segment(Direction::Receive, self.epoch.elapsed(), &reply);
            debug!("handshake complete, rtt sample {sample} ns");

            let mut ack = Segment::control(FLAG_ACK, 1, 1, self.now_ns());
            ack.fill_checksum();
            self.transmit(&ack).await?;
            self.state = SenderState::Established;
            return Ok(());
        }
    }

    /// Keeps the window full and digests acknowledgments until every file
    /// byte is covered by the cumulative ack.
    async fn pump(&mut self, file: &Bytes) -> Result<()> {
        let file_len = file.len() as u32;
        let mut next_seq: u32 = 1;
        let mut base: u32 = 1;

        loop {
            let failed = self.flight.lock().await.failed;
            if let Some(seq) = failed {
                return Err(StreamError::RetransmitLimit { seq });
            }
            self.admit(file, &mut next_seq, file_len).await?;
            if base > file_len {
                return Ok(());
            }
            match timeout(RECV_POLL, self.link.recv()).await {
                Err(_) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(raw)) => self.on_ack(raw, &mut base).await?,
            }
        }
    }

    /// Admits segments while the window has room and file bytes remain.
    async fn admit(&self, file: &Bytes, next_seq: &mut u32, file_len: u32) -> Result<()> {
        loop {
            let mut flight = self.flight.lock().await;
            if *next_seq > file_len || !flight.window.has_room() {
                return Ok(());
            }
            let start = (*next_seq - 1) as usize;
            let end = usize::min(start + self.config.mss, file.len());
            let payload = file.slice(start..end);
            let seq = *next_seq;

            let mut segment = Segment::data(seq, payload.clone(), self.now_ns());
            segment.fill_checksum();
            self.link.send(&segment.encode()).await?;
            flight.stats.packets_sent += 1;
            trace_segment(Direction::Send, self.epoch.elapsed(), &segment);

            let delay = flight.rtt.timeout();
            let timer = schedule_retransmit(
                Arc::clone(&self.link),
                Arc::clone(&self.flight),
                self.epoch,
                seq,
                delay,
            );
            flight.window.insert(
                seq,
                InFlight {
                    payload,
                    retransmits: 0,
                    timer,
                },
            );
            *next_seq = seq + (end - start) as u32;
        }
    }

    /// Digests one inbound datagram during the data phase.
    async fn on_ack(&self, raw: Bytes, base: &mut u32) -> Result<()> {
        let mut cursor = raw;
        let Ok(segment) = Segment::decode(&mut cursor) else {
            return Ok(());
        };
        let mut flight = self.flight.lock().await;
        if !segment.verify() {
            flight.stats.checksum_failures += 1;
            return Ok(());
        }
        if !segment.is_ack() {
            return Ok(());
        }
        flight.stats.packets_received += 1;
        trace_segment(Direction::Receive, self.epoch.elapsed(), &segment);

        let observed = flight.window.observe_ack(segment.ack);
        if observed > 1 {
            flight.stats.duplicate_acks += 1;
        }

        let sample = self.now_ns() - segment.timestamp;
        flight.rtt.sample(sample, segment.seq == 0);

        flight.window.ack(segment.ack);
        if segment.ack > *base {
            *base = segment.ack;
            flight.stats.bytes = (*base - 1) as u64;
        }

        if observed == DUP_ACK_TRIGGER {
            if let Some(seq) = flight.window.lowest() {
                retransmit_now(
                    &self.link,
                    &self.flight,
                    &mut flight,
                    self.epoch,
                    seq,
                    Retransmit::FastPath,
                )
                .await;
            }
        }
        Ok(())
    }

    /// Sends FIN and gives the peer one poll interval to answer with F|A.
    /// Completion does not depend on that answer arriving.
    async fn teardown(&mut self, file_len: u32) -> Result<()> {
        self.flight.lock().await.window.shutdown();

        let mut fin = Segment::control(FLAG_FIN | FLAG_ACK, file_len + 1, 0, self.now_ns());
        fin.fill_checksum();
        self.transmit(&fin).await?;
        self.state = SenderState::FinSent;

        let deadline = Instant::now() + RECV_POLL;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            let raw = match timeout(remaining, self.link.recv()).await {
                Err(_) | Ok(Err(_)) => return Ok(()),
                Ok(Ok(raw)) => raw,
            };
            let mut cursor = raw;
            let Ok(segment) = Segment::decode(&mut cursor) else {
                continue;
            };
            let mut flight = self.flight.lock().await;
            if !segment.verify() {
                flight.stats.checksum_failures += 1;
                continue;
            }
            if segment.is_fin() && segment.is_ack() {
                flight.stats.packets_received += 1;
                drop(flight);
                trace_segment(Direction::Receive, self.epoch.elapsed(), &segment);
                return Ok(());
            }
        }
    }

    async fn transmit(&self, segment: &Segment) -> Result<()> {
        self.link.send(&segment.encode()).await?;
        self.flight.lock().await.stats.packets_sent += 1;
        trace_segment(Direction::Send, self.epoch.elapsed(), segment);
        Ok(())
    }
}

/// Arms one retransmission timer. When it fires and the segment is still
/// outstanding, the segment goes out again and a fresh timer replaces this
/// one; acknowledgment processing aborts the handle instead.
fn schedule_retransmit<L: Link>(
    link: Arc<L>,
    flight: Arc<Mutex<Flight>>,
    epoch: Instant,
    seq: u32,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut guard = flight.lock().await;
        if !guard.window.contains(seq) {
            return;
        }
        retransmit_now(&link, &flight, &mut guard, epoch, seq, Retransmit::Timeout).await;
    })
}

/// Retransmits `seq` right now: bumps the attempt counter, re-stamps the
/// timestamp, recomputes the checksum and re-arms the timer. Both the timer
/// path and the fast-retransmit path end up here.
async fn retransmit_now<L: Link>(
    link: &Arc<L>,
    flight: &Arc<Mutex<Flight>>,
    guard: &mut Flight,
    epoch: Instant,
    seq: u32,
    kind: Retransmit,
) {
    let payload = match guard.window.get_mut(seq) {
        Some(entry) => {
            if entry.retransmits >= MAX_RETRANSMITS {
                warn!("seq {seq} exhausted its retransmission budget");
                guard.failed = Some(seq);
                return;
            }
            entry.retransmits += 1;
            entry.payload.clone()
        }
        None => return,
    };

    let mut segment = Segment::data(seq, payload, epoch.elapsed().as_nanos() as i64);
    segment.fill_checksum();
    if let Err(e) = link.send(&segment.encode()).await {
        warn!("retransmit of seq {seq} failed to send: {e}");
    }
    guard.stats.retransmissions += 1;
    guard.stats.packets_sent += 1;
    trace_segment(Direction::Send, epoch.elapsed(), &segment);
    match kind {
        Retransmit::Timeout => debug!("timeout, retransmitted seq {seq}"),
        Retransmit::FastPath => info!("fast retransmit of seq {seq} after duplicate acks"),
    }

    let delay = guard.rtt.timeout();
    let timer = schedule_retransmit(Arc::clone(link), Arc::clone(flight), epoch, seq, delay);
    if let Some(entry) = guard.window.get_mut(seq) {
        let old = std::mem::replace(&mut entry.timer, timer);
        old.abort();
    } else {
        timer.abort();
    }
}
