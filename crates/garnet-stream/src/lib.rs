//! # Garnet Stream
//!
//! Reliable byte-stream file transfer over an unreliable datagram link:
//! three-way handshake, byte-indexed sequence numbers, a segment-counted
//! sliding window, cumulative acknowledgments, adaptive retransmission
//! timeouts with fast retransmit, and graceful teardown.

use std::time::Duration;

pub mod error;
pub mod link;
pub mod receiver;
pub mod rtt;
pub mod segment;
pub mod sender;
pub mod stats;
mod window;

pub use error::StreamError;
pub use link::{Link, UdpLink};
pub use receiver::{Receiver, ReceiverState};
pub use sender::{Sender, SenderConfig, SenderState};
pub use stats::TransferStats;

/// How long the opening handshake waits for a reply before giving up.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll timeout on datagram reads so the event loops never block forever.
pub const RECV_POLL: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use crate::link::Link;
    use crate::link::testing::{ChannelLink, Fault, pair};
    use crate::receiver::Receiver;
    use crate::segment::{FLAG_ACK, FLAG_FIN, FLAG_SYN, HEADER_LEN, Segment};
    use crate::sender::{Sender, SenderConfig, SenderState};
    use crate::{StreamError, TransferStats};
    use bytes::Bytes;
    use rand::Rng;
    use std::sync::Arc;
    use tokio::time::Duration;

    const SYN_DELAY: Duration = Duration::from_millis(20);

    /// Gives the handshake flight a visible round trip so the measured
    /// timeout comfortably exceeds in-process delivery time.
    fn delay_handshake(link: &ChannelLink) {
        link.set_fault(|raw| {
            let mut cursor = Bytes::copy_from_slice(raw);
            match Segment::decode(&mut cursor) {
                Ok(segment) if segment.is_syn() => Fault::Delay(SYN_DELAY),
                _ => Fault::Deliver,
            }
        });
    }

    /// Like [`delay_handshake`], but additionally applies `fault` to the
    /// first data segment matching `seq`.
    fn delay_handshake_and_fault_once(link: &ChannelLink, seq: u32, fault: fn() -> Fault) {
        let mut tripped = false;
        link.set_fault(move |raw| {
            let mut cursor = Bytes::copy_from_slice(raw);
            let Ok(segment) = Segment::decode(&mut cursor) else {
                return Fault::Deliver;
            };
            if segment.is_syn() {
                return Fault::Delay(SYN_DELAY);
            }
            if !tripped && segment.seq == seq && !segment.payload.is_empty() {
                tripped = true;
                return fault();
            }
            Fault::Deliver
        });
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn spawn_receiver(
        link: Arc<ChannelLink>,
    ) -> tokio::task::JoinHandle<(TransferStats, Vec<u8>)> {
        tokio::spawn(async move {
            let receiver = Receiver::new(link);
            let mut out = Vec::new();
            let stats = receiver.run(&mut out).await.unwrap();
            (stats, out)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn clean_transfer_delivers_file_in_order() {
        let (a, b) = pair();
        delay_handshake(&a);
        let file = vec![0x41u8; 3000];

        let receiving = spawn_receiver(b);
        let mut sender = Sender::new(
            a,
            SenderConfig {
                mss: 1000,
                window: 4,
            },
        );
        let stats = sender.run(Bytes::from(file.clone())).await.unwrap();
        let (recv_stats, delivered) = receiving.await.unwrap();

        assert_eq!(delivered, file);
        assert_eq!(sender.state(), SenderState::Done);
        assert_eq!(stats.bytes, 3000);
        assert_eq!(stats.retransmissions, 0);
        assert_eq!(stats.duplicate_acks, 0);
        assert_eq!(recv_stats.bytes, 3000);
        assert_eq!(recv_stats.out_of_sequence, 0);
        assert_eq!(recv_stats.checksum_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_file_closes_cleanly() {
        let (a, b) = pair();
        delay_handshake(&a);

        let receiving = spawn_receiver(b);
        let mut sender = Sender::new(a, SenderConfig { mss: 500, window: 2 });
        let stats = sender.run(Bytes::new()).await.unwrap();
        let (recv_stats, delivered) = receiving.await.unwrap();

        assert!(delivered.is_empty());
        assert_eq!(stats.bytes, 0);
        assert_eq!(recv_stats.bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_recovers_a_dropped_segment() {
        let (a, b) = pair();
        delay_handshake_and_fault_once(&a, 1001, || Fault::Drop);
        let file = patterned(1500);

        let receiving = spawn_receiver(b);
        let mut sender = Sender::new(a, SenderConfig { mss: 500, window: 2 });
        let stats = sender.run(Bytes::from(file.clone())).await.unwrap();
        let (recv_stats, delivered) = receiving.await.unwrap();

        assert_eq!(delivered, file);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.duplicate_acks, 0);
        assert_eq!(recv_stats.bytes, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn third_duplicate_ack_fast_retransmits() {
        let (a, b) = pair();
        delay_handshake_and_fault_once(&a, 1, || Fault::Drop);
        let mut rng = rand::rng();
        let file: Vec<u8> = (0..4000).map(|_| rng.random::<u8>()).collect();

        let receiving = spawn_receiver(b);
        let mut sender = Sender::new(
            a,
            SenderConfig {
                mss: 1000,
                window: 4,
            },
        );
        let stats = sender.run(Bytes::from(file.clone())).await.unwrap();
        let (recv_stats, delivered) = receiving.await.unwrap();

        assert_eq!(delivered, file);
        // Three acks for byte 1 arrive before the retransmission timer has
        // any chance to fire; the third one repairs the hole.
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.duplicate_acks, 2);
        assert_eq!(recv_stats.bytes, 4000);
        assert_eq!(recv_stats.out_of_sequence, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_segment_is_discarded_and_retransmitted() {
        let (a, b) = pair();
        delay_handshake_and_fault_once(&a, 1, || Fault::Corrupt(HEADER_LEN));
        let file = patterned(1500);

        let receiving = spawn_receiver(b);
        let mut sender = Sender::new(a, SenderConfig { mss: 500, window: 1 });
        let stats = sender.run(Bytes::from(file.clone())).await.unwrap();
        let (recv_stats, delivered) = receiving.await.unwrap();

        assert_eq!(delivered, file);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(recv_stats.checksum_failures, 1);
        assert_eq!(recv_stats.bytes, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_gives_up_after_timeout() {
        let (a, _b) = pair();
        let mut sender = Sender::new(a, SenderConfig { mss: 100, window: 1 });
        let err = sender.run(Bytes::from_static(b"hello")).await.unwrap_err();
        assert!(matches!(err, StreamError::HandshakeTimeout));
        assert_eq!(sender.state(), SenderState::SynSent);
    }

    #[tokio::test(start_paused = true)]
    async fn receiver_reorders_buffered_segments() {
        let (a, b) = pair();
        let receiving = spawn_receiver(b);

        let mut syn = Segment::control(FLAG_SYN, 0, 0, 7);
        syn.fill_checksum();
        a.send(&syn.encode()).await.unwrap();
        let mut raw = a.recv().await.unwrap();
        let syn_ack = Segment::decode(&mut raw).unwrap();
        assert!(syn_ack.is_syn() && syn_ack.is_ack());
        assert_eq!(syn_ack.ack, 1);
        assert_eq!(syn_ack.timestamp, 7, "handshake reply echoes the SYN stamp");

        let first = Bytes::from(patterned(500));
        let second = Bytes::from(vec![0xEEu8; 500]);

        // The second segment arrives first and has to wait in the buffer.
        let mut ahead = Segment::data(501, second.clone(), 9);
        ahead.fill_checksum();
        a.send(&ahead.encode()).await.unwrap();
        let mut raw = a.recv().await.unwrap();
        let ack = Segment::decode(&mut raw).unwrap();
        assert_eq!(ack.ack, 1);
        assert_eq!(ack.timestamp, 9);

        let mut head = Segment::data(1, first.clone(), 11);
        head.fill_checksum();
        a.send(&head.encode()).await.unwrap();
        let mut raw = a.recv().await.unwrap();
        let ack = Segment::decode(&mut raw).unwrap();
        assert_eq!(ack.ack, 1001, "buffered segment drained behind the hole");
        assert_eq!(ack.timestamp, 11);

        // A stale copy is dropped but still acknowledged.
        a.send(&head.encode()).await.unwrap();
        let mut raw = a.recv().await.unwrap();
        let ack = Segment::decode(&mut raw).unwrap();
        assert_eq!(ack.ack, 1001);

        let mut fin = Segment::control(FLAG_FIN | FLAG_ACK, 1001, 0, 13);
        fin.fill_checksum();
        a.send(&fin.encode()).await.unwrap();
        let mut raw = a.recv().await.unwrap();
        let fin_ack = Segment::decode(&mut raw).unwrap();
        assert!(fin_ack.is_fin() && fin_ack.is_ack());
        assert_eq!(fin_ack.ack, 1002);
        assert_eq!(fin_ack.timestamp, 13);

        let (stats, delivered) = receiving.await.unwrap();
        let mut expected = first.to_vec();
        expected.extend_from_slice(&second);
        assert_eq!(delivered, expected);
        assert_eq!(stats.bytes, 1000);
        assert_eq!(stats.out_of_sequence, 1);
    }
}
