//! Per-sender message buffering.
//!
//! Every transport funnels inbound traffic into one stream of [`Envelope`]s.
//! A receive for peer P returns P's oldest message: either one already parked
//! in P's queue, or the next one read from the stream. Messages from other
//! senders read along the way are parked in their own queues, so FIFO order
//! holds per sender no matter how peers interleave.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::endpoint::Endpoint;
use crate::error::{CommError, CommResult};

/// One inbound message tagged with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender identity.
    pub sender: Endpoint,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Sending half feeding an [`Inbox`].
pub type InboxSender = mpsc::UnboundedSender<Envelope>;

/// Inbound stream plus per-sender queues.
pub struct Inbox {
    stream: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    queues: Mutex<FxHashMap<Endpoint, VecDeque<Vec<u8>>>>,
}

impl Inbox {
    /// Create an inbox and the sender that feeds it.
    pub fn new() -> (Self, InboxSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = Self {
            stream: tokio::sync::Mutex::new(rx),
            queues: Mutex::new(FxHashMap::default()),
        };
        (inbox, tx)
    }

    /// Receive the oldest message from `peer`.
    pub async fn recv_from(&self, peer: &Endpoint) -> CommResult<Vec<u8>> {
        loop {
            if let Some(payload) = self.pop_queued(peer) {
                return Ok(payload);
            }

            let mut stream = self.stream.lock().await;
            // A concurrent receiver may have parked our message while we waited.
            if let Some(payload) = self.pop_queued(peer) {
                return Ok(payload);
            }

            let envelope = stream.recv().await.ok_or(CommError::Closed)?;
            if envelope.sender == *peer {
                return Ok(envelope.payload);
            }
            trace!(
                sender = %envelope.sender,
                waiting_for = %peer,
                "Parking message from other peer"
            );
            self.park(envelope);
        }
    }

    /// Number of parked messages from `peer`.
    pub fn queued(&self, peer: &Endpoint) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .map_or(0, VecDeque::len)
    }

    fn pop_queued(&self, peer: &Endpoint) -> Option<Vec<u8>> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(peer)
            .and_then(VecDeque::pop_front)
    }

    fn park(&self, envelope: Envelope) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(envelope.sender)
            .or_default()
            .push_back(envelope.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn envelope(sender: &str, payload: &[u8]) -> Envelope {
        Envelope {
            sender: Endpoint::from(sender),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_senders() {
        let (inbox, tx) = Inbox::new();
        tx.send(envelope("A", b"a1")).unwrap();
        tx.send(envelope("B", b"b1")).unwrap();
        tx.send(envelope("A", b"a2")).unwrap();

        assert_eq!(inbox.recv_from(&"B".into()).await.unwrap(), b"b1");
        assert_eq!(inbox.queued(&"A".into()), 1);
        assert_eq!(inbox.recv_from(&"A".into()).await.unwrap(), b"a1");
        assert_eq!(inbox.recv_from(&"A".into()).await.unwrap(), b"a2");
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (inbox, tx) = Inbox::new();
        drop(tx);
        assert!(matches!(
            inbox.recv_from(&"A".into()).await,
            Err(CommError::Closed)
        ));
    }

    proptest! {
        #[test]
        fn prop_fifo_per_sender(order in proptest::collection::vec(0usize..3, 0..60)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let names = ["A", "B", "C"];
                let (inbox, tx) = Inbox::new();
                let mut sent: [Vec<Vec<u8>>; 3] = Default::default();
                for (seq, &who) in order.iter().enumerate() {
                    let payload = (seq as u32).to_le_bytes().to_vec();
                    sent[who].push(payload.clone());
                    tx.send(envelope(names[who], &payload)).unwrap();
                }

                // Drain B first, then C, then A: each must come back in send order.
                for who in [1, 2, 0] {
                    let peer = Endpoint::from(names[who]);
                    for expected in &sent[who] {
                        let got = inbox.recv_from(&peer).await.unwrap();
                        assert_eq!(&got, expected);
                    }
                }
            });
        }
    }
}
