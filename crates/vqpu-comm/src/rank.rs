//! Rank-addressed transport.
//!
//! Endpoints are rank numbers `"0"..size`. A [`RankFabric`] wires `size`
//! channels together in one process, one per worker; connecting is a no-op
//! because every rank can reach every other rank from the start.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::channel::ClassicalChannel;
use crate::endpoint::Endpoint;
use crate::error::{CommError, CommResult};
use crate::inbox::{Envelope, Inbox, InboxSender};

/// Factory for a fully connected set of rank channels.
pub struct RankFabric;

impl RankFabric {
    /// Create `size` channels, one per rank, in rank order.
    pub fn create(size: usize) -> Vec<RankChannel> {
        let (inboxes, senders): (Vec<_>, Vec<_>) = (0..size).map(|_| Inbox::new()).unzip();
        let senders = Arc::new(senders);
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| RankChannel {
                rank,
                endpoint: Endpoint::from_rank(rank),
                inbox,
                ranks: Arc::clone(&senders),
            })
            .collect()
    }
}

/// One rank's channel.
pub struct RankChannel {
    rank: usize,
    endpoint: Endpoint,
    inbox: Inbox,
    ranks: Arc<Vec<InboxSender>>,
}

impl RankChannel {
    /// This channel's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the fabric.
    pub fn size(&self) -> usize {
        self.ranks.len()
    }

    fn route(&self, peer: &Endpoint) -> CommResult<&InboxSender> {
        peer.rank()
            .and_then(|rank| self.ranks.get(rank))
            .ok_or_else(|| CommError::UnknownPeer(peer.clone()))
    }
}

#[async_trait]
impl ClassicalChannel for RankChannel {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self, peer: &Endpoint) -> CommResult<()> {
        self.route(peer).map(|_| ())
    }

    async fn send(&self, payload: &[u8], peer: &Endpoint) -> CommResult<()> {
        trace!(from = self.rank, to = %peer, len = payload.len(), "Rank send");
        self.route(peer)?
            .send(Envelope {
                sender: self.endpoint.clone(),
                payload: payload.to_vec(),
            })
            .map_err(|_| CommError::Closed)
    }

    async fn recv(&self, peer: &Endpoint) -> CommResult<Vec<u8>> {
        self.route(peer)?;
        self.inbox.recv_from(peer).await
    }
}
