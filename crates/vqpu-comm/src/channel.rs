//! The classical channel interface.
//!
//! A channel is a process-wide, point-to-point messaging resource addressed by
//! [`Endpoint`]. Transports implement the four required methods; the typed
//! helpers for single measurement bits and UTF-8 documents are provided.
//!
//! | Method | Required | Blocks |
//! |--------|----------|--------|
//! | `endpoint()` | yes | no |
//! | `connect()` | yes | until dialed |
//! | `send()` | yes | until written |
//! | `recv()` | yes | until a message from the peer arrives |
//! | `publish()` | provided | no |
//! | `send_measure()` / `recv_measure()` | provided | as `send` / `recv` |
//! | `send_info()` / `recv_info()` | provided | as `send` / `recv` |

use async_trait::async_trait;
use tracing::debug;

use crate::discovery::DiscoveryStore;
use crate::endpoint::Endpoint;
use crate::error::{CommError, CommResult};

/// Point-to-point messaging between worker processes.
///
/// `recv` has no timeout: a peer that never sends stalls the caller.
#[async_trait]
pub trait ClassicalChannel: Send + Sync {
    /// This process's own endpoint.
    fn endpoint(&self) -> &Endpoint;

    /// Establish the link to `peer`. Idempotent.
    async fn connect(&self, peer: &Endpoint) -> CommResult<()>;

    /// Send a payload to `peer`, connecting first if needed.
    async fn send(&self, payload: &[u8], peer: &Endpoint) -> CommResult<()>;

    /// Receive the oldest payload sent by `peer`.
    async fn recv(&self, peer: &Endpoint) -> CommResult<Vec<u8>>;

    /// Advertise this endpoint under `key`.
    async fn publish(&self, store: &dyn DiscoveryStore, key: &str) -> CommResult<()> {
        debug!(key, endpoint = %self.endpoint(), "Publishing channel endpoint");
        store.publish(key, self.endpoint()).await
    }

    /// Connect to every peer in order.
    async fn connect_all(&self, peers: &[Endpoint]) -> CommResult<()> {
        for peer in peers {
            self.connect(peer).await?;
        }
        Ok(())
    }

    /// Send one measurement bit, encoded as a little-endian `i32` 0 or 1.
    async fn send_measure(&self, bit: bool, peer: &Endpoint) -> CommResult<()> {
        self.send(&i32::from(bit).to_le_bytes(), peer).await
    }

    /// Receive one measurement bit.
    async fn recv_measure(&self, peer: &Endpoint) -> CommResult<bool> {
        let payload = self.recv(peer).await?;
        let bytes: [u8; 4] = payload.as_slice().try_into().map_err(|_| CommError::Decode {
            peer: peer.clone(),
            reason: format!("expected a 4-byte measurement, got {} bytes", payload.len()),
        })?;
        Ok(i32::from_le_bytes(bytes) != 0)
    }

    /// Send a UTF-8 document.
    async fn send_info(&self, info: &str, peer: &Endpoint) -> CommResult<()> {
        self.send(info.as_bytes(), peer).await
    }

    /// Receive a UTF-8 document.
    async fn recv_info(&self, peer: &Endpoint) -> CommResult<String> {
        let payload = self.recv(peer).await?;
        String::from_utf8(payload).map_err(|e| CommError::Decode {
            peer: peer.clone(),
            reason: e.to_string(),
        })
    }
}
