//! Virtual QPU Classical Communication
//!
//! Workers hosting tasks in different processes exchange measurement bits and
//! whole documents over a [`ClassicalChannel`]. Channels are addressed by
//! opaque [`Endpoint`]s and found through a [`DiscoveryStore`].
//!
//! # Transports
//!
//! | Transport | Endpoint form | Connect |
//! |-----------|---------------|---------|
//! | [`RouterChannel`] | `tcp://host:port` | dials once per peer, memoized |
//! | [`RankChannel`] | `"0"`, `"1"`, ... | no-op |
//!
//! Both deliver inbound traffic through an [`Inbox`], which keeps one FIFO
//! queue per sender: a `recv` for peer P never returns another peer's message
//! and never reorders P's messages.
//!
//! # Example
//!
//! ```rust,no_run
//! use vqpu_comm::{ClassicalChannel, MemoryDiscovery, RouterChannel, RouterOptions};
//!
//! # async fn demo() -> vqpu_comm::CommResult<()> {
//! let discovery = MemoryDiscovery::new();
//! let a = RouterChannel::bind(RouterOptions::default()).await?;
//! let b = RouterChannel::bind(RouterOptions::default()).await?;
//! a.publish(&discovery, "job_0").await?;
//!
//! a.send_measure(true, b.endpoint()).await?;
//! assert!(b.recv_measure(a.endpoint()).await?);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod inbox;
pub mod rank;
pub mod router;

pub use channel::ClassicalChannel;
pub use discovery::{
    DiscoveryRecord, DiscoveryStore, FileDiscovery, MemoryDiscovery, WaitPolicy,
    default_discovery_path, wait_for, wait_for_prefix,
};
pub use endpoint::Endpoint;
pub use error::{CommError, CommResult};
pub use inbox::{Envelope, Inbox, InboxSender};
pub use rank::{RankChannel, RankFabric};
pub use router::{DEFAULT_MAX_FRAME, RouterChannel, RouterOptions};
