//! Dealer/router transport over TCP.
//!
//! Each channel binds one listening socket (the router). Outbound links are
//! dialed lazily per peer (the dealers) and announce the sender's endpoint as
//! their first frame, so every inbound message is attributed to a logical
//! peer rather than a socket address.
//!
//! Each dealer sits in its own slot, so dialing a slow or missing peer never
//! holds up traffic to the others.
//!
//! Frames are a big-endian `u32` length followed by the payload.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::channel::ClassicalChannel;
use crate::endpoint::Endpoint;
use crate::error::{CommError, CommResult};
use crate::inbox::{Envelope, Inbox, InboxSender};

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

/// Settings for a [`RouterChannel`].
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Interface to bind.
    pub bind_host: String,
    /// Host written into the advertised endpoint; defaults to `bind_host`.
    pub advertise_host: Option<String>,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Dial attempts per peer before giving up.
    pub connect_retries: u32,
    /// Delay between dial attempts.
    pub retry_interval: Duration,
    /// Largest accepted frame.
    pub max_frame: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            advertise_host: None,
            port: 0,
            connect_retries: 50,
            retry_interval: Duration::from_millis(100),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

/// Outbound link to one peer; empty until dialed or after a failed write.
type DealerSlot = Arc<Mutex<Option<TcpStream>>>;

/// Socket-addressed classical channel.
pub struct RouterChannel {
    endpoint: Endpoint,
    inbox: Inbox,
    dealers: std::sync::Mutex<FxHashMap<Endpoint, DealerSlot>>,
    options: RouterOptions,
    acceptor: JoinHandle<()>,
}

impl RouterChannel {
    /// Bind the listening socket and start accepting peers.
    pub async fn bind(options: RouterOptions) -> CommResult<Self> {
        let listener = TcpListener::bind((options.bind_host.as_str(), options.port)).await?;
        let port = listener.local_addr()?.port();
        let host = options
            .advertise_host
            .clone()
            .unwrap_or_else(|| options.bind_host.clone());
        let endpoint = Endpoint::tcp(&host, port);
        info!(%endpoint, "Classical channel listening");

        let (inbox, tx) = Inbox::new();
        let acceptor = tokio::spawn(accept_loop(listener, tx, options.max_frame));

        Ok(Self {
            endpoint,
            inbox,
            dealers: std::sync::Mutex::new(FxHashMap::default()),
            options,
            acceptor,
        })
    }

    /// Whether a dealer link to `peer` is open.
    pub async fn is_connected(&self, peer: &Endpoint) -> bool {
        let slot = self
            .dealers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .cloned();
        match slot {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    fn slot(&self, peer: &Endpoint) -> DealerSlot {
        let mut dealers = self.dealers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(dealers.entry(peer.clone()).or_default())
    }

    async fn dial(&self, peer: &Endpoint) -> CommResult<TcpStream> {
        let addr = peer.socket_addr()?;
        let attempts = self.options.connect_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match TcpStream::connect(addr).await {
                Ok(mut stream) => {
                    stream.set_nodelay(true)?;
                    write_frame(&mut stream, self.endpoint.as_str().as_bytes()).await?;
                    debug!(%peer, attempt, "Connected to peer");
                    return Ok(stream);
                }
                Err(e) => {
                    trace!(%peer, attempt, error = %e, "Dial failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.options.retry_interval).await;
                    }
                }
            }
        }
        Err(CommError::Connect {
            peer: peer.clone(),
            attempts,
            source: last_error
                .unwrap_or_else(|| std::io::Error::other("no connection attempt made")),
        })
    }
}

#[async_trait]
impl ClassicalChannel for RouterChannel {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[instrument(skip(self), fields(me = %self.endpoint))]
    async fn connect(&self, peer: &Endpoint) -> CommResult<()> {
        let slot = self.slot(peer);
        let mut link = slot.lock().await;
        if link.is_none() {
            *link = Some(self.dial(peer).await?);
        }
        Ok(())
    }

    async fn send(&self, payload: &[u8], peer: &Endpoint) -> CommResult<()> {
        if payload.len() > self.options.max_frame {
            return Err(CommError::FrameTooLarge {
                len: payload.len(),
                max: self.options.max_frame,
            });
        }
        let slot = self.slot(peer);
        let mut link = slot.lock().await;
        if link.is_none() {
            *link = Some(self.dial(peer).await?);
        }
        let Some(stream) = link.as_mut() else {
            return Err(CommError::UnknownPeer(peer.clone()));
        };
        if let Err(e) = write_frame(stream, payload).await {
            // Drop the broken link so the next send redials.
            *link = None;
            warn!(%peer, error = %e, "Send failed");
            return Err(e);
        }
        trace!(%peer, len = payload.len(), "Sent frame");
        Ok(())
    }

    async fn recv(&self, peer: &Endpoint) -> CommResult<Vec<u8>> {
        self.inbox.recv_from(peer).await
    }
}

impl Drop for RouterChannel {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: InboxSender, max_frame: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(%addr, "Accepted connection");
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = read_connection(stream, tx, max_frame).await {
                        warn!(%addr, error = %e, "Inbound connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
            }
        }
    }
}

async fn read_connection(
    mut stream: TcpStream,
    tx: InboxSender,
    max_frame: usize,
) -> CommResult<()> {
    stream.set_nodelay(true)?;
    let identity = read_frame(&mut stream, max_frame)
        .await?
        .ok_or(CommError::Closed)?;
    let sender = Endpoint::new(String::from_utf8(identity).map_err(|e| {
        CommError::InvalidEndpoint(format!("non UTF-8 identity: {e}"))
    })?);
    debug!(%sender, "Peer identified");

    while let Some(payload) = read_frame(&mut stream, max_frame).await? {
        let envelope = Envelope {
            sender: sender.clone(),
            payload,
        };
        if tx.send(envelope).is_err() {
            // Channel dropped.
            return Ok(());
        }
    }
    trace!(%sender, "Peer closed connection");
    Ok(())
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> CommResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| CommError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame; `None` on a clean close at a frame boundary.
async fn read_frame(stream: &mut TcpStream, max_frame: usize) -> CommResult<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame {
        return Err(CommError::FrameTooLarge {
            len,
            max: max_frame,
        });
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_port_is_advertised() {
        let channel = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        let addr = channel.endpoint().socket_addr().unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        assert!(!addr.ends_with(":0"));
    }

    #[tokio::test]
    async fn test_connect_is_memoized() {
        let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        a.connect(b.endpoint()).await.unwrap();
        a.connect(b.endpoint()).await.unwrap();
        assert!(a.is_connected(b.endpoint()).await);
        assert!(!b.is_connected(a.endpoint()).await);
    }

    #[tokio::test]
    async fn test_measure_round_trip() {
        let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();

        a.send_measure(true, b.endpoint()).await.unwrap();
        a.send_measure(false, b.endpoint()).await.unwrap();
        assert!(b.recv_measure(a.endpoint()).await.unwrap());
        assert!(!b.recv_measure(a.endpoint()).await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_failure_reports_attempts() {
        let a = RouterChannel::bind(RouterOptions {
            connect_retries: 2,
            retry_interval: Duration::from_millis(1),
            ..RouterOptions::default()
        })
        .await
        .unwrap();
        // Bind then drop a listener to get a port with nobody behind it.
        let closed = {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            probe.local_addr().unwrap().port()
        };
        let err = a
            .connect(&Endpoint::tcp("127.0.0.1", closed))
            .await
            .unwrap_err();
        assert!(matches!(err, CommError::Connect { attempts: 2, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_peer_does_not_stall_others() {
        let a = Arc::new(
            RouterChannel::bind(RouterOptions {
                connect_retries: 30,
                retry_interval: Duration::from_millis(100),
                ..RouterOptions::default()
            })
            .await
            .unwrap(),
        );
        let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            Endpoint::tcp("127.0.0.1", listener.local_addr().unwrap().port())
        };

        let stuck = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.send_measure(true, &dead).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), a.send_measure(true, b.endpoint()))
            .await
            .expect("send to a live peer waited on the dead one")
            .unwrap();
        assert!(b.recv_measure(a.endpoint()).await.unwrap());
        assert!(!stuck.is_finished());
        stuck.abort();
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_peer_unconnected() {
        let a = RouterChannel::bind(RouterOptions {
            connect_retries: 1,
            ..RouterOptions::default()
        })
        .await
        .unwrap();
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            Endpoint::tcp("127.0.0.1", listener.local_addr().unwrap().port())
        };
        assert!(a.send(b"x", &closed).await.is_err());
        assert!(!a.is_connected(&closed).await);
    }

    #[tokio::test]
    async fn test_rejects_non_socket_endpoint() {
        let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
        let err = a.connect(&Endpoint::from_rank(1)).await.unwrap_err();
        assert!(matches!(err, CommError::InvalidEndpoint(_)));
    }
}
