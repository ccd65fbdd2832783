//! Opaque endpoint identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CommError, CommResult};

/// Address of a process on a classical channel.
///
/// Two encodings are in use: a small-integer rank (`"3"`) for rank-addressed
/// transports and `scheme://host:port` for socket transports. Protocol code
/// treats both as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap an endpoint string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Endpoint of a rank.
    pub fn from_rank(rank: usize) -> Self {
        Self(rank.to_string())
    }

    /// Endpoint of a TCP listener.
    pub fn tcp(host: &str, port: u16) -> Self {
        Self(format!("tcp://{host}:{port}"))
    }

    /// The endpoint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The rank, if this is a rank endpoint.
    pub fn rank(&self) -> Option<usize> {
        self.0.parse().ok()
    }

    /// The `host:port` part of a socket endpoint.
    pub fn socket_addr(&self) -> CommResult<&str> {
        let (scheme, addr) = self
            .0
            .split_once("://")
            .ok_or_else(|| CommError::InvalidEndpoint(self.0.clone()))?;
        if scheme != "tcp" || !addr.contains(':') {
            return Err(CommError::InvalidEndpoint(self.0.clone()));
        }
        Ok(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Endpoint {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for Endpoint {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
