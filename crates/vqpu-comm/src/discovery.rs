//! Endpoint discovery.
//!
//! Workers advertise their channel endpoint under a key (job id, task id or
//! `<job>_executor`) so peers can find them before connecting. The file store
//! keeps every record in one JSON object on a shared filesystem:
//!
//! ```json
//! { "job_0": { "communications_endpoint": "tcp://10.0.0.5:6001",
//!              "published_at": "2026-03-01T12:00:00Z" } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::{CommError, CommResult};

/// A published endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    /// Where the publishing worker can be reached.
    pub communications_endpoint: Endpoint,
    /// When the record was written.
    pub published_at: DateTime<Utc>,
}

impl DiscoveryRecord {
    /// Create a record stamped with the current time.
    pub fn now(endpoint: Endpoint) -> Self {
        Self {
            communications_endpoint: endpoint,
            published_at: Utc::now(),
        }
    }
}

/// Shared key-value store of endpoints.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Publish `endpoint` under `key`, replacing any previous record.
    async fn publish(&self, key: &str, endpoint: &Endpoint) -> CommResult<()>;

    /// Look up the record under `key`.
    async fn lookup(&self, key: &str) -> CommResult<Option<DiscoveryRecord>>;

    /// All records whose key starts with `prefix`, ordered by key.
    async fn entries_with_prefix(
        &self,
        prefix: &str,
    ) -> CommResult<Vec<(String, DiscoveryRecord)>>;

    /// Remove the record under `key`.
    async fn remove(&self, key: &str) -> CommResult<()>;
}

/// Polling behavior for [`wait_for`] and [`wait_for_prefix`].
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    /// Delay between polls.
    pub interval: Duration,
    /// Give up after this many polls; `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_attempts: None,
        }
    }
}

/// Poll until a record for `key` appears.
pub async fn wait_for(
    store: &dyn DiscoveryStore,
    key: &str,
    policy: WaitPolicy,
) -> CommResult<DiscoveryRecord> {
    let mut attempts = 0u32;
    loop {
        if let Some(record) = store.lookup(key).await? {
            debug!(key, endpoint = %record.communications_endpoint, "Resolved endpoint");
            return Ok(record);
        }
        attempts += 1;
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(CommError::NotFound(key.to_string()));
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Poll until at least `count` records share `prefix`.
pub async fn wait_for_prefix(
    store: &dyn DiscoveryStore,
    prefix: &str,
    count: usize,
    policy: WaitPolicy,
) -> CommResult<Vec<(String, DiscoveryRecord)>> {
    let mut attempts = 0u32;
    loop {
        let entries = store.entries_with_prefix(prefix).await?;
        if entries.len() >= count {
            return Ok(entries);
        }
        attempts += 1;
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(CommError::NotFound(format!("{count} records with prefix '{prefix}'")));
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Default location of the communications file, `~/.vqpu/communications.json`.
pub fn default_discovery_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vqpu")
        .join("communications.json")
}

type Records = BTreeMap<String, DiscoveryRecord>;

/// Discovery backed by one JSON file on a shared filesystem.
///
/// Writers serialize through a sibling `.lock` file created exclusively and
/// replace the data file with an atomic rename, so readers never see a
/// partially written document.
pub struct FileDiscovery {
    path: PathBuf,
    lock_path: PathBuf,
    lock_retry: Duration,
    lock_attempts: u32,
}

/// Removes the lock file when dropped.
struct LockGuard(PathBuf);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            warn!("Failed to release discovery lock {:?}: {}", self.0, e);
        }
    }
}

impl FileDiscovery {
    /// Use the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_retry: Duration::from_millis(10),
            lock_attempts: 1000,
        }
    }

    /// Path of the communications file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn acquire(&self) -> CommResult<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        for _ in 0..self.lock_attempts {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
                .await
            {
                Ok(_) => return Ok(LockGuard(self.lock_path.clone())),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(self.lock_retry).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CommError::Discovery(format!(
            "Timed out acquiring lock {:?}",
            self.lock_path
        )))
    }

    async fn read_all(&self) -> CommResult<Records> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Records::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &Records) -> CommResult<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_string_pretty(records)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DiscoveryStore for FileDiscovery {
    async fn publish(&self, key: &str, endpoint: &Endpoint) -> CommResult<()> {
        let _lock = self.acquire().await?;
        let mut records = self.read_all().await?;
        records.insert(key.to_string(), DiscoveryRecord::now(endpoint.clone()));
        self.write_all(&records).await?;
        debug!(key, %endpoint, path = ?self.path, "Published endpoint");
        Ok(())
    }

    async fn lookup(&self, key: &str) -> CommResult<Option<DiscoveryRecord>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn entries_with_prefix(
        &self,
        prefix: &str,
    ) -> CommResult<Vec<(String, DiscoveryRecord)>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    async fn remove(&self, key: &str) -> CommResult<()> {
        let _lock = self.acquire().await?;
        let mut records = self.read_all().await?;
        if records.remove(key).is_some() {
            self.write_all(&records).await?;
        }
        Ok(())
    }
}

/// In-process discovery, shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiscovery {
    records: Arc<RwLock<Records>>,
}

impl MemoryDiscovery {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscoveryStore for MemoryDiscovery {
    async fn publish(&self, key: &str, endpoint: &Endpoint) -> CommResult<()> {
        self.records
            .write()
            .await
            .insert(key.to_string(), DiscoveryRecord::now(endpoint.clone()));
        Ok(())
    }

    async fn lookup(&self, key: &str) -> CommResult<Option<DiscoveryRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn entries_with_prefix(
        &self,
        prefix: &str,
    ) -> CommResult<Vec<(String, DiscoveryRecord)>> {
        Ok(self
            .records
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn remove(&self, key: &str) -> CommResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_prefix_scan() {
        let store = MemoryDiscovery::new();
        store.publish("job_executor", &"tcp://h:1".into()).await.unwrap();
        store.publish("job_0", &"tcp://h:2".into()).await.unwrap();
        store.publish("jobx_0", &"tcp://h:3".into()).await.unwrap();
        store.publish("other", &"tcp://h:4".into()).await.unwrap();

        let keys: Vec<_> = store
            .entries_with_prefix("job_")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["job_0", "job_executor"]);
    }

    #[tokio::test]
    async fn test_wait_for_gives_up() {
        let store = MemoryDiscovery::new();
        let policy = WaitPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let err = wait_for(&store, "missing", policy).await.unwrap_err();
        assert!(matches!(err, CommError::NotFound(k) if k == "missing"));
    }

    #[tokio::test]
    async fn test_wait_for_sees_late_publish() {
        let store = MemoryDiscovery::new();
        let publisher = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("late", &"5".into()).await.unwrap();
        });
        let policy = WaitPolicy {
            interval: Duration::from_millis(5),
            max_attempts: None,
        };
        let record = wait_for(&store, "late", policy).await.unwrap();
        assert_eq!(record.communications_endpoint, Endpoint::from_rank(5));
    }
}
