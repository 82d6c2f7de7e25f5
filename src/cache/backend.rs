//! Persistent cache tier.
//!
//! A best-effort accelerator that lets cached responses survive a process
//! restart. It is never a source of truth: every failure here degrades to a
//! cache miss or a skipped write in [`CacheStore`](super::CacheStore).

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// On-disk record. Timestamps are wall-clock so they stay meaningful across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub stored_at_ms: u64,
    pub ttl_ms: u64,
}

impl PersistedEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            stored_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Lifetime left as of now, or `None` once expired.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let age = now_ms().saturating_sub(self.stored_at_ms);
        if age >= self.ttl_ms {
            None
        } else {
            Some(Duration::from_millis(self.ttl_ms - age))
        }
    }
}

#[async_trait]
pub trait PersistentTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PersistedEntry>>;
    async fn set(&self, entry: &PersistedEntry) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
    /// Remove every entry whose key starts with `prefix`.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// One JSON file per key, named by the SHA-256 of the key.
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.dir.join(format!("{}.json", hash))
    }

    async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths of every record file currently in the directory.
    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl PersistentTier for FileTier {
    async fn get(&self, key: &str) -> Result<Option<PersistedEntry>> {
        let data = match tokio::fs::read(self.path_for(key)).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: PersistedEntry = serde_json::from_slice(&data)?;
        // hash collision guard
        if entry.key != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn set(&self, entry: &PersistedEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, serde_json::to_vec(entry)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        Self::remove(&self.path_for(key)).await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        for path in self.record_paths().await? {
            let Ok(data) = tokio::fs::read(&path).await else {
                continue;
            };
            match serde_json::from_slice::<PersistedEntry>(&data) {
                Ok(entry) if entry.key.starts_with(prefix) => Self::remove(&path).await?,
                Ok(_) => {}
                // unreadable records are useless anyway
                Err(_) => Self::remove(&path).await?,
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for path in self.record_paths().await? {
            Self::remove(&path).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
