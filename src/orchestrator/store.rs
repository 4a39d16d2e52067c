//! Durable per-actor state
//!
//! The store holds one [`ActorRecord`] per key. Saving an empty record
//! deletes it, so a finished actor leaves nothing behind.

use crate::error::{Error, Result};
use crate::orchestrator::key::ActorKey;
use crate::orchestrator::state::ActorRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage backend for actor records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record of `key`, or an empty record when nothing is stored
    async fn load(&self, key: &ActorKey) -> Result<ActorRecord>;

    /// Replace the record of `record.key`; an empty record is deleted
    async fn save(&self, record: &ActorRecord) -> Result<()>;

    /// Keys that have a stored record
    async fn keys(&self) -> Result<Vec<ActorKey>>;
}

/// State store kept in memory; everything is lost on restart
#[derive(Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<ActorKey, ActorRecord>>,
}

impl InMemoryStateStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, key: &ActorKey) -> Result<ActorRecord> {
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .cloned()
            .unwrap_or_else(|| ActorRecord::new(key.clone())))
    }

    async fn save(&self, record: &ActorRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if record.is_empty() {
            records.remove(&record.key);
        } else {
            records.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<ActorKey>> {
        let records = self.records.read().await;
        let mut keys: Vec<ActorKey> = records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// State store writing one JSON document per actor into a directory
///
/// Documents are written to a temporary file and renamed into place, so a
/// crash never leaves a half-written record.
pub struct FileStateStore {
    dir: PathBuf,
}

const RECORD_EXTENSION: &str = "json";

impl FileStateStore {
    /// Store under `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &ActorKey) -> PathBuf {
        // Keys contain URLs; name files by a stable hash of the key instead
        let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.to_string().as_bytes());
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    async fn read(path: &Path) -> Result<Option<ActorRecord>> {
        match fs::read_to_string(path).await {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::Store(format!("corrupt record {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, key: &ActorKey) -> Result<ActorRecord> {
        let path = self.path(key);
        match Self::read(&path).await? {
            Some(record) if record.key == *key => Ok(record),
            Some(record) => Err(Error::Store(format!(
                "{} holds {} instead of {key}",
                path.display(),
                record.key
            ))),
            None => Ok(ActorRecord::new(key.clone())),
        }
    }

    async fn save(&self, record: &ActorRecord) -> Result<()> {
        let path = self.path(&record.key);

        if record.is_empty() {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(actor = %record.key, "Removed actor record"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(actor = %record.key, path = %path.display(), "Saved actor record");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<ActorKey>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read(&path).await {
                Ok(Some(record)) => keys.push(record.key),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable actor record: {e}"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::state::InProgressPullRequest;
    use tempfile::TempDir;

    fn batch_key() -> ActorKey {
        ActorKey::Batch {
            repository: "https://github.com/dotnet/sdk".to_string(),
            branch: "main".to_string(),
        }
    }

    fn record_with_pr(key: ActorKey) -> ActorRecord {
        let mut record = ActorRecord::new(key);
        record.pull_request = Some(InProgressPullRequest::new(
            "https://github.com/dotnet/sdk/pull/1",
            "darc-main-1",
        ));
        record
    }

    #[tokio::test]
    async fn test_in_memory_round_trip_and_delete() {
        let store = InMemoryStateStore::new();
        let key = batch_key();

        assert!(store.load(&key).await.unwrap().is_empty());

        store.save(&record_with_pr(key.clone())).await.unwrap();
        assert!(store.load(&key).await.unwrap().pull_request.is_some());
        assert_eq!(store.keys().await.unwrap(), vec![key.clone()]);

        store.save(&ActorRecord::new(key.clone())).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let key = batch_key();

        FileStateStore::new(temp.path())
            .save(&record_with_pr(key.clone()))
            .await
            .unwrap();

        let reopened = FileStateStore::new(temp.path());
        let record = reopened.load(&key).await.unwrap();
        assert_eq!(
            record.pull_request.unwrap().url,
            "https://github.com/dotnet/sdk/pull/1"
        );
        assert_eq!(reopened.keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_file_store_batch_key_with_userinfo_url() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path());
        let key = ActorKey::Batch {
            repository: "https://bot@github.com/dotnet/runtime".to_string(),
            branch: "release/9.0".to_string(),
        };

        store.save(&record_with_pr(key.clone())).await.unwrap();

        assert!(store.load(&key).await.unwrap().pull_request.is_some());
        assert_eq!(store.keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_file_store_removes_empty_record() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path());
        let key = ActorKey::Subscription(Uuid::new_v4());

        store.save(&record_with_pr(key.clone())).await.unwrap();
        store.save(&ActorRecord::new(key.clone())).await.unwrap();

        assert!(store.keys().await.unwrap().is_empty());
        assert!(store.load(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_missing_dir_has_no_keys() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp.path().join("absent"));
        assert!(store.keys().await.unwrap().is_empty());
    }
}
