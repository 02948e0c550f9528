//! In-memory partition storage.
//!
//! Uses a tokio RwLock around nested maps. Nothing survives the process, which
//! makes it the storage of choice for tests and throwaway hosts.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, StoredEntry};
use crate::Error;
use crate::message::RequestKey;

type Entries = HashMap<RequestKey, StoredEntry>;

/// Volatile [`CacheStorage`] with an optional entry quota.
#[derive(Default)]
pub struct MemoryStorage {
    partitions: RwLock<HashMap<String, Entries>>,
    max_entries: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total number of entries across all partitions.
    ///
    /// Writes that would add an entry past the limit fail with
    /// [`Error::QuotaExceeded`]; overwrites of existing keys still succeed.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Total entries across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, partition: &str) -> Result<(), Error> {
        self.partitions.write().await.entry(partition.to_string()).or_default();
        Ok(())
    }

    async fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>, Error> {
        let partitions = self.partitions.read().await;
        Ok(partitions.get(partition).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, partition: &str, key: &RequestKey, entry: StoredEntry) -> Result<(), Error> {
        let mut partitions = self.partitions.write().await;

        if let Some(max) = self.max_entries {
            let exists = partitions.get(partition).is_some_and(|entries| entries.contains_key(key));
            let total: usize = partitions.values().map(HashMap::len).sum();
            if !exists && total >= max {
                return Err(Error::QuotaExceeded(format!("{max} entries already stored, cannot add {key}")));
            }
        }

        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.clone(), entry);
        Ok(())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }

    async fn delete(&self, partition: &str) -> Result<bool, Error> {
        Ok(self.partitions.write().await.remove(partition).is_some())
    }
}
