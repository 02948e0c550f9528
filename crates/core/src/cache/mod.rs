//! Named, versioned cache partitions.
//!
//! A partition maps request identities to stored responses. Storage is an
//! injected [`CacheStorage`] so the registry runs the same over SQLite
//! ([`CacheDb`]) and memory ([`MemoryStorage`]).
//!
//! - Partition names are `{prefix}-{role}-{version}`
//! - Writes fully replace an entry (last writer wins)
//! - Whole partitions are dropped once their version stops being current

pub mod connection;
pub mod entries;
pub mod entry;
pub mod memory;
pub mod migrations;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::Error;
use crate::message::{Request, RequestKey};

pub use connection::CacheDb;
pub use entries::PartitionStats;
pub use entry::{CACHED_AT_HEADER, StoredEntry};
pub use memory::MemoryStorage;

/// Backend for partitioned request/response storage.
///
/// Shared by every in-flight handler; implementations must tolerate
/// concurrent writes to the same key.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the partition if it does not exist yet.
    async fn open(&self, partition: &str) -> Result<(), Error>;

    /// Look up an entry. Never touches the network.
    async fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>, Error>;

    /// Store an entry, replacing any previous one for the same key.
    async fn put(&self, partition: &str, key: &RequestKey, entry: StoredEntry) -> Result<(), Error>;

    /// Keys stored in a partition.
    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error>;

    /// Names of all existing partitions.
    async fn names(&self) -> Result<Vec<String>, Error>;

    /// Drop a partition with all of its entries. Returns whether it existed.
    async fn delete(&self, partition: &str) -> Result<bool, Error>;
}

/// Logical role of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    /// Pre-cached manifest and cache-first assets.
    Static,
    /// Network-first responses (API calls, documents).
    Dynamic,
    /// Stale-while-revalidate responses.
    Runtime,
}

impl PartitionRole {
    pub const ALL: [PartitionRole; 3] = [PartitionRole::Static, PartitionRole::Dynamic, PartitionRole::Runtime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Naming scheme tying partitions to the product prefix and release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    prefix: String,
    version: String,
}

impl PartitionNames {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), version: version.into() }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current partition name for a role.
    pub fn name(&self, role: PartitionRole) -> String {
        format!("{}-{}-{}", self.prefix, role, self.version)
    }

    pub fn current(&self) -> Vec<String> {
        PartitionRole::ALL.iter().map(|role| self.name(*role)).collect()
    }

    /// Role of a current partition name, if it is one.
    pub fn role_of(&self, name: &str) -> Option<PartitionRole> {
        PartitionRole::ALL.into_iter().find(|role| self.name(*role) == name)
    }

    /// A `{prefix}-{role}-{version}` partition of ours whose version is not current.
    ///
    /// Names with an unknown role, or a longer prefix such as
    /// `{prefix}-admin`, belong to someone else and are left alone.
    pub fn is_stale(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(self.prefix.as_str()).and_then(|r| r.strip_prefix('-')) else {
            return false;
        };
        let Some((role, version)) = rest.split_once('-') else {
            return false;
        };
        PartitionRole::ALL.iter().any(|r| r.as_str() == role) && version != self.version
    }
}

/// Entry point to the partitions of one origin.
#[derive(Clone)]
pub struct CacheRegistry {
    storage: Arc<dyn CacheStorage>,
}

impl CacheRegistry {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Open a partition, creating it if absent. Idempotent.
    pub async fn open(&self, name: &str) -> Result<Partition, Error> {
        self.storage.open(name).await?;
        Ok(Partition { name: name.to_string(), storage: Arc::clone(&self.storage) })
    }

    /// Handle to a partition without creating it.
    ///
    /// Lookups on a missing partition miss; the first put creates it.
    pub fn partition(&self, name: &str) -> Partition {
        Partition { name: name.to_string(), storage: Arc::clone(&self.storage) }
    }

    pub async fn names(&self) -> Result<Vec<String>, Error> {
        self.storage.names().await
    }

    /// Delete every partition whose name satisfies `predicate`.
    ///
    /// Returns the number of partitions deleted.
    pub async fn delete_where<F>(&self, predicate: F) -> Result<u64, Error>
    where
        F: Fn(&str) -> bool + Send,
    {
        let mut deleted = 0u64;
        for name in self.storage.names().await? {
            if predicate(&name) && self.storage.delete(&name).await? {
                tracing::debug!(partition = %name, "deleted partition");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Handle to one opened partition.
#[derive(Clone)]
pub struct Partition {
    name: String,
    storage: Arc<dyn CacheStorage>,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn lookup(&self, key: &RequestKey) -> Result<Option<StoredEntry>, Error> {
        self.storage.lookup(&self.name, key).await
    }

    /// Look up the GET identity of a request.
    pub async fn lookup_request(&self, request: &Request) -> Result<Option<StoredEntry>, Error> {
        self.lookup(&RequestKey::get(&request.url)).await
    }

    pub async fn put(&self, key: &RequestKey, entry: StoredEntry) -> Result<(), Error> {
        self.storage.put(&self.name, key, entry).await
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>, Error> {
        self.storage.keys(&self.name).await
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition").field("name", &self.name).finish_non_exhaustive()
    }
}
