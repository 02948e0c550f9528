//! Cache inspection tools.
//!
//! Partitions may be named by role (`static`, `dynamic`, `runtime`), which
//! resolves to the current version, or by full partition name.

pub mod get;
pub mod purge;

use shelter_client::ServiceWorker;
use shelter_core::PartitionRole;

pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};

fn partition_name(worker: &ServiceWorker, input: &str) -> String {
    PartitionRole::ALL
        .into_iter()
        .find(|role| role.as_str() == input)
        .map(|role| worker.names().name(role))
        .unwrap_or_else(|| input.to_string())
}
