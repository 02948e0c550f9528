//! Worker code for shelter.
//!
//! This crate provides the network seam, the caching strategies and the
//! lifecycle controller that the server hosts.

pub mod fetch;
pub mod lifecycle;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchConfig, HttpFetcher, Network};
pub use lifecycle::{
    ActivateReport, ClickOutcome, ClientHost, FetchDisposition, HostEvent, InstallReport, LifecycleState, Notification,
    RecordingHost, RefreshReport, ServiceWorker, SyncReport, WindowClient, WorkerStatus,
};
pub use strategy::{Handled, ResponseSource, Revalidation, StrategyExecutor};
pub use sync::Outbox;
