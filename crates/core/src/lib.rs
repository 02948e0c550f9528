//! Core types and shared functionality for shelter.
//!
//! This crate provides:
//! - Request/response model and request identity
//! - Partition registry with SQLite and in-memory backends
//! - Expiry evaluation and request classification
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod expiry;
pub mod message;

pub use cache::{CacheDb, CacheRegistry, CacheStorage, MemoryStorage, Partition, PartitionNames, PartitionRole, StoredEntry};
pub use classify::{Classifier, RequestClass, Route, StrategyKind};
pub use config::AppConfig;
pub use error::Error;
pub use message::{CacheMode, Request, RequestKey, RequestMode, Response};
