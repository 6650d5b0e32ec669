//! Core types and shared functionality for rendercache.
//!
//! This crate provides:
//! - The freshness coordinator deciding between serving and rebuilding
//! - The cache entry model and the store trait with SQLite, Redis and
//!   in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod key;
pub mod request;
pub mod store;

pub use config::{AppConfig, ConfigError, RendererKind};
pub use coordinator::{CompleteOutcome, FreshnessCoordinator, FreshnessPolicy, SkipReason, StartDecision};
pub use entry::{CacheEntry, EntryPatch};
pub use error::Error;
pub use request::RenderRequest;
pub use store::{CacheEntryStore, MemoryStore, SqliteStore, open_store, spawn_heartbeat};
