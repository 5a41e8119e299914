//! Core types for the cachet HTTP response cache.
//!
//! This crate provides:
//! - The cached entry model and its freshness rules
//! - Per-request override flags
//! - Cache key generators
//! - The storage provider contract with memory, SQLite and Redis backends
//! - The structured log hook
//! - Unified error types and configuration

pub mod config;
pub mod entry;
pub mod error;
pub mod flags;
pub mod key;
pub mod log;
pub mod provider;

pub use config::{CacheConfig, ConfigError};
pub use entry::CacheEntry;
pub use error::{Error, StorageError, TransportError};
pub use flags::{CacheFlags, CacheFlagsExt, IgnoreCache, IgnoreExpired, OnlyCached, cache_flags};
pub use key::{KeyGenerator, UrlKey};
pub use log::{Field, Level, LogSink, NoopSink, ScopedSink, TracingSink};
pub use provider::{MemoryProvider, SqliteProvider, StorageProvider};
