//! SQLite-backed cache store and background-sync queue.
//!
//! This module provides the durable key-value store behind the caching
//! strategies, using SQLite with async access via tokio-rusqlite:
//!
//! - Request-addressed entries keyed by SHA-256 of method + URL
//! - Versioned entries with rollover cleanup on activation
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - A durable queue of deferred actions for background sync

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod sync_queue;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, EntryKind, EntryStat};
pub use sync_queue::PendingAction;
