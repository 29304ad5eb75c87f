//! Core types and shared functionality for offcast.
//!
//! This crate provides:
//! - Versioned request/response cache with SQLite backend
//! - Durable background-sync queue for deferred actions
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, EntryKind, PendingAction};
pub use config::AppConfig;
pub use error::Error;
