//! Caching strategies.
//!
//! One strategy per resource class, all behind the same seam so the worker
//! facade can dispatch without caring which policy runs:
//!
//! - network-first with cache fallback (API requests)
//! - cache-first with network fallback (static assets)
//! - offline-navigation fallback (top-level page loads)
//! - cache-then-network passthrough (everything else)
//!
//! A strategy never errors: every path ends in a response, synthesized if
//! necessary. Cache faults on the request path are logged and treated as
//! misses; only install/activate treats them as fatal.

pub mod cache_first;
pub mod navigation;
pub mod network_first;
pub mod passthrough;

use std::sync::Arc;

use async_trait::async_trait;

use crate::fetch::{FetchClient, FetchResponse};
use crate::response::{WorkerRequest, WorkerResponse, headers_to_json};
use offcast_core::{CacheDb, CacheEntry, EntryKind};

pub use cache_first::CacheFirst;
pub use navigation::NavigationFallback;
pub use network_first::NetworkFirst;
pub use passthrough::Passthrough;

/// A caching strategy consuming the cache store and the network.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn handle(&self, req: &WorkerRequest) -> WorkerResponse;
}

/// Shared handles every strategy needs.
#[derive(Clone)]
pub struct StrategyContext {
    pub fetcher: Arc<FetchClient>,
    pub cache: CacheDb,
    /// Current cache version entries are read from and written under.
    pub version: String,
}

impl StrategyContext {
    /// Cache lookup that degrades store faults to a miss.
    pub(crate) async fn lookup(&self, req: &WorkerRequest) -> Option<CacheEntry> {
        match self.cache.get_entry(&self.version, &req.cache_key()).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("cache read failed for {}: {e}", req.url);
                None
            }
        }
    }

    /// Best-effort write-back of a fetched response.
    pub(crate) async fn store(&self, req: &WorkerRequest, resp: &FetchResponse, kind: EntryKind) {
        let entry = entry_from_fetch(req, resp, kind, &self.version);
        if let Err(e) = self.cache.put_entry(&entry).await {
            tracing::warn!("cache write failed for {}: {e}", req.url);
        }
    }
}

/// Build a cache entry from a live response, stamped with now.
pub fn entry_from_fetch(req: &WorkerRequest, resp: &FetchResponse, kind: EntryKind, version: &str) -> CacheEntry {
    CacheEntry {
        key: req.cache_key(),
        version: version.to_string(),
        kind,
        method: req.method.to_uppercase(),
        url: req.url.to_string(),
        status: resp.status.as_u16(),
        headers_json: headers_to_json(&resp.headers),
        body: resp.bytes.to_vec(),
        stored_at: chrono::Utc::now().to_rfc3339(),
    }
}
