//! Network-first strategy for API requests.
//!
//! The live response always wins when the network is reachable, even when
//! it is non-2xx: a success-shaped error body still belongs to the caller
//! and must not trigger fallback. Only transport failures fall back, first
//! to the cache (stale entries allowed, staleness is best-effort) and then
//! to the synthesized offline envelope.

use async_trait::async_trait;
use regex::Regex;

use super::{Strategy, StrategyContext};
use crate::response::{WorkerRequest, WorkerResponse};
use offcast_core::{Error, EntryKind};

pub struct NetworkFirst {
    ctx: StrategyContext,
    cacheable: Vec<Regex>,
}

impl NetworkFirst {
    /// `patterns` select which API paths are eligible for brief caching:
    /// GET-only, filterable, non-personalized listings.
    pub fn new(ctx: StrategyContext, patterns: &[String]) -> Result<Self, Error> {
        let cacheable = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::InvalidInput(format!("{p}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ctx, cacheable })
    }

    fn is_cacheable(&self, path: &str) -> bool {
        self.cacheable.iter().any(|re| re.is_match(path))
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    async fn handle(&self, req: &WorkerRequest) -> WorkerResponse {
        match self.ctx.fetcher.get(&req.url).await {
            Ok(resp) => {
                if resp.status.is_success() && self.is_cacheable(req.url.path()) {
                    self.ctx.store(req, &resp, EntryKind::Api).await;
                }
                WorkerResponse::from_fetch(resp)
            }
            Err(e) => {
                tracing::debug!("network-first fetch failed for {}: {e}", req.url);
                match self.ctx.lookup(req).await {
                    Some(entry) => WorkerResponse::from_entry(&entry),
                    None => WorkerResponse::offline_api(),
                }
            }
        }
    }
}
