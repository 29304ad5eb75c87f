//! Cache-first strategy for static assets.
//!
//! A hit returns immediately with no network round-trip. A miss goes to the
//! network and writes back on success; an unreachable network with nothing
//! cached yields an empty 404 so the page degrades instead of crashing.

use async_trait::async_trait;

use super::{Strategy, StrategyContext};
use crate::response::{WorkerRequest, WorkerResponse};
use offcast_core::EntryKind;

pub struct CacheFirst {
    ctx: StrategyContext,
}

impl CacheFirst {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    async fn handle(&self, req: &WorkerRequest) -> WorkerResponse {
        if let Some(entry) = self.ctx.lookup(req).await {
            return WorkerResponse::from_entry(&entry);
        }

        match self.ctx.fetcher.get(&req.url).await {
            Ok(resp) => {
                if resp.status.is_success() {
                    self.ctx.store(req, &resp, EntryKind::Static).await;
                }
                WorkerResponse::from_fetch(resp)
            }
            Err(e) => {
                tracing::debug!("cache-first fetch failed for {}: {e}", req.url);
                WorkerResponse::not_found()
            }
        }
    }
}
