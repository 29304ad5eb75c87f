//! Offline-fallback strategy for top-level navigations.
//!
//! Live navigations pass through untouched and are never cached here;
//! whatever shell caching exists comes from the install manifest. When the
//! network fails the cached offline document is served, and if even that is
//! missing a minimal self-contained page is synthesized so a navigation
//! never hard-fails.

use async_trait::async_trait;
use url::Url;

use super::{Strategy, StrategyContext};
use crate::response::{WorkerRequest, WorkerResponse};
use offcast_core::cache::hash::entry_key;

pub struct NavigationFallback {
    ctx: StrategyContext,
    offline_doc: Url,
}

impl NavigationFallback {
    /// `offline_doc` is the absolute URL of the pre-built offline page,
    /// consulted before synthesizing one.
    pub fn new(ctx: StrategyContext, offline_doc: Url) -> Self {
        Self { ctx, offline_doc }
    }

    async fn offline_fallback(&self) -> WorkerResponse {
        let key = entry_key("GET", self.offline_doc.as_str());
        match self.ctx.cache.get_entry(&self.ctx.version, &key).await {
            Ok(Some(entry)) => WorkerResponse::from_entry(&entry),
            Ok(None) => WorkerResponse::offline_page(),
            Err(e) => {
                tracing::warn!("offline document lookup failed: {e}");
                WorkerResponse::offline_page()
            }
        }
    }
}

#[async_trait]
impl Strategy for NavigationFallback {
    async fn handle(&self, req: &WorkerRequest) -> WorkerResponse {
        match self.ctx.fetcher.get(&req.url).await {
            Ok(resp) => WorkerResponse::from_fetch(resp),
            Err(e) => {
                tracing::debug!("navigation fetch failed for {}: {e}", req.url);
                self.offline_fallback().await
            }
        }
    }
}
