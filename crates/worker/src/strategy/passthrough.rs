//! Cache-then-network passthrough for unclassified requests.
//!
//! No special policy: a cached copy is served if one exists, otherwise the
//! request goes to the network without write-back.

use async_trait::async_trait;

use super::{Strategy, StrategyContext};
use crate::response::{WorkerRequest, WorkerResponse};

pub struct Passthrough {
    ctx: StrategyContext,
}

impl Passthrough {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Strategy for Passthrough {
    async fn handle(&self, req: &WorkerRequest) -> WorkerResponse {
        if let Some(entry) = self.ctx.lookup(req).await {
            return WorkerResponse::from_entry(&entry);
        }

        match self.ctx.fetcher.get(&req.url).await {
            Ok(resp) => WorkerResponse::from_fetch(resp),
            Err(e) => {
                tracing::debug!("passthrough fetch failed for {}: {e}", req.url);
                WorkerResponse::not_found()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchClient, FetchConfig};
    use crate::response::ServedFrom;
    use offcast_core::CacheDb;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn context() -> StrategyContext {
        StrategyContext {
            fetcher: Arc::new(FetchClient::new(FetchConfig::default()).unwrap()),
            cache: CacheDb::open_in_memory().await.unwrap(),
            version: "offcast-v1.0.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_write_back() {
        let server = MockServer::start().await;
        let ctx = context().await;

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("feed"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        let req = WorkerRequest::get(url);

        let pt = Passthrough::new(ctx.clone());
        let resp = pt.handle(&req).await;

        assert_eq!(resp.served_from, ServedFrom::Network);
        assert!(ctx.cache.get_entry("offcast-v1.0.0", &req.cache_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_unclassified_is_404() {
        let ctx = context().await;
        let pt = Passthrough::new(ctx);

        let req = WorkerRequest::get(Url::parse("http://127.0.0.1:1/feed").unwrap());
        let resp = pt.handle(&req).await;

        assert_eq!(resp.status, 404);
    }
}
