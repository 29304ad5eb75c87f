//! The worker facade.
//!
//! Ties the classifier, strategies, lifecycle, push bridge, and sync engine
//! together behind one handle the gateway drives. Each inbound event maps to
//! one method: `handle_fetch`, `handle_message`, `on_push`,
//! `on_notification_click`, `sync_now`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::{Classifier, Decision, ResourceClass};
use crate::fetch::{FetchClient, FetchConfig, canonicalize, resolve};
use crate::lifecycle::LifecycleController;
use crate::push::{ClientCommand, Notification, NotificationBridge};
use crate::response::{WorkerRequest, WorkerResponse};
use crate::strategy::{
    CacheFirst, NavigationFallback, NetworkFirst, Passthrough, Strategy, StrategyContext, entry_from_fetch,
};
use crate::sync::{DrainReport, SyncEngine, SyncPolicy};
use offcast_core::cache::hash::entry_key;
use offcast_core::{AppConfig, CacheDb, EntryKind, Error};

/// Inbound control messages from clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Sweep API entries older than the freshness window.
    CleanCache,
    /// Accepted for compatibility; skipping the waiting state is already
    /// the default here.
    SkipWaiting,
    /// Report the current cache version.
    Version,
    /// Fetch a media URL and pin it for offline playback.
    CacheMedia { url: String },
    /// Unpin previously saved media.
    RemoveMedia { url: String },
}

/// Replies to control messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlReply {
    Cleaned { deleted: u64 },
    Ack,
    Version { version: String },
    MediaCached { url: String },
    MediaRemoved { url: String, existed: bool },
}

pub struct Worker {
    classifier: Classifier,
    network_first: NetworkFirst,
    cache_first: CacheFirst,
    navigation: NavigationFallback,
    passthrough: Passthrough,
    lifecycle: LifecycleController,
    bridge: NotificationBridge,
    sync: SyncEngine,
    fetcher: Arc<FetchClient>,
    cache: CacheDb,
    origin: Url,
    version: String,
    api_entry_ttl: chrono::Duration,
}

impl Worker {
    pub fn new(cfg: &AppConfig, cache: CacheDb) -> Result<Self, Error> {
        let origin = Url::parse(&cfg.upstream).map_err(|e| Error::InvalidUrl(format!("upstream: {e}")))?;
        let fetcher = Arc::new(FetchClient::new(FetchConfig::from(cfg))?);
        let version = cfg.current_cache();

        let ctx = StrategyContext { fetcher: fetcher.clone(), cache: cache.clone(), version: version.clone() };

        let offline_doc =
            resolve(&origin, &cfg.offline_doc).map_err(|e| Error::InvalidUrl(format!("offline_doc: {e}")))?;

        let lifecycle = LifecycleController::new(
            fetcher.clone(),
            cache.clone(),
            origin.clone(),
            version.clone(),
            cfg.precache.clone(),
        );

        let sync = SyncEngine::new(
            cache.clone(),
            fetcher.clone(),
            SyncPolicy {
                base_backoff: std::time::Duration::from_secs(cfg.sync_base_backoff_secs),
                max_attempts: cfg.sync_max_attempts,
            },
        );

        let api_entry_ttl = chrono::Duration::from_std(cfg.api_entry_ttl())
            .map_err(|e| Error::InvalidInput(format!("api_entry_ttl_secs: {e}")))?;

        Ok(Self {
            classifier: Classifier::new(cfg)?,
            network_first: NetworkFirst::new(ctx.clone(), &cfg.cacheable_api_patterns)?,
            cache_first: CacheFirst::new(ctx.clone()),
            navigation: NavigationFallback::new(ctx.clone(), offline_doc),
            passthrough: Passthrough::new(ctx),
            lifecycle,
            bridge: NotificationBridge::new(cfg.notification_title.clone(), cfg.notification_body.clone()),
            sync,
            fetcher,
            cache,
            origin,
            version,
            api_entry_ttl,
        })
    }

    /// Run install then activate. Fatal on failure; the previous deploy
    /// keeps running in its own process.
    pub async fn start(&self) -> Result<(), Error> {
        self.lifecycle.install().await?;
        self.lifecycle.activate().await?;
        Ok(())
    }

    /// Handle one intercepted request.
    ///
    /// Until activation completes everything falls through to network-only
    /// handling, as does anything the classifier declines to intercept.
    pub async fn handle_fetch(&self, req: &WorkerRequest) -> WorkerResponse {
        if !self.lifecycle.is_active().await {
            return self.network_only(req).await;
        }

        match self.classifier.classify(&req.method, &req.url, req.mode) {
            Decision::Bypass => self.network_only(req).await,
            Decision::Handle(ResourceClass::Api) => self.network_first.handle(req).await,
            Decision::Handle(ResourceClass::Static) => self.cache_first.handle(req).await,
            Decision::Handle(ResourceClass::Navigation) => self.navigation.handle(req).await,
            Decision::Handle(ResourceClass::Other) => self.passthrough.handle(req).await,
        }
    }

    async fn network_only(&self, req: &WorkerRequest) -> WorkerResponse {
        let body = req.body.as_ref().map(|b| b.to_vec());
        match self.fetcher.forward(&req.method, &req.url, &req.headers_json, body).await {
            Ok(resp) => WorkerResponse::from_fetch(resp),
            Err(e) => {
                tracing::debug!("pass-through fetch failed for {}: {e}", req.url);
                WorkerResponse::bad_gateway(&e.to_string())
            }
        }
    }

    /// Handle a control message from a client.
    pub async fn handle_message(&self, msg: ControlMessage) -> Result<ControlReply, Error> {
        match msg {
            ControlMessage::CleanCache => {
                let deleted = self.clean_cache().await?;
                Ok(ControlReply::Cleaned { deleted })
            }
            ControlMessage::SkipWaiting => Ok(ControlReply::Ack),
            ControlMessage::Version => Ok(ControlReply::Version { version: self.version.clone() }),
            ControlMessage::CacheMedia { url } => self.cache_media(&url).await,
            ControlMessage::RemoveMedia { url } => self.remove_media(&url).await,
        }
    }

    /// Delete API entries older than the freshness window. Returns the
    /// number removed.
    pub async fn clean_cache(&self) -> Result<u64, Error> {
        let cutoff = (chrono::Utc::now() - self.api_entry_ttl).to_rfc3339();
        let deleted = self.cache.purge_stale_api_entries(&cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "cleaned stale API cache entries");
        }
        Ok(deleted)
    }

    async fn cache_media(&self, raw: &str) -> Result<ControlReply, Error> {
        let url = self.media_url(raw)?;
        let resp = self.fetcher.get(&url).await?;
        if !resp.status.is_success() {
            return Err(Error::Network(format!("media fetch returned {}", resp.status.as_u16())));
        }

        let req = WorkerRequest::get(url.clone());
        let entry = entry_from_fetch(&req, &resp, EntryKind::Media, &self.version);
        self.cache.put_entry(&entry).await?;

        self.bridge.announce("Saved for offline", "Available without a connection", url.as_str());
        Ok(ControlReply::MediaCached { url: url.to_string() })
    }

    async fn remove_media(&self, raw: &str) -> Result<ControlReply, Error> {
        let url = self.media_url(raw)?;
        let existed = self
            .cache
            .delete_entry(&self.version, &entry_key("GET", url.as_str()))
            .await?;
        Ok(ControlReply::MediaRemoved { url: url.to_string(), existed })
    }

    fn media_url(&self, raw: &str) -> Result<Url, Error> {
        let resolved = if raw.contains("://") {
            canonicalize(raw)
        } else {
            resolve(&self.origin, raw)
        };
        resolved.map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Display a push payload as a notification.
    pub fn on_push(&self, payload: Option<&[u8]>) -> Notification {
        self.bridge.on_push(payload)
    }

    /// Route a notification click to a client command.
    pub fn on_notification_click(&self, action: Option<&str>, url: &str) -> Option<ClientCommand> {
        self.bridge.on_click(action, url)
    }

    /// Drain the deferred-action queue once.
    pub async fn sync_now(&self) -> Result<DrainReport, Error> {
        self.sync.drain().await
    }

    /// Defer an action for background sync.
    pub async fn defer_action(
        &self, method: &str, url: &str, headers_json: &str, body: Option<Vec<u8>>,
    ) -> Result<i64, Error> {
        self.sync.enqueue(method, url, headers_json, body).await
    }

    pub fn bridge(&self) -> &NotificationBridge {
        &self.bridge
    }

    pub async fn is_active(&self) -> bool {
        self.lifecycle.is_active().await
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RequestMode;
    use crate::response::ServedFrom;
    use offcast_core::CacheEntry;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn worker_against(server: &MockServer) -> (Worker, CacheDb, AppConfig) {
        let cfg = AppConfig { upstream: server.uri(), precache: vec!["/".into(), "/offline.html".into()], ..Default::default() };
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = Worker::new(&cfg, cache.clone()).unwrap();
        (worker, cache, cfg)
    }

    fn mock_ok(p: &str, body: &str) -> Mock {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
    }

    #[tokio::test]
    async fn test_requests_bypass_strategies_until_active() {
        let server = MockServer::start().await;
        mock_ok("/", "<html>shell</html>").mount(&server).await;
        mock_ok("/offline.html", "<html>offline</html>").mount(&server).await;
        mock_ok("/assets/app.js", "js").mount(&server).await;

        let (worker, cache, cfg) = worker_against(&server).await;

        // Before install: static asset handled network-only, nothing cached.
        let url = Url::parse(&format!("{}/assets/app.js", server.uri())).unwrap();
        let req = WorkerRequest::get(url);
        let resp = worker.handle_fetch(&req).await;
        assert_eq!(resp.served_from, ServedFrom::Network);
        assert!(cache.get_entry(&cfg.current_cache(), &req.cache_key()).await.unwrap().is_none());

        worker.start().await.unwrap();

        // After activation the same request is cached by cache-first.
        worker.handle_fetch(&req).await;
        assert!(cache.get_entry(&cfg.current_cache(), &req.cache_key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_classes_dispatch_to_distinct_strategies() {
        let server = MockServer::start().await;
        mock_ok("/", "<html>shell</html>").mount(&server).await;
        mock_ok("/offline.html", "<html>offline</html>").mount(&server).await;

        let (worker, _cache, cfg) = worker_against(&server).await;
        worker.start().await.unwrap();
        drop(server);

        // API offline with no cache: synthesized JSON envelope.
        let api = WorkerRequest::get(Url::parse(&format!("{}/api/v1/videos", cfg.upstream)).unwrap());
        let resp = worker.handle_fetch(&api).await;
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["offline"], true);

        // Navigation offline: precached offline document.
        let nav = WorkerRequest {
            mode: RequestMode::Navigate,
            ..WorkerRequest::get(Url::parse(&format!("{}/watch/1", cfg.upstream)).unwrap())
        };
        let resp = worker.handle_fetch(&nav).await;
        assert_eq!(resp.served_from, ServedFrom::Cache);
        assert!(std::str::from_utf8(&resp.body).unwrap().contains("offline"));

        // Precached static path offline: cache-first hit.
        let shell = WorkerRequest::get(Url::parse(&format!("{}/offline.html", cfg.upstream)).unwrap());
        let resp = worker.handle_fetch(&shell).await;
        assert_eq!(resp.served_from, ServedFrom::Cache);
    }

    #[tokio::test]
    async fn test_clean_cache_message() {
        let server = MockServer::start().await;
        mock_ok("/", "<html>shell</html>").mount(&server).await;
        mock_ok("/offline.html", "<html>offline</html>").mount(&server).await;

        let (worker, cache, cfg) = worker_against(&server).await;
        worker.start().await.unwrap();

        let version = cfg.current_cache();
        let mut stale = CacheEntry {
            key: entry_key("GET", "http://u/api/v1/videos"),
            version: version.clone(),
            kind: EntryKind::Api,
            method: "GET".into(),
            url: "http://u/api/v1/videos".into(),
            status: 200,
            headers_json: "{}".into(),
            body: b"[]".to_vec(),
            stored_at: (chrono::Utc::now() - chrono::Duration::minutes(10)).to_rfc3339(),
        };
        cache.put_entry(&stale).await.unwrap();
        stale.key = entry_key("GET", "http://u/api/v1/categories");
        stale.url = "http://u/api/v1/categories".into();
        stale.stored_at = chrono::Utc::now().to_rfc3339();
        cache.put_entry(&stale).await.unwrap();

        let reply = worker.handle_message(ControlMessage::CleanCache).await.unwrap();
        match reply {
            ControlReply::Cleaned { deleted } => assert_eq!(deleted, 1),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_message() {
        let server = MockServer::start().await;
        mock_ok("/", "x").mount(&server).await;
        mock_ok("/offline.html", "x").mount(&server).await;

        let (worker, _cache, cfg) = worker_against(&server).await;

        let reply = worker.handle_message(ControlMessage::Version).await.unwrap();
        match reply {
            ControlReply::Version { version } => assert_eq!(version, cfg.current_cache()),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_media_pin_and_unpin() {
        let server = MockServer::start().await;
        mock_ok("/", "x").mount(&server).await;
        mock_ok("/offline.html", "x").mount(&server).await;
        mock_ok("/media/sermon.mp4", "mp4-bytes").mount(&server).await;

        let (worker, cache, cfg) = worker_against(&server).await;
        worker.start().await.unwrap();

        let reply = worker
            .handle_message(ControlMessage::CacheMedia { url: "/media/sermon.mp4".into() })
            .await
            .unwrap();
        let url = match reply {
            ControlReply::MediaCached { url } => url,
            other => panic!("unexpected reply: {other:?}"),
        };

        let key = entry_key("GET", &url);
        let entry = cache.get_entry(&cfg.current_cache(), &key).await.unwrap().unwrap();
        assert_eq!(entry.kind, EntryKind::Media);

        let reply = worker
            .handle_message(ControlMessage::RemoveMedia { url: "/media/sermon.mp4".into() })
            .await
            .unwrap();
        match reply {
            ControlReply::MediaRemoved { existed, .. } => assert!(existed),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(cache.get_entry(&cfg.current_cache(), &key).await.unwrap().is_none());
    }

    #[test]
    fn test_control_message_wire_format() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"clean-cache"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::CleanCache));

        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"cache-media","url":"/media/sermon.mp4"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::CacheMedia { .. }));
    }
}
