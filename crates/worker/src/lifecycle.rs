//! Install/activate lifecycle.
//!
//! The controller owns the state machine gating strategy dispatch. Until it
//! reaches `Active`, every intercepted request falls through to network-only
//! handling, so there is no window where a half-installed cache serves
//! traffic.

use std::sync::Arc;

use tokio::sync::RwLock;
use url::Url;

use crate::fetch::{FetchClient, resolve};
use crate::response::headers_to_json;
use offcast_core::{CacheDb, CacheEntry, EntryKind, Error};
use offcast_core::cache::hash::entry_key;

/// Lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Active,
}

pub struct LifecycleController {
    fetcher: Arc<FetchClient>,
    cache: CacheDb,
    origin: Url,
    version: String,
    precache: Vec<String>,
    state: RwLock<WorkerState>,
}

impl LifecycleController {
    pub fn new(fetcher: Arc<FetchClient>, cache: CacheDb, origin: Url, version: String, precache: Vec<String>) -> Self {
        Self { fetcher, cache, origin, version, precache, state: RwLock::new(WorkerState::Installing) }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        *self.state.read().await == WorkerState::Active
    }

    /// Fetch and commit the critical resource set.
    ///
    /// All-or-nothing: every resource is fetched and staged first, then the
    /// whole set is written in one transaction. Any fetch failure (or non-2xx
    /// status) aborts with zero entries committed and the state unchanged.
    pub async fn install(&self) -> Result<(), Error> {
        let mut staged = Vec::with_capacity(self.precache.len());

        for path in &self.precache {
            let url = resolve(&self.origin, path).map_err(|e| Error::PrecacheFailed(format!("{path}: {e}")))?;
            let resp = self
                .fetcher
                .get(&url)
                .await
                .map_err(|e| Error::PrecacheFailed(format!("{path}: {e}")))?;

            if !resp.status.is_success() {
                return Err(Error::PrecacheFailed(format!("{path} returned {}", resp.status.as_u16())));
            }

            staged.push(CacheEntry {
                key: entry_key("GET", url.as_str()),
                version: self.version.clone(),
                kind: EntryKind::Precache,
                method: "GET".to_string(),
                url: url.to_string(),
                status: resp.status.as_u16(),
                headers_json: headers_to_json(&resp.headers),
                body: resp.bytes.to_vec(),
                stored_at: chrono::Utc::now().to_rfc3339(),
            });
        }

        let count = staged.len();
        self.cache.put_entries_atomic(staged).await?;

        *self.state.write().await = WorkerState::Installed;
        tracing::info!(resources = count, version = %self.version, "install complete");

        Ok(())
    }

    /// Delete stale cache versions, then claim traffic.
    ///
    /// Cleanup happens before the state flips to `Active`, so no request is
    /// ever served strategy logic alongside a stale version.
    pub async fn activate(&self) -> Result<u64, Error> {
        *self.state.write().await = WorkerState::Activating;

        let deleted = self.cache.delete_versions_except(&self.version).await?;

        *self.state.write().await = WorkerState::Active;
        tracing::info!(deleted, version = %self.version, "activated");

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VERSION: &str = "offcast-v1.0.0";

    fn controller(server_uri: &str, precache: Vec<String>, cache: CacheDb) -> LifecycleController {
        LifecycleController::new(
            Arc::new(FetchClient::new(FetchConfig::default()).unwrap()),
            cache,
            Url::parse(server_uri).unwrap(),
            VERSION.to_string(),
            precache,
        )
    }

    fn mock_page(p: &str) -> Mock {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("<html>{p}</html>")))
    }

    #[tokio::test]
    async fn test_install_populates_critical_set() {
        let server = MockServer::start().await;
        for p in ["/", "/index.html", "/offline.html"] {
            mock_page(p).mount(&server).await;
        }

        let cache = CacheDb::open_in_memory().await.unwrap();
        let lc = controller(
            &server.uri(),
            vec!["/".into(), "/index.html".into(), "/offline.html".into()],
            cache.clone(),
        );

        assert_eq!(lc.state().await, WorkerState::Installing);
        lc.install().await.unwrap();
        assert_eq!(lc.state().await, WorkerState::Installed);

        assert_eq!(cache.entry_keys(VERSION).await.unwrap().len(), 3);

        let key = entry_key("GET", &format!("{}/offline.html", server.uri()));
        let entry = cache.get_entry(VERSION, &key).await.unwrap().unwrap();
        assert_eq!(entry.kind, EntryKind::Precache);
    }

    #[tokio::test]
    async fn test_install_atomicity_on_failure() {
        // One of N critical resources 404s: zero entries are committed and
        // the lifecycle does not advance.
        let server = MockServer::start().await;
        mock_page("/").mount(&server).await;
        mock_page("/index.html").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/offline.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = CacheDb::open_in_memory().await.unwrap();
        let lc = controller(
            &server.uri(),
            vec!["/".into(), "/index.html".into(), "/offline.html".into()],
            cache.clone(),
        );

        let err = lc.install().await.unwrap_err();
        assert!(matches!(err, Error::PrecacheFailed(_)));

        assert!(cache.entry_keys(VERSION).await.unwrap().is_empty());
        assert_eq!(lc.state().await, WorkerState::Installing);
        assert!(!lc.is_active().await);
    }

    #[tokio::test]
    async fn test_install_atomicity_on_unreachable_network() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let lc = controller("http://127.0.0.1:1", vec!["/".into(), "/index.html".into()], cache.clone());

        assert!(lc.install().await.is_err());
        assert!(cache.entry_keys(VERSION).await.unwrap().is_empty());
        assert!(!lc.is_active().await);
    }

    #[tokio::test]
    async fn test_activation_deletes_stale_versions() {
        let server = MockServer::start().await;
        mock_page("/").mount(&server).await;

        let cache = CacheDb::open_in_memory().await.unwrap();

        // Two prior versions left behind by earlier deploys.
        for version in ["offcast-v0.8.0", "offcast-v0.9.0"] {
            cache
                .put_entry(&CacheEntry {
                    key: entry_key("GET", "http://old.example/app.js"),
                    version: version.to_string(),
                    kind: EntryKind::Static,
                    method: "GET".to_string(),
                    url: "http://old.example/app.js".to_string(),
                    status: 200,
                    headers_json: "{}".to_string(),
                    body: b"old".to_vec(),
                    stored_at: chrono::Utc::now().to_rfc3339(),
                })
                .await
                .unwrap();
        }

        let lc = controller(&server.uri(), vec!["/".into()], cache.clone());
        lc.install().await.unwrap();
        lc.activate().await.unwrap();

        assert!(lc.is_active().await);
        assert_eq!(cache.cache_versions().await.unwrap(), vec![VERSION.to_string()]);
    }
}
