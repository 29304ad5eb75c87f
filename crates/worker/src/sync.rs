//! Background-sync replay.
//!
//! Drains the durable queue of actions deferred while offline. An action is
//! removed only once its replay gets a 2xx back; anything else re-queues it
//! with exponential backoff until the attempt cap, after which it is dropped
//! with a warning. Failures are never escalated to the user.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::fetch::FetchClient;
use offcast_core::{CacheDb, Error};

/// Retry policy for queued actions.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Delay after the first failure; doubles on each subsequent one.
    pub base_backoff: Duration,
    /// Attempts before an action is dropped.
    pub max_attempts: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self { base_backoff: Duration::from_secs(30), max_attempts: 5 }
    }
}

impl SyncPolicy {
    /// Backoff before the next try, given the number of failed attempts so
    /// far (1-based).
    pub fn backoff_after(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << shift)
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DrainReport {
    pub replayed: u64,
    pub retried: u64,
    pub dropped: u64,
}

pub struct SyncEngine {
    cache: CacheDb,
    fetcher: Arc<FetchClient>,
    policy: SyncPolicy,
}

impl SyncEngine {
    pub fn new(cache: CacheDb, fetcher: Arc<FetchClient>, policy: SyncPolicy) -> Self {
        Self { cache, fetcher, policy }
    }

    /// Defer a network action for later replay. Returns the queue id.
    pub async fn enqueue(
        &self, method: &str, url: &str, headers_json: &str, body: Option<Vec<u8>>,
    ) -> Result<i64, Error> {
        let id = self.cache.enqueue_action(method, url, headers_json, body).await?;
        tracing::debug!(id, method, url, "queued deferred action");
        Ok(id)
    }

    /// Replay every due action once.
    pub async fn drain(&self) -> Result<DrainReport, Error> {
        let now = chrono::Utc::now();
        let due = self.cache.due_actions(&now.to_rfc3339()).await?;
        let mut report = DrainReport::default();

        for action in due {
            let url = match url::Url::parse(&action.url) {
                Ok(url) => url,
                Err(e) => {
                    // Unreplayable forever; drop instead of looping on it.
                    tracing::warn!(id = action.id, url = %action.url, "dropping unparseable queued action: {e}");
                    self.cache.delete_action(action.id).await?;
                    report.dropped += 1;
                    continue;
                }
            };

            let replay = self
                .fetcher
                .forward(&action.method, &url, &action.headers_json, action.body.clone())
                .await;

            match replay {
                Ok(resp) if resp.status.is_success() => {
                    self.cache.delete_action(action.id).await?;
                    report.replayed += 1;
                    tracing::debug!(id = action.id, url = %action.url, "replayed deferred action");
                }
                outcome => {
                    let reason = match outcome {
                        Ok(resp) => format!("status {}", resp.status.as_u16()),
                        Err(e) => e.to_string(),
                    };
                    let attempts = action.attempts + 1;

                    if attempts >= self.policy.max_attempts {
                        tracing::warn!(
                            id = action.id,
                            url = %action.url,
                            attempts,
                            "dropping deferred action after final failed replay: {reason}"
                        );
                        self.cache.delete_action(action.id).await?;
                        report.dropped += 1;
                    } else {
                        let next = now + chrono::Duration::from_std(self.policy.backoff_after(attempts))
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                        self.cache
                            .record_failed_attempt(action.id, attempts, &next.to_rfc3339())
                            .await?;
                        report.retried += 1;
                        tracing::debug!(id = action.id, attempts, "replay failed, re-queued: {reason}");
                    }
                }
            }
        }

        Ok(report)
    }
}
