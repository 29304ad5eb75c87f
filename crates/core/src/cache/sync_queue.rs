//! Durable queue of deferred network actions.
//!
//! Actions land here when they are attempted while the upstream is
//! unreachable. They persist across restarts and are deleted only once a
//! replay succeeds; the replay engine owns the backoff policy and records
//! failed attempts through [`CacheDb::record_failed_attempt`].

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A deferred network call awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: i64,
    pub method: String,
    pub url: String,
    /// Request headers as a JSON string map.
    pub headers_json: String,
    pub body: Option<Vec<u8>>,
    /// Failed replay attempts so far.
    pub attempts: u32,
    pub created_at: String,
    /// RFC 3339 time before which the action is not due.
    pub next_attempt_at: String,
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingAction> {
    Ok(PendingAction {
        id: row.get(0)?,
        method: row.get(1)?,
        url: row.get(2)?,
        headers_json: row.get(3)?,
        body: row.get(4)?,
        attempts: row.get::<_, i64>(5)? as u32,
        created_at: row.get(6)?,
        next_attempt_at: row.get(7)?,
    })
}

impl CacheDb {
    /// Append a deferred action to the queue. Returns its id.
    pub async fn enqueue_action(
        &self, method: &str, url: &str, headers_json: &str, body: Option<Vec<u8>>,
    ) -> Result<i64, Error> {
        let method = method.to_uppercase();
        let url = url.to_string();
        let headers_json = headers_json.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO sync_queue (method, url, headers_json, body, attempts, created_at, next_attempt_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                    params![method, url, headers_json, body, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Actions due for replay at `now` (RFC 3339), oldest first.
    pub async fn due_actions(&self, now: &str) -> Result<Vec<PendingAction>, Error> {
        let now = now.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<PendingAction>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, method, url, headers_json, body, attempts, created_at, next_attempt_at
                     FROM sync_queue WHERE next_attempt_at <= ?1 ORDER BY id",
                )?;
                let actions = stmt
                    .query_map(params![now], row_to_action)?
                    .collect::<rusqlite::Result<Vec<PendingAction>>>()?;
                Ok(actions)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an action after a successful replay. Returns true if it existed.
    pub async fn delete_action(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Record a failed replay: bump the attempt count and reschedule.
    pub async fn record_failed_attempt(&self, id: i64, attempts: u32, next_attempt_at: &str) -> Result<(), Error> {
        let next_attempt_at = next_attempt_at.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE sync_queue SET attempts = ?2, next_attempt_at = ?3 WHERE id = ?1",
                    params![id, attempts as i64, next_attempt_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of actions currently queued.
    pub async fn queue_depth(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
