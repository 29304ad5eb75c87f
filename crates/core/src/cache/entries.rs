//! Cache entry CRUD operations.
//!
//! Entries are full request/response records addressed by
//! (cache version, request key). `put_entry` is a whole-row overwrite and
//! `get_entry` a whole-row read, so readers never observe partial writes.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// What an entry was cached as. Drives retention:
///
/// - `Api` entries are subject to the freshness-window sweep
/// - `Media` entries are pinned across cache version rollover
/// - everything else lives until its version is superseded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Precache,
    Api,
    Static,
    Media,
    Other,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Precache => "precache",
            EntryKind::Api => "api",
            EntryKind::Static => "static",
            EntryKind::Media => "media",
            EntryKind::Other => "other",
        }
    }

    /// Parse a stored kind tag. Unknown tags degrade to `Other` so a
    /// forward-compatible row never fails a read.
    pub fn parse(s: &str) -> EntryKind {
        match s {
            "precache" => EntryKind::Precache,
            "api" => EntryKind::Api,
            "static" => EntryKind::Static,
            "media" => EntryKind::Media,
            _ => EntryKind::Other,
        }
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 of method + canonical URL, see [`super::hash::entry_key`].
    pub key: String,
    /// Cache version this entry was written under.
    pub version: String,
    pub kind: EntryKind,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Response headers as a JSON string map.
    pub headers_json: String,
    pub body: Vec<u8>,
    /// RFC 3339 insertion timestamp, used for the API freshness window.
    pub stored_at: String,
}

/// Per version/kind entry count, for stats reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryStat {
    pub version: String,
    pub kind: EntryKind,
    pub count: u64,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.get(0)?,
        version: row.get(1)?,
        kind: EntryKind::parse(&row.get::<_, String>(2)?),
        method: row.get(3)?,
        url: row.get(4)?,
        status: row.get::<_, i64>(5)? as u16,
        headers_json: row.get(6)?,
        body: row.get(7)?,
        stored_at: row.get(8)?,
    })
}

const UPSERT_SQL: &str = "INSERT INTO entries (
        key, version, kind, method, url, status, headers_json, body, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(version, key) DO UPDATE SET
        kind = excluded.kind,
        method = excluded.method,
        url = excluded.url,
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

impl CacheDb {
    /// Insert or overwrite a cache entry.
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    UPSERT_SQL,
                    params![
                        &entry.key,
                        &entry.version,
                        entry.kind.as_str(),
                        &entry.method,
                        &entry.url,
                        entry.status as i64,
                        &entry.headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert a batch of entries in a single transaction.
    ///
    /// Either every entry is committed or none is; used by install to keep
    /// the critical resource set all-or-nothing.
    pub async fn put_entries_atomic(&self, entries: Vec<CacheEntry>) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for entry in &entries {
                    tx.execute(
                        UPSERT_SQL,
                        params![
                            &entry.key,
                            &entry.version,
                            entry.kind.as_str(),
                            &entry.method,
                            &entry.url,
                            entry.status as i64,
                            &entry.headers_json,
                            &entry.body,
                            &entry.stored_at,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by version and key.
    ///
    /// Returns None if no entry exists under that version.
    pub async fn get_entry(&self, version: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let version = version.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, version, kind, method, url, status, headers_json, body, stored_at
                     FROM entries WHERE version = ?1 AND key = ?2",
                )?;

                match stmt.query_row(params![version, key], row_to_entry) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry. Returns true if a row was removed.
    pub async fn delete_entry(&self, version: &str, key: &str) -> Result<bool, Error> {
        let version = version.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE version = ?1 AND key = ?2",
                    params![version, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// All entry keys under a version.
    pub async fn entry_keys(&self, version: &str) -> Result<Vec<String>, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM entries WHERE version = ?1 ORDER BY key")?;
                let keys = stmt
                    .query_map(params![version], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// All distinct cache versions currently holding entries.
    pub async fn cache_versions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT version FROM entries ORDER BY version")?;
                let versions = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(versions)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry whose version differs from `current`, leaving
    /// exactly one version behind.
    ///
    /// Used only during activation. Media entries are pinned: instead of
    /// being deleted they are adopted into the current version, so
    /// deliberately saved-for-offline content survives an upgrade. Where a
    /// pinned key already exists under the current version, the current
    /// entry wins. Returns the number of deleted entries.
    pub async fn delete_versions_except(&self, current: &str) -> Result<u64, Error> {
        let current = current.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut count = tx.execute(
                    "DELETE FROM entries WHERE version != ?1 AND kind != 'media'",
                    params![current],
                )?;
                count += tx.execute(
                    "DELETE FROM entries WHERE version != ?1
                     AND key IN (SELECT key FROM entries WHERE version = ?1)",
                    params![current],
                )?;
                tx.execute("UPDATE entries SET version = ?1 WHERE version != ?1", params![current])?;
                tx.commit()?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entire cache version, media included.
    pub async fn delete_version(&self, version: &str) -> Result<u64, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE version = ?1", params![version])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete API entries stored before `cutoff` (RFC 3339).
    ///
    /// This is the clean-cache sweep; it is best-effort and does not affect
    /// whether a strategy may still serve a stale entry as offline fallback.
    pub async fn purge_stale_api_entries(&self, cutoff: &str) -> Result<u64, Error> {
        let cutoff = cutoff.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE kind = 'api' AND stored_at < ?1",
                    params![cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete non-media entries stored before `cutoff` (RFC 3339),
    /// whatever their kind. Used by the periodic janitor.
    pub async fn purge_entries_older_than(&self, cutoff: &str) -> Result<u64, Error> {
        let cutoff = cutoff.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE kind != 'media' AND stored_at < ?1",
                    params![cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry counts grouped by version and kind.
    pub async fn entry_stats(&self) -> Result<Vec<EntryStat>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<EntryStat>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT version, kind, COUNT(*) FROM entries GROUP BY version, kind ORDER BY version, kind",
                )?;
                let stats = stmt
                    .query_map([], |row| {
                        Ok(EntryStat {
                            version: row.get(0)?,
                            kind: EntryKind::parse(&row.get::<_, String>(1)?),
                            count: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<EntryStat>>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}
