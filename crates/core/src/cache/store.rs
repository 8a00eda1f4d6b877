//! Generation-partitioned entry storage.
//!
//! `CacheStore` is the storage seam shared by the interception engine and
//! the lifecycle controller. `CacheDb` implements it on SQLite. Entries are
//! keyed by `(generation, key)`; nothing is ever read across generations.

use std::collections::BTreeSet;

use super::connection::CacheDb;
use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// One stored request/response pair.
///
/// The body is an owned copy taken before the original response was handed
/// back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

/// Key-value storage partitioned by cache generation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the generation if it does not exist yet. Idempotent.
    async fn open(&self, generation: &str) -> Result<(), Error>;

    /// Look up `key` within `generation` only.
    async fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, Error>;

    /// Store `entry` under `generation`, replacing any entry with the same key.
    async fn put(&self, generation: &str, entry: &CacheEntry) -> Result<(), Error>;

    /// Store a batch of entries. Either every entry is written or none is.
    async fn put_all(&self, generation: &str, entries: &[CacheEntry]) -> Result<(), Error> {
        for entry in entries {
            self.put(generation, entry).await?;
        }
        Ok(())
    }

    /// Remove a generation and all of its entries. Absent generations are not an error.
    ///
    /// Returns the number of entries removed.
    async fn delete_generation(&self, generation: &str) -> Result<u64, Error>;

    /// Keys stored under `generation`, in first-write order, each exactly once.
    async fn keys_of(&self, generation: &str) -> Result<Vec<String>, Error>;

    /// Every generation physically present in the store.
    async fn list_generations(&self) -> Result<BTreeSet<String>, Error>;

    /// Record `generation` as the one that last completed activation.
    async fn mark_active(&self, generation: &str) -> Result<(), Error>;

    /// Generation recorded by the last completed activation, if any.
    ///
    /// Survives restarts, so a new deployment that has not activated yet can
    /// keep serving from it.
    async fn active_generation(&self) -> Result<Option<String>, Error>;
}

fn ensure_generation(conn: &rusqlite::Connection, generation: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO generations (id, created_at) VALUES (?1, ?2)",
        params![generation, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn read_failure(err: Error) -> Error {
    match err {
        Error::Corrupt { .. } | Error::StoreRead(_) => err,
        other => Error::StoreRead(other.to_string()),
    }
}

fn write_failure(err: Error) -> Error {
    match err {
        Error::StoreWrite(_) => err,
        other => Error::StoreWrite(other.to_string()),
    }
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_generation(conn, &generation) })
            .await
            .map_err(Error::from)
            .map_err(write_failure)
    }

    async fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let generation = generation.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, method, url, status_code, content_type, headers_json, body, stored_at
                     FROM entries WHERE generation = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![generation, key], |row| {
                    Ok((
                        CacheEntry {
                            key: row.get(0)?,
                            method: row.get(1)?,
                            url: row.get(2)?,
                            status_code: row.get(3)?,
                            content_type: row.get(4)?,
                            headers: Vec::new(),
                            body: row.get(6)?,
                            stored_at: row.get(7)?,
                        },
                        row.get::<_, String>(5)?,
                    ))
                });

                match result {
                    Ok((mut entry, headers_json)) => {
                        entry.headers = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::Corrupt { key: entry.key.clone(), reason: e.to_string() })?;
                        Ok(Some(entry))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
            .map_err(read_failure)
    }

    async fn put(&self, generation: &str, entry: &CacheEntry) -> Result<(), Error> {
        self.put_all(generation, std::slice::from_ref(entry)).await
    }

    async fn put_all(&self, generation: &str, entries: &[CacheEntry]) -> Result<(), Error> {
        let generation = generation.to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO entries (
                        generation, key, method, url, status_code, content_type,
                        headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(generation, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status_code = excluded.status_code,
                        content_type = excluded.content_type,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    )?;
                    for entry in &entries {
                        let headers_json = serde_json::to_string(&entry.headers)?;
                        stmt.execute(params![
                            &generation,
                            &entry.key,
                            &entry.method,
                            &entry.url,
                            entry.status_code,
                            &entry.content_type,
                            headers_json,
                            &entry.body,
                            &entry.stored_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
            .map_err(write_failure)
    }

    async fn delete_generation(&self, generation: &str) -> Result<u64, Error> {
        let id = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM entries WHERE generation = ?1", params![&id])?;
                tx.execute("DELETE FROM generations WHERE id = ?1", params![&id])?;
                tx.commit()?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
            .map_err(|e| Error::GenerationDelete { generation: generation.to_string(), reason: e.to_string() })
    }

    async fn keys_of(&self, generation: &str) -> Result<Vec<String>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM entries WHERE generation = ?1 ORDER BY rowid")?;
                let keys = stmt
                    .query_map(params![generation], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
            .map_err(read_failure)
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM generations")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<BTreeSet<String>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
            .map_err(read_failure)
    }

    async fn mark_active(&self, generation: &str) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO active_generation (slot, generation, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(slot) DO UPDATE SET
                        generation = excluded.generation,
                        activated_at = excluded.activated_at",
                    params![generation, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
            .map_err(write_failure)
    }

    async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT generation FROM active_generation WHERE slot = 1")?;
                let mut rows = stmt.query([])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
            .map_err(read_failure)
    }
}
