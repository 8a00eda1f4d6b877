//! Generation bookkeeping and the version manager.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::connection::CacheDb;
use super::store::CacheStore;
use crate::Error;
use serde::{Deserialize, Serialize};

/// Summary of one stored generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GenerationInfo {
    pub id: String,
    pub created_at: String,
    pub entries: u64,
}

impl CacheDb {
    /// Summaries of every stored generation, oldest first.
    pub async fn generation_info(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.id, g.created_at, COUNT(e.key)
                     FROM generations g
                     LEFT JOIN entries e ON e.generation = g.id
                     GROUP BY g.id, g.created_at
                     ORDER BY g.created_at ASC, g.id ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(GenerationInfo {
                            id: row.get(0)?,
                            created_at: row.get(1)?,
                            entries: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}

/// Owns the current generation id and decides which stored generations are stale.
///
/// The id is fixed for the lifetime of a deployment; changing it on redeploy is
/// the only way cached data gets invalidated.
#[derive(Clone)]
pub struct VersionManager {
    current: String,
    store: Arc<dyn CacheStore>,
}

impl VersionManager {
    pub fn new(current: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        Self { current: current.into(), store }
    }

    /// The generation this deployment reads from and writes to.
    pub fn current_generation(&self) -> &str {
        &self.current
    }

    /// Every generation present in the store.
    pub async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.store.list_generations().await
    }

    /// Stored generations other than the current one.
    pub async fn stale_generations(&self) -> Result<BTreeSet<String>, Error> {
        let mut generations = self.list_generations().await?;
        generations.remove(&self.current);
        Ok(generations)
    }

    /// Generation recorded by the last completed activation.
    pub async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.store.active_generation().await
    }

    /// Record the current generation as active.
    pub async fn mark_current_active(&self) -> Result<(), Error> {
        self.store.mark_active(&self.current).await
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager").field("current", &self.current).finish_non_exhaustive()
    }
}
