//! Ordered key-value cache tiers.
//!
//! A [`TieredCache`] tries each [`CacheTier`] in order on read and back-fills
//! the faster tiers on a hit further down. Writes and invalidations go to
//! every tier; the store is last-write-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

/// Deterministic cache keys.
pub mod keys {
    pub const PROJECTS: &str = "projects";

    pub fn boards(project_key: &str) -> String {
        format!("boards-{project_key}")
    }

    pub fn sprints(board_id: u64) -> String {
        format!("sprints-{board_id}")
    }

    /// Normalized issues fetched under a sprint.
    pub fn sprint_issues(sprint_id: u64) -> String {
        format!("sprint-{sprint_id}")
    }

    /// Prefix shared by every KPI snapshot.
    pub const KPI_PREFIX: &str = "kpi-";

    pub fn kpi(sprint_id: u64) -> String {
        format!("kpi-{sprint_id}")
    }

    pub fn overrides(sprint_id: u64) -> String {
        format!("overrides-{sprint_id}")
    }
}

#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
    async fn invalidate_prefix(&self, prefix: &str) -> Result<()>;
}

/// Process-local tier.
#[derive(Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|e| Error::Cache {
            tier: "memory".into(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        self.lock()?.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// Persistent tier backed by the `cache_entries` table.
#[derive(Clone)]
pub struct SqliteTier {
    db: Database,
}

impl SqliteTier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheTier for SqliteTier {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_cache_entry(conn, &key))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_cache_entry(conn, &key, &value))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.db
            .writer()
            .call(move |conn| repository::delete_cache_entry(conn, &key))
            .await
            .map(|_| ())
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        let owned = prefix.to_string();
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::delete_cache_prefix(conn, &owned))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        log::debug!("removed {removed} persisted entries under {prefix}");
        Ok(())
    }
}

#[derive(Clone)]
pub struct TieredCache {
    tiers: Vec<Arc<dyn CacheTier>>,
}

impl TieredCache {
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self { tiers }
    }

    /// Memory in front of the database: the usual arrangement.
    pub fn memory_over(db: Database) -> Self {
        Self::new(vec![
            Arc::new(MemoryTier::new()),
            Arc::new(SqliteTier::new(db)),
        ])
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Read through the tiers in order. A failing tier is logged and skipped.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(value)) => {
                    for upper in &self.tiers[..i] {
                        if let Err(e) = upper.set(key, &value).await {
                            log::warn!("Failed to back-fill {key} into {}: {e}", upper.name());
                        }
                    }
                    log::trace!("cache hit for {key} in {}", tier.name());
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cache tier {} failed reading {key}: {e}", tier.name()),
            }
        }
        Ok(None)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        for tier in &self.tiers {
            tier.set(key, value).await?;
        }
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        for tier in &self.tiers {
            tier.invalidate(key).await?;
        }
        log::debug!("invalidated {key}");
        Ok(())
    }

    /// Drop every entry under `prefix` from every tier.
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        for tier in &self.tiers {
            tier.invalidate_prefix(prefix).await?;
        }
        Ok(())
    }

    /// Typed read. A blob that no longer decodes is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Discarding undecodable cache entry {key}: {e}");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTier;

    #[async_trait]
    impl CacheTier for FailingTier {
        fn name(&self) -> &str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Cache {
                tier: "failing".into(),
                message: "unavailable".into(),
            })
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        async fn invalidate(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn invalidate_prefix(&self, _prefix: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys::sprint_issues(12), "sprint-12");
        assert_eq!(keys::kpi(12), "kpi-12");
        assert_eq!(keys::overrides(12), "overrides-12");
        assert_eq!(keys::sprints(3), "sprints-3");
        assert_eq!(keys::boards("ABC"), "boards-ABC");
    }

    #[tokio::test]
    async fn test_hit_in_lower_tier_backfills_upper() {
        let db = Database::open_memory().await.unwrap();
        let memory = Arc::new(MemoryTier::new());
        let sqlite = Arc::new(SqliteTier::new(db));
        sqlite.set("sprint-1", "[]").await.unwrap();

        let cache = TieredCache::new(vec![memory.clone(), sqlite]);
        assert_eq!(memory.get("sprint-1").await.unwrap(), None);
        assert_eq!(cache.get("sprint-1").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(memory.get("sprint-1").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_invalidate_clears_every_tier() {
        let db = Database::open_memory().await.unwrap();
        let memory = Arc::new(MemoryTier::new());
        let sqlite = Arc::new(SqliteTier::new(db));
        let cache = TieredCache::new(vec![memory.clone(), sqlite.clone()]);

        cache.set("kpi-4", "{}").await.unwrap();
        assert!(memory.get("kpi-4").await.unwrap().is_some());
        assert!(sqlite.get("kpi-4").await.unwrap().is_some());

        cache.invalidate("kpi-4").await.unwrap();
        assert_eq!(cache.get("kpi-4").await.unwrap(), None);
        assert_eq!(sqlite.get("kpi-4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_prefix_keeps_other_keys() {
        let db = Database::open_memory().await.unwrap();
        let sqlite = Arc::new(SqliteTier::new(db));
        let cache = TieredCache::new(vec![Arc::new(MemoryTier::new()), sqlite.clone()]);
        for key in ["kpi-1", "kpi-2", "sprint-1", "overrides-1"] {
            cache.set(key, "{}").await.unwrap();
        }

        cache.invalidate_prefix(keys::KPI_PREFIX).await.unwrap();
        assert_eq!(cache.get("kpi-1").await.unwrap(), None);
        assert_eq!(sqlite.get("kpi-2").await.unwrap(), None);
        assert!(cache.get("sprint-1").await.unwrap().is_some());
        assert!(sqlite.get("overrides-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_tier_is_skipped() {
        let memory = Arc::new(MemoryTier::new());
        memory.set("projects", "[\"ABC\"]").await.unwrap();
        let cache = TieredCache::new(vec![Arc::new(FailingTier), memory]);
        assert_eq!(
            cache.get("projects").await.unwrap().as_deref(),
            Some("[\"ABC\"]")
        );
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = TieredCache::new(vec![Arc::new(MemoryTier::new())]);
        cache.set_json("overrides-1", &vec![1u32, 2, 3]).await.unwrap();
        let back: Option<Vec<u32>> = cache.get_json("overrides-1").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        cache.set("overrides-2", "not json").await.unwrap();
        let garbage: Option<Vec<u32>> = cache.get_json("overrides-2").await.unwrap();
        assert_eq!(garbage, None);
    }
}
