pub mod date_util;
pub mod derive;
pub mod error;
pub mod metrics;
pub mod model;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod url;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

pub use error::{Error, Result};
pub use metrics::{AssigneeKpi, AssigneeOverride, AssigneeStat, KpiConfig, KpiWeights, SprintKpiReport};
pub use model::{Sprint, SprintState, Task};
pub use storage::cache::TieredCache;
pub use storage::Database;
pub use sync::{NoopProgress, SyncOptions, SyncProgress, SyncReport, SyncStatus};
pub use tracker::models::{JiraBoard, JiraProject};
pub use tracker::{JiraClient, TrackerConfig, TrackerSource, Unconfigured};
pub use url::{parse_jira_url, resolve_board_id, resolve_sprint_id, JiraUrlInfo};

use storage::cache::keys;
use storage::repository;
use sync::syncer;

/// Cache occupancy, for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub tiers: Vec<String>,
    /// Persisted entry counts by key prefix.
    pub entries: Vec<(String, i64)>,
    pub last_cached_at: Option<String>,
}

/// Main entry point for sprint KPI derivation.
pub struct SprintKpi {
    db: Database,
    source: Arc<dyn TrackerSource>,
    cache: TieredCache,
    selected: Mutex<Option<u64>>,
    /// Bumped whenever stored inputs to a KPI snapshot change.
    generation: AtomicU64,
}

impl SprintKpi {
    pub fn new(db: Database, source: Arc<dyn TrackerSource>) -> Self {
        let cache = TieredCache::memory_over(db.clone());
        Self {
            db,
            source,
            cache,
            selected: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Record `sprint_id` as the sprint currently being viewed. Reports
    /// computed for any other sprint are discarded when they finish.
    pub fn select_sprint(&self, sprint_id: u64) -> Result<()> {
        *self.lock_selected()? = Some(sprint_id);
        Ok(())
    }

    pub fn selected_sprint(&self) -> Result<Option<u64>> {
        Ok(*self.lock_selected()?)
    }

    fn lock_selected(&self) -> Result<std::sync::MutexGuard<'_, Option<u64>>> {
        self.selected
            .lock()
            .map_err(|e| Error::Other(format!("selection lock poisoned: {e}")))
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    // ── Catalogue ──────────────────────────────────────────────────

    pub async fn projects(&self, options: &SyncOptions) -> Result<Vec<JiraProject>> {
        syncer::fetch_projects(self.source.as_ref(), &self.cache, options).await
    }

    pub async fn boards(&self, project_key: &str, options: &SyncOptions) -> Result<Vec<JiraBoard>> {
        syncer::fetch_boards(self.source.as_ref(), &self.cache, project_key, options).await
    }

    pub async fn sprints(&self, board: &str, options: &SyncOptions) -> Result<Vec<Sprint>> {
        let board_id = url::resolve_board_id(board)?;
        syncer::fetch_sprints(self.source.as_ref(), &self.cache, board_id, options).await
    }

    pub async fn sync_board(
        &self,
        board: &str,
        options: &SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        let board_id = url::resolve_board_id(board)?;
        syncer::sync_board(self.source.as_ref(), &self.cache, board_id, options, progress).await
    }

    // ── Reports ────────────────────────────────────────────────────

    /// KPI report for a sprint. Selects the sprint, then serves the cached
    /// snapshot or runs fetch, classify, aggregate and score.
    ///
    /// Returns `Ok(None)` when another sprint was selected while this one
    /// was being computed; nothing is written in that case. A report whose
    /// inputs (weights, config, overrides) changed mid-flight is returned
    /// but not persisted.
    pub async fn sprint_report(
        &self,
        sprint_id: u64,
        board_id: u64,
        options: &SyncOptions,
    ) -> Result<Option<SprintKpiReport>> {
        self.select_sprint(sprint_id)?;
        let kpi_key = keys::kpi(sprint_id);

        if options.refresh {
            self.bump_generation();
            self.cache.invalidate(&kpi_key).await?;
            self.cache.invalidate(&keys::sprint_issues(sprint_id)).await?;
        } else if let Some(cached) = self.cache.get_json::<SprintKpiReport>(&kpi_key).await? {
            log::debug!("sprint {sprint_id}: serving cached KPI snapshot");
            return Ok(Some(cached));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let config = KpiConfig::load(&self.db).await?;
        let weights = KpiWeights::load(&self.db).await?;
        let report = syncer::compute_report(
            self.source.as_ref(),
            &self.cache,
            sprint_id,
            board_id,
            &config,
            &weights,
        )
        .await?;

        if self.selected_sprint()? != Some(sprint_id) {
            log::debug!("sprint {sprint_id}: selection changed mid-flight, discarding report");
            return Ok(None);
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("sprint {sprint_id}: KPI inputs changed mid-flight, snapshot not persisted");
            return Ok(Some(report));
        }

        if report.weights_valid {
            self.cache.set_json(&kpi_key, &report).await?;
        } else {
            log::warn!(
                "KPI weights sum to {} instead of 100; sprint {sprint_id} report not persisted",
                report.weights.sum()
            );
        }
        Ok(Some(report))
    }

    pub async fn overrides(&self, sprint_id: u64) -> Result<HashMap<String, AssigneeOverride>> {
        syncer::load_overrides(&self.cache, sprint_id).await
    }

    pub async fn set_override(
        &self,
        sprint_id: u64,
        assignee: &str,
        value: AssigneeOverride,
    ) -> Result<()> {
        self.bump_generation();
        syncer::store_override(&self.cache, sprint_id, assignee, value).await
    }

    // ── KPI configuration ──────────────────────────────────────────

    pub async fn kpi_config(&self) -> Result<KpiConfig> {
        KpiConfig::load(&self.db).await
    }

    /// Persist the config; every KPI snapshot is dropped.
    pub async fn set_kpi_config(&self, config: &KpiConfig) -> Result<()> {
        self.bump_generation();
        config.save(&self.db).await?;
        self.cache.invalidate_prefix(keys::KPI_PREFIX).await
    }

    pub async fn weights(&self) -> Result<KpiWeights> {
        KpiWeights::load(&self.db).await
    }

    /// Persist the weights (valid or not); every KPI snapshot is dropped.
    pub async fn set_weights(&self, weights: &KpiWeights) -> Result<()> {
        self.bump_generation();
        weights.save(&self.db).await?;
        self.cache.invalidate_prefix(keys::KPI_PREFIX).await
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Raw write to `app_config`. Touching `kpi.*` or `weights.*` drops
    /// the KPI snapshots.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        if key.starts_with("kpi.") || key.starts_with("weights.") {
            self.bump_generation();
            self.cache.invalidate_prefix(keys::KPI_PREFIX).await?;
        }
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn status(&self) -> Result<CacheStatus> {
        let (entries, last_cached_at) = self
            .db
            .reader()
            .call(|conn| {
                let counts = repository::cache_entry_counts(conn)?;
                let last = repository::last_cached_at(conn)?;
                Ok::<_, rusqlite::Error>((counts, last))
            })
            .await?;
        Ok(CacheStatus {
            tiers: self.cache.tier_names().into_iter().map(String::from).collect(),
            entries,
            last_cached_at,
        })
    }
}
