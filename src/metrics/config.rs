//! Process-wide KPI configuration: loaded at startup from `app_config`,
//! persisted on change.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::KpiWeights;
use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiConfig {
    pub historical_rework_rate: f64,
    /// Ceiling for the rework sub-score, as a percentage.
    pub perfect_work_kpi_limit: f64,
    pub sprint_quality_pct: f64,
    /// Fixed baseline; when unset the team average is used.
    pub target_story_points: Option<f64>,
    pub target_tasks: Option<f64>,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            historical_rework_rate: 1.0,
            perfect_work_kpi_limit: 100.0,
            sprint_quality_pct: 100.0,
            target_story_points: None,
            target_tasks: None,
        }
    }
}

const KPI_HISTORICAL_REWORK_RATE: &str = "kpi.historical_rework_rate";
const KPI_PERFECT_WORK_LIMIT: &str = "kpi.perfect_work_kpi_limit";
const KPI_SPRINT_QUALITY_PCT: &str = "kpi.sprint_quality_pct";
const KPI_TARGET_STORY_POINTS: &str = "kpi.target_story_points";
const KPI_TARGET_TASKS: &str = "kpi.target_tasks";

const WEIGHT_STORY_POINTS: &str = "weights.story_points";
const WEIGHT_TASKS: &str = "weights.tasks";
const WEIGHT_COMPLEXITY: &str = "weights.complexity";
const WEIGHT_REWORK: &str = "weights.rework";
const WEIGHT_DELAYS: &str = "weights.delays";

/// Parse a non-negative number from the stored config, falling back to `default`.
fn read_number(values: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    read_optional(values, key).unwrap_or(default)
}

fn read_optional(values: &HashMap<String, String>, key: &str) -> Option<f64> {
    let raw = values.get(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        _ => {
            log::warn!("Ignoring invalid value for {key}: {raw:?}");
            None
        }
    }
}

async fn load_values(db: &Database) -> Result<HashMap<String, String>> {
    let items: Vec<(String, String)> = db
        .reader()
        .call(|conn| repository::list_config(conn))
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
    Ok(items.into_iter().collect())
}

async fn store_values(db: &Database, values: Vec<(&'static str, Option<f64>)>) -> Result<()> {
    db.writer()
        .call(move |conn| {
            for (key, value) in &values {
                match value {
                    Some(v) => repository::set_config(conn, key, &v.to_string())?,
                    None => {
                        repository::delete_config(conn, key)?;
                    }
                }
            }
            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
}

impl KpiConfig {
    pub async fn load(db: &Database) -> Result<Self> {
        let values = load_values(db).await?;
        let defaults = Self::default();
        Ok(Self {
            historical_rework_rate: read_number(
                &values,
                KPI_HISTORICAL_REWORK_RATE,
                defaults.historical_rework_rate,
            ),
            perfect_work_kpi_limit: read_number(
                &values,
                KPI_PERFECT_WORK_LIMIT,
                defaults.perfect_work_kpi_limit,
            ),
            sprint_quality_pct: read_number(
                &values,
                KPI_SPRINT_QUALITY_PCT,
                defaults.sprint_quality_pct,
            ),
            target_story_points: read_optional(&values, KPI_TARGET_STORY_POINTS),
            target_tasks: read_optional(&values, KPI_TARGET_TASKS),
        })
    }

    pub async fn save(&self, db: &Database) -> Result<()> {
        store_values(
            db,
            vec![
                (KPI_HISTORICAL_REWORK_RATE, Some(self.historical_rework_rate)),
                (KPI_PERFECT_WORK_LIMIT, Some(self.perfect_work_kpi_limit)),
                (KPI_SPRINT_QUALITY_PCT, Some(self.sprint_quality_pct)),
                (KPI_TARGET_STORY_POINTS, self.target_story_points),
                (KPI_TARGET_TASKS, self.target_tasks),
            ],
        )
        .await
    }
}

impl KpiWeights {
    pub async fn load(db: &Database) -> Result<Self> {
        let values = load_values(db).await?;
        let defaults = Self::default();
        Ok(Self {
            story_points: read_number(&values, WEIGHT_STORY_POINTS, defaults.story_points),
            tasks: read_number(&values, WEIGHT_TASKS, defaults.tasks),
            complexity: read_number(&values, WEIGHT_COMPLEXITY, defaults.complexity),
            rework: read_number(&values, WEIGHT_REWORK, defaults.rework),
            delays: read_number(&values, WEIGHT_DELAYS, defaults.delays),
        })
    }

    /// Persist the weights. Invalid weights are stored too; callers decide
    /// whether to act on [`KpiWeights::is_valid`].
    pub async fn save(&self, db: &Database) -> Result<()> {
        if !self.is_valid() {
            log::warn!("Saving KPI weights that sum to {} instead of 100", self.sum());
        }
        store_values(
            db,
            vec![
                (WEIGHT_STORY_POINTS, Some(self.story_points)),
                (WEIGHT_TASKS, Some(self.tasks)),
                (WEIGHT_COMPLEXITY, Some(self.complexity)),
                (WEIGHT_REWORK, Some(self.rework)),
                (WEIGHT_DELAYS, Some(self.delays)),
            ],
        )
        .await
    }
}
