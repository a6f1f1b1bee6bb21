use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::derive::UserKpiTask;

/// Per-assignee aggregate for one sprint selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssigneeStat {
    pub assignee: String,
    pub tasks: u32,
    pub story_points: f64,
    /// Story points per task; 0 when there are no tasks.
    pub avg_complexity: f64,
    pub qa_rework: u32,
    pub delay_minutes: f64,
}

/// Caller-supplied values that cannot be derived from the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssigneeOverride {
    pub qa_rework: u32,
    pub delay_minutes: f64,
}

/// Sub-score weights, as percentages. Valid only when they sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiWeights {
    pub story_points: f64,
    pub tasks: f64,
    pub complexity: f64,
    pub rework: f64,
    pub delays: f64,
}

impl Default for KpiWeights {
    fn default() -> Self {
        Self {
            story_points: 20.0,
            tasks: 20.0,
            complexity: 20.0,
            rework: 30.0,
            delays: 10.0,
        }
    }
}

impl KpiWeights {
    pub fn sum(&self) -> f64 {
        self.story_points + self.tasks + self.complexity + self.rework + self.delays
    }

    /// Exact comparison, no tolerance.
    #[allow(clippy::float_cmp)]
    pub fn is_valid(&self) -> bool {
        self.sum() == 100.0
    }
}

/// Raw inputs for one assignee's KPI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiInputs {
    pub user_story_points: f64,
    pub user_tasks: f64,
    pub user_qa_rework: f64,
    pub user_delays_minutes: f64,
    pub target_story_points: f64,
    pub target_tasks: f64,
    pub historical_rework_rate: f64,
    pub perfect_work_kpi_limit: f64,
}

/// Weighted sub-scores, each already scaled by its weight / 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiComponents {
    pub story_points_kpi: f64,
    pub tasks_kpi: f64,
    pub complexity_kpi: f64,
    pub rework_kpi: f64,
    pub delays_kpi: f64,
}

impl KpiComponents {
    pub fn total(&self) -> f64 {
        self.story_points_kpi + self.tasks_kpi + self.complexity_kpi + self.rework_kpi + self.delays_kpi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalKpi {
    pub components: KpiComponents,
    /// Rounded percentage; may exceed 100 for over-delivery.
    pub final_kpi: i64,
}

/// Baseline an assignee is measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiTargets {
    pub story_points: f64,
    pub tasks: f64,
}

/// One row of a sprint report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssigneeKpi {
    pub stat: AssigneeStat,
    pub components: KpiComponents,
    pub final_kpi: i64,
    /// The tasks credited to this assignee, for audit display.
    pub tasks: Vec<UserKpiTask>,
}

/// Derived KPI snapshot for one sprint, cached under `kpi-<sprintId>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintKpiReport {
    pub sprint_id: u64,
    pub sprint_name: String,
    pub weights: KpiWeights,
    pub weights_valid: bool,
    pub targets: KpiTargets,
    pub sprint_quality_pct: f64,
    pub rows: Vec<AssigneeKpi>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_validity() {
        let mut weights = KpiWeights {
            story_points: 20.0,
            tasks: 20.0,
            complexity: 20.0,
            rework: 30.0,
            delays: 10.0,
        };
        assert!(weights.is_valid());
        weights.rework = 31.0;
        assert_eq!(weights.sum(), 101.0);
        assert!(!weights.is_valid());
    }

    #[test]
    fn test_default_weights_valid() {
        assert!(KpiWeights::default().is_valid());
    }
}
