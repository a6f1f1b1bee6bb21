//! KPI sub-score calculation and consolidation.
//!
//! Ratios are not capped at 1: an assignee above target scores
//! above 100% on that component. Only rework and delays floor at zero.

use super::types::{FinalKpi, KpiComponents, KpiInputs, KpiWeights};

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Compute the five weighted sub-scores.
pub fn calculate_kpi_components(inputs: &KpiInputs, weights: &KpiWeights) -> KpiComponents {
    let story_points_kpi =
        ratio(inputs.user_story_points, inputs.target_story_points) * weights.story_points / 100.0;

    let tasks_kpi = ratio(inputs.user_tasks, inputs.target_tasks) * weights.tasks / 100.0;

    let user_complexity = ratio(inputs.user_story_points, inputs.user_tasks);
    let target_complexity = ratio(inputs.target_story_points, inputs.target_tasks);
    let complexity_kpi = ratio(user_complexity, target_complexity) * weights.complexity / 100.0;

    let rework_ratio = ratio(inputs.user_qa_rework, inputs.historical_rework_rate);
    let rework_pct = (inputs.perfect_work_kpi_limit / 100.0 - rework_ratio).max(0.0);
    let rework_kpi = rework_pct * weights.rework / 100.0;

    let delays_ratio = inputs.user_delays_minutes / 60.0;
    let delays_pct = (1.0 - delays_ratio).max(0.0);
    let delays_kpi = delays_pct * weights.delays / 100.0;

    KpiComponents {
        story_points_kpi,
        tasks_kpi,
        complexity_kpi,
        rework_kpi,
        delays_kpi,
    }
}

/// Sum the weighted components into a rounded percentage.
pub fn consolidate_kpi(components: &KpiComponents) -> i64 {
    (components.total() * 100.0).round() as i64
}

/// Components plus consolidated score. Runs regardless of weight validity;
/// check [`weights_are_valid`] separately.
pub fn calculate_final_kpi(inputs: &KpiInputs, weights: &KpiWeights) -> FinalKpi {
    let components = calculate_kpi_components(inputs, weights);
    FinalKpi {
        final_kpi: consolidate_kpi(&components),
        components,
    }
}

pub fn weights_are_valid(weights: &KpiWeights) -> bool {
    weights.is_valid()
}
