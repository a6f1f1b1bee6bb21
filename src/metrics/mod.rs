pub mod config;
pub mod kpi;
pub mod types;

pub use config::KpiConfig;
pub use kpi::{calculate_final_kpi, calculate_kpi_components, consolidate_kpi, weights_are_valid};
pub use types::*;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;

use crate::derive::{get_user_kpi_tasks, UserKpiTask};
use crate::model::task::UNASSIGNED;
use crate::model::{Sprint, Task};

/// Every name that could be credited for the sprint: anyone in an
/// assignment history plus every current assignee.
fn candidate_assignees(tasks: &[Task]) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = tasks
        .iter()
        .flat_map(|t| t.assignee_history.iter().map(|e| e.assignee.clone()))
        .collect();
    names.extend(tasks.iter().map(|t| t.assignee_name().to_string()));
    names
}

/// Credited tasks per assignee for the sprint window.
///
/// With a sprint start date every task is checked against the assignee's
/// history. Without one, only tasks currently held by the assignee are
/// considered, and the carryover fallback decides.
pub fn assignee_kpi_tasks(tasks: &[Task], sprint: &Sprint) -> BTreeMap<String, Vec<UserKpiTask>> {
    candidate_assignees(tasks)
        .into_iter()
        .map(|name| {
            let credited = match sprint.start_date {
                Some(_) => get_user_kpi_tasks(tasks, &name, sprint.start_date, sprint.complete_date),
                None => get_user_kpi_tasks(
                    tasks.iter().filter(|t| t.assignee_name() == name),
                    &name,
                    None,
                    None,
                ),
            };
            (name, credited)
        })
        .collect()
}

fn stat_from_tasks(
    assignee: &str,
    credited: &[UserKpiTask],
    overrides: &HashMap<String, AssigneeOverride>,
) -> AssigneeStat {
    let tasks = credited.len() as u32;
    let story_points: f64 = credited.iter().map(|t| t.story_points).sum();
    let avg_complexity = if tasks > 0 {
        story_points / tasks as f64
    } else {
        0.0
    };
    let manual = overrides.get(assignee).copied().unwrap_or_default();
    AssigneeStat {
        assignee: assignee.to_string(),
        tasks,
        story_points,
        avg_complexity,
        qa_rework: manual.qa_rework,
        delay_minutes: manual.delay_minutes,
    }
}

/// Credited tasks per assignee alongside their ranked stats.
fn ranked_stats(
    tasks: &[Task],
    sprint: &Sprint,
    overrides: &HashMap<String, AssigneeOverride>,
) -> (BTreeMap<String, Vec<UserKpiTask>>, Vec<AssigneeStat>) {
    let credited = assignee_kpi_tasks(tasks, sprint);
    let mut stats: Vec<AssigneeStat> = credited
        .iter()
        .map(|(name, list)| stat_from_tasks(name, list, overrides))
        .collect();
    sort_stats(&mut stats);
    (credited, stats)
}

/// Per-assignee aggregates for a sprint, with rework/delay overrides merged
/// in. Sorted by story points descending, then name.
pub fn build_assignee_stats(
    tasks: &[Task],
    sprint: &Sprint,
    overrides: &HashMap<String, AssigneeOverride>,
) -> Vec<AssigneeStat> {
    ranked_stats(tasks, sprint, overrides).1
}

fn sort_stats(stats: &mut [AssigneeStat]) {
    stats.sort_by(|a, b| {
        b.story_points
            .total_cmp(&a.story_points)
            .then_with(|| a.assignee.cmp(&b.assignee))
    });
}

/// Baseline for the sprint: configured values when present, otherwise the
/// average over assignees (excluding [`UNASSIGNED`]) with at least one task.
pub fn kpi_targets(stats: &[AssigneeStat], config: &KpiConfig) -> KpiTargets {
    let contributing: Vec<&AssigneeStat> = stats
        .iter()
        .filter(|s| s.assignee != UNASSIGNED && s.tasks > 0)
        .collect();
    let n = contributing.len() as f64;
    let average = |f: fn(&AssigneeStat) -> f64| {
        if n > 0.0 {
            contributing.iter().map(|s| f(s)).sum::<f64>() / n
        } else {
            0.0
        }
    };
    KpiTargets {
        story_points: config
            .target_story_points
            .unwrap_or_else(|| average(|s| s.story_points)),
        tasks: config
            .target_tasks
            .unwrap_or_else(|| average(|s| s.tasks as f64)),
    }
}

pub fn kpi_inputs(stat: &AssigneeStat, targets: &KpiTargets, config: &KpiConfig) -> KpiInputs {
    KpiInputs {
        user_story_points: stat.story_points,
        user_tasks: stat.tasks as f64,
        user_qa_rework: stat.qa_rework as f64,
        user_delays_minutes: stat.delay_minutes,
        target_story_points: targets.story_points,
        target_tasks: targets.tasks,
        historical_rework_rate: config.historical_rework_rate,
        perfect_work_kpi_limit: config.perfect_work_kpi_limit,
    }
}

/// Aggregate and score every assignee for the sprint.
///
/// `tasks` must already carry derived history and carryover tags.
pub fn build_sprint_report(
    sprint: &Sprint,
    tasks: &[Task],
    overrides: &HashMap<String, AssigneeOverride>,
    config: &KpiConfig,
    weights: &KpiWeights,
) -> SprintKpiReport {
    let (credited, stats) = ranked_stats(tasks, sprint, overrides);
    let targets = kpi_targets(&stats, config);

    let rows: Vec<AssigneeKpi> = stats
        .into_iter()
        .map(|stat| {
            let result = calculate_final_kpi(&kpi_inputs(&stat, &targets, config), weights);
            let tasks = credited.get(&stat.assignee).cloned().unwrap_or_default();
            AssigneeKpi {
                stat,
                components: result.components,
                final_kpi: result.final_kpi,
                tasks,
            }
        })
        .collect();

    log::debug!(
        "sprint {}: {} assignees scored against {:.1} pts / {:.1} tasks",
        sprint.id,
        rows.len(),
        targets.story_points,
        targets.tasks
    );

    SprintKpiReport {
        sprint_id: sprint.id,
        sprint_name: sprint.name.clone(),
        weights: *weights,
        weights_valid: weights.is_valid(),
        targets,
        sprint_quality_pct: config.sprint_quality_pct,
        rows,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;
    use crate::model::{Assignee, AssignmentEvent, SprintState};

    fn sprint(start: Option<&str>, complete: Option<&str>) -> Sprint {
        Sprint {
            id: 2,
            name: "Sprint 2".to_string(),
            state: SprintState::Closed,
            start_date: start.and_then(parse_timestamp),
            end_date: None,
            complete_date: complete.and_then(parse_timestamp),
        }
    }

    fn task(id: &str, points: f64, current: Option<&str>, history: &[(&str, &str)]) -> Task {
        Task {
            id: id.to_string(),
            story_points: points,
            assignee: current.map(|name| Assignee {
                account_id: format!("acc-{name}"),
                display_name: name.to_string(),
                avatar_url: None,
            }),
            assignee_history: history
                .iter()
                .map(|(name, date)| AssignmentEvent {
                    assignee: name.to_string(),
                    assigned_date: parse_timestamp(date).unwrap(),
                    from_assignee: None,
                })
                .collect(),
            ..Task::default()
        }
    }

    #[test]
    fn test_stats_credit_assignee_during_window() {
        let tasks = vec![
            task("1", 5.0, Some("Bo"), &[("Ana", "2024-01-11"), ("Bo", "2024-01-25")]),
            task("2", 3.0, Some("Ana"), &[("Ana", "2024-01-12")]),
            task("3", 8.0, Some("Bo"), &[("Bo", "2024-01-13")]),
            task("4", 2.0, None, &[]),
        ];
        let s = sprint(Some("2024-01-10"), Some("2024-01-20"));
        let stats = build_assignee_stats(&tasks, &s, &HashMap::new());

        let names: Vec<&str> = stats.iter().map(|s| s.assignee.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Bo", UNASSIGNED]);

        assert_eq!(stats[0].tasks, 2);
        assert_eq!(stats[0].story_points, 8.0);
        assert_eq!(stats[0].avg_complexity, 4.0);
        assert_eq!(stats[1].tasks, 1);
        assert_eq!(stats[1].story_points, 8.0);
        assert_eq!(stats[2].tasks, 0);
        assert_eq!(stats[2].avg_complexity, 0.0);
    }

    #[test]
    fn test_stats_dateless_fallback_groups_by_current_assignee() {
        let mut carried = task("3", 8.0, Some("Ana"), &[]);
        carried.is_carryover = true;
        let tasks = vec![
            task("1", 5.0, Some("Ana"), &[]),
            task("2", 3.0, Some("Bo"), &[]),
            carried,
            task("4", 1.0, None, &[]),
        ];
        let stats = build_assignee_stats(&tasks, &sprint(None, None), &HashMap::new());
        let by_name: HashMap<&str, &AssigneeStat> =
            stats.iter().map(|s| (s.assignee.as_str(), s)).collect();
        assert_eq!(by_name["Ana"].tasks, 1);
        assert_eq!(by_name["Ana"].story_points, 5.0);
        assert_eq!(by_name["Bo"].tasks, 1);
        assert_eq!(by_name[UNASSIGNED].tasks, 1);
    }

    #[test]
    fn test_overrides_merged() {
        let tasks = vec![task("1", 5.0, Some("Ana"), &[("Ana", "2024-01-11")])];
        let mut overrides = HashMap::new();
        overrides.insert(
            "Ana".to_string(),
            AssigneeOverride {
                qa_rework: 2,
                delay_minutes: 45.0,
            },
        );
        let stats = build_assignee_stats(&tasks, &sprint(Some("2024-01-10"), None), &overrides);
        assert_eq!(stats[0].qa_rework, 2);
        assert_eq!(stats[0].delay_minutes, 45.0);
    }

    #[test]
    fn test_targets_team_average_excludes_unassigned_and_idle() {
        let stats = vec![
            AssigneeStat {
                assignee: "Ana".into(),
                tasks: 4,
                story_points: 12.0,
                ..AssigneeStat::default()
            },
            AssigneeStat {
                assignee: "Bo".into(),
                tasks: 2,
                story_points: 4.0,
                ..AssigneeStat::default()
            },
            AssigneeStat {
                assignee: "Cy".into(),
                ..AssigneeStat::default()
            },
            AssigneeStat {
                assignee: UNASSIGNED.into(),
                tasks: 10,
                story_points: 50.0,
                ..AssigneeStat::default()
            },
        ];
        let targets = kpi_targets(&stats, &KpiConfig::default());
        assert_eq!(targets.story_points, 8.0);
        assert_eq!(targets.tasks, 3.0);

        let fixed = KpiConfig {
            target_story_points: Some(20.0),
            ..KpiConfig::default()
        };
        let targets = kpi_targets(&stats, &fixed);
        assert_eq!(targets.story_points, 20.0);
        assert_eq!(targets.tasks, 3.0);
    }

    #[test]
    fn test_report_scores_and_flags_weights() {
        let tasks = vec![
            task("1", 6.0, Some("Ana"), &[("Ana", "2024-01-11")]),
            task("2", 2.0, Some("Bo"), &[("Bo", "2024-01-11")]),
        ];
        let config = KpiConfig {
            target_story_points: Some(4.0),
            target_tasks: Some(1.0),
            ..KpiConfig::default()
        };
        let weights = KpiWeights {
            story_points: 100.0,
            tasks: 0.0,
            complexity: 0.0,
            rework: 0.0,
            delays: 0.0,
        };
        let s = sprint(Some("2024-01-10"), Some("2024-01-20"));
        let report = build_sprint_report(&s, &tasks, &HashMap::new(), &config, &weights);

        assert!(report.weights_valid);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].stat.assignee, "Ana");
        // 6 / 4 = 150%: over-delivery is not capped.
        assert_eq!(report.rows[0].final_kpi, 150);
        assert_eq!(report.rows[1].final_kpi, 50);
        assert_eq!(report.rows[0].tasks.len(), 1);
        assert_eq!(report.rows[0].tasks[0].task_id, "1");

        let bad = KpiWeights {
            tasks: 1.0,
            ..weights
        };
        let report = build_sprint_report(&s, &tasks, &HashMap::new(), &config, &bad);
        assert!(!report.weights_valid);
        // Still computed: 150% + 1 task / 1 target * 1%.
        assert_eq!(report.rows[0].final_kpi, 151);
    }

    #[test]
    fn test_report_rows_match_assignee_stats() {
        let tasks = vec![
            task("1", 3.0, Some("Bo"), &[("Bo", "2024-01-11")]),
            task("2", 3.0, Some("Ana"), &[("Ana", "2024-01-12")]),
            task("3", 1.0, None, &[]),
        ];
        let mut overrides = HashMap::new();
        overrides.insert(
            "Bo".to_string(),
            AssigneeOverride {
                qa_rework: 1,
                delay_minutes: 10.0,
            },
        );
        let s = sprint(Some("2024-01-10"), None);
        let stats = build_assignee_stats(&tasks, &s, &overrides);
        let report = build_sprint_report(&s, &tasks, &overrides, &KpiConfig::default(), &KpiWeights::default());

        let from_report: Vec<AssigneeStat> = report.rows.iter().map(|r| r.stat.clone()).collect();
        assert_eq!(from_report, stats);
        // Equal points tie-break by name.
        assert_eq!(stats[0].assignee, "Ana");
        assert_eq!(stats[1].qa_rework, 1);
    }
}
