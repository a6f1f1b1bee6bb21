use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AssignmentEvent, Task};

/// A task credited to an assignee for a sprint window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKpiTask {
    pub task_id: String,
    /// Latest assignment to the user inside the window. `None` when the
    /// date-less fallback admitted the task.
    pub assigned_date: Option<DateTime<Utc>>,
    pub story_points: f64,
}

fn in_window(
    event: &AssignmentEvent,
    start: DateTime<Utc>,
    complete: Option<DateTime<Utc>>,
) -> bool {
    event.assigned_date >= start && complete.map_or(true, |end| event.assigned_date <= end)
}

fn matching_assignments<'a>(
    task: &'a Task,
    assignee_name: &'a str,
    start: DateTime<Utc>,
    complete: Option<DateTime<Utc>>,
) -> impl Iterator<Item = &'a AssignmentEvent> + 'a {
    task.assignee_history
        .iter()
        .filter(move |e| e.assignee == assignee_name && in_window(e, start, complete))
}

/// Whether `task` counts toward `assignee_name` for the sprint window.
///
/// Without a sprint start the task counts iff it is not carryover. Otherwise
/// the user must have been assigned the task inside
/// `[sprint_start, sprint_complete]`; an open sprint has no upper bound.
pub fn should_include_task_for_kpi(
    task: &Task,
    assignee_name: &str,
    sprint_start: Option<DateTime<Utc>>,
    sprint_complete: Option<DateTime<Utc>>,
) -> bool {
    let Some(start) = sprint_start else {
        return !task.is_carryover;
    };
    if task.assignee_history.is_empty() {
        return false;
    }
    matching_assignments(task, assignee_name, start, sprint_complete)
        .next()
        .is_some()
}

/// The tasks credited to `assignee_name`, with the latest in-window
/// assignment date and the task's story points.
pub fn get_user_kpi_tasks<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    assignee_name: &str,
    sprint_start: Option<DateTime<Utc>>,
    sprint_complete: Option<DateTime<Utc>>,
) -> Vec<UserKpiTask> {
    tasks
        .into_iter()
        .filter(|t| should_include_task_for_kpi(t, assignee_name, sprint_start, sprint_complete))
        .map(|t| {
            let assigned_date = sprint_start.and_then(|start| {
                matching_assignments(t, assignee_name, start, sprint_complete)
                    .map(|e| e.assigned_date)
                    .max()
            });
            UserKpiTask {
                task_id: t.id.clone(),
                assigned_date,
                story_points: t.story_points,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn event(name: &str, date: &str) -> AssignmentEvent {
        AssignmentEvent {
            assignee: name.to_string(),
            assigned_date: ts(date),
            from_assignee: None,
        }
    }

    fn task(id: &str, points: f64, history: Vec<AssignmentEvent>) -> Task {
        Task {
            id: id.to_string(),
            story_points: points,
            assignee_history: history,
            ..Task::default()
        }
    }

    #[test]
    fn test_assignment_before_window_excluded() {
        let t = task("1", 3.0, vec![event("Ana", "2024-01-05")]);
        assert!(!should_include_task_for_kpi(
            &t,
            "Ana",
            Some(ts("2024-01-10")),
            Some(ts("2024-01-20"))
        ));
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let start = Some(ts("2024-01-10"));
        let end = Some(ts("2024-01-20"));
        let on_start = task("1", 1.0, vec![event("Ana", "2024-01-10")]);
        let on_end = task("2", 1.0, vec![event("Ana", "2024-01-20")]);
        let after = task("3", 1.0, vec![event("Ana", "2024-01-20T00:00:01Z")]);
        assert!(should_include_task_for_kpi(&on_start, "Ana", start, end));
        assert!(should_include_task_for_kpi(&on_end, "Ana", start, end));
        assert!(!should_include_task_for_kpi(&after, "Ana", start, end));
    }

    #[test]
    fn test_open_sprint_has_no_upper_bound() {
        let t = task("1", 2.0, vec![event("Ana", "2031-06-01")]);
        assert!(should_include_task_for_kpi(&t, "Ana", Some(ts("2024-01-10")), None));
    }

    #[test]
    fn test_other_assignee_not_credited() {
        let t = task(
            "1",
            2.0,
            vec![event("Ana", "2024-01-11"), event("Bo", "2024-01-25")],
        );
        let start = Some(ts("2024-01-10"));
        let end = Some(ts("2024-01-20"));
        // Reassignment to Bo after close does not move the credit.
        assert!(should_include_task_for_kpi(&t, "Ana", start, end));
        assert!(!should_include_task_for_kpi(&t, "Bo", start, end));
    }

    #[test]
    fn test_empty_history_with_dates_excluded() {
        let t = task("1", 2.0, vec![]);
        assert!(!should_include_task_for_kpi(&t, "Ana", Some(ts("2024-01-10")), None));
    }

    #[test]
    fn test_dateless_fallback_uses_carryover_tag() {
        let mut t = task("1", 2.0, vec![]);
        assert!(should_include_task_for_kpi(&t, "Ana", None, None));
        t.is_carryover = true;
        assert!(!should_include_task_for_kpi(&t, "Ana", None, None));
    }

    #[test]
    fn test_user_kpi_tasks_latest_matching_assignment() {
        let tasks = vec![
            task(
                "1",
                5.0,
                vec![
                    event("Ana", "2024-01-11"),
                    event("Bo", "2024-01-12"),
                    event("Ana", "2024-01-15"),
                    event("Ana", "2024-01-25"),
                ],
            ),
            task("2", 3.0, vec![event("Bo", "2024-01-11")]),
        ];
        let result = get_user_kpi_tasks(
            &tasks,
            "Ana",
            Some(ts("2024-01-10")),
            Some(ts("2024-01-20")),
        );
        assert_eq!(
            result,
            vec![UserKpiTask {
                task_id: "1".to_string(),
                assigned_date: Some(ts("2024-01-15")),
                story_points: 5.0,
            }]
        );
    }

    #[test]
    fn test_user_kpi_tasks_dateless() {
        let mut carried = task("2", 8.0, vec![]);
        carried.is_carryover = true;
        let tasks = vec![task("1", 2.0, vec![]), carried];
        let result = get_user_kpi_tasks(&tasks, "Ana", None, None);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].task_id, "1");
        assert_eq!(result[0].assigned_date, None);
    }
}
