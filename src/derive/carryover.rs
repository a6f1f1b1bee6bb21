use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Sprint, Task};

/// Date-ordering carryover test for a selected sprint.
///
/// A task is carryover when any sprint in its history started strictly
/// before the selected sprint. Without a start date on the selected sprint,
/// or with an empty history, the answer is `false`.
pub fn is_carryover(task: &Task, selected: &Sprint, all_sprints: &[Sprint]) -> bool {
    let Some(selected_start) = selected.start_date else {
        return false;
    };
    if task.sprint_history.is_empty() {
        return false;
    }

    let starts: HashMap<String, DateTime<Utc>> = all_sprints
        .iter()
        .filter_map(|s| s.start_date.map(|d| (s.id_key(), d)))
        .collect();

    task.sprint_history
        .iter()
        .filter_map(|id| starts.get(id))
        .any(|start| *start < selected_start)
}

/// Fetch-time carryover test: the first sprint the task was ever linked to
/// is not the one being viewed. No known first sprint means not carryover.
///
/// This can disagree with [`is_carryover`]; the two are kept separate.
pub fn is_carryover_by_first_sprint(first_sprint_id: Option<&str>, viewed_sprint_id: &str) -> bool {
    match first_sprint_id {
        Some(first) => first != viewed_sprint_id,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;
    use crate::model::SprintState;

    fn sprint(id: u64, start: Option<&str>) -> Sprint {
        Sprint {
            id,
            name: format!("Sprint {id}"),
            state: SprintState::Closed,
            start_date: start.and_then(parse_timestamp),
            end_date: None,
            complete_date: None,
        }
    }

    fn task_with_history(ids: &[&str]) -> Task {
        Task {
            id: "1".to_string(),
            sprint_history: ids.iter().map(|s| s.to_string()).collect(),
            ..Task::default()
        }
    }

    fn catalogue() -> Vec<Sprint> {
        vec![sprint(1, Some("2024-01-01")), sprint(2, Some("2024-01-10"))]
    }

    #[test]
    fn test_linked_to_earlier_sprint_is_carryover() {
        let all = catalogue();
        let task = task_with_history(&["1", "2"]);
        assert!(is_carryover(&task, &all[1], &all));
    }

    #[test]
    fn test_only_selected_sprint_is_not_carryover() {
        let all = catalogue();
        let task = task_with_history(&["2"]);
        assert!(!is_carryover(&task, &all[1], &all));
    }

    #[test]
    fn test_empty_history_never_carryover() {
        let all = catalogue();
        let task = task_with_history(&[]);
        assert!(!is_carryover(&task, &all[0], &all));
        assert!(!is_carryover(&task, &all[1], &all));
    }

    #[test]
    fn test_selected_without_start_date() {
        let all = catalogue();
        let selected = sprint(3, None);
        let task = task_with_history(&["1", "3"]);
        assert!(!is_carryover(&task, &selected, &all));
    }

    #[test]
    fn test_later_or_undated_history_sprints_ignored() {
        let all = vec![
            sprint(1, Some("2024-01-01")),
            sprint(2, Some("2024-01-10")),
            sprint(3, Some("2024-01-20")),
            sprint(4, None),
        ];
        // Sprint 3 is later, sprint 4 has no date, sprint 9 is unknown.
        let task = task_with_history(&["2", "3", "4", "9"]);
        assert!(!is_carryover(&task, &all[1], &all));
    }

    #[test]
    fn test_first_sprint_policy() {
        assert!(is_carryover_by_first_sprint(Some("1"), "2"));
        assert!(!is_carryover_by_first_sprint(Some("2"), "2"));
        assert!(!is_carryover_by_first_sprint(None, "2"));
    }
}
