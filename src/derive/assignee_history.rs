use chrono::{DateTime, Utc};

use crate::model::{AssignmentEvent, Task};

/// Field name the tracker uses for assignee changes in the changelog.
pub const ASSIGNEE_FIELD: &str = "assignee";

/// Reconstruct the task's assignment timeline from its changelog.
///
/// Uses the current time when a synthetic entry is needed and the task has
/// no creation date.
pub fn extract_assignee_history(task: &Task) -> Vec<AssignmentEvent> {
    extract_assignee_history_at(task, Utc::now())
}

/// Like [`extract_assignee_history`] with an explicit fallback time.
///
/// Every `assignee` change with a non-empty target becomes an event. If there
/// are none and the task has a current assignee, a single synthetic event is
/// created at the task's creation time (or `now`). Output is sorted ascending
/// by assignment date.
pub fn extract_assignee_history_at(task: &Task, now: DateTime<Utc>) -> Vec<AssignmentEvent> {
    let mut events: Vec<AssignmentEvent> = Vec::new();

    for entry in &task.changelog {
        // An entry without a usable timestamp cannot be placed on the timeline.
        let Some(created) = entry.created else {
            continue;
        };
        for item in entry.items.iter().filter(|i| i.field == ASSIGNEE_FIELD) {
            let Some(to) = item.to.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            events.push(AssignmentEvent {
                assignee: to.to_string(),
                assigned_date: created,
                from_assignee: item.from.clone().filter(|s| !s.is_empty()),
            });
        }
    }

    if events.is_empty() {
        if let Some(assignee) = &task.assignee {
            events.push(AssignmentEvent {
                assignee: assignee.display_name.clone(),
                assigned_date: task.created.unwrap_or(now),
                from_assignee: None,
            });
        }
    }

    events.sort_by_key(|e| e.assigned_date);
    events
}
