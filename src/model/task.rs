use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name used for tasks with no current assignee.
pub const UNASSIGNED: &str = "Unassigned";

/// Workflow status of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub name: String,
    pub category_id: Option<u64>,
}

/// The person a task is currently assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub account_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// One field-level change inside an audit entry.
///
/// For `Sprint` items `from`/`to` hold comma-separated sprint ids; for
/// `assignee` items they hold display names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditItem {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// A timestamped group of field changes from the task's changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<AuditItem>,
}

/// A reconstructed assignment: who received the task, when, and from whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    pub assignee: String,
    pub assigned_date: DateTime<Utc>,
    pub from_assignee: Option<String>,
}

/// A normalized issue with its derived fields attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub status: Status,
    pub priority: Option<String>,
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub story_points: f64,
    pub created: Option<DateTime<Utc>>,
    /// Every sprint id (stringified) this task was ever linked to.
    #[serde(default)]
    pub sprint_history: BTreeSet<String>,
    #[serde(default)]
    pub is_carryover: bool,
    #[serde(default)]
    pub assignee_history: Vec<AssignmentEvent>,
    #[serde(default)]
    pub changelog: Vec<AuditEntry>,
}

impl Task {
    /// Display name of the current assignee, or [`UNASSIGNED`].
    pub fn assignee_name(&self) -> &str {
        self.assignee
            .as_ref()
            .map(|a| a.display_name.as_str())
            .unwrap_or(UNASSIGNED)
    }
}
