//! The single place raw tracker payloads become domain types.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{JiraChangeItem, JiraHistory, JiraIssue, JiraSprint};
use crate::date_util::{parse_opt_timestamp, parse_timestamp};
use crate::derive::{
    extract_assignee_history_at, first_sprint, is_carryover_by_first_sprint, sprint_membership,
};
use crate::model::{Assignee, AuditEntry, AuditItem, Sprint, SprintState, Status, Task};

// Legacy sprint field values are strings like
// "com.atlassian.greenhopper.service.sprint.Sprint@1a2b[id=12,rapidViewId=3,...]".
static RE_LEGACY_SPRINT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bid=(\d+)").unwrap());

/// Site-specific custom field ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub story_points: String,
    pub sprint: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            story_points: "customfield_10016".to_string(),
            sprint: "customfield_10020".to_string(),
        }
    }
}

pub fn normalize_sprint(raw: &JiraSprint) -> Sprint {
    Sprint {
        id: raw.id,
        name: raw.name.clone(),
        state: SprintState::parse(&raw.state),
        start_date: parse_opt_timestamp(raw.start_date.as_deref()),
        end_date: parse_opt_timestamp(raw.end_date.as_deref()),
        complete_date: parse_opt_timestamp(raw.complete_date.as_deref()),
    }
}

fn normalize_item(item: &JiraChangeItem) -> AuditItem {
    // Assignee diffs carry account ids in from/to; history is keyed by
    // display name, which lives in the *String variants.
    let (from, to) = if item.field.eq_ignore_ascii_case("assignee") {
        (
            item.from_string.clone().or_else(|| item.from.clone()),
            item.to_string.clone().or_else(|| item.to.clone()),
        )
    } else {
        (item.from.clone(), item.to.clone())
    };
    AuditItem {
        field: if item.field.eq_ignore_ascii_case("assignee") {
            "assignee".to_string()
        } else {
            item.field.clone()
        },
        from,
        to,
    }
}

fn normalize_history(history: &JiraHistory) -> AuditEntry {
    AuditEntry {
        created: parse_opt_timestamp(history.created.as_deref()),
        items: history.items.iter().map(normalize_item).collect(),
    }
}

/// Sprint ids present in the live sprint field value.
pub fn live_sprint_ids(value: Option<&Value>) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let Some(value) = value else {
        return ids;
    };
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };
    for entry in entries {
        match entry {
            Value::Object(map) => match map.get("id") {
                Some(Value::Number(n)) => {
                    if let Some(id) = n.as_u64() {
                        ids.insert(id.to_string());
                    }
                }
                Some(Value::String(s)) if !s.is_empty() => {
                    ids.insert(s.clone());
                }
                _ => {}
            },
            Value::String(s) => {
                if let Some(caps) = RE_LEGACY_SPRINT_ID.captures(s) {
                    ids.insert(caps[1].to_string());
                }
            }
            Value::Number(n) => {
                if let Some(id) = n.as_u64() {
                    ids.insert(id.to_string());
                }
            }
            _ => {}
        }
    }
    ids
}

/// Story points as a non-negative number. Missing or malformed values are 0.
pub fn story_points(value: Option<&Value>) -> f64 {
    let points = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if points.is_finite() && points > 0.0 {
        points
    } else {
        0.0
    }
}

/// Turn a raw issue fetched under `fetched_sprint_id` into a [`Task`] with
/// sprint history, assignee history and fetch-time carryover attached.
pub fn normalize_issue(
    raw: &JiraIssue,
    fetched_sprint_id: u64,
    catalogue: &[Sprint],
    fields: &FieldMapping,
    now: DateTime<Utc>,
) -> Task {
    if let Some(partial) = raw.changelog.as_ref().filter(|c| c.is_truncated()) {
        log::warn!(
            "{}: deriving from {} of {} changelog entries",
            raw.key,
            partial.histories.len(),
            partial.total.unwrap_or_default()
        );
    }
    let changelog: Vec<AuditEntry> = raw
        .changelog
        .as_ref()
        .map(|c| c.histories.iter().map(normalize_history).collect())
        .unwrap_or_default();

    let fetched_key = fetched_sprint_id.to_string();
    let mut sprint_history = sprint_membership(&changelog);
    sprint_history.extend(live_sprint_ids(raw.fields.custom.get(&fields.sprint)));
    sprint_history.insert(fetched_key.clone());

    let first = first_sprint(&changelog, catalogue).map(Sprint::id_key);
    let is_carryover = is_carryover_by_first_sprint(first.as_deref(), &fetched_key);

    let assignee = raw.fields.assignee.as_ref().map(|user| Assignee {
        account_id: user.account_id.clone(),
        display_name: user
            .display_name
            .clone()
            .unwrap_or_else(|| user.account_id.clone()),
        avatar_url: user.avatar().map(str::to_string),
    });

    let mut task = Task {
        id: raw.id.clone(),
        key: raw.key.clone(),
        title: raw.fields.summary.clone().unwrap_or_default(),
        status: raw
            .fields
            .status
            .as_ref()
            .map(|s| Status {
                name: s.name.clone(),
                category_id: s.status_category.as_ref().map(|c| c.id),
            })
            .unwrap_or_default(),
        priority: raw.fields.priority.as_ref().map(|p| p.name.clone()),
        assignee,
        story_points: story_points(raw.fields.custom.get(&fields.story_points)),
        created: raw.fields.created.as_deref().and_then(parse_timestamp),
        sprint_history,
        is_carryover,
        assignee_history: Vec::new(),
        changelog,
    };
    task.assignee_history = extract_assignee_history_at(&task, now);
    task
}
