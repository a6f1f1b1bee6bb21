//! Raw Jira Cloud payloads. Issues and sprints become domain types in [`super::normalize`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraBoard {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraSprint {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub state: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub complete_date: Option<String>,
    pub origin_board_id: Option<u64>,
}

/// `values`-style page used by the Agile API and project search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesPage<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(default)]
    pub is_last: Option<bool>,
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    pub total: Option<u64>,
}

/// `issues`-style page returned by the sprint issue endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePage {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    pub fields: IssueFields,
    pub changelog: Option<JiraChangelog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFields {
    pub summary: Option<String>,
    pub status: Option<JiraStatus>,
    pub priority: Option<JiraPriority>,
    pub assignee: Option<JiraUser>,
    pub created: Option<String>,
    /// Custom fields (story points, sprint) keyed by their site-specific id.
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraStatus {
    pub name: String,
    pub status_category: Option<JiraStatusCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatusCategory {
    pub id: u64,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraPriority {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub account_id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_urls: HashMap<String, String>,
}

impl JiraUser {
    /// The largest avatar Jira offers.
    pub fn avatar(&self) -> Option<&str> {
        ["48x48", "32x32", "24x24", "16x16"]
            .iter()
            .find_map(|size| self.avatar_urls.get(*size))
            .map(String::as_str)
    }
}

/// Changelog embedded by `expand=changelog`. Jira caps the embedded page,
/// so `total` may exceed `histories.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraChangelog {
    #[serde(default)]
    pub start_at: u64,
    pub max_results: Option<u64>,
    pub total: Option<u64>,
    #[serde(default)]
    pub histories: Vec<JiraHistory>,
}

impl JiraChangelog {
    /// True when Jira reported more entries than it embedded.
    pub fn is_truncated(&self) -> bool {
        self.total
            .is_some_and(|total| total > self.start_at + self.histories.len() as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraHistory {
    pub created: Option<String>,
    #[serde(default)]
    pub items: Vec<JiraChangeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraChangeItem {
    pub field: String,
    pub from: Option<String>,
    pub from_string: Option<String>,
    pub to: Option<String>,
    pub to_string: Option<String>,
}
