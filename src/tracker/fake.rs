//! In-process [`TrackerSource`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use super::models::{JiraBoard, JiraHistory, JiraIssue, JiraProject, JiraSprint};
use super::TrackerSource;
use crate::error::{Error, Result};

/// Pauses `sprint_issues` until released, so tests can act mid-flight.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeSource {
    pub projects: Vec<JiraProject>,
    pub boards: HashMap<String, Vec<JiraBoard>>,
    pub sprints: HashMap<u64, Vec<JiraSprint>>,
    pub issues: HashMap<u64, Vec<JiraIssue>>,
    /// Full histories served by `issue_changelog`, by issue id.
    pub changelogs: HashMap<String, Vec<JiraHistory>>,
    pub failing_sprints: HashSet<u64>,
    pub gate: Option<Arc<Gate>>,
    pub issue_calls: AtomicUsize,
    pub sprint_calls: AtomicUsize,
}

impl FakeSource {
    /// Board 10 of project ABC with two consecutive sprints. Sprint 2 holds
    /// ABC-1 (carried over from sprint 1, reassigned Ana -> Bo), ABC-2
    /// (Ana, new) and ABC-3 (unassigned).
    pub fn board() -> Self {
        let sprint = |id: u64, start: &str, complete: &str| -> JiraSprint {
            serde_json::from_value(json!({
                "id": id,
                "name": format!("Sprint {id}"),
                "state": "closed",
                "startDate": start,
                "completeDate": complete,
                "originBoardId": 10
            }))
            .unwrap()
        };
        let issue = |value: serde_json::Value| -> JiraIssue { serde_json::from_value(value).unwrap() };

        let issues = vec![
            issue(json!({
                "id": "10001", "key": "ABC-1",
                "fields": {
                    "summary": "Login page",
                    "status": {"name": "Done", "statusCategory": {"id": 3}},
                    "assignee": {"accountId": "acc-bo", "displayName": "Bo"},
                    "created": "2024-01-02T08:00:00.000+0000",
                    "customfield_10016": 5,
                    "customfield_10020": [{"id": 2}]
                },
                "changelog": {"histories": [
                    {"created": "2024-01-02T09:00:00.000+0000", "items": [
                        {"field": "Sprint", "from": "", "to": "1"},
                        {"field": "assignee", "to": "acc-ana", "toString": "Ana"}
                    ]},
                    {"created": "2024-01-15T08:00:00.000+0000", "items": [
                        {"field": "Sprint", "from": "1", "to": "2"}
                    ]},
                    {"created": "2024-01-16T09:00:00.000+0000", "items": [
                        {"field": "assignee", "from": "acc-ana", "fromString": "Ana",
                         "to": "acc-bo", "toString": "Bo"}
                    ]}
                ]}
            })),
            issue(json!({
                "id": "10002", "key": "ABC-2",
                "fields": {
                    "summary": "Logout",
                    "assignee": {"accountId": "acc-ana", "displayName": "Ana"},
                    "created": "2024-01-15T10:00:00.000+0000",
                    "customfield_10016": 3
                },
                "changelog": {"histories": [
                    {"created": "2024-01-15T10:05:00.000+0000", "items": [
                        {"field": "Sprint", "from": "", "to": "2"}
                    ]},
                    {"created": "2024-01-17T09:00:00.000+0000", "items": [
                        {"field": "assignee", "to": "acc-ana", "toString": "Ana"}
                    ]}
                ]}
            })),
            issue(json!({
                "id": "10003", "key": "ABC-3",
                "fields": {"summary": "Search", "customfield_10016": 2}
            })),
        ];

        Self {
            projects: vec![serde_json::from_value(json!({"id": "1", "key": "ABC", "name": "Alphabet"})).unwrap()],
            boards: HashMap::from([(
                "ABC".to_string(),
                vec![serde_json::from_value(json!({"id": 10, "name": "ABC board", "type": "scrum"})).unwrap()],
            )]),
            sprints: HashMap::from([(
                10,
                vec![
                    sprint(1, "2024-01-01T09:00:00.000Z", "2024-01-14T17:00:00.000Z"),
                    sprint(2, "2024-01-15T09:00:00.000Z", "2024-01-28T17:00:00.000Z"),
                ],
            )]),
            issues: HashMap::from([(2, issues), (1, Vec::new())]),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TrackerSource for FakeSource {
    async fn list_projects(&self) -> Result<Vec<JiraProject>> {
        Ok(self.projects.clone())
    }

    async fn list_boards(&self, project_key: &str) -> Result<Vec<JiraBoard>> {
        Ok(self.boards.get(project_key).cloned().unwrap_or_default())
    }

    async fn list_sprints(&self, board_id: u64) -> Result<Vec<JiraSprint>> {
        self.sprint_calls.fetch_add(1, Ordering::SeqCst);
        self.sprints
            .get(&board_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("board {board_id}")))
    }

    async fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<JiraIssue>> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing_sprints.contains(&sprint_id) {
            return Err(Error::Api(format!("HTTP 500 for sprint {sprint_id}")));
        }
        Ok(self.issues.get(&sprint_id).cloned().unwrap_or_default())
    }

    async fn issue_changelog(&self, issue_id: &str) -> Result<Vec<JiraHistory>> {
        self.changelogs
            .get(issue_id)
            .cloned()
            .ok_or_else(|| Error::Api(format!("HTTP 404 for issue {issue_id} changelog")))
    }
}
