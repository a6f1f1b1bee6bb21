//! Boundary to the project-tracking API.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod models;
pub mod normalize;

pub use client::JiraClient;
pub use normalize::FieldMapping;

use async_trait::async_trait;

use crate::error::{Error, Result};
use models::{JiraBoard, JiraHistory, JiraIssue, JiraProject, JiraSprint};

/// Anything that can supply projects, boards, sprints and sprint issues.
#[async_trait]
pub trait TrackerSource: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<JiraProject>>;
    async fn list_boards(&self, project_key: &str) -> Result<Vec<JiraBoard>>;
    async fn list_sprints(&self, board_id: u64) -> Result<Vec<JiraSprint>>;
    /// Issues of a sprint, with their changelog expanded.
    async fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<JiraIssue>>;
    /// Full change history of one issue, oldest first. Used when the
    /// changelog embedded in `sprint_issues` was cut short.
    async fn issue_changelog(&self, issue_id: &str) -> Result<Vec<JiraHistory>>;

    /// Custom field ids this source reports story points and sprints under.
    fn field_mapping(&self) -> FieldMapping {
        FieldMapping::default()
    }
}

/// Stand-in source when no tracker credentials are configured. Cached data,
/// config and overrides stay usable; anything that needs the API fails.
pub struct Unconfigured;

impl Unconfigured {
    fn error() -> Error {
        Error::Config("JIRA_BASE_URL, JIRA_EMAIL and JIRA_API_TOKEN must be set".into())
    }
}

#[async_trait]
impl TrackerSource for Unconfigured {
    async fn list_projects(&self) -> Result<Vec<JiraProject>> {
        Err(Self::error())
    }

    async fn list_boards(&self, _project_key: &str) -> Result<Vec<JiraBoard>> {
        Err(Self::error())
    }

    async fn list_sprints(&self, _board_id: u64) -> Result<Vec<JiraSprint>> {
        Err(Self::error())
    }

    async fn sprint_issues(&self, _sprint_id: u64) -> Result<Vec<JiraIssue>> {
        Err(Self::error())
    }

    async fn issue_changelog(&self, _issue_id: &str) -> Result<Vec<JiraHistory>> {
        Err(Self::error())
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: url::Url,
    pub email: String,
    pub api_token: String,
    pub fields: FieldMapping,
    pub timeout_secs: u64,
}

impl TrackerConfig {
    /// Load tracker config from the environment.
    ///
    /// Returns `Ok(None)` if the tracker is not configured (base URL / email /
    /// token missing). Returns `Err` if the base URL does not parse.
    pub fn from_env() -> Result<Option<Self>> {
        let base_url = match std::env::var("JIRA_BASE_URL").ok() {
            Some(v) => v,
            None => return Ok(None),
        };
        let email = match std::env::var("JIRA_EMAIL").ok() {
            Some(v) => v,
            None => return Ok(None),
        };
        let api_token = match std::env::var("JIRA_API_TOKEN").ok() {
            Some(v) => v,
            None => return Ok(None),
        };

        let defaults = FieldMapping::default();
        let fields = FieldMapping {
            story_points: std::env::var("JIRA_STORY_POINTS_FIELD").unwrap_or(defaults.story_points),
            sprint: std::env::var("JIRA_SPRINT_FIELD").unwrap_or(defaults.sprint),
        };
        let timeout_secs = std::env::var("JIRA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Some(Self {
            base_url: parse_base_url(&base_url)?,
            email,
            api_token,
            fields,
            timeout_secs,
        }))
    }
}

/// Parse and normalize a site URL so that relative API paths join onto it.
pub fn parse_base_url(raw: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("invalid JIRA_BASE_URL {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "JIRA_BASE_URL must be http(s), got {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
