use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::models::{IssuePage, JiraBoard, JiraHistory, JiraIssue, JiraProject, JiraSprint, ValuesPage};
use super::{FieldMapping, TrackerConfig, TrackerSource};
use crate::error::{Error, Result};

const PAGE_SIZE: u64 = 50;

#[derive(Clone)]
pub struct JiraClient {
    client: Client,
    config: TrackerConfig,
}

impl JiraClient {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<url::Url> {
        let mut url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| Error::UrlParse(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path, query)?;
        log::debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("HTTP {} for {url}: {body}", status.as_u16())));
        }
        Ok(response.json::<T>().await?)
    }

    /// Follow a `values`-style paginated endpoint to the end.
    async fn get_all_values<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut start_at = 0u64;
        let mut all = Vec::new();
        loop {
            let mut query = extra.to_vec();
            query.push(("startAt", start_at.to_string()));
            query.push(("maxResults", PAGE_SIZE.to_string()));

            let page: ValuesPage<T> = self.get(path, &query).await?;
            let fetched = page.values.len() as u64;
            all.extend(page.values);

            let done = match (page.is_last, page.total) {
                (Some(is_last), _) => is_last,
                (None, Some(total)) => start_at + fetched >= total,
                (None, None) => fetched < PAGE_SIZE,
            };
            if done || fetched == 0 {
                break;
            }
            start_at += fetched;
        }
        Ok(all)
    }
}

/// Query fields requested for sprint issues.
fn issue_fields(mapping: &FieldMapping) -> String {
    format!(
        "summary,status,priority,assignee,created,{},{}",
        mapping.story_points, mapping.sprint
    )
}

#[async_trait]
impl TrackerSource for JiraClient {
    async fn list_projects(&self) -> Result<Vec<JiraProject>> {
        let projects = self.get_all_values("rest/api/3/project/search", &[]).await?;
        log::info!("Fetched {} projects", projects.len());
        Ok(projects)
    }

    async fn list_boards(&self, project_key: &str) -> Result<Vec<JiraBoard>> {
        let query = [("projectKeyOrId", project_key.to_string())];
        let boards = self.get_all_values("rest/agile/1.0/board", &query).await?;
        log::info!("Fetched {} boards for {project_key}", boards.len());
        Ok(boards)
    }

    async fn list_sprints(&self, board_id: u64) -> Result<Vec<JiraSprint>> {
        let path = format!("rest/agile/1.0/board/{board_id}/sprint");
        let sprints = self.get_all_values(&path, &[]).await?;
        log::info!("Fetched {} sprints for board {board_id}", sprints.len());
        Ok(sprints)
    }

    async fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<JiraIssue>> {
        let path = format!("rest/agile/1.0/sprint/{sprint_id}/issue");
        let fields = issue_fields(&self.config.fields);
        let mut start_at = 0u64;
        let mut issues = Vec::new();
        loop {
            let query = [
                ("expand", "changelog".to_string()),
                ("fields", fields.clone()),
                ("startAt", start_at.to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            let page: IssuePage = self.get(&path, &query).await?;
            let fetched = page.issues.len() as u64;
            issues.extend(page.issues);
            if fetched == 0 || start_at + fetched >= page.total {
                break;
            }
            start_at += fetched;
        }
        log::info!("Fetched {} issues for sprint {sprint_id}", issues.len());
        Ok(issues)
    }

    async fn issue_changelog(&self, issue_id: &str) -> Result<Vec<JiraHistory>> {
        let path = format!("rest/api/3/issue/{issue_id}/changelog");
        let histories = self.get_all_values(&path, &[]).await?;
        log::debug!("Fetched {} changelog entries for issue {issue_id}", histories.len());
        Ok(histories)
    }

    fn field_mapping(&self) -> FieldMapping {
        self.config.fields.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::parse_base_url;

    fn client() -> JiraClient {
        JiraClient::new(TrackerConfig {
            base_url: parse_base_url("https://acme.atlassian.net").unwrap(),
            email: "bot@acme.io".to_string(),
            api_token: "token".to_string(),
            fields: FieldMapping::default(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_with_query() {
        let url = client()
            .endpoint(
                "rest/agile/1.0/board",
                &[("projectKeyOrId", "ABC".to_string()), ("startAt", "0".to_string())],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acme.atlassian.net/rest/agile/1.0/board?projectKeyOrId=ABC&startAt=0"
        );
    }

    #[test]
    fn test_issue_fields_include_custom_fields() {
        let fields = issue_fields(&FieldMapping {
            story_points: "customfield_10028".to_string(),
            sprint: "customfield_10007".to_string(),
        });
        assert_eq!(
            fields,
            "summary,status,priority,assignee,created,customfield_10028,customfield_10007"
        );
    }

    #[test]
    fn test_field_mapping_from_config() {
        assert_eq!(client().field_mapping(), FieldMapping::default());
    }
}
