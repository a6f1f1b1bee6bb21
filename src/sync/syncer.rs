use std::collections::HashMap;
use std::future::Future;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::derive::is_carryover;
use crate::error::{Error, Result};
use crate::metrics::{build_sprint_report, AssigneeOverride, KpiConfig, KpiWeights, SprintKpiReport};
use crate::model::{Sprint, Task};
use crate::storage::cache::{keys, TieredCache};
use crate::sync::{SyncOptions, SyncProgress, SyncReport};
use crate::tracker::models::{JiraBoard, JiraIssue, JiraProject};
use crate::tracker::normalize::{normalize_issue, normalize_sprint};
use crate::tracker::TrackerSource;

/// Serve `key` from the cache, or fetch it and store the result.
async fn cached_or_fetch<T, F, Fut>(
    cache: &TieredCache,
    key: &str,
    options: &SyncOptions,
    fetch: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if options.refresh {
        cache.invalidate(key).await?;
    } else if let Some(hit) = cache.get_json::<T>(key).await? {
        return Ok(hit);
    }
    let value = fetch().await?;
    cache.set_json(key, &value).await?;
    Ok(value)
}

pub async fn fetch_projects(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    options: &SyncOptions,
) -> Result<Vec<JiraProject>> {
    cached_or_fetch(cache, keys::PROJECTS, options, move || source.list_projects()).await
}

pub async fn fetch_boards(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    project_key: &str,
    options: &SyncOptions,
) -> Result<Vec<JiraBoard>> {
    cached_or_fetch(cache, &keys::boards(project_key), options, move || {
        source.list_boards(project_key)
    })
    .await
}

/// The board's sprint catalogue, normalized and ordered by start date
/// (undated sprints last).
pub async fn fetch_sprints(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    board_id: u64,
    options: &SyncOptions,
) -> Result<Vec<Sprint>> {
    cached_or_fetch(cache, &keys::sprints(board_id), options, move || async move {
        let mut sprints: Vec<Sprint> = source
            .list_sprints(board_id)
            .await?
            .iter()
            .map(normalize_sprint)
            .collect();
        sprints.sort_by_key(|s| (s.start_date.is_none(), s.start_date, s.id));
        Ok(sprints)
    })
    .await
}

/// Swap each cut-short embedded changelog for the issue's full history.
/// A failed lookup keeps the partial changelog.
async fn complete_changelogs(source: &dyn TrackerSource, issues: &mut [JiraIssue]) {
    for issue in issues.iter_mut() {
        let Some(changelog) = issue.changelog.as_mut().filter(|c| c.is_truncated()) else {
            continue;
        };
        match source.issue_changelog(&issue.id).await {
            Ok(histories) => {
                log::debug!(
                    "{}: completed changelog, {} of {} entries were embedded",
                    issue.key,
                    changelog.histories.len(),
                    histories.len()
                );
                changelog.start_at = 0;
                changelog.total = Some(histories.len() as u64);
                changelog.histories = histories;
            }
            Err(e) => log::warn!("{}: could not fetch full changelog: {e}", issue.key),
        }
    }
}

/// Normalized tasks of a sprint, with fetch-time derivations attached.
pub async fn fetch_sprint_tasks(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    sprint_id: u64,
    catalogue: &[Sprint],
    options: &SyncOptions,
) -> Result<Vec<Task>> {
    cached_or_fetch(cache, &keys::sprint_issues(sprint_id), options, move || async move {
        let fields = source.field_mapping();
        let now = Utc::now();
        let mut issues = source.sprint_issues(sprint_id).await?;
        complete_changelogs(source, &mut issues).await;
        let tasks: Vec<Task> = issues
            .iter()
            .map(|issue| normalize_issue(issue, sprint_id, catalogue, &fields, now))
            .collect();
        log::debug!(
            "sprint {sprint_id}: normalized {} tasks, {} carried over at fetch time",
            tasks.len(),
            tasks.iter().filter(|t| t.is_carryover).count()
        );
        Ok(tasks)
    })
    .await
}

/// Re-tag carryover against the selected sprint using start-date ordering.
pub fn classify(tasks: &mut [Task], selected: &Sprint, catalogue: &[Sprint]) {
    for task in tasks.iter_mut() {
        task.is_carryover = is_carryover(task, selected, catalogue);
    }
}

pub async fn load_overrides(
    cache: &TieredCache,
    sprint_id: u64,
) -> Result<HashMap<String, AssigneeOverride>> {
    Ok(cache
        .get_json(&keys::overrides(sprint_id))
        .await?
        .unwrap_or_default())
}

/// Record rework/delay for one assignee and drop the sprint's KPI snapshot.
pub async fn store_override(
    cache: &TieredCache,
    sprint_id: u64,
    assignee: &str,
    value: AssigneeOverride,
) -> Result<()> {
    let mut overrides = load_overrides(cache, sprint_id).await?;
    overrides.insert(assignee.to_string(), value);
    cache
        .set_json(&keys::overrides(sprint_id), &overrides)
        .await?;
    cache.invalidate(&keys::kpi(sprint_id)).await
}

/// Fetch, classify, aggregate and score one sprint, in that order.
pub async fn compute_report(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    sprint_id: u64,
    board_id: u64,
    config: &KpiConfig,
    weights: &KpiWeights,
) -> Result<SprintKpiReport> {
    let options = SyncOptions::default();
    let catalogue = fetch_sprints(source, cache, board_id, &options).await?;
    let sprint = catalogue
        .iter()
        .find(|s| s.id == sprint_id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("sprint {sprint_id} on board {board_id}")))?;

    let mut tasks = fetch_sprint_tasks(source, cache, sprint_id, &catalogue, &options).await?;
    classify(&mut tasks, &sprint, &catalogue);

    let overrides = load_overrides(cache, sprint_id).await?;
    Ok(build_sprint_report(&sprint, &tasks, &overrides, config, weights))
}

/// Warm the cache with a board's catalogue and every sprint's tasks.
pub async fn sync_board(
    source: &dyn TrackerSource,
    cache: &TieredCache,
    board_id: u64,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let entity_key = format!("board:{board_id}");
    let catalogue = fetch_sprints(source, cache, board_id, options).await?;
    let total = catalogue.len();

    let mut synced = 0u64;
    let mut failed = 0u64;
    let mut completed = 0u32;
    for (i, sprint) in catalogue.iter().enumerate() {
        let sprint_key = format!("sprint:{}", sprint.id);
        progress.on_entity_start(&sprint_key, i, total);
        match fetch_sprint_tasks(source, cache, sprint.id, &catalogue, options).await {
            Ok(tasks) => {
                progress.on_tasks_fetched(&sprint_key, tasks.len());
                synced += tasks.len() as u64;
                completed += 1;
            }
            Err(e) => {
                log::error!("Failed to fetch {sprint_key}: {e}");
                failed += 1;
            }
        }
    }

    let report = SyncReport::from_counts(entity_key, synced, failed, completed, total as u32);
    progress.on_entity_complete(&report);
    Ok(report)
}
