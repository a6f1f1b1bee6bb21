pub mod syncer;

use serde::Serialize;

/// Options controlling a fetch or report.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Drop cached entries for the target before fetching.
    pub refresh: bool,
}

/// Report returned after warming the cache for a board.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity_key: String,
    pub status: SyncStatus,
    pub items_synced: u64,
    pub items_failed: u64,
    pub sprints_completed: u32,
    pub sprints_total: u32,
    pub error: Option<String>,
}

impl SyncReport {
    /// Create a SyncReport with the appropriate status derived from counts.
    pub fn from_counts(
        entity_key: String,
        items_synced: u64,
        items_failed: u64,
        sprints_completed: u32,
        sprints_total: u32,
    ) -> Self {
        let status = if items_failed == 0 {
            SyncStatus::Success
        } else if items_synced > 0 || sprints_completed > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        let error = if items_failed > 0 {
            Some(format!("{items_failed} sprints failed"))
        } else {
            None
        };
        Self {
            entity_key,
            status,
            items_synced,
            items_failed,
            sprints_completed,
            sprints_total,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Callbacks for reporting progress while a board is fetched.
pub trait SyncProgress: Send + Sync {
    fn on_entity_start(&self, _entity_key: &str, _index: usize, _total: usize) {}
    fn on_tasks_fetched(&self, _entity_key: &str, _count: usize) {}
    fn on_entity_complete(&self, _report: &SyncReport) {}
}

/// Progress sink that ignores everything.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_status_from_counts() {
        let ok = SyncReport::from_counts("board:1".into(), 12, 0, 3, 3);
        assert_eq!(ok.status, SyncStatus::Success);
        assert!(ok.error.is_none());

        let partial = SyncReport::from_counts("board:1".into(), 12, 1, 2, 3);
        assert_eq!(partial.status, SyncStatus::PartialFailure);
        assert_eq!(partial.error.as_deref(), Some("1 sprints failed"));

        let failed = SyncReport::from_counts("board:1".into(), 0, 3, 0, 3);
        assert_eq!(failed.status, SyncStatus::Failed);
    }
}
