//! Pure derivations over normalized tasks.
//!
//! Nothing in here performs I/O or fails: missing or malformed audit data
//! degrades to empty sets, `None`, or `false`.

pub mod assignee_history;
pub mod carryover;
pub mod membership;
pub mod window;

pub use assignee_history::{extract_assignee_history, extract_assignee_history_at};
pub use carryover::{is_carryover, is_carryover_by_first_sprint};
pub use membership::{first_sprint, sprint_membership};
pub use window::{get_user_kpi_tasks, should_include_task_for_kpi, UserKpiTask};
