//! Normalized task and sprint types.
//!
//! Raw tracker payloads are converted into these once, in
//! [`crate::tracker::normalize`]; everything downstream works on them only.

pub mod sprint;
pub mod task;

pub use sprint::{Sprint, SprintState};
pub use task::{AssignmentEvent, Assignee, AuditEntry, AuditItem, Status, Task, UNASSIGNED};
