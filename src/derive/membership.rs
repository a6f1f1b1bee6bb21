use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{AuditEntry, Sprint};

/// Field name the tracker uses for sprint changes in the changelog.
pub const SPRINT_FIELD: &str = "Sprint";

static RE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Parse a comma-separated sprint list from a changelog diff.
///
/// Each piece yields its first run of digits, so both `"12, 13"` and
/// free-text forms like `"Sprint id 12"` resolve to ids. Pieces without
/// digits are dropped.
pub fn parse_sprint_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|piece| RE_DIGITS.find(piece).map(|m| m.as_str().to_string()))
        .collect()
}

/// Every sprint id the changelog ever added the issue to.
///
/// Removals are tracked while replaying but do not shrink the result: the
/// question answered is "was this issue ever in sprint X".
pub fn sprint_membership(changelog: &[AuditEntry]) -> BTreeSet<String> {
    let mut entries: Vec<&AuditEntry> = changelog.iter().collect();
    entries.sort_by_key(|e| e.created);

    // Current links. Only the trace below reads it; membership is `ever`.
    let mut active: HashSet<String> = HashSet::new();
    let mut ever: BTreeSet<String> = BTreeSet::new();

    for entry in entries {
        for item in entry.items.iter().filter(|i| i.field == SPRINT_FIELD) {
            if let Some(from) = item.from.as_deref() {
                for id in parse_sprint_ids(from) {
                    active.remove(&id);
                }
            }
            if let Some(to) = item.to.as_deref() {
                for id in parse_sprint_ids(to) {
                    active.insert(id.clone());
                    ever.insert(id);
                }
            }
        }
    }

    log::trace!(
        "sprint membership: {} ever, {} still active",
        ever.len(),
        active.len()
    );
    ever
}

/// The earliest-starting sprint from the catalogue that the changelog ever
/// linked the issue to. Sprints without a start date are ignored.
pub fn first_sprint<'a>(changelog: &[AuditEntry], catalogue: &'a [Sprint]) -> Option<&'a Sprint> {
    let ever = sprint_membership(changelog);
    catalogue
        .iter()
        .filter(|s| s.start_date.is_some() && ever.contains(&s.id_key()))
        .min_by_key(|s| s.start_date)
}
