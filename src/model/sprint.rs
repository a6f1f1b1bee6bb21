use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Active,
    Future,
    Closed,
}

impl SprintState {
    /// Parse the tracker's state string. Unknown values are treated as future.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "active" => SprintState::Active,
            "closed" => SprintState::Closed,
            _ => SprintState::Future,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SprintState::Active => "active",
            SprintState::Future => "future",
            SprintState::Closed => "closed",
        }
    }
}

/// A time-boxed sprint from a board's catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: u64,
    pub name: String,
    pub state: SprintState,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub complete_date: Option<DateTime<Utc>>,
}

impl Sprint {
    /// The id as compared against `sprint_history` entries.
    pub fn id_key(&self) -> String {
        self.id.to_string()
    }
}
