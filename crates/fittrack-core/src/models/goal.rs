//! Fitness goals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A free-text goal. The server sets `completed_at` when the goal is marked
/// complete and clears it again when the goal is reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct FitnessGoal {
    pub id: i64,
    #[serde(default)]
    pub user: Option<String>,
    pub goal_text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FitnessGoal {
    /// Patch that flips the completion flag.
    pub fn toggle_patch(&self) -> GoalPatch {
        GoalPatch {
            goal_text: None,
            completed: Some(!self.completed),
        }
    }
}

/// Body of `POST /goals/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGoal {
    pub goal_text: String,
}

/// Body of `PATCH /goals/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}
