use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Syllabus,
    Manual,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syllabus => "syllabus",
            Self::Manual => "manual",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Study,
    Personal,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Personal => "personal",
        }
    }
}

/// An action item derived from a detected change. Deduplicated on
/// `(user, title, source)` by the task store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewActionTask {
    pub title: String,
    pub source: TaskSource,
    pub category: TaskCategory,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionTask {
    pub id: i64,
    pub user: UserId,
    pub title: String,
    pub source: TaskSource,
    pub category: TaskCategory,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
