use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// A course module as reported by the platform adapter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub visible: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub has_survey: bool,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredModule {
    pub user: UserId,
    pub course_external_id: String,
    pub external_id: String,
    pub title: String,
    pub visible: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub has_survey: bool,
    pub url: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}
