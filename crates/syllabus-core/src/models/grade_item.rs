use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// A grade-book item (assignment, quiz, workshop) as reported by the adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradeItemRecord {
    pub id: String,
    pub course_id: String,
    pub item_type: String,
    pub title: String,
    pub grade_value: Option<f64>,
    pub grade_display: Option<String>,
    pub url: Option<String>,
    pub available_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub submission_status: Option<String>,
    pub grading_status: Option<String>,
    pub last_submission_at: Option<DateTime<Utc>>,
    pub attempts_allowed: Option<i64>,
    pub time_limit_minutes: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredGradeItem {
    pub user: UserId,
    pub course_external_id: String,
    pub external_id: String,
    pub item_type: String,
    pub title: String,
    pub grade_value: Option<f64>,
    pub grade_display: Option<String>,
    pub url: Option<String>,
    pub available_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub submission_status: Option<String>,
    pub grading_status: Option<String>,
    pub last_submission_at: Option<DateTime<Utc>>,
    pub attempts_allowed: Option<i64>,
    pub time_limit_minutes: Option<i64>,
    pub last_seen_at: DateTime<Utc>,
}
