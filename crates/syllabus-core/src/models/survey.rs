use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// A module survey as reported by the platform adapter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub id: String,
    pub course_id: String,
    pub module_id: String,
    pub title: String,
    pub url: Option<String>,
    pub completion_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredSurvey {
    pub user: UserId,
    pub course_external_id: String,
    pub module_external_id: String,
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    pub completion_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
}

/// Outcome of an attempted survey submission through the adapter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SurveySubmission {
    pub submitted: bool,
    pub url: String,
    pub reason: Option<String>,
}

impl SurveySubmission {
    /// Submission reasons that still count as a completed survey.
    pub fn counts_as_completed(&self) -> bool {
        if self.submitted {
            return true;
        }
        matches!(
            self.reason.as_deref(),
            Some("completion_badge") | Some("completion_text") | Some("already_completed")
        )
    }
}
