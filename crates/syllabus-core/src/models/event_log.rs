use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CourseDetected,
    ModuleDetected,
    SurveyDetected,
    BlockedDetected,
    ModuleUnlocked,
    TaskCreated,
    SurveySent,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourseDetected => "course_detected",
            Self::ModuleDetected => "module_detected",
            Self::SurveyDetected => "survey_detected",
            Self::BlockedDetected => "blocked_detected",
            Self::ModuleUnlocked => "module_unlocked",
            Self::TaskCreated => "task_created",
            Self::SurveySent => "survey_sent",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewEventRecord {
    pub kind: EventKind,
    pub source: String,
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub user: UserId,
    pub kind: EventKind,
    pub source: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
