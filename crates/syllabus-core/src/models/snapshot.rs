use serde::{Deserialize, Serialize};

use crate::models::{CourseRecord, GradeItemRecord, ModuleRecord, SurveyRecord};

/// The fully merged view of a user's platform state as of one fetch.
/// Replaced wholesale after each successful full run.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub courses: Vec<CourseRecord>,
    pub modules: Vec<ModuleRecord>,
    pub module_surveys: Vec<SurveyRecord>,
    pub grade_items: Vec<GradeItemRecord>,
}

/// A snapshot as persisted: opaque JSON blob plus capture metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub id: String,
    pub taken_at: String,
    pub data: Snapshot,
}
