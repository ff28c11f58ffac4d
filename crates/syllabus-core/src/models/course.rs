use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// A course as reported by the platform adapter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredCourse {
    pub user: UserId,
    pub external_id: String,
    pub name: String,
    pub last_seen_at: DateTime<Utc>,
}
