use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    ActionTask, CourseRecord, EventRecord, GradeItemRecord, ModuleRecord, NewActionTask,
    NewEventRecord, Snapshot, StoredCourse, StoredGradeItem, StoredModule, StoredSnapshot,
    StoredSurvey, SurveyRecord, SyncError, UserId,
};
use crate::vault::VaultRecord;

pub type PersistenceResult<T> = Result<T, SyncError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Merge of fetched platform records into the relational copy. Upserts are
/// keyed by external id within a user; a record whose parent was never
/// upserted is skipped, not inserted dangling.
pub trait RecordStore: Send + Sync {
    fn upsert_courses(
        &self,
        user: UserId,
        courses: &[CourseRecord],
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<HashMap<String, StoredCourse>>;

    fn upsert_modules(
        &self,
        user: UserId,
        modules: &[ModuleRecord],
        courses: &HashMap<String, StoredCourse>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<HashMap<(String, String), StoredModule>>;

    fn upsert_module_surveys(
        &self,
        user: UserId,
        surveys: &[SurveyRecord],
        modules: &HashMap<(String, String), StoredModule>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()>;

    fn upsert_grade_items(
        &self,
        user: UserId,
        items: &[GradeItemRecord],
        courses: &HashMap<String, StoredCourse>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()>;

    fn list_courses(&self, user: UserId) -> PersistenceResult<Vec<StoredCourse>>;

    fn list_modules(&self, user: UserId) -> PersistenceResult<Vec<StoredModule>>;

    fn list_module_surveys(&self, user: UserId) -> PersistenceResult<Vec<StoredSurvey>>;

    fn list_grade_items(&self, user: UserId) -> PersistenceResult<Vec<StoredGradeItem>>;

    fn mark_survey_completed(
        &self,
        user: UserId,
        course_external_id: &str,
        module_external_id: &str,
        external_id: &str,
        completed_at: DateTime<Utc>,
    ) -> PersistenceResult<()>;
}

pub trait TaskStore: Send + Sync {
    /// Insert unless an identical `(user, title, source)` task exists.
    /// Returns whether a row was actually created.
    fn create_task_if_absent(&self, user: UserId, task: &NewActionTask)
    -> PersistenceResult<bool>;

    fn list_tasks(&self, user: UserId) -> PersistenceResult<Vec<ActionTask>>;
}

pub trait EventLogStore: Send + Sync {
    fn append_event(&self, user: UserId, event: &NewEventRecord) -> PersistenceResult<()>;

    fn list_events(&self, user: UserId) -> PersistenceResult<Vec<EventRecord>>;
}

/// Latest known platform state per user, kept outside the relational copy so
/// the diff always compares against exactly what the previous run saw.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, user: UserId) -> PersistenceResult<Option<StoredSnapshot>>;

    fn replace(&self, user: UserId, snapshot: &Snapshot) -> PersistenceResult<StoredSnapshot>;
}

pub trait VaultStore: Send + Sync {
    fn vault(&self, user: UserId) -> PersistenceResult<Option<VaultRecord>>;

    fn upsert_vault(&self, vault: &VaultRecord) -> PersistenceResult<()>;

    fn update_cron_status(
        &self,
        user: UserId,
        cron_enabled: bool,
        server_wrapped: Option<(Vec<u8>, Vec<u8>)>,
    ) -> PersistenceResult<()>;

    fn list_cron_enabled(&self) -> PersistenceResult<Vec<VaultRecord>>;
}
