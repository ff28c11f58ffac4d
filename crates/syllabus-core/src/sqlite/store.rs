use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{
    ActionTask, CourseRecord, EventKind, EventRecord, GradeItemRecord, ModuleRecord,
    NewActionTask, NewEventRecord, StoredCourse, StoredGradeItem, StoredModule, StoredSurvey,
    SurveyRecord, SyncError, SyncErrorKind, TaskCategory, TaskSource, UserId,
};
use crate::persistence::{
    EventLogStore, MigrationStore, PersistenceResult, RecordStore, TaskStore, VaultStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};
use crate::vault::VaultRecord;

const MIGRATIONS_TABLE: &str = "syllabus_schema_migrations";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Re-apply all DDL so a database whose version row survived
                // but whose tables did not still comes up usable. The DDL is
                // CREATE ... IF NOT EXISTS throughout; ALTER TABLE ADD COLUMN
                // is not idempotent in SQLite, so duplicate-column errors are
                // tolerated.
                for version in 1..=target_version {
                    if let Some(entry) = migration(version) {
                        execute_batch_tolerant(connection, entry.up_sql)?;
                    }
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    if let Some(entry) = migration(version) {
                        apply_up_migration(connection, entry)?;
                    }
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    if let Some(entry) = migration(version) {
                        apply_down_migration(connection, entry)?;
                    }
                }
            }

            Ok(())
        })
    }
}

impl RecordStore for SqliteStore {
    fn upsert_courses(
        &self,
        user: UserId,
        courses: &[CourseRecord],
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<HashMap<String, StoredCourse>> {
        self.with_connection("upsert_courses", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            {
                let mut statement = transaction.prepare(
                    "
INSERT INTO courses (user_id, external_id, name, last_seen_at_unix)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(user_id, external_id) DO UPDATE SET
    name = excluded.name,
    last_seen_at_unix = excluded.last_seen_at_unix
",
                )?;

                for course in courses {
                    statement.execute((
                        user.0,
                        course.id.as_str(),
                        course.name.as_str(),
                        to_unix_seconds(seen_at),
                    ))?;
                }
            }
            transaction.commit()?;

            let mut merged = HashMap::new();
            for course in courses {
                merged.insert(
                    course.id.clone(),
                    StoredCourse {
                        user,
                        external_id: course.id.clone(),
                        name: course.name.clone(),
                        last_seen_at: seen_at,
                    },
                );
            }
            Ok(merged)
        })
    }

    fn upsert_modules(
        &self,
        user: UserId,
        modules: &[ModuleRecord],
        courses: &HashMap<String, StoredCourse>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<HashMap<(String, String), StoredModule>> {
        self.with_connection("upsert_modules", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let mut merged = HashMap::new();
            {
                let mut statement = transaction.prepare(
                    "
INSERT INTO modules (
    user_id, course_external_id, external_id, title, visible, blocked,
    block_reason, has_survey, url, last_seen_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(user_id, course_external_id, external_id) DO UPDATE SET
    title = excluded.title,
    visible = excluded.visible,
    blocked = excluded.blocked,
    block_reason = excluded.block_reason,
    has_survey = excluded.has_survey,
    url = excluded.url,
    last_seen_at_unix = excluded.last_seen_at_unix
",
                )?;

                for module in modules {
                    if !courses.contains_key(&module.course_id) {
                        tracing::warn!(
                            user = %user,
                            module_id = %module.id,
                            course_id = %module.course_id,
                            "skipping module whose parent course was not merged"
                        );
                        continue;
                    }

                    statement.execute((
                        user.0,
                        module.course_id.as_str(),
                        module.id.as_str(),
                        module.title.as_str(),
                        bool_to_sqlite(module.visible),
                        bool_to_sqlite(module.blocked),
                        module.block_reason.as_deref(),
                        bool_to_sqlite(module.has_survey),
                        module.url.as_deref(),
                        to_unix_seconds(seen_at),
                    ))?;

                    merged.insert(
                        (module.course_id.clone(), module.id.clone()),
                        StoredModule {
                            user,
                            course_external_id: module.course_id.clone(),
                            external_id: module.id.clone(),
                            title: module.title.clone(),
                            visible: module.visible,
                            blocked: module.blocked,
                            block_reason: module.block_reason.clone(),
                            has_survey: module.has_survey,
                            url: module.url.clone(),
                            last_seen_at: seen_at,
                        },
                    );
                }
            }
            transaction.commit()?;
            Ok(merged)
        })
    }

    fn upsert_module_surveys(
        &self,
        user: UserId,
        surveys: &[SurveyRecord],
        modules: &HashMap<(String, String), StoredModule>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        self.with_connection("upsert_module_surveys", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            {
                // completed_at_unix is deliberately left alone on conflict so
                // re-merging a survey never clears its completion mark.
                let mut statement = transaction.prepare(
                    "
INSERT INTO module_surveys (
    user_id, course_external_id, module_external_id, external_id,
    title, url, completion_url, last_seen_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(user_id, module_external_id, external_id) DO UPDATE SET
    course_external_id = excluded.course_external_id,
    title = excluded.title,
    url = excluded.url,
    completion_url = excluded.completion_url,
    last_seen_at_unix = excluded.last_seen_at_unix
",
                )?;

                for survey in surveys {
                    let parent = (survey.course_id.clone(), survey.module_id.clone());
                    if !modules.contains_key(&parent) {
                        tracing::warn!(
                            user = %user,
                            survey_id = %survey.id,
                            module_id = %survey.module_id,
                            "skipping survey whose parent module was not merged"
                        );
                        continue;
                    }

                    statement.execute((
                        user.0,
                        survey.course_id.as_str(),
                        survey.module_id.as_str(),
                        survey.id.as_str(),
                        survey.title.as_str(),
                        survey.url.as_deref(),
                        survey.completion_url.as_deref(),
                        to_unix_seconds(seen_at),
                    ))?;
                }
            }
            transaction.commit()?;
            Ok(())
        })
    }

    fn upsert_grade_items(
        &self,
        user: UserId,
        items: &[GradeItemRecord],
        courses: &HashMap<String, StoredCourse>,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        self.with_connection("upsert_grade_items", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            {
                let mut statement = transaction.prepare(
                    "
INSERT INTO grade_items (
    user_id, course_external_id, external_id, item_type, title,
    grade_value, grade_display, url, available_at_unix, due_at_unix,
    submission_status, grading_status, last_submission_at_unix,
    attempts_allowed, time_limit_minutes, last_seen_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
ON CONFLICT(user_id, course_external_id, external_id) DO UPDATE SET
    item_type = excluded.item_type,
    title = excluded.title,
    grade_value = excluded.grade_value,
    grade_display = excluded.grade_display,
    url = excluded.url,
    available_at_unix = excluded.available_at_unix,
    due_at_unix = excluded.due_at_unix,
    submission_status = excluded.submission_status,
    grading_status = excluded.grading_status,
    last_submission_at_unix = excluded.last_submission_at_unix,
    attempts_allowed = excluded.attempts_allowed,
    time_limit_minutes = excluded.time_limit_minutes,
    last_seen_at_unix = excluded.last_seen_at_unix
",
                )?;

                for item in items {
                    if !courses.contains_key(&item.course_id) {
                        tracing::warn!(
                            user = %user,
                            item_id = %item.id,
                            course_id = %item.course_id,
                            "skipping grade item whose parent course was not merged"
                        );
                        continue;
                    }

                    statement.execute((
                        user.0,
                        item.course_id.as_str(),
                        item.id.as_str(),
                        item.item_type.as_str(),
                        item.title.as_str(),
                        item.grade_value,
                        item.grade_display.as_deref(),
                        item.url.as_deref(),
                        item.available_at.map(to_unix_seconds),
                        item.due_at.map(to_unix_seconds),
                        item.submission_status.as_deref(),
                        item.grading_status.as_deref(),
                        item.last_submission_at.map(to_unix_seconds),
                        item.attempts_allowed,
                        item.time_limit_minutes,
                        to_unix_seconds(seen_at),
                    ))?;
                }
            }
            transaction.commit()?;
            Ok(())
        })
    }

    fn list_courses(&self, user: UserId) -> PersistenceResult<Vec<StoredCourse>> {
        self.with_connection("list_courses", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT external_id, name, last_seen_at_unix
FROM courses
WHERE user_id = ?1
ORDER BY external_id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                Ok(StoredCourse {
                    user,
                    external_id: row.get(0)?,
                    name: row.get(1)?,
                    last_seen_at: from_unix_seconds(row.get(2)?)?,
                })
            })?;

            rows.collect()
        })
    }

    fn list_modules(&self, user: UserId) -> PersistenceResult<Vec<StoredModule>> {
        self.with_connection("list_modules", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT course_external_id, external_id, title, visible, blocked,
       block_reason, has_survey, url, last_seen_at_unix
FROM modules
WHERE user_id = ?1
ORDER BY course_external_id, external_id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                Ok(StoredModule {
                    user,
                    course_external_id: row.get(0)?,
                    external_id: row.get(1)?,
                    title: row.get(2)?,
                    visible: sqlite_to_bool(row.get(3)?),
                    blocked: sqlite_to_bool(row.get(4)?),
                    block_reason: row.get(5)?,
                    has_survey: sqlite_to_bool(row.get(6)?),
                    url: row.get(7)?,
                    last_seen_at: from_unix_seconds(row.get(8)?)?,
                })
            })?;

            rows.collect()
        })
    }

    fn list_module_surveys(&self, user: UserId) -> PersistenceResult<Vec<StoredSurvey>> {
        self.with_connection("list_module_surveys", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT course_external_id, module_external_id, external_id, title,
       url, completion_url, completed_at_unix, last_seen_at_unix
FROM module_surveys
WHERE user_id = ?1
ORDER BY course_external_id, module_external_id, external_id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                let completed_at_unix: Option<i64> = row.get(6)?;
                Ok(StoredSurvey {
                    user,
                    course_external_id: row.get(0)?,
                    module_external_id: row.get(1)?,
                    external_id: row.get(2)?,
                    title: row.get(3)?,
                    url: row.get(4)?,
                    completion_url: row.get(5)?,
                    completed_at: completed_at_unix
                        .map(from_unix_seconds)
                        .transpose()?,
                    last_seen_at: from_unix_seconds(row.get(7)?)?,
                })
            })?;

            rows.collect()
        })
    }

    fn list_grade_items(&self, user: UserId) -> PersistenceResult<Vec<StoredGradeItem>> {
        self.with_connection("list_grade_items", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT course_external_id, external_id, item_type, title, grade_value,
       grade_display, url, available_at_unix, due_at_unix,
       submission_status, grading_status, last_submission_at_unix,
       attempts_allowed, time_limit_minutes, last_seen_at_unix
FROM grade_items
WHERE user_id = ?1
ORDER BY course_external_id, external_id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                let available_at_unix: Option<i64> = row.get(7)?;
                let due_at_unix: Option<i64> = row.get(8)?;
                let last_submission_at_unix: Option<i64> = row.get(11)?;
                Ok(StoredGradeItem {
                    user,
                    course_external_id: row.get(0)?,
                    external_id: row.get(1)?,
                    item_type: row.get(2)?,
                    title: row.get(3)?,
                    grade_value: row.get(4)?,
                    grade_display: row.get(5)?,
                    url: row.get(6)?,
                    available_at: available_at_unix.map(from_unix_seconds).transpose()?,
                    due_at: due_at_unix.map(from_unix_seconds).transpose()?,
                    submission_status: row.get(9)?,
                    grading_status: row.get(10)?,
                    last_submission_at: last_submission_at_unix
                        .map(from_unix_seconds)
                        .transpose()?,
                    attempts_allowed: row.get(12)?,
                    time_limit_minutes: row.get(13)?,
                    last_seen_at: from_unix_seconds(row.get(14)?)?,
                })
            })?;

            rows.collect()
        })
    }

    fn mark_survey_completed(
        &self,
        user: UserId,
        course_external_id: &str,
        module_external_id: &str,
        external_id: &str,
        completed_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        self.with_connection("mark_survey_completed", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
UPDATE module_surveys
SET completed_at_unix = ?1
WHERE user_id = ?2
  AND course_external_id = ?3
  AND module_external_id = ?4
  AND external_id = ?5
",
                (
                    to_unix_seconds(completed_at),
                    user.0,
                    course_external_id,
                    module_external_id,
                    external_id,
                ),
            )?;
            Ok(())
        })
    }
}

impl TaskStore for SqliteStore {
    fn create_task_if_absent(
        &self,
        user: UserId,
        task: &NewActionTask,
    ) -> PersistenceResult<bool> {
        self.with_connection("create_task_if_absent", |connection| {
            ensure_schema_ready(connection)?;
            let inserted = connection.execute(
                "
INSERT INTO action_tasks (user_id, title, source, category, metadata, created_at_unix)
VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
ON CONFLICT(user_id, title, source) DO NOTHING
",
                (
                    user.0,
                    task.title.as_str(),
                    task.source.as_str(),
                    task.category.as_str(),
                    task.metadata.as_ref().map(|value| value.to_string()),
                ),
            )?;
            Ok(inserted > 0)
        })
    }

    fn list_tasks(&self, user: UserId) -> PersistenceResult<Vec<ActionTask>> {
        self.with_connection("list_tasks", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, title, source, category, metadata, created_at_unix
FROM action_tasks
WHERE user_id = ?1
ORDER BY id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                let source: String = row.get(2)?;
                let category: String = row.get(3)?;
                let metadata: Option<String> = row.get(4)?;
                Ok(ActionTask {
                    id: row.get(0)?,
                    user,
                    title: row.get(1)?,
                    source: parse_task_source(&source)?,
                    category: parse_task_category(&category)?,
                    metadata: metadata.as_deref().map(parse_json).transpose()?,
                    created_at: from_unix_seconds(row.get(5)?)?,
                })
            })?;

            rows.collect()
        })
    }
}

impl EventLogStore for SqliteStore {
    fn append_event(&self, user: UserId, event: &NewEventRecord) -> PersistenceResult<()> {
        self.with_connection("append_event", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO event_logs (user_id, kind, source, payload, created_at_unix)
VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
",
                (
                    user.0,
                    event.kind.as_str(),
                    event.source.as_str(),
                    event.payload.to_string(),
                ),
            )?;
            Ok(())
        })
    }

    fn list_events(&self, user: UserId) -> PersistenceResult<Vec<EventRecord>> {
        self.with_connection("list_events", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, kind, source, payload, created_at_unix
FROM event_logs
WHERE user_id = ?1
ORDER BY id
",
            )?;

            let rows = statement.query_map([user.0], |row| {
                let kind: String = row.get(1)?;
                let payload: String = row.get(3)?;
                Ok(EventRecord {
                    id: row.get(0)?,
                    user,
                    kind: parse_event_kind(&kind)?,
                    source: row.get(2)?,
                    payload: parse_json(&payload)?,
                    created_at: from_unix_seconds(row.get(4)?)?,
                })
            })?;

            rows.collect()
        })
    }
}

impl VaultStore for SqliteStore {
    fn vault(&self, user: UserId) -> PersistenceResult<Option<VaultRecord>> {
        self.with_connection("vault", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT credentials_ciphertext, credentials_nonce,
       pipeline_key_wrapped_user, pipeline_key_wrapped_user_nonce,
       pipeline_key_wrapped_server, pipeline_key_wrapped_server_nonce,
       user_kdf_salt, cron_enabled
FROM vaults
WHERE user_id = ?1
",
                    [user.0],
                    |row| {
                        let cron_enabled: i64 = row.get(7)?;
                        Ok(VaultRecord {
                            user,
                            credentials_ciphertext: row.get(0)?,
                            credentials_nonce: row.get(1)?,
                            pipeline_key_wrapped_user: row.get(2)?,
                            pipeline_key_wrapped_user_nonce: row.get(3)?,
                            pipeline_key_wrapped_server: row.get(4)?,
                            pipeline_key_wrapped_server_nonce: row.get(5)?,
                            user_kdf_salt: row.get(6)?,
                            cron_enabled: sqlite_to_bool(cron_enabled),
                        })
                    },
                )
                .optional()
        })
    }

    fn upsert_vault(&self, vault: &VaultRecord) -> PersistenceResult<()> {
        self.with_connection("upsert_vault", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO vaults (
    user_id, credentials_ciphertext, credentials_nonce,
    pipeline_key_wrapped_user, pipeline_key_wrapped_user_nonce,
    pipeline_key_wrapped_server, pipeline_key_wrapped_server_nonce,
    user_kdf_salt, cron_enabled
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(user_id) DO UPDATE SET
    credentials_ciphertext = excluded.credentials_ciphertext,
    credentials_nonce = excluded.credentials_nonce,
    pipeline_key_wrapped_user = excluded.pipeline_key_wrapped_user,
    pipeline_key_wrapped_user_nonce = excluded.pipeline_key_wrapped_user_nonce,
    pipeline_key_wrapped_server = excluded.pipeline_key_wrapped_server,
    pipeline_key_wrapped_server_nonce = excluded.pipeline_key_wrapped_server_nonce,
    user_kdf_salt = excluded.user_kdf_salt,
    cron_enabled = excluded.cron_enabled
",
                (
                    vault.user.0,
                    vault.credentials_ciphertext.as_slice(),
                    vault.credentials_nonce.as_slice(),
                    vault.pipeline_key_wrapped_user.as_slice(),
                    vault.pipeline_key_wrapped_user_nonce.as_slice(),
                    vault.pipeline_key_wrapped_server.as_deref(),
                    vault.pipeline_key_wrapped_server_nonce.as_deref(),
                    vault.user_kdf_salt.as_slice(),
                    bool_to_sqlite(vault.cron_enabled),
                ),
            )?;
            Ok(())
        })
    }

    fn update_cron_status(
        &self,
        user: UserId,
        cron_enabled: bool,
        server_wrapped: Option<(Vec<u8>, Vec<u8>)>,
    ) -> PersistenceResult<()> {
        self.with_connection("update_cron_status", |connection| {
            ensure_schema_ready(connection)?;
            match &server_wrapped {
                Some((wrapped, nonce)) => {
                    connection.execute(
                        "
UPDATE vaults
SET cron_enabled = ?1,
    pipeline_key_wrapped_server = ?2,
    pipeline_key_wrapped_server_nonce = ?3
WHERE user_id = ?4
",
                        (
                            bool_to_sqlite(cron_enabled),
                            wrapped.as_slice(),
                            nonce.as_slice(),
                            user.0,
                        ),
                    )?;
                }
                None => {
                    connection.execute(
                        "UPDATE vaults SET cron_enabled = ?1 WHERE user_id = ?2",
                        (bool_to_sqlite(cron_enabled), user.0),
                    )?;
                }
            }
            Ok(())
        })
    }

    fn list_cron_enabled(&self) -> PersistenceResult<Vec<VaultRecord>> {
        self.with_connection("list_cron_enabled", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT user_id, credentials_ciphertext, credentials_nonce,
       pipeline_key_wrapped_user, pipeline_key_wrapped_user_nonce,
       pipeline_key_wrapped_server, pipeline_key_wrapped_server_nonce,
       user_kdf_salt, cron_enabled
FROM vaults
WHERE cron_enabled = 1
ORDER BY user_id
",
            )?;

            let rows = statement.query_map([], |row| {
                let user_id: i64 = row.get(0)?;
                let cron_enabled: i64 = row.get(8)?;
                Ok(VaultRecord {
                    user: UserId(user_id),
                    credentials_ciphertext: row.get(1)?,
                    credentials_nonce: row.get(2)?,
                    pipeline_key_wrapped_user: row.get(3)?,
                    pipeline_key_wrapped_user_nonce: row.get(4)?,
                    pipeline_key_wrapped_server: row.get(5)?,
                    pipeline_key_wrapped_server_nonce: row.get(6)?,
                    user_kdf_salt: row.get(7)?,
                    cron_enabled: sqlite_to_bool(cron_enabled),
                })
            })?;

            rows.collect()
        })
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
CREATE TABLE IF NOT EXISTS syllabus_schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
",
    )?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before sync operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    execute_batch_tolerant(&transaction, migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

/// Execute a SQL batch, tolerating "duplicate column name" errors from
/// `ALTER TABLE ADD COLUMN` which is not idempotent in SQLite.
fn execute_batch_tolerant(connection: &Connection, sql: &str) -> rusqlite::Result<()> {
    match connection.execute_batch(sql) {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e),
    }
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn storage_error(operation: &str, error: rusqlite::Error) -> SyncError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn parse_task_source(raw: &str) -> rusqlite::Result<TaskSource> {
    match raw {
        "syllabus" => Ok(TaskSource::Syllabus),
        "manual" => Ok(TaskSource::Manual),
        _ => Err(storage_error_sqlite(&format!(
            "unknown task source '{raw}' in sqlite record"
        ))),
    }
}

fn parse_task_category(raw: &str) -> rusqlite::Result<TaskCategory> {
    match raw {
        "study" => Ok(TaskCategory::Study),
        "personal" => Ok(TaskCategory::Personal),
        _ => Err(storage_error_sqlite(&format!(
            "unknown task category '{raw}' in sqlite record"
        ))),
    }
}

fn parse_event_kind(raw: &str) -> rusqlite::Result<EventKind> {
    match raw {
        "course_detected" => Ok(EventKind::CourseDetected),
        "module_detected" => Ok(EventKind::ModuleDetected),
        "survey_detected" => Ok(EventKind::SurveyDetected),
        "blocked_detected" => Ok(EventKind::BlockedDetected),
        "module_unlocked" => Ok(EventKind::ModuleUnlocked),
        "task_created" => Ok(EventKind::TaskCreated),
        "survey_sent" => Ok(EventKind::SurveySent),
        _ => Err(storage_error_sqlite(&format!(
            "unknown event kind '{raw}' in sqlite record"
        ))),
    }
}

fn parse_json(raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|error| {
        storage_error_sqlite(&format!("malformed JSON in sqlite record: {error}"))
    })
}

fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn to_unix_seconds(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(value, 0).ok_or_else(|| {
        storage_error_sqlite(&format!("unix timestamp '{value}' is out of range"))
    })
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> SyncError {
    SyncError::new(
        SyncErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
