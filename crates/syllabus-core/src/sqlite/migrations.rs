#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_sync_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS courses (
    user_id INTEGER NOT NULL,
    external_id TEXT NOT NULL,
    name TEXT NOT NULL,
    last_seen_at_unix INTEGER NOT NULL,
    PRIMARY KEY (user_id, external_id)
);

CREATE TABLE IF NOT EXISTS modules (
    user_id INTEGER NOT NULL,
    course_external_id TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    visible INTEGER NOT NULL DEFAULT 1,
    blocked INTEGER NOT NULL DEFAULT 0,
    block_reason TEXT,
    has_survey INTEGER NOT NULL DEFAULT 0,
    url TEXT,
    last_seen_at_unix INTEGER NOT NULL,
    PRIMARY KEY (user_id, course_external_id, external_id)
);

CREATE TABLE IF NOT EXISTS module_surveys (
    user_id INTEGER NOT NULL,
    course_external_id TEXT NOT NULL,
    module_external_id TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT,
    completion_url TEXT,
    last_seen_at_unix INTEGER NOT NULL,
    PRIMARY KEY (user_id, module_external_id, external_id)
);

CREATE TABLE IF NOT EXISTS grade_items (
    user_id INTEGER NOT NULL,
    course_external_id TEXT NOT NULL,
    external_id TEXT NOT NULL,
    item_type TEXT NOT NULL,
    title TEXT NOT NULL,
    grade_value REAL,
    grade_display TEXT,
    url TEXT,
    available_at_unix INTEGER,
    due_at_unix INTEGER,
    submission_status TEXT,
    grading_status TEXT,
    last_submission_at_unix INTEGER,
    attempts_allowed INTEGER,
    time_limit_minutes INTEGER,
    last_seen_at_unix INTEGER NOT NULL,
    PRIMARY KEY (user_id, course_external_id, external_id)
);

CREATE TABLE IF NOT EXISTS action_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    source TEXT NOT NULL,
    category TEXT NOT NULL,
    metadata TEXT,
    created_at_unix INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_action_tasks_dedup
    ON action_tasks (user_id, title, source);

CREATE TABLE IF NOT EXISTS vaults (
    user_id INTEGER PRIMARY KEY,
    credentials_ciphertext BLOB NOT NULL,
    credentials_nonce BLOB NOT NULL,
    pipeline_key_wrapped_user BLOB NOT NULL,
    pipeline_key_wrapped_user_nonce BLOB NOT NULL,
    pipeline_key_wrapped_server BLOB,
    pipeline_key_wrapped_server_nonce BLOB,
    user_kdf_salt BLOB NOT NULL,
    cron_enabled INTEGER NOT NULL DEFAULT 0
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS vaults;
DROP INDEX IF EXISTS idx_action_tasks_dedup;
DROP TABLE IF EXISTS action_tasks;
DROP TABLE IF EXISTS grade_items;
DROP TABLE IF EXISTS module_surveys;
DROP TABLE IF EXISTS modules;
DROP TABLE IF EXISTS courses;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_event_log_and_survey_completion",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS event_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    source TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at_unix INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_logs_user_time
    ON event_logs (user_id, created_at_unix);

ALTER TABLE module_surveys ADD COLUMN completed_at_unix INTEGER;
"#,
    down_sql: r#"
ALTER TABLE module_surveys DROP COLUMN completed_at_unix;
DROP INDEX IF EXISTS idx_event_logs_user_time;
DROP TABLE IF EXISTS event_logs;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
