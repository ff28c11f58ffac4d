use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use syllabus_core::adapters::{
    AdapterDataset, InMemoryAdapter, InMemoryAdapterFactory, RetryPolicy,
};
use syllabus_core::config::SyncConfig;
use syllabus_core::models::{
    CourseRecord, EventKind, GradeItemRecord, ModuleRecord, PlatformCredentials, RunKind,
    SurveyRecord, SyncErrorKind, UserId,
};
use syllabus_core::persistence::{EventLogStore, RecordStore, SnapshotStore, TaskStore, VaultStore};
use syllabus_core::pipeline::sweep::run_unattended_sweep;
use syllabus_core::pipeline::{PipelineRunner, VaultAccess};
use syllabus_core::snapshots::FileSnapshotStore;
use syllabus_core::sqlite::SqliteStore;
use syllabus_core::stream::{ProgressEventKind, ProgressLevel};
use syllabus_core::vault::KdfParams;

const APP_PASSWORD: &str = "app password";
const MASTER_KEY: &str = "!unit-test-master-key-material-000000";

struct Harness {
    runner: PipelineRunner,
    adapter: Arc<InMemoryAdapter>,
    store: SqliteStore,
    snapshots: FileSnapshotStore,
}

fn temp_root(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("syllabus-{test_name}-{nanos}"))
}

fn harness(test_name: &str, adapter: InMemoryAdapter) -> Harness {
    let root = temp_root(test_name);
    let database_path = root.join("sync.sqlite3");
    let snapshot_dir = root.join("snapshots");

    let adapter = Arc::new(adapter);
    let factory = Arc::new(InMemoryAdapterFactory::new(adapter.clone()));

    let runner = SyncConfig::new(&database_path, &snapshot_dir)
        .with_kdf(KdfParams {
            time_cost: 1,
            memory_cost_kib: 1024,
            parallelism: 1,
        })
        .with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            multiplier: 1.0,
        })
        .with_server_master_key(MASTER_KEY)
        .build(factory)
        .expect("runner must build");

    Harness {
        runner,
        adapter,
        store: SqliteStore::new(&database_path),
        snapshots: FileSnapshotStore::new(&snapshot_dir),
    }
}

fn dataset() -> AdapterDataset {
    AdapterDataset {
        courses: vec![CourseRecord {
            id: "c1".to_string(),
            name: "Course One".to_string(),
        }],
        modules: vec![
            ModuleRecord {
                id: "m1".to_string(),
                course_id: "c1".to_string(),
                title: "Module One".to_string(),
                visible: true,
                blocked: false,
                block_reason: None,
                has_survey: true,
                url: Some("https://lms.test/mod/m1".to_string()),
            },
            ModuleRecord {
                id: "m2".to_string(),
                course_id: "c1".to_string(),
                title: "Module Two".to_string(),
                visible: true,
                blocked: true,
                block_reason: Some("Complete Module One first".to_string()),
                has_survey: false,
                url: Some("https://lms.test/mod/m2".to_string()),
            },
        ],
        surveys: vec![SurveyRecord {
            id: "s1".to_string(),
            course_id: "c1".to_string(),
            module_id: "m1".to_string(),
            title: "Module One Feedback".to_string(),
            url: Some("https://lms.test/survey/s1".to_string()),
            completion_url: Some("https://lms.test/survey/s1/complete".to_string()),
        }],
        grades: vec![GradeItemRecord {
            id: "g1".to_string(),
            course_id: "c1".to_string(),
            item_type: "assign".to_string(),
            title: "Assignment 1".to_string(),
            grade_value: Some(7.5),
            grade_display: Some("7.50".to_string()),
            url: None,
            available_at: None,
            due_at: None,
            submission_status: Some("submitted".to_string()),
            grading_status: None,
            last_submission_at: None,
            attempts_allowed: None,
            time_limit_minutes: None,
        }],
        quizzes: vec![GradeItemRecord {
            id: "q1".to_string(),
            course_id: "c1".to_string(),
            item_type: "quiz".to_string(),
            title: "Quiz 1".to_string(),
            grade_value: None,
            grade_display: None,
            url: None,
            available_at: None,
            due_at: None,
            submission_status: None,
            grading_status: None,
            last_submission_at: None,
            attempts_allowed: Some(3),
            time_limit_minutes: Some(30),
        }],
    }
}

fn interactive() -> VaultAccess {
    VaultAccess::Interactive {
        app_password: APP_PASSWORD.to_string(),
    }
}

async fn store_credentials(harness: &Harness, user: UserId, enable_cron: bool) {
    harness
        .runner
        .store_credentials(
            user,
            PlatformCredentials::new(format!("student{}", user.0), "platform-secret"),
            APP_PASSWORD.to_string(),
            enable_cron,
        )
        .await
        .expect("credentials must store");
}

#[tokio::test]
async fn full_run_merges_diffs_and_creates_tasks() {
    let harness = harness("full-run", InMemoryAdapter::new(dataset()));
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    let run_id = harness
        .runner
        .run_to_completion(user, RunKind::Full, interactive())
        .await
        .expect("run must complete");

    assert_eq!(harness.store.list_courses(user).expect("courses").len(), 1);
    assert_eq!(harness.store.list_modules(user).expect("modules").len(), 2);
    assert_eq!(
        harness
            .store
            .list_module_surveys(user)
            .expect("surveys")
            .len(),
        1
    );
    assert_eq!(
        harness
            .store
            .list_grade_items(user)
            .expect("grade items")
            .len(),
        2
    );

    let tasks = harness.store.list_tasks(user).expect("tasks");
    let titles: Vec<&str> = tasks.iter().map(|task| task.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "New module available - Course One - Module One",
            "Submit survey - Course One - Module One",
            "New module available - Course One - Module Two",
        ]
    );
    let survey_task = &tasks[1];
    assert_eq!(
        survey_task
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("action_url"))
            .and_then(|value| value.as_str()),
        Some("https://lms.test/mod/m1")
    );
    assert_eq!(
        survey_task
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("module_id"))
            .and_then(|value| value.as_str()),
        Some("m1")
    );
    // Module tasks carry the scope ids too, even without an action url.
    let module_task = &tasks[0];
    assert_eq!(
        module_task
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("course_id"))
            .and_then(|value| value.as_str()),
        Some("c1")
    );
    assert_eq!(
        module_task
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("module_id"))
            .and_then(|value| value.as_str()),
        Some("m1")
    );

    let events = harness.store.list_events(user).expect("events");
    let kinds: Vec<EventKind> = events.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::CourseDetected,
            EventKind::ModuleDetected,
            EventKind::TaskCreated,
            EventKind::SurveyDetected,
            EventKind::TaskCreated,
            EventKind::ModuleDetected,
            EventKind::TaskCreated,
            EventKind::BlockedDetected,
        ]
    );

    let snapshot = harness
        .snapshots
        .load(user)
        .expect("load")
        .expect("snapshot written");
    assert_eq!(snapshot.data.courses.len(), 1);
    assert_eq!(snapshot.data.grade_items.len(), 2);

    let history = harness.runner.stream().history(&run_id).await;
    assert_eq!(history[0].message, "Pipeline started (full).");
    let last = history.last().expect("terminal event");
    assert_eq!(last.event, ProgressEventKind::Done);
    assert_eq!(last.message, "Pipeline completed.");
    assert!(harness.runner.stream().is_completed(&run_id).await);
    assert!(harness.adapter.is_closed());
}

#[tokio::test]
async fn unchanged_second_run_creates_no_new_tasks_or_events() {
    let harness = harness("no-change", InMemoryAdapter::new(dataset()));
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    harness
        .runner
        .run_to_completion(user, RunKind::Full, interactive())
        .await
        .expect("first run");
    let tasks_before = harness.store.list_tasks(user).expect("tasks").len();
    let events_before = harness.store.list_events(user).expect("events").len();

    harness
        .runner
        .run_to_completion(user, RunKind::Full, interactive())
        .await
        .expect("second run");

    assert_eq!(harness.store.list_tasks(user).expect("tasks").len(), tasks_before);
    assert_eq!(
        harness.store.list_events(user).expect("events").len(),
        events_before
    );
}

#[tokio::test]
async fn failed_login_publishes_an_error_terminal_event() {
    let harness = harness(
        "login-failure",
        InMemoryAdapter::new(dataset()).with_failing_login(),
    );
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    let run_id = harness
        .runner
        .spawn_run(user, RunKind::Full, interactive())
        .await;

    let mut receiver = harness
        .runner
        .stream()
        .subscribe(&run_id)
        .await
        .expect("subscribe");
    let mut last = None;
    while let Some(event) = receiver.recv().await {
        last = Some(event);
    }
    let last = last.expect("stream must carry events");
    assert_eq!(last.event, ProgressEventKind::Done);
    assert_eq!(last.level, ProgressLevel::Error);
    assert!(last.message.starts_with("Pipeline failed:"), "{}", last.message);

    assert!(harness.runner.stream().is_completed(&run_id).await);
    assert!(harness.store.list_courses(user).expect("courses").is_empty());
}

#[tokio::test]
async fn transient_login_failures_are_retried() {
    let harness = harness(
        "login-retry",
        InMemoryAdapter::new(dataset()).with_transient_login_failures(2),
    );
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    harness
        .runner
        .run_to_completion(user, RunKind::Full, interactive())
        .await
        .expect("third attempt succeeds");
    assert_eq!(harness.store.list_courses(user).expect("courses").len(), 1);
}

#[tokio::test]
async fn subset_run_merges_without_diffing_or_tasks() {
    let harness = harness("subset-courses", InMemoryAdapter::new(dataset()));
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    harness
        .runner
        .run_to_completion(user, RunKind::Courses, interactive())
        .await
        .expect("subset run");

    assert_eq!(harness.store.list_courses(user).expect("courses").len(), 1);
    assert!(harness.store.list_tasks(user).expect("tasks").is_empty());
    assert!(harness.store.list_events(user).expect("events").is_empty());
    assert!(
        harness.snapshots.load(user).expect("load").is_none(),
        "subset runs must not touch the snapshot"
    );
}

#[tokio::test]
async fn wrong_app_password_fails_before_the_adapter_is_built() {
    let harness = harness("wrong-password", InMemoryAdapter::new(dataset()));
    let user = UserId(1);
    store_credentials(&harness, user, false).await;

    let error = harness
        .runner
        .run_to_completion(
            user,
            RunKind::Full,
            VaultAccess::Interactive {
                app_password: "wrong".to_string(),
            },
        )
        .await
        .expect_err("wrong password must fail");
    assert_eq!(error.kind, SyncErrorKind::Authentication);
}

#[tokio::test]
async fn unattended_sweep_isolates_per_user_failures() {
    let harness = harness("sweep", InMemoryAdapter::new(dataset()));
    let healthy = UserId(1);
    let broken = UserId(2);

    store_credentials(&harness, healthy, true).await;
    store_credentials(&harness, broken, true).await;
    // Corrupt the second user's server-wrapped key so their unattended
    // unwrap fails while the first user still syncs.
    harness
        .store
        .update_cron_status(broken, true, Some((vec![0; 48], vec![0; 12])))
        .expect("corrupt vault");

    let report = run_unattended_sweep(&harness.runner)
        .await
        .expect("sweep must finish");
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    assert_eq!(
        harness.store.list_courses(healthy).expect("courses").len(),
        1
    );
    assert!(harness.store.list_courses(broken).expect("courses").is_empty());
}

#[tokio::test]
async fn completing_a_survey_marks_it_and_audits() {
    let harness = harness("survey-complete", InMemoryAdapter::new(dataset()));
    let user = UserId(1);
    store_credentials(&harness, user, false).await;
    harness
        .runner
        .run_to_completion(user, RunKind::Full, interactive())
        .await
        .expect("full run");

    let submission = harness
        .runner
        .complete_survey(user, interactive(), "m1", "s1")
        .await
        .expect("submission");
    assert!(submission.submitted);

    let surveys = harness.store.list_module_surveys(user).expect("surveys");
    assert!(surveys[0].completed_at.is_some());

    let events = harness.store.list_events(user).expect("events");
    assert!(events.iter().any(|event| event.kind == EventKind::SurveySent));

    assert_eq!(
        harness.adapter.completed_surveys(),
        vec!["https://lms.test/survey/s1/complete".to_string()]
    );

    // An unknown survey id is rejected without touching the adapter.
    let error = harness
        .runner
        .complete_survey(user, interactive(), "m1", "nope")
        .await
        .expect_err("unknown survey");
    assert_eq!(error.kind, SyncErrorKind::InvalidInput);
}
