use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use syllabus_core::models::{CourseRecord, Snapshot, UserId};
use syllabus_core::persistence::SnapshotStore;
use syllabus_core::snapshots::FileSnapshotStore;

fn temp_snapshot_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("syllabus-{test_name}-{nanos}-snapshots"))
}

fn snapshot(course_name: &str) -> Snapshot {
    Snapshot {
        courses: vec![CourseRecord {
            id: "c1".to_string(),
            name: course_name.to_string(),
        }],
        ..Snapshot::default()
    }
}

#[test]
fn missing_snapshot_loads_as_none() {
    let store = FileSnapshotStore::new(temp_snapshot_dir("missing"));
    assert!(store.load(UserId(1)).expect("load").is_none());
}

#[test]
fn replace_then_load_round_trips() {
    let store = FileSnapshotStore::new(temp_snapshot_dir("round-trip"));
    let written = store.replace(UserId(1), &snapshot("Algebra")).expect("replace");
    assert!(!written.taken_at.is_empty());

    let loaded = store.load(UserId(1)).expect("load").expect("present");
    assert_eq!(loaded.data, snapshot("Algebra"));
    assert_eq!(loaded.id, written.id);

    // Snapshots are per user.
    assert!(store.load(UserId(2)).expect("load").is_none());
}

#[test]
fn replace_overwrites_the_previous_snapshot() {
    let store = FileSnapshotStore::new(temp_snapshot_dir("overwrite"));
    store.replace(UserId(1), &snapshot("Algebra")).expect("first");
    store.replace(UserId(1), &snapshot("Algebra II")).expect("second");

    let loaded = store.load(UserId(1)).expect("load").expect("present");
    assert_eq!(loaded.data.courses[0].name, "Algebra II");
}
