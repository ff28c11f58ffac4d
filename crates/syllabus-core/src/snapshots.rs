use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::models::{Snapshot, StoredSnapshot, SyncError, SyncErrorKind, UserId};
use crate::persistence::{PersistenceResult, SnapshotStore};

/// Snapshot store backed by one JSON file per user under a fixed directory.
/// Writes go through a temp file and rename so a crashed run never leaves a
/// half-written snapshot for the next diff to read.
pub struct FileSnapshotStore {
    directory: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn snapshot_path(&self, user: UserId) -> PathBuf {
        self.directory.join(format!("snapshot-{user}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, user: UserId) -> PersistenceResult<Option<StoredSnapshot>> {
        let path = self.snapshot_path(user);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(snapshot_error(user, "read", error.to_string())),
        };

        let stored = serde_json::from_slice(&raw)
            .map_err(|error| snapshot_error(user, "parse", error.to_string()))?;
        Ok(Some(stored))
    }

    fn replace(&self, user: UserId, snapshot: &Snapshot) -> PersistenceResult<StoredSnapshot> {
        let now = Utc::now();
        let stored = StoredSnapshot {
            id: now.timestamp().to_string(),
            taken_at: now.to_rfc3339(),
            data: snapshot.clone(),
        };

        fs::create_dir_all(&self.directory)
            .map_err(|error| snapshot_error(user, "prepare directory", error.to_string()))?;

        let raw = serde_json::to_vec(&stored)
            .map_err(|error| snapshot_error(user, "serialize", error.to_string()))?;

        let path = self.snapshot_path(user);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &raw)
            .map_err(|error| snapshot_error(user, "write", error.to_string()))?;
        fs::rename(&temp_path, &path)
            .map_err(|error| snapshot_error(user, "rename", error.to_string()))?;

        Ok(stored)
    }
}

fn snapshot_error(user: UserId, operation: &str, message: String) -> SyncError {
    SyncError::new(
        SyncErrorKind::SnapshotIo,
        format!("snapshot {operation} failed: {message}"),
    )
    .for_user(user)
}
