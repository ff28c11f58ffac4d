use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::{AdapterFactory, RetryPolicy};
use crate::models::SyncError;
use crate::pipeline::PipelineRunner;
use crate::snapshots::FileSnapshotStore;
use crate::sqlite::SqliteStore;
use crate::stream::RunStreamManager;
use crate::vault::{KdfParams, decode_master_key};

/// Everything the sync core needs from its host: where state lives and the
/// optional server master key for unattended runs.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub database_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub server_master_key: Option<String>,
    pub kdf: KdfParams,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(database_path: impl Into<PathBuf>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            snapshot_dir: snapshot_dir.into(),
            server_master_key: None,
            kdf: KdfParams::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_server_master_key(mut self, raw: impl Into<String>) -> Self {
        self.server_master_key = Some(raw.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Open the store, bring the schema up to date, and assemble a runner
    /// around the given adapter factory.
    pub fn build(self, factory: Arc<dyn AdapterFactory>) -> Result<PipelineRunner, SyncError> {
        let store = Arc::new(SqliteStore::new(self.database_path.clone()));
        store.migrate_to_latest()?;

        let master_key = self
            .server_master_key
            .as_deref()
            .map(decode_master_key)
            .transpose()?;

        let snapshots = Arc::new(FileSnapshotStore::new(self.snapshot_dir.clone()));

        Ok(PipelineRunner::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            snapshots,
            factory,
            RunStreamManager::new(),
            self.retry,
            self.kdf,
            master_key,
        ))
    }
}
