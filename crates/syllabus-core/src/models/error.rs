use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::{PipelineStage, UserId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SyncErrorKind {
    Authentication,
    Configuration,
    Adapter,
    Crypto,
    StorageFailure,
    SnapshotIo,
    InvalidInput,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncError {
    pub user: Option<UserId>,
    pub stage: Option<PipelineStage>,
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            user: None,
            stage: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn at_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for SyncError {}
