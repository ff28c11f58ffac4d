use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{
    CourseRecord, GradeItemRecord, ModuleRecord, PlatformCredentials, SurveyRecord,
    SurveySubmission, SyncError,
};

pub type AdapterResult<T> = Result<T, SyncError>;

/// One authenticated session against the source learning platform. The core
/// depends only on this shape; how records are obtained (scraping, API) is
/// the implementation's business, including any internal request retries.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    async fn login(&self) -> AdapterResult<()>;

    async fn close(&self) -> AdapterResult<()>;

    async fn courses(&self) -> AdapterResult<Vec<CourseRecord>>;

    async fn modules(&self, course_id: &str) -> AdapterResult<Vec<ModuleRecord>>;

    async fn grades(&self) -> AdapterResult<Vec<GradeItemRecord>>;

    async fn quizzes(&self) -> AdapterResult<Vec<GradeItemRecord>>;

    async fn surveys(&self) -> AdapterResult<Vec<SurveyRecord>>;

    async fn complete_survey(&self, completion_url: &str) -> AdapterResult<SurveySubmission>;
}

/// Builds an adapter session from unwrapped credentials. Which concrete
/// adapter backs the factory is the caller's configuration choice.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, credentials: &PlatformCredentials) -> AdapterResult<Arc<dyn PlatformAdapter>>;
}
