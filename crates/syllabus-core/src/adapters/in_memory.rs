use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::adapters::platform::{AdapterFactory, AdapterResult, PlatformAdapter};
use crate::models::{
    CourseRecord, GradeItemRecord, ModuleRecord, PlatformCredentials, SurveyRecord,
    SurveySubmission, SyncError, SyncErrorKind,
};

/// Scripted platform data served by [`InMemoryAdapter`].
#[derive(Clone, Debug, Default)]
pub struct AdapterDataset {
    pub courses: Vec<CourseRecord>,
    pub modules: Vec<ModuleRecord>,
    pub surveys: Vec<SurveyRecord>,
    pub grades: Vec<GradeItemRecord>,
    pub quizzes: Vec<GradeItemRecord>,
}

/// Deterministic adapter backed by a fixed dataset. Used by tests and local
/// pipeline runs that should not reach a real platform.
pub struct InMemoryAdapter {
    dataset: AdapterDataset,
    fail_login: bool,
    transient_failures: AtomicUsize,
    logged_in: AtomicBool,
    closed: AtomicBool,
    completed_surveys: Mutex<Vec<String>>,
}

impl InMemoryAdapter {
    pub fn new(dataset: AdapterDataset) -> Self {
        Self {
            dataset,
            fail_login: false,
            transient_failures: AtomicUsize::new(0),
            logged_in: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            completed_surveys: Mutex::new(Vec::new()),
        }
    }

    /// Every login attempt fails with an authentication error.
    pub fn with_failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    /// The first `count` logins fail with a retryable adapter error before
    /// the session comes up.
    pub fn with_transient_login_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Completion URLs handed to `complete_survey`, in call order.
    pub fn completed_surveys(&self) -> Vec<String> {
        self.completed_surveys
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }

    fn ensure_session(&self) -> AdapterResult<()> {
        if !self.logged_in.load(Ordering::SeqCst) {
            return Err(SyncError::new(
                SyncErrorKind::Adapter,
                "adapter session is not logged in",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for InMemoryAdapter {
    async fn login(&self) -> AdapterResult<()> {
        if self.fail_login {
            return Err(SyncError::new(
                SyncErrorKind::Authentication,
                "platform rejected the stored credentials",
            ));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::new(
                SyncErrorKind::Adapter,
                "platform login timed out",
            ));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> AdapterResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn courses(&self) -> AdapterResult<Vec<CourseRecord>> {
        self.ensure_session()?;
        Ok(self.dataset.courses.clone())
    }

    async fn modules(&self, course_id: &str) -> AdapterResult<Vec<ModuleRecord>> {
        self.ensure_session()?;
        Ok(self
            .dataset
            .modules
            .iter()
            .filter(|module| module.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn grades(&self) -> AdapterResult<Vec<GradeItemRecord>> {
        self.ensure_session()?;
        Ok(self.dataset.grades.clone())
    }

    async fn quizzes(&self) -> AdapterResult<Vec<GradeItemRecord>> {
        self.ensure_session()?;
        Ok(self.dataset.quizzes.clone())
    }

    async fn surveys(&self) -> AdapterResult<Vec<SurveyRecord>> {
        self.ensure_session()?;
        Ok(self.dataset.surveys.clone())
    }

    async fn complete_survey(&self, completion_url: &str) -> AdapterResult<SurveySubmission> {
        self.ensure_session()?;
        if let Ok(mut urls) = self.completed_surveys.lock() {
            urls.push(completion_url.to_string());
        }
        Ok(SurveySubmission {
            submitted: true,
            url: completion_url.to_string(),
            reason: None,
        })
    }
}

/// Factory that hands out one shared scripted adapter, remembering the last
/// credentials it was asked to build with.
pub struct InMemoryAdapterFactory {
    adapter: Arc<InMemoryAdapter>,
    seen_usernames: Mutex<Vec<String>>,
}

impl InMemoryAdapterFactory {
    pub fn new(adapter: Arc<InMemoryAdapter>) -> Self {
        Self {
            adapter,
            seen_usernames: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_usernames(&self) -> Vec<String> {
        self.seen_usernames
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }
}

impl AdapterFactory for InMemoryAdapterFactory {
    fn build(&self, credentials: &PlatformCredentials) -> AdapterResult<Arc<dyn PlatformAdapter>> {
        if let Ok(mut names) = self.seen_usernames.lock() {
            names.push(credentials.username.clone());
        }
        Ok(self.adapter.clone())
    }
}
