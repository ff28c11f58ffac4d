pub mod sweep;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use chrono::Utc;
use zeroize::Zeroizing;

use crate::adapters::{AdapterFactory, PlatformAdapter, RetryPolicy};
use crate::diff::{DiffEvent, diff_snapshots};
use crate::models::{
    EventKind, NewEventRecord, PipelineStage, PlatformCredentials, RunKind, Snapshot,
    StoredCourse, StoredModule, SurveySubmission, SyncError, SyncErrorKind, UserId,
};
use crate::persistence::{
    EventLogStore, RecordStore, SnapshotStore, TaskStore, VaultStore,
};
use crate::stream::{ProgressEvent, ProgressLevel, RunStreamManager};
use crate::tasks::task_for_event;
use crate::vault::{
    KEY_SIZE, KdfParams, open_interactive, open_unattended, rewrap_for_unattended,
    seal_credentials,
};

/// How a run is allowed to unwrap the user's credential vault.
#[derive(Clone)]
pub enum VaultAccess {
    Interactive { app_password: String },
    Unattended,
}

impl Debug for VaultAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interactive { .. } => f
                .debug_struct("Interactive")
                .field("app_password", &"<redacted>")
                .finish(),
            Self::Unattended => f.debug_struct("Unattended").finish(),
        }
    }
}

/// Drives one user's sync end to end: unwrap credentials, fetch through the
/// adapter, merge into storage, diff against the previous snapshot, and turn
/// changes into audit entries and action tasks, reporting progress on the
/// run stream throughout.
#[derive(Clone)]
pub struct PipelineRunner {
    records: Arc<dyn RecordStore>,
    tasks: Arc<dyn TaskStore>,
    events: Arc<dyn EventLogStore>,
    vaults: Arc<dyn VaultStore>,
    snapshots: Arc<dyn SnapshotStore>,
    factory: Arc<dyn AdapterFactory>,
    stream: RunStreamManager,
    retry: RetryPolicy,
    kdf: KdfParams,
    master_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
}

impl PipelineRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn RecordStore>,
        tasks: Arc<dyn TaskStore>,
        events: Arc<dyn EventLogStore>,
        vaults: Arc<dyn VaultStore>,
        snapshots: Arc<dyn SnapshotStore>,
        factory: Arc<dyn AdapterFactory>,
        stream: RunStreamManager,
        retry: RetryPolicy,
        kdf: KdfParams,
        master_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    ) -> Self {
        Self {
            records,
            tasks,
            events,
            vaults,
            snapshots,
            factory,
            stream,
            retry,
            kdf,
            master_key,
        }
    }

    pub fn stream(&self) -> &RunStreamManager {
        &self.stream
    }

    pub fn vault_store(&self) -> Arc<dyn VaultStore> {
        self.vaults.clone()
    }

    /// Seal fresh credentials into the user's vault, replacing any previous
    /// one. The pipeline key is always wrapped under the server master key
    /// too when one is configured, so unattended access can be enabled later
    /// without re-entering the platform password.
    pub async fn store_credentials(
        &self,
        user: UserId,
        credentials: PlatformCredentials,
        app_password: String,
        enable_cron: bool,
    ) -> Result<(), SyncError> {
        let kdf = self.kdf;
        let master = self.master_key.clone();
        let vaults = self.vaults.clone();
        run_blocking(move || {
            let vault = seal_credentials(
                user,
                &credentials,
                &app_password,
                master.as_ref().map(|key| &**key),
                &kdf,
                enable_cron,
            )?;
            vaults.upsert_vault(&vault)
        })
        .await
    }

    /// Turn on unattended runs for a user. Requires the app password as
    /// proof of presence; the pipeline key is recovered through the user
    /// path and re-wrapped under the server master key.
    pub async fn enable_unattended(
        &self,
        user: UserId,
        app_password: String,
    ) -> Result<(), SyncError> {
        let master = self.master_key.clone().ok_or_else(|| {
            SyncError::new(
                SyncErrorKind::Configuration,
                "unattended access requested but no server master key is configured",
            )
            .for_user(user)
        })?;
        let kdf = self.kdf;
        let vaults = self.vaults.clone();
        run_blocking(move || {
            let vault = vaults.vault(user)?.ok_or_else(|| {
                SyncError::new(SyncErrorKind::Configuration, "user has no credential vault")
                    .for_user(user)
            })?;
            let rewrapped = rewrap_for_unattended(&vault, &app_password, &master, &kdf)?;
            vaults.update_cron_status(user, true, Some(rewrapped))
        })
        .await
    }

    pub async fn disable_unattended(&self, user: UserId) -> Result<(), SyncError> {
        let vaults = self.vaults.clone();
        run_blocking(move || vaults.update_cron_status(user, false, None)).await
    }

    /// Start a run in the background and return its stream id immediately.
    pub async fn spawn_run(&self, user: UserId, kind: RunKind, access: VaultAccess) -> String {
        let run_id = self.stream.create_run().await;
        let runner = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            // Failures are published on the stream and logged inside.
            let _ = runner.execute_run(&id, user, kind, access).await;
        });
        run_id
    }

    /// Run synchronously, returning the run id once the stream is closed.
    pub async fn run_to_completion(
        &self,
        user: UserId,
        kind: RunKind,
        access: VaultAccess,
    ) -> Result<String, SyncError> {
        let run_id = self.stream.create_run().await;
        self.execute_run(&run_id, user, kind, access).await?;
        Ok(run_id)
    }

    /// Full unattended run for one user, unlocking the vault through the
    /// server master key. Scheduler entry point.
    pub async fn run_unattended(&self, user: UserId, kind: RunKind) -> Result<String, SyncError> {
        self.run_to_completion(user, kind, VaultAccess::Unattended).await
    }

    /// Execute one run against an already created stream id, publishing the
    /// start and terminal events around the pipeline itself.
    pub async fn execute_run(
        &self,
        run_id: &str,
        user: UserId,
        kind: RunKind,
        access: VaultAccess,
    ) -> Result<(), SyncError> {
        self.stream
            .publish(
                run_id,
                ProgressEvent::status(format!("Pipeline started ({}).", kind.as_str())),
            )
            .await;

        let result = self.run_pipeline(run_id, user, kind, access).await;

        match &result {
            Ok(()) => {
                self.stream
                    .mark_done(
                        run_id,
                        ProgressEvent::done("Pipeline completed.", ProgressLevel::Info),
                    )
                    .await;
            }
            Err(error) => {
                tracing::error!(
                    user = %user,
                    kind = kind.as_str(),
                    error = %error,
                    "pipeline run failed"
                );
                self.stream
                    .mark_done(
                        run_id,
                        ProgressEvent::done(
                            format!("Pipeline failed: {error}"),
                            ProgressLevel::Error,
                        ),
                    )
                    .await;
            }
        }

        result
    }

    /// Submit a stored survey through the adapter and, when the platform
    /// confirms it, record the completion and an audit entry.
    pub async fn complete_survey(
        &self,
        user: UserId,
        access: VaultAccess,
        module_external_id: &str,
        survey_external_id: &str,
    ) -> Result<SurveySubmission, SyncError> {
        let records = self.records.clone();
        let surveys = run_blocking(move || records.list_module_surveys(user)).await?;
        let survey = surveys
            .into_iter()
            .find(|survey| {
                survey.module_external_id == module_external_id
                    && survey.external_id == survey_external_id
            })
            .ok_or_else(|| {
                SyncError::new(
                    SyncErrorKind::InvalidInput,
                    format!("unknown survey '{survey_external_id}'"),
                )
                .for_user(user)
            })?;
        let completion_url = survey.completion_url.clone().ok_or_else(|| {
            SyncError::new(
                SyncErrorKind::InvalidInput,
                format!("survey '{survey_external_id}' has no completion url"),
            )
            .for_user(user)
        })?;

        let credentials = self.unlock_credentials(user, &access).await?;
        let adapter = self.factory.build(&credentials)?;
        self.retry
            .run(|| adapter.login())
            .await
            .map_err(|error| error.for_user(user))?;

        let submission = adapter.complete_survey(&completion_url).await;
        if let Err(error) = adapter.close().await {
            tracing::warn!(user = %user, error = %error, "adapter close failed");
        }
        let submission = submission.map_err(|error| error.for_user(user))?;

        if submission.counts_as_completed() {
            let records = self.records.clone();
            let marked = survey.clone();
            run_blocking(move || {
                records.mark_survey_completed(
                    user,
                    &marked.course_external_id,
                    &marked.module_external_id,
                    &marked.external_id,
                    Utc::now(),
                )
            })
            .await?;

            let audit = NewEventRecord {
                kind: EventKind::SurveySent,
                source: "survey".to_string(),
                payload: serde_json::json!({
                    "survey": survey.title,
                    "module_id": survey.module_external_id,
                    "submitted": submission.submitted,
                    "reason": submission.reason,
                }),
            };
            let events = self.events.clone();
            run_blocking(move || events.append_event(user, &audit)).await?;
        }

        Ok(submission)
    }

    async fn run_pipeline(
        &self,
        run_id: &str,
        user: UserId,
        kind: RunKind,
        access: VaultAccess,
    ) -> Result<(), SyncError> {
        let credentials = self
            .unlock_credentials(user, &access)
            .await
            .map_err(|error| error.at_stage(PipelineStage::Started))?;

        let adapter = self
            .factory
            .build(&credentials)
            .map_err(|error| error.for_user(user).at_stage(PipelineStage::Started))?;

        self.stream
            .publish(run_id, ProgressEvent::status("Logging in to the platform."))
            .await;
        self.retry
            .run(|| adapter.login())
            .await
            .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;

        let outcome = match kind {
            RunKind::Full => self.run_full(run_id, user, &adapter).await,
            _ => self.run_subset(run_id, user, kind, &adapter).await,
        };

        if let Err(error) = adapter.close().await {
            tracing::warn!(user = %user, error = %error, "adapter close failed");
        }

        outcome
    }

    async fn run_full(
        &self,
        run_id: &str,
        user: UserId,
        adapter: &Arc<dyn PlatformAdapter>,
    ) -> Result<(), SyncError> {
        self.stream
            .publish(run_id, ProgressEvent::status("Fetching platform records."))
            .await;
        let snapshot = self
            .fetch_full(run_id, adapter)
            .await
            .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;

        self.stream
            .publish(run_id, ProgressEvent::status("Persisting records."))
            .await;
        self.persist_records(user, &snapshot)
            .await
            .map_err(|error| error.at_stage(PipelineStage::Persisting))?;

        self.stream
            .publish(run_id, ProgressEvent::status("Computing changes."))
            .await;
        let snapshots = self.snapshots.clone();
        let previous = run_blocking(move || snapshots.load(user))
            .await
            .map_err(|error| error.at_stage(PipelineStage::Diffing))?;
        let changes = diff_snapshots(previous.as_ref().map(|stored| &stored.data), &snapshot);
        self.stream
            .publish(
                run_id,
                ProgressEvent::log(
                    format!("Detected {} changes.", changes.len()),
                    ProgressLevel::Info,
                ),
            )
            .await;

        let snapshots = self.snapshots.clone();
        let replaced = snapshot.clone();
        run_blocking(move || snapshots.replace(user, &replaced).map(|_| ()))
            .await
            .map_err(|error| error.at_stage(PipelineStage::Diffing))?;

        self.stream
            .publish(run_id, ProgressEvent::status("Generating tasks."))
            .await;
        let created = self
            .record_changes(run_id, user, changes)
            .await
            .map_err(|error| error.at_stage(PipelineStage::GeneratingTasks))?;
        if created > 0 {
            self.stream
                .publish(
                    run_id,
                    ProgressEvent::log(
                        format!("Created {created} new tasks."),
                        ProgressLevel::Info,
                    ),
                )
                .await;
        }

        Ok(())
    }

    async fn run_subset(
        &self,
        run_id: &str,
        user: UserId,
        kind: RunKind,
        adapter: &Arc<dyn PlatformAdapter>,
    ) -> Result<(), SyncError> {
        let seen_at = Utc::now();
        match kind {
            RunKind::Courses => {
                let courses = self
                    .retry
                    .run(|| adapter.courses())
                    .await
                    .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;
                self.publish_count(run_id, courses.len(), "courses").await;
                let records = self.records.clone();
                run_blocking(move || records.upsert_courses(user, &courses, seen_at).map(|_| ()))
                    .await
                    .map_err(|error| error.at_stage(PipelineStage::Persisting))?;
            }
            RunKind::Modules => {
                let course_map = self.course_map(user, adapter).await?;
                let mut modules = Vec::new();
                let course_ids: Vec<String> = course_map.keys().cloned().collect();
                for course_id in &course_ids {
                    let fetched = self
                        .retry
                        .run(|| adapter.modules(course_id))
                        .await
                        .map_err(|error| {
                            error.for_user(user).at_stage(PipelineStage::Fetching)
                        })?;
                    modules.extend(fetched);
                }
                self.publish_count(run_id, modules.len(), "modules").await;
                let records = self.records.clone();
                run_blocking(move || {
                    records
                        .upsert_modules(user, &modules, &course_map, seen_at)
                        .map(|_| ())
                })
                .await
                .map_err(|error| error.at_stage(PipelineStage::Persisting))?;
            }
            RunKind::Surveys => {
                let module_map = self.module_map(user).await?;
                let surveys = self
                    .retry
                    .run(|| adapter.surveys())
                    .await
                    .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;
                self.publish_count(run_id, surveys.len(), "surveys").await;
                let records = self.records.clone();
                run_blocking(move || {
                    records.upsert_module_surveys(user, &surveys, &module_map, seen_at)
                })
                .await
                .map_err(|error| error.at_stage(PipelineStage::Persisting))?;
            }
            RunKind::Grades => {
                let course_map = self.course_map(user, adapter).await?;
                let items = self
                    .retry
                    .run(|| adapter.grades())
                    .await
                    .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;
                self.publish_count(run_id, items.len(), "grade items").await;
                let records = self.records.clone();
                run_blocking(move || {
                    records.upsert_grade_items(user, &items, &course_map, seen_at)
                })
                .await
                .map_err(|error| error.at_stage(PipelineStage::Persisting))?;
            }
            RunKind::Quizzes => {
                let course_map = self.course_map(user, adapter).await?;
                let items = self
                    .retry
                    .run(|| adapter.quizzes())
                    .await
                    .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;
                self.publish_count(run_id, items.len(), "quizzes").await;
                let records = self.records.clone();
                run_blocking(move || {
                    records.upsert_grade_items(user, &items, &course_map, seen_at)
                })
                .await
                .map_err(|error| error.at_stage(PipelineStage::Persisting))?;
            }
            RunKind::Full => {
                return Err(SyncError::new(
                    SyncErrorKind::Internal,
                    "full runs do not take the subset path",
                )
                .for_user(user));
            }
        }

        Ok(())
    }

    async fn fetch_full(
        &self,
        run_id: &str,
        adapter: &Arc<dyn PlatformAdapter>,
    ) -> Result<Snapshot, SyncError> {
        let courses = self.retry.run(|| adapter.courses()).await?;
        self.publish_count(run_id, courses.len(), "courses").await;

        let mut modules = Vec::new();
        for course in &courses {
            let fetched = self.retry.run(|| adapter.modules(&course.id)).await?;
            modules.extend(fetched);
        }
        self.publish_count(run_id, modules.len(), "modules").await;

        let module_surveys = self.retry.run(|| adapter.surveys()).await?;
        self.publish_count(run_id, module_surveys.len(), "surveys")
            .await;

        let mut grade_items = self.retry.run(|| adapter.grades()).await?;
        let quizzes = self.retry.run(|| adapter.quizzes()).await?;
        grade_items.extend(quizzes);
        self.publish_count(run_id, grade_items.len(), "grade items")
            .await;

        Ok(Snapshot {
            courses,
            modules,
            module_surveys,
            grade_items,
        })
    }

    async fn persist_records(&self, user: UserId, snapshot: &Snapshot) -> Result<(), SyncError> {
        let records = self.records.clone();
        let snapshot = snapshot.clone();
        run_blocking(move || {
            let seen_at = Utc::now();
            let courses = records.upsert_courses(user, &snapshot.courses, seen_at)?;
            let modules = records.upsert_modules(user, &snapshot.modules, &courses, seen_at)?;
            records.upsert_module_surveys(user, &snapshot.module_surveys, &modules, seen_at)?;
            records.upsert_grade_items(user, &snapshot.grade_items, &courses, seen_at)?;
            Ok(())
        })
        .await
    }

    async fn record_changes(
        &self,
        run_id: &str,
        user: UserId,
        changes: Vec<DiffEvent>,
    ) -> Result<usize, SyncError> {
        let mut created = 0;
        for change in changes {
            let payload = serde_json::to_value(&change).map_err(|error| {
                SyncError::new(SyncErrorKind::Internal, error.to_string()).for_user(user)
            })?;
            let audit = NewEventRecord {
                kind: change.kind(),
                source: "sync".to_string(),
                payload,
            };
            let events = self.events.clone();
            run_blocking(move || events.append_event(user, &audit)).await?;

            let Some(task) = task_for_event(&change) else {
                continue;
            };
            let tasks = self.tasks.clone();
            let inserted_task = task.clone();
            let inserted =
                run_blocking(move || tasks.create_task_if_absent(user, &inserted_task)).await?;
            if !inserted {
                continue;
            }
            created += 1;

            let audit = NewEventRecord {
                kind: EventKind::TaskCreated,
                source: "sync".to_string(),
                payload: serde_json::json!({
                    "title": task.title,
                    "category": task.category.as_str(),
                }),
            };
            let events = self.events.clone();
            run_blocking(move || events.append_event(user, &audit)).await?;

            let mut log = ProgressEvent::log(
                format!("Created task: {}", task.title),
                ProgressLevel::Info,
            );
            if let Some(url) = task
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("action_url"))
                .and_then(|value| value.as_str())
            {
                log = log.with_url(url);
            }
            self.stream.publish(run_id, log).await;
        }
        Ok(created)
    }

    async fn publish_count(&self, run_id: &str, count: usize, noun: &str) {
        self.stream
            .publish(
                run_id,
                ProgressEvent::log(format!("Fetched {count} {noun}."), ProgressLevel::Info),
            )
            .await;
    }

    async fn course_map(
        &self,
        user: UserId,
        adapter: &Arc<dyn PlatformAdapter>,
    ) -> Result<HashMap<String, StoredCourse>, SyncError> {
        let records = self.records.clone();
        let stored = run_blocking(move || records.list_courses(user)).await?;
        if !stored.is_empty() {
            return Ok(stored
                .into_iter()
                .map(|course| (course.external_id.clone(), course))
                .collect());
        }

        // Nothing merged yet; pull the course list first so child records
        // have parents to attach to.
        let courses = self
            .retry
            .run(|| adapter.courses())
            .await
            .map_err(|error| error.for_user(user).at_stage(PipelineStage::Fetching))?;
        let records = self.records.clone();
        run_blocking(move || records.upsert_courses(user, &courses, Utc::now()))
            .await
            .map_err(|error| error.at_stage(PipelineStage::Persisting))
    }

    async fn module_map(
        &self,
        user: UserId,
    ) -> Result<HashMap<(String, String), StoredModule>, SyncError> {
        let records = self.records.clone();
        let stored = run_blocking(move || records.list_modules(user)).await?;
        Ok(stored
            .into_iter()
            .map(|module| {
                (
                    (module.course_external_id.clone(), module.external_id.clone()),
                    module,
                )
            })
            .collect())
    }

    async fn unlock_credentials(
        &self,
        user: UserId,
        access: &VaultAccess,
    ) -> Result<PlatformCredentials, SyncError> {
        let vaults = self.vaults.clone();
        let vault = run_blocking(move || vaults.vault(user)).await?.ok_or_else(|| {
            SyncError::new(SyncErrorKind::Configuration, "user has no credential vault")
                .for_user(user)
        })?;

        match access {
            VaultAccess::Interactive { app_password } => {
                let password = app_password.clone();
                let kdf = self.kdf;
                run_blocking(move || open_interactive(&vault, &password, &kdf)).await
            }
            VaultAccess::Unattended => {
                let master = self.master_key.clone().ok_or_else(|| {
                    SyncError::new(
                        SyncErrorKind::Configuration,
                        "unattended run requested but no server master key is configured",
                    )
                    .for_user(user)
                })?;
                run_blocking(move || open_unattended(&vault, &master)).await
            }
        }
    }
}

/// Store and KDF calls are blocking; dispatch them off the async runtime.
pub(crate) async fn run_blocking<T, F>(operation: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|join_error| {
            SyncError::new(
                SyncErrorKind::Internal,
                format!("blocking task join failure: {join_error}"),
            )
        })?
}
