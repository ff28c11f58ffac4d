pub mod course;
pub mod credentials;
pub mod error;
pub mod event_log;
pub mod grade_item;
pub mod module;
pub mod run;
pub mod snapshot;
pub mod survey;
pub mod task;

pub use course::{CourseRecord, StoredCourse};
pub use credentials::PlatformCredentials;
pub use error::{SyncError, SyncErrorKind};
pub use event_log::{EventKind, EventRecord, NewEventRecord};
pub use grade_item::{GradeItemRecord, StoredGradeItem};
pub use module::{ModuleRecord, StoredModule};
pub use run::{PipelineStage, RunKind, UserId};
pub use snapshot::{Snapshot, StoredSnapshot};
pub use survey::{StoredSurvey, SurveyRecord, SurveySubmission};
pub use task::{ActionTask, NewActionTask, TaskCategory, TaskSource};
