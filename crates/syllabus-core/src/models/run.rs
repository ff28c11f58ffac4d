use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which slice of the platform a run synchronizes. `Full` is the only kind
/// that diffs, replaces the snapshot, and generates tasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RunKind {
    Full,
    Courses,
    Modules,
    Surveys,
    Grades,
    Quizzes,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Courses => "courses",
            Self::Modules => "modules",
            Self::Surveys => "surveys",
            Self::Grades => "grades",
            Self::Quizzes => "quizzes",
        }
    }
}

impl FromStr for RunKind {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "courses" => Ok(Self::Courses),
            "modules" => Ok(Self::Modules),
            "surveys" => Ok(Self::Surveys),
            "grades" => Ok(Self::Grades),
            "quizzes" => Ok(Self::Quizzes),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PipelineStage {
    Started,
    Fetching,
    Diffing,
    Persisting,
    GeneratingTasks,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Persisting => "persisting",
            Self::GeneratingTasks => "generating_tasks",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}
