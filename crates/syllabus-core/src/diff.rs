use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{EventKind, ModuleRecord, Snapshot};

/// A typed description of one change between two snapshots. Serialized with a
/// `type` tag so audit-log payloads stay self-describing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffEvent {
    CourseDetected {
        course_id: String,
        course: String,
    },
    ModuleDetected {
        course_id: String,
        course: String,
        module_id: String,
        module: String,
        module_url: Option<String>,
    },
    SurveyDetected {
        course_id: String,
        course: String,
        module_id: String,
        module: String,
        module_url: Option<String>,
    },
    BlockedDetected {
        course_id: String,
        course: String,
        module_id: String,
        module: String,
        reason: Option<String>,
        module_url: Option<String>,
    },
    ModuleUnlocked {
        course_id: String,
        course: String,
        module_id: String,
        module: String,
        reason: Option<String>,
        module_url: Option<String>,
    },
}

impl DiffEvent {
    /// Audit-log kind this event is recorded under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CourseDetected { .. } => EventKind::CourseDetected,
            Self::ModuleDetected { .. } => EventKind::ModuleDetected,
            Self::SurveyDetected { .. } => EventKind::SurveyDetected,
            Self::BlockedDetected { .. } => EventKind::BlockedDetected,
            Self::ModuleUnlocked { .. } => EventKind::ModuleUnlocked,
        }
    }
}

/// Compare two snapshots and emit change events in snapshot order: courses
/// first, then modules. `None` is treated as an empty previous snapshot, so
/// a first run emits a detection event for everything present.
pub fn diff_snapshots(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<DiffEvent> {
    let mut events = Vec::new();

    let empty = Snapshot::default();
    let old = previous.unwrap_or(&empty);

    let old_courses: HashMap<&str, _> = old.courses.iter().map(|c| (c.id.as_str(), c)).collect();
    let new_courses: HashMap<&str, _> =
        current.courses.iter().map(|c| (c.id.as_str(), c)).collect();
    let old_modules: HashMap<&str, &ModuleRecord> =
        old.modules.iter().map(|m| (m.id.as_str(), m)).collect();

    for course in &current.courses {
        if !old_courses.contains_key(course.id.as_str()) {
            events.push(DiffEvent::CourseDetected {
                course_id: course.id.clone(),
                course: course.name.clone(),
            });
        }
    }

    for module in &current.modules {
        let course_name = new_courses
            .get(module.course_id.as_str())
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let Some(old_module) = old_modules.get(module.id.as_str()) else {
            events.push(DiffEvent::ModuleDetected {
                course_id: module.course_id.clone(),
                course: course_name.clone(),
                module_id: module.id.clone(),
                module: module.title.clone(),
                module_url: module.url.clone(),
            });
            if module.has_survey {
                events.push(DiffEvent::SurveyDetected {
                    course_id: module.course_id.clone(),
                    course: course_name.clone(),
                    module_id: module.id.clone(),
                    module: module.title.clone(),
                    module_url: module.url.clone(),
                });
            }
            if module.blocked {
                events.push(DiffEvent::BlockedDetected {
                    course_id: module.course_id.clone(),
                    course: course_name,
                    module_id: module.id.clone(),
                    module: module.title.clone(),
                    reason: module.block_reason.clone(),
                    module_url: module.url.clone(),
                });
            }
            continue;
        };

        if !old_module.has_survey && module.has_survey {
            events.push(DiffEvent::SurveyDetected {
                course_id: module.course_id.clone(),
                course: course_name.clone(),
                module_id: module.id.clone(),
                module: module.title.clone(),
                module_url: module.url.clone(),
            });
        }

        if old_module.blocked != module.blocked {
            let event = if module.blocked {
                DiffEvent::BlockedDetected {
                    course_id: module.course_id.clone(),
                    course: course_name,
                    module_id: module.id.clone(),
                    module: module.title.clone(),
                    reason: module.block_reason.clone(),
                    module_url: module.url.clone(),
                }
            } else {
                DiffEvent::ModuleUnlocked {
                    course_id: module.course_id.clone(),
                    course: course_name,
                    module_id: module.id.clone(),
                    module: module.title.clone(),
                    reason: module.block_reason.clone(),
                    module_url: module.url.clone(),
                }
            };
            events.push(event);
        }
    }

    events
}
