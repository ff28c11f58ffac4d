use crate::diff::DiffEvent;
use crate::models::{NewActionTask, TaskCategory, TaskSource};

/// Hard cap on task titles; longer titles are truncated with an ellipsis.
const TITLE_LIMIT: usize = 255;

/// Derive the action task a change event calls for, if any. Only new modules
/// and new surveys produce tasks; blocking transitions are audit-only.
pub fn task_for_event(event: &DiffEvent) -> Option<NewActionTask> {
    match event {
        DiffEvent::SurveyDetected {
            course_id,
            course,
            module_id,
            module,
            module_url,
        } => {
            let mut metadata = serde_json::json!({
                "course_id": course_id,
                "module_id": module_id,
            });
            if let Some(url) = module_url {
                metadata["action_url"] = serde_json::Value::String(url.clone());
                metadata["action_label"] = serde_json::Value::String("View survey".to_string());
            }
            Some(NewActionTask {
                title: safe_title(&format!("Submit survey - {course} - {module}")),
                source: TaskSource::Syllabus,
                category: TaskCategory::Study,
                metadata: Some(metadata),
            })
        }
        DiffEvent::ModuleDetected {
            course_id,
            course,
            module_id,
            module,
            ..
        } => Some(NewActionTask {
            title: safe_title(&format!("New module available - {course} - {module}")),
            source: TaskSource::Syllabus,
            category: TaskCategory::Study,
            metadata: Some(serde_json::json!({
                "course_id": course_id,
                "module_id": module_id,
            })),
        }),
        _ => None,
    }
}

/// Collapse runs of whitespace and keep the title within the storage limit.
pub fn safe_title(raw: &str) -> String {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= TITLE_LIMIT {
        return normalized;
    }
    let mut truncated: String = normalized.chars().take(TITLE_LIMIT - 3).collect();
    truncated.push_str("...");
    truncated
}
