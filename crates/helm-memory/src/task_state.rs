//! Task-state file persistence.
//!
//! The file is a JSON object with the fields of
//! [`TaskState`][helm_types::TaskState]. Loading merges the file onto the
//! defaults: unknown policy parameters are added, known ones overridden,
//! malformed regions fall back to their defaults, and non-numeric policy
//! values are dropped. Saving is atomic (temp file + rename).

use std::fs;
use std::path::Path;

use helm_types::{HelmError, ParamBounds, Rect, TaskState};
use serde_json::Value;
use tracing::warn;

use crate::store::write_json_atomic;

/// Load a task state, merging the file's fields onto [`TaskState::default`].
///
/// # Errors
///
/// [`HelmError::Persistence`] when the file cannot be read,
/// [`HelmError::Validation`] when it is not a JSON object.
pub fn load_task_state(path: &Path) -> Result<TaskState, HelmError> {
    let raw = fs::read_to_string(path).map_err(|e| HelmError::persistence(path.display(), e))?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| HelmError::Validation(format!("task state at {}: {e}", path.display())))?;
    let obj = value.as_object().ok_or_else(|| {
        HelmError::Validation(format!("task state at {} must be a JSON object", path.display()))
    })?;

    let mut task = TaskState::default();
    if let Some(id) = obj.get("task_id").and_then(|v| v.as_str()) {
        if !id.trim().is_empty() {
            task.task_id = id.to_string();
        }
    }
    if let Some(instruction) = obj.get("instruction").and_then(|v| v.as_str()) {
        task.instruction = instruction.to_string();
    }
    task.camera_roi = Rect::from_value_or(
        obj.get("camera_roi").unwrap_or(&Value::Null),
        task.camera_roi,
    );
    task.home_roi =
        Rect::from_value_or(obj.get("home_roi").unwrap_or(&Value::Null), task.home_roi);

    if let Some(safety) = obj.get("safety").filter(|v| v.is_object()) {
        match serde_json::from_value(safety.clone()) {
            Ok(limits) => task.safety = limits,
            Err(e) => warn!(error = %e, "ignoring malformed safety block"),
        }
    }

    if let Some(params) = obj.get("policy_params").and_then(|v| v.as_object()) {
        for (key, raw) in params {
            // `as_f64` is None for booleans and strings.
            if let Some(v) = raw.as_f64() {
                task.policy_params.insert(key.clone(), v);
            }
        }
    }

    if let Some(bounds) = obj.get("policy_param_bounds").and_then(|v| v.as_object()) {
        for (key, raw) in bounds {
            match serde_json::from_value::<ParamBounds>(raw.clone()) {
                Ok(b) => {
                    task.policy_param_bounds.insert(key.clone(), b);
                }
                Err(e) => warn!(key, error = %e, "ignoring malformed parameter bounds"),
            }
        }
    }

    Ok(task)
}

/// Persist the task state atomically.
pub fn save_task_state(path: &Path, task: &TaskState) -> Result<(), HelmError> {
    write_json_atomic(path, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &tempfile::TempDir, value: &Value) -> std::path::PathBuf {
        let path = dir.path().join("task.json");
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn load_merges_onto_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &json!({
                "task_id": "follow-line",
                "instruction": "drive a square",
                "policy_params": {"default_speed": 0.7, "extra": 1.5, "bogus": "x"},
                "safety": {"max_step_ms": 500}
            }),
        );
        let task = load_task_state(&path).unwrap();
        assert_eq!(task.task_id, "follow-line");
        assert_eq!(task.instruction, "drive a square");
        assert_eq!(task.param("default_speed", 0.0), 0.7);
        // Default params survive a partial override.
        assert_eq!(task.param("center_margin", 0.0), 0.12);
        assert_eq!(task.param("extra", 0.0), 1.5);
        assert!(!task.policy_params.contains_key("bogus"));
        assert_eq!(task.safety.max_step_ms, 500.0);
        // Unmentioned safety fields keep their defaults.
        assert_eq!(task.safety.visible_conf_min, 0.12);
    }

    #[test]
    fn malformed_rois_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!({"camera_roi": "everything", "home_roi": {"x": 2}}));
        let task = load_task_state(&path).unwrap();
        assert_eq!(task.camera_roi, TaskState::default().camera_roi);
        assert_eq!(task.home_roi, TaskState::default().home_roi);
    }

    #[test]
    fn bounds_are_loaded_and_bad_entries_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &json!({
                "policy_param_bounds": {
                    "default_speed": {"min": 0.1, "max": 0.9},
                    "broken": {"min": "no"}
                }
            }),
        );
        let task = load_task_state(&path).unwrap();
        assert_eq!(
            task.policy_param_bounds.get("default_speed"),
            Some(&ParamBounds { min: 0.1, max: 0.9 })
        );
        assert!(!task.policy_param_bounds.contains_key("broken"));
    }

    #[test]
    fn non_object_file_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!([1, 2, 3]));
        assert!(matches!(
            load_task_state(&path),
            Err(HelmError::Validation(_))
        ));
    }

    #[test]
    fn missing_file_is_a_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_task_state(&dir.path().join("absent.json")),
            Err(HelmError::Persistence { .. })
        ));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        let mut task = TaskState::default();
        task.instruction = "spin in place".to_string();
        task.policy_params.insert("default_speed".into(), 0.33);
        save_task_state(&path, &task).unwrap();
        let back = load_task_state(&path).unwrap();
        assert_eq!(back.instruction, "spin in place");
        assert_eq!(back.param("default_speed", 0.0), 0.33);
    }
}
