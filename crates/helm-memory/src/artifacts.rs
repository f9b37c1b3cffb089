//! Per-attempt episode artifacts.
//!
//! Each attempt gets its own directory under the configured output root:
//!
//! ```text
//! <out_dir>/<attempt_id>/
//!   frames/frame_0.jpg … frame_N.jpg   (≤ 8 key frames, driver-encoded)
//!   steps.json                          (full step log)
//!   task_state.json                     (task-state snapshot at attempt end)
//! ```
//!
//! Artifacts are written once at attempt end and never mutated. Failures
//! propagate: silently losing attempt evidence would undermine the
//! adaptation loop.

use std::fs;
use std::path::{Path, PathBuf};

use helm_types::{HelmError, StepRecord, TaskState};
use serde::Serialize;
use tracing::info;

use crate::store::write_json_atomic;

/// At most this many frames are persisted per attempt.
pub const MAX_ARTIFACT_FRAMES: usize = 8;

#[derive(Serialize)]
struct StepsDoc<'a> {
    steps: &'a [StepRecord],
}

/// Write one attempt's evidence and return its directory.
pub fn write_attempt(
    out_dir: &Path,
    attempt_id: &str,
    frames: &[Vec<u8>],
    steps: &[StepRecord],
    task: &TaskState,
) -> Result<PathBuf, HelmError> {
    let base = out_dir.join(attempt_id);
    let frames_dir = base.join("frames");
    fs::create_dir_all(&frames_dir)
        .map_err(|e| HelmError::persistence(frames_dir.display(), e))?;

    for (idx, frame) in frames.iter().take(MAX_ARTIFACT_FRAMES).enumerate() {
        let path = frames_dir.join(format!("frame_{idx}.jpg"));
        fs::write(&path, frame).map_err(|e| HelmError::persistence(path.display(), e))?;
    }

    write_json_atomic(&base.join("steps.json"), &StepsDoc { steps })?;
    write_json_atomic(&base.join("task_state.json"), task)?;

    info!(attempt_id, dir = %base.display(), frames = frames.len().min(MAX_ARTIFACT_FRAMES),
        "attempt artifacts written");
    Ok(base)
}
