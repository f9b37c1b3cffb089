//! `helm-memory` – on-disk persistence for the autonomy loop.
//!
//! Every store in this crate is a JSON document written with the
//! temp-file-then-atomic-rename pattern and is **single-writer only**:
//! concurrent multi-process writers are last-writer-wins.
//!
//! # Modules
//!
//! - [`store`] – the shared atomic-write and lenient-read helpers.
//! - [`task_state`] – the task-state file (merged onto defaults on load).
//! - [`semantics_cache`] – [`SemanticsStore`][semantics_cache::SemanticsStore]:
//!   classified command semantics keyed by manifest content hash.
//! - [`judge_cache`] – [`JudgeStore`][judge_cache::JudgeStore]:
//!   content-addressed judge verdicts.
//! - [`artifacts`] – per-attempt episode evidence (frames, step log,
//!   task-state snapshot).

pub mod artifacts;
pub mod judge_cache;
pub mod semantics_cache;
pub mod store;
pub mod task_state;

pub use artifacts::{MAX_ARTIFACT_FRAMES, write_attempt};
pub use judge_cache::{JUDGE_CACHE_VERSION, JudgeStore, judge_digest};
pub use semantics_cache::{SEMANTICS_CACHE_VERSION, SemanticsStore, manifest_digest};
pub use store::write_json_atomic;
pub use task_state::{load_task_state, save_task_state};
