//! Content-addressed judge cache.
//!
//! Identical (instruction, frame-set) pairs must never re-invoke the
//! external judging service, so verdicts are stored under a digest of the
//! instruction text plus a bounded prefix of each frame's encoded bytes and
//! its total length. Versioned; a version mismatch means a fresh start.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use helm_types::{HelmError, JudgeResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::semantics_cache::hex_prefix;
use crate::store::{read_json_lenient, write_json_atomic};

pub const JUDGE_CACHE_VERSION: u32 = 1;

/// How many leading bytes of each frame participate in the digest.
const DIGEST_PREFIX_BYTES: usize = 2048;

/// Cache key for one (instruction, frame-set) pair.
pub fn judge_digest(instruction: &str, frames: &[Vec<u8>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instruction.trim().as_bytes());
    for frame in frames {
        hasher.update(&frame[..frame.len().min(DIGEST_PREFIX_BYTES)]);
        hasher.update(frame.len().to_string().as_bytes());
    }
    hex_prefix(&hasher.finalize(), 20)
}

// ────────────────────────────────────────────────────────────────────────────
// File shape
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JudgeCacheEntry {
    ts: String,
    #[serde(flatten)]
    result: JudgeResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JudgeCacheFile {
    version: u32,
    entries: BTreeMap<String, JudgeCacheEntry>,
}

impl Default for JudgeCacheFile {
    fn default() -> Self {
        Self {
            version: JUDGE_CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

/// Disk-backed judge verdict cache. Single-writer only.
pub struct JudgeStore {
    path: PathBuf,
}

impl JudgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_file(&self) -> JudgeCacheFile {
        match read_json_lenient::<JudgeCacheFile>(&self.path) {
            Some(file) if file.version == JUDGE_CACHE_VERSION => file,
            Some(file) => {
                debug!(found = file.version, expected = JUDGE_CACHE_VERSION,
                    "judge cache version mismatch; starting fresh");
                JudgeCacheFile::default()
            }
            None => JudgeCacheFile::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<JudgeResult> {
        self.load_file()
            .entries
            .get(key)
            .map(|entry| entry.result.clone())
    }

    pub fn put(&self, key: &str, result: &JudgeResult) -> Result<(), HelmError> {
        let mut file = self.load_file();
        file.entries.insert(
            key.to_string(),
            JudgeCacheEntry {
                ts: Utc::now().to_rfc3339(),
                result: result.clone(),
            },
        );
        file.version = JUDGE_CACHE_VERSION;
        write_json_atomic(&self.path, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::{FixProposal, Verdict};

    fn verdict() -> JudgeResult {
        JudgeResult {
            verdict: Verdict::Failure,
            score: 0.3,
            confidence: 0.7,
            failure_modes: vec!["undershot_turn".into()],
            what_went_wrong: "stopped before completing the square".into(),
            fix_proposal: FixProposal::default(),
        }
    }

    #[test]
    fn digest_depends_on_instruction_and_frame_bytes() {
        let frames = vec![vec![1u8; 100], vec![2u8; 200]];
        let a = judge_digest("drive a square", &frames);
        let b = judge_digest("drive a square", &frames);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);

        assert_ne!(a, judge_digest("drive a circle", &frames));
        let other_frames = vec![vec![9u8; 100], vec![2u8; 200]];
        assert_ne!(a, judge_digest("drive a square", &other_frames));
    }

    #[test]
    fn digest_sees_length_changes_beyond_the_prefix() {
        // Two frames identical in their first 2048 bytes but different in
        // total length must produce different keys.
        let short = vec![vec![7u8; 3000]];
        let long = vec![vec![7u8; 4000]];
        assert_ne!(
            judge_digest("task", &short),
            judge_digest("task", &long)
        );
    }

    #[test]
    fn digest_trims_instruction_whitespace() {
        let frames = vec![vec![1u8; 10]];
        assert_eq!(
            judge_digest("  task  ", &frames),
            judge_digest("task", &frames)
        );
    }

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JudgeStore::new(dir.path().join("judge_cache.json"));
        store.put("abc", &verdict()).unwrap();
        assert_eq!(store.get("abc"), Some(verdict()));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn version_mismatch_drops_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge_cache.json");
        let store = JudgeStore::new(&path);
        store.put("abc", &verdict()).unwrap();

        // Bump the version on disk; the store must start fresh.
        let mut raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        raw["version"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();
        assert_eq!(store.get("abc"), None);
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge_cache.json");
        std::fs::write(&path, "not json at all").unwrap();
        let store = JudgeStore::new(&path);
        assert_eq!(store.get("abc"), None);
        store.put("abc", &verdict()).unwrap();
        assert!(store.get("abc").is_some());
    }
}
