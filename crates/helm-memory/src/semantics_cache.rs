//! On-disk semantics cache, keyed by manifest content hash.
//!
//! Unchanged manifests skip re-classification entirely: the whole record
//! set for a manifest hash is loaded in one step. A version mismatch
//! invalidates the entire cache (fresh start), never a partial migration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use helm_types::{HelmError, Manifest, SemanticsMap, SemanticsRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::{read_json_lenient, write_json_atomic};

pub const SEMANTICS_CACHE_VERSION: u32 = 1;

/// Stable content hash of a manifest, used as the cache key.
pub fn manifest_digest(manifest: &Manifest) -> String {
    // Typed manifests serialize with a fixed field order, so the JSON text
    // is canonical.
    let raw = serde_json::to_string(manifest).unwrap_or_default();
    let digest = Sha256::digest(raw.as_bytes());
    hex_prefix(&digest, 16)
}

pub(crate) fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out.truncate(chars);
    out
}

// ────────────────────────────────────────────────────────────────────────────
// File shape
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCommand {
    #[serde(flatten)]
    record: SemanticsRecord,
    updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ManifestEntry {
    commands: BTreeMap<String, CachedCommand>,
    updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SemanticsCacheFile {
    version: u32,
    by_manifest: BTreeMap<String, ManifestEntry>,
}

impl Default for SemanticsCacheFile {
    fn default() -> Self {
        Self {
            version: SEMANTICS_CACHE_VERSION,
            by_manifest: BTreeMap::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────

/// Disk-backed semantics cache. Single-writer only.
pub struct SemanticsStore {
    path: PathBuf,
}

impl SemanticsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_file(&self) -> SemanticsCacheFile {
        match read_json_lenient::<SemanticsCacheFile>(&self.path) {
            Some(file) if file.version == SEMANTICS_CACHE_VERSION => file,
            Some(file) => {
                debug!(found = file.version, expected = SEMANTICS_CACHE_VERSION,
                    "semantics cache version mismatch; starting fresh");
                SemanticsCacheFile::default()
            }
            None => SemanticsCacheFile::default(),
        }
    }

    /// Records cached for one manifest hash; empty when unknown.
    pub fn load_records(&self, manifest_hash: &str) -> SemanticsMap {
        self.load_file()
            .by_manifest
            .get(manifest_hash)
            .map(|entry| {
                entry
                    .commands
                    .iter()
                    .map(|(key, cached)| (key.clone(), cached.record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the cached record set for one manifest hash.
    pub fn save_records(
        &self,
        manifest_hash: &str,
        records: &SemanticsMap,
    ) -> Result<(), HelmError> {
        let now = Utc::now().to_rfc3339();
        let mut file = self.load_file();
        let entry = file.by_manifest.entry(manifest_hash.to_string()).or_default();
        entry.commands = records
            .iter()
            .map(|(key, record)| {
                (
                    key.clone(),
                    CachedCommand {
                        record: record.clone(),
                        updated_at: now.clone(),
                    },
                )
            })
            .collect();
        entry.updated_at = now;
        file.version = SEMANTICS_CACHE_VERSION;
        write_json_atomic(&self.path, &file)
    }
}
