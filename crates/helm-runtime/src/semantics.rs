//! Semantics resolution driver: cache → heuristic → optional service
//! refinement.
//!
//! The pure classification rules live in `helm-kernel`; this module layers
//! the manifest-hash-keyed disk cache and the bounded refinement pass on
//! top. An unchanged manifest is served entirely from cache.

use helm_kernel::{KNOWN_TAGS, infer_tags_heuristic};
use helm_memory::{SemanticsStore, manifest_digest};
use helm_types::{
    CommandHandle, HelmError, Manifest, SemanticsMap, SemanticsRecord, SemanticsSource,
};
use tracing::{debug, info, warn};

use crate::services::{ClassificationService, CommandProfile};

/// Refinement requests are bounded to this many commands.
pub const CLASSIFY_BATCH_LIMIT: usize = 60;

fn profile(handle: &CommandHandle<'_>) -> CommandProfile {
    CommandProfile {
        key: handle.key(),
        token: handle.command.token_upper(),
        description: handle.command.description.clone(),
        args: handle.command.args.clone(),
        synonyms: handle.command.synonyms.clone(),
    }
}

/// Classify every command of `manifest`.
///
/// Cached records (keyed by manifest content hash) are reused verbatim;
/// missing ones get the deterministic heuristic. When a classifier is
/// supplied, low-confidence/generic records are refined in one bounded
/// batch, with service results overwriting heuristic ones. The cache is
/// rewritten only when something changed.
///
/// # Errors
///
/// [`HelmError::Persistence`] when the refreshed cache cannot be written.
/// Classification-service failures are absorbed (heuristic results stand).
pub async fn resolve_semantics(
    manifest: &Manifest,
    store: &SemanticsStore,
    classifier: Option<&dyn ClassificationService>,
) -> Result<SemanticsMap, HelmError> {
    let hash = manifest_digest(manifest);
    let cached = store.load_records(&hash);

    let mut out = SemanticsMap::new();
    let mut dirty = false;
    for handle in manifest.commands() {
        let key = handle.key();
        match cached.get(&key) {
            Some(record) => {
                out.insert(key, record.clone());
            }
            None => {
                let (tags, confidence) = infer_tags_heuristic(handle.command);
                out.insert(
                    key,
                    SemanticsRecord {
                        tags,
                        confidence,
                        source: SemanticsSource::Heuristic,
                    },
                );
                dirty = true;
            }
        }
    }

    if let Some(classifier) = classifier {
        let weak: Vec<CommandProfile> = manifest
            .commands()
            .filter(|h| out.get(&h.key()).map(SemanticsRecord::is_weak).unwrap_or(false))
            .take(CLASSIFY_BATCH_LIMIT)
            .map(|h| profile(&h))
            .collect();
        if !weak.is_empty() {
            debug!(count = weak.len(), "refining weak command semantics");
            match classifier.classify(&weak).await {
                Ok(classified) => {
                    for cmd in classified {
                        if !out.contains_key(&cmd.key) {
                            continue;
                        }
                        let mut tags: Vec<String> = cmd
                            .tags
                            .into_iter()
                            .filter(|t| KNOWN_TAGS.contains(&t.as_str()))
                            .collect();
                        if tags.is_empty() {
                            tags.push("generic.action".to_string());
                        }
                        out.insert(
                            cmd.key,
                            SemanticsRecord {
                                tags,
                                confidence: cmd.confidence.clamp(0.0, 1.0),
                                source: SemanticsSource::Service,
                            },
                        );
                        dirty = true;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "semantics refinement failed; keeping heuristic results");
                }
            }
        }
    }

    if dirty {
        store.save_records(&hash, &out)?;
        info!(manifest = %hash, commands = out.len(), "semantics cache refreshed");
    } else {
        debug!(manifest = %hash, "semantics served entirely from cache");
    }
    Ok(out)
}
