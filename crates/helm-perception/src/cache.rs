//! Time-bounded perception fallback cache.
//!
//! Motion-only detection is blind to stationary subjects, so when the
//! tracker finds nothing the attempt loop may ask an external vision
//! service instead. [`PerceptionCache`] memoizes that call: a fresh entry
//! with a bounding box is returned verbatim, which bounds the fallback-call
//! frequency to roughly once per freshness window regardless of step rate.

use async_trait::async_trait;
use helm_types::{HelmError, Rect, TrackerOutput};
use tracing::{debug, warn};

/// Default freshness window for cached fallback results.
pub const DEFAULT_MAX_AGE_MS: i64 = 900;

/// External vision capability: locate the controlled device in an encoded
/// camera frame.
///
/// One real (LLM-backed) implementation lives in the runtime crate;
/// deterministic stubs implement this for tests.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn locate(
        &self,
        frame_encoded: &[u8],
        roi: &Rect,
        hint: &str,
    ) -> Result<TrackerOutput, HelmError>;
}

/// One memoized fallback result.
#[derive(Debug, Clone)]
pub struct CachedPerception {
    pub ts_ms: i64,
    pub out: TrackerOutput,
}

/// Owns the fallback memoization state. Entries are replaced whole, never
/// mutated in place.
pub struct PerceptionCache {
    max_age_ms: i64,
    entry: Option<CachedPerception>,
}

impl Default for PerceptionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_MS)
    }
}

impl PerceptionCache {
    pub fn new(max_age_ms: i64) -> Self {
        Self {
            max_age_ms,
            entry: None,
        }
    }

    /// Resolve a fallback observation for the current frame.
    ///
    /// Returns the cached output when it is fresh (age ≤ the configured
    /// window) *and* carries a bounding box; otherwise invokes `vision`
    /// exactly once and replaces the cache entry with the result.
    ///
    /// Service failures degrade to an absent [`TrackerOutput`]: a missing
    /// API key yields reason `missing_api_key`, any transport or validation
    /// failure yields `vision_unavailable`. The fallback never errors the
    /// step.
    pub async fn resolve(
        &mut self,
        vision: &dyn VisionService,
        frame_encoded: &[u8],
        roi: &Rect,
        hint: &str,
        now_ms: i64,
    ) -> TrackerOutput {
        if let Some(entry) = &self.entry {
            if now_ms - entry.ts_ms <= self.max_age_ms && entry.out.bbox.is_some() {
                debug!(age_ms = now_ms - entry.ts_ms, "perception fallback served from cache");
                return entry.out.clone();
            }
        }

        let out = match vision.locate(frame_encoded, roi, hint).await {
            Ok(out) => out,
            Err(HelmError::Configuration(details)) => {
                debug!(%details, "vision fallback disabled");
                TrackerOutput::absent("missing_api_key")
            }
            Err(err) => {
                warn!(error = %err, "vision fallback failed; treating subject as absent");
                TrackerOutput::absent("vision_unavailable")
            }
        };
        self.entry = Some(CachedPerception {
            ts_ms: now_ms,
            out: out.clone(),
        });
        out
    }
}
