//! Per-step observations and the records the attempt loop persists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::BBox;
use crate::plan::PlanStep;

// ────────────────────────────────────────────────────────────────────────────
// Tracker output
// ────────────────────────────────────────────────────────────────────────────

/// What perception knows about the subject for one frame.
///
/// Produced fresh every step; `bbox = None` is the canonical "nothing
/// detected" signal, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerOutput {
    pub bbox: Option<BBox>,
    /// Saturating detection-strength proxy in [0, 1]; not calibrated.
    pub visibility_confidence: f64,
    /// Smallest normalized distance from the bbox to any ROI edge, in [0, 1].
    pub edge_margin: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub debug: BTreeMap<String, String>,
}

impl TrackerOutput {
    /// The canonical "nothing found" output, tagged with a debug reason.
    pub fn absent(reason: &str) -> Self {
        let mut debug = BTreeMap::new();
        debug.insert("reason".to_string(), reason.to_string());
        Self {
            bbox: None,
            visibility_confidence: 0.0,
            edge_margin: 0.0,
            debug,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Step records
// ────────────────────────────────────────────────────────────────────────────

/// One executed step of an episode, as written into the attempt artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub tracker: TrackerOutput,
    pub plan: Vec<PlanStep>,
    pub reason: String,
    pub overridden: bool,
}
