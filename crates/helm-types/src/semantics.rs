//! Command semantics records and the derived capability mapping.
//!
//! The classification *logic* lives in `helm-kernel`; these are the data
//! shapes it produces, shared here so the persistence layer can cache them
//! without depending on the rules engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a semantics record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticsSource {
    Heuristic,
    Service,
    Cache,
}

/// Tags and confidence for one command, keyed by `node_id:TOKEN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticsRecord {
    pub tags: Vec<String>,
    pub confidence: f64,
    pub source: SemanticsSource,
}

impl SemanticsRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// `true` when this record should be offered to the refinement pass.
    pub fn is_weak(&self) -> bool {
        self.has_tag("generic.action") || self.confidence < 0.55
    }
}

/// Semantics for a whole manifest.
pub type SemanticsMap = BTreeMap<String, SemanticsRecord>;

/// Derived, read-only snapshot mapping abstract actions to concrete
/// (node, token) pairs.
///
/// Unset fields mean "action unavailable" — callers must treat that as a
/// normal condition, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMapping {
    pub mobility_target: Option<String>,
    pub fwd_token: Option<String>,
    pub bwd_token: Option<String>,
    pub turn_token: Option<String>,
    pub strafe_token: Option<String>,
    pub grip_target: Option<String>,
    pub grip_token: Option<String>,
    pub estop_target: Option<String>,
    pub estop_token: Option<String>,
}
