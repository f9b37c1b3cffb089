//! `helm-types` – shared data model for the helm autonomy engine.
//!
//! # Modules
//!
//! - [`geometry`] – normalized [`Rect`] regions and detection [`BBox`]es.
//! - [`plan`] – the STOP/RUN plan vocabulary sent to the remote executor,
//!   and [`ShieldDecision`].
//! - [`observation`] – [`TrackerOutput`] perception snapshots and the
//!   [`StepRecord`]s persisted per attempt.
//! - [`manifest`] – typed, boundary-validated view of the executor's
//!   command manifest.
//! - [`task`] – [`TaskState`] with safety limits, policy parameters and the
//!   constrained patch protocol.
//! - [`semantics`] – [`SemanticsRecord`] classification results and the
//!   derived [`CapabilityMapping`].
//! - [`judge`] – [`JudgeResult`] attempt evaluations.
//!
//! The crate also defines [`HelmError`], the process-wide error taxonomy:
//! transport, validation, configuration, persistence, and hardware
//! failures each get a distinct variant so degraded-path handling is an
//! explicit branch rather than a catch-all.

use thiserror::Error;

pub mod geometry;
pub mod judge;
pub mod manifest;
pub mod observation;
pub mod plan;
pub mod semantics;
pub mod task;

pub use geometry::{BBox, Rect};
pub use judge::{FixProposal, JudgeResult, Verdict};
pub use manifest::{ArgSpec, ArgType, CommandHandle, CommandSpec, Manifest, NodeSpec};
pub use observation::{StepRecord, TrackerOutput};
pub use plan::{ArgValue, PlanStep, ShieldDecision, stop_plan};
pub use semantics::{CapabilityMapping, SemanticsMap, SemanticsRecord, SemanticsSource};
pub use task::{MAX_PATCH_KEYS, ParamBounds, SafetyLimits, TaskState};

/// Global error type spanning remote-executor transport, LLM-service
/// response validation, startup configuration, artifact persistence, and
/// camera hardware failures.
#[derive(Error, Debug)]
pub enum HelmError {
    #[error("transport failure talking to {endpoint}: {details}")]
    Transport { endpoint: String, details: String },

    #[error("response validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("persistence failure at {path}: {details}")]
    Persistence { path: String, details: String },

    #[error("hardware fault on {component}: {details}")]
    Hardware { component: String, details: String },
}

impl HelmError {
    /// Shorthand for a transport failure on a named endpoint.
    pub fn transport(endpoint: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            details: details.to_string(),
        }
    }

    /// Shorthand for a persistence failure at a path.
    pub fn persistence(path: impl std::fmt::Display, details: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.to_string(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_endpoint() {
        let err = HelmError::transport("/execute_plan", "connection refused");
        assert!(err.to_string().contains("/execute_plan"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn error_display_names_path() {
        let err = HelmError::persistence("/tmp/helm/steps.json", "disk full");
        assert!(err.to_string().contains("steps.json"));
    }

    #[test]
    fn validation_and_configuration_variants_format() {
        assert!(
            HelmError::Validation("bad plan shape".into())
                .to_string()
                .contains("bad plan shape")
        );
        assert!(
            HelmError::Configuration("instruction is required".into())
                .to_string()
                .contains("instruction")
        );
    }
}
