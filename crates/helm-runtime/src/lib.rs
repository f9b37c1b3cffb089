//! `helm-runtime` – the decision engine.
//!
//! Everything that thinks lives here, wired around the pure rules in
//! `helm-kernel` and the persistence in `helm-memory`.
//!
//! # Modules
//!
//! - [`llm`] – [`LlmClient`][llm::LlmClient]: the one structured-output
//!   completion request shape (system text + user text/images + strict
//!   JSON schema) shared by every LLM-backed capability.
//! - [`services`] – the capability interfaces
//!   ([`PlanningService`][services::PlanningService],
//!   [`JudgingService`][services::JudgingService],
//!   [`ClassificationService`][services::ClassificationService]) and their
//!   LLM-backed implementations, plus the vision fallback implementing
//!   [`VisionService`][helm_perception::VisionService].
//! - [`planner`] – next-step planning with validation, normalization, and
//!   argument sanitization; degrades to `[STOP]` on every failure path.
//! - [`judge`] – [`EpisodeJudge`][judge::EpisodeJudge]: content-addressed
//!   caching around the judging service.
//! - [`semantics`] – cache → heuristic → refinement semantics resolution.
//! - [`explore`] – bounded multiplicative parameter perturbation.
//! - [`controller`] – [`AttemptLoop`][controller::AttemptLoop]: the
//!   reset → rollout → persist → judge → adapt cycle.
//! - [`telemetry`] – tracing subscriber + optional OTLP export.

pub mod controller;
pub mod explore;
pub mod judge;
pub mod llm;
pub mod planner;
pub mod semantics;
pub mod services;
pub mod telemetry;

pub use controller::{AttemptLoop, LoopConfig, RunOutcome};
pub use explore::auto_explore;
pub use judge::EpisodeJudge;
pub use llm::{DEFAULT_LLM_BASE_URL, LlmClient, StructuredRequest, UserPart};
pub use planner::{fallback_plan, next_step};
pub use semantics::resolve_semantics;
pub use services::{
    ClassificationService, JudgingService, LlmClassifier, LlmJudge, LlmPlanner, LlmVision,
    PlanningService,
};
pub use telemetry::{TracerProviderGuard, init_tracing};

// Re-export the shield so orchestration code can hold the safety layer
// without an explicit dependency on helm-kernel.
pub use helm_kernel::{home_ok, maybe_override};
