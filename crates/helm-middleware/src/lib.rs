//! `helm-middleware` – adapters to the outside world.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`OrchestratorClient`][orchestrator::OrchestratorClient]:
//!   the HTTP client for the remote actuator orchestrator (`/status`,
//!   `/telemetry`, `/execute_plan`, `/stop`) with per-call timeouts and
//!   correlation-id propagation.

pub mod orchestrator;

pub use orchestrator::{Executor, OrchestratorClient};
