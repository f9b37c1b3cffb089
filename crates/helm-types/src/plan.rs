//! Executable plans: the strict vocabulary of actions the engine may send to
//! the remote executor.
//!
//! A valid executable plan is either `[STOP]` or `[RUN, STOP]` — the planner
//! and shield never emit an unterminated `RUN`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Argument values
// ────────────────────────────────────────────────────────────────────────────

/// A single positional command argument as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ArgValue {
    /// Numeric view of the value; booleans are not numbers, strings are
    /// parsed when they look numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Bool(_) => None,
            ArgValue::Int(i) => Some(*i as f64),
            ArgValue::Float(f) => Some(*f),
            ArgValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Plan steps
// ────────────────────────────────────────────────────────────────────────────

/// One step of an executable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum PlanStep {
    /// Halt all motion on the executor.
    #[serde(rename = "STOP")]
    Stop,
    /// Run one manifest command on the named node.
    #[serde(rename = "RUN")]
    Run {
        target: String,
        token: String,
        #[serde(default)]
        args: Vec<ArgValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<f64>,
    },
}

impl PlanStep {
    pub fn is_stop(&self) -> bool {
        matches!(self, PlanStep::Stop)
    }
}

/// The canonical do-nothing plan.
pub fn stop_plan() -> Vec<PlanStep> {
    vec![PlanStep::Stop]
}

// ────────────────────────────────────────────────────────────────────────────
// Shield decisions
// ────────────────────────────────────────────────────────────────────────────

/// The safety shield's verdict for one step: whether the planner was
/// overridden, why, and the replacement plan to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldDecision {
    pub overridden: bool,
    pub reason: String,
    pub plan: Vec<PlanStep>,
}
