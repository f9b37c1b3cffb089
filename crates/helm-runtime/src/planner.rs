//! Planner: asks the planning service for the next step, then validates,
//! normalizes, and sanitizes the answer.
//!
//! Only the *first* returned step is honored regardless of how many the
//! service produced. A RUN step gets its arguments sanitized against the
//! resolved command's argument spec and a trailing STOP appended — the
//! planner never returns a bare unterminated RUN. Every failure path
//! degrades to `[STOP]` with an explanatory reason.

use std::collections::BTreeMap;

use helm_types::{
    ArgSpec, ArgType, ArgValue, CapabilityMapping, HelmError, Manifest, PlanStep, SemanticsMap,
    TaskState, TrackerOutput, geometry::clamp, stop_plan,
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::services::{Observation, PlanRequest, PlanningService};

/// Upper bound on commands included in the compacted manifest view.
pub const MANIFEST_COMMAND_LIMIT: usize = 60;

/// Ask the planning service for the next step.
///
/// Returns `(plan, reason)`; the plan is ready to execute as-is.
pub async fn next_step(
    service: &dyn PlanningService,
    instruction: &str,
    manifest: &Manifest,
    semantics: &SemanticsMap,
    caps: &CapabilityMapping,
    tracker: &TrackerOutput,
    task: &TaskState,
) -> (Vec<PlanStep>, String) {
    let request = PlanRequest {
        instruction: instruction.to_string(),
        observation: Observation {
            visible_conf: tracker.visibility_confidence,
            edge_margin: tracker.edge_margin,
            bbox: tracker.bbox,
            mobility_target: caps.mobility_target.clone(),
            hint: "Stay within camera ROI; if uncertain or unsafe, output STOP.".to_string(),
        },
        manifest_compact: compact_manifest(manifest, semantics, MANIFEST_COMMAND_LIMIT),
        policy_params: task.policy_params.clone(),
        max_step_ms: task.safety.max_step_ms,
    };

    let reply = match service.propose(&request).await {
        Ok(reply) => reply,
        Err(HelmError::Configuration(details)) => {
            debug!(%details, "planner disabled");
            return (stop_plan(), "planner_disabled_missing_api_key".to_string());
        }
        Err(HelmError::Validation(details)) => {
            warn!(%details, "planner returned an invalid reply");
            return (stop_plan(), "planner_invalid_output".to_string());
        }
        Err(err) => {
            warn!(error = %err, "planner unreachable");
            return (stop_plan(), "planner_unreachable".to_string());
        }
    };

    // Normalization: honor only the first step.
    match reply.plan.into_iter().next() {
        None => (stop_plan(), "planner_empty_plan".to_string()),
        Some(PlanStep::Stop) => (stop_plan(), reply.reason),
        Some(PlanStep::Run {
            target,
            token,
            args,
            duration_ms,
        }) => {
            let token = token.trim().to_uppercase();
            let args = match manifest.command_spec(&target, &token) {
                Some(cmd) => sanitize_args(&args, &cmd.args, &task.policy_params),
                None => args,
            };
            let duration_ms = duration_ms.map(|d| clamp(d, 0.0, task.safety.max_step_ms));
            (
                vec![
                    PlanStep::Run {
                        target,
                        token,
                        args,
                        duration_ms,
                    },
                    PlanStep::Stop,
                ],
                reply.reason,
            )
        }
    }
}

/// Conservative fallback heuristic.
///
/// It recognizes no meaningful command set — it exists purely to bound the
/// damage of planner failure, not to attempt goal progress. Only an
/// explicit "stop" instruction gets a distinguished reason.
pub fn fallback_plan(instruction: &str) -> (Vec<PlanStep>, String) {
    if instruction.to_lowercase().contains("stop") {
        (stop_plan(), "fallback_stop".to_string())
    } else {
        (stop_plan(), "fallback_noop".to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Manifest compaction
// ────────────────────────────────────────────────────────────────────────────

/// Bounded view of the manifest for the planner prompt: node names/ids,
/// tokens, descriptions, arg specs, and inferred tags, truncated to
/// `limit` commands.
pub fn compact_manifest(manifest: &Manifest, semantics: &SemanticsMap, limit: usize) -> Value {
    let mut nodes_out = Vec::new();
    let mut command_count = 0usize;
    for node in &manifest.nodes {
        let mut commands = Vec::new();
        for cmd in &node.commands {
            if command_count >= limit {
                break;
            }
            let key = format!("{}:{}", node.node_id, cmd.token_upper());
            commands.push(json!({
                "token": cmd.token_upper(),
                "description": cmd.description,
                "args": cmd.args,
                "tags": semantics.get(&key).map(|r| r.tags.clone()),
            }));
            command_count += 1;
        }
        nodes_out.push(json!({
            "name": node.name,
            "node_id": node.node_id,
            "commands": commands,
        }));
        if command_count >= limit {
            break;
        }
    }
    json!({
        "daemon_version": manifest.daemon_version,
        "nodes": nodes_out,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Argument sanitization
// ────────────────────────────────────────────────────────────────────────────

/// Sanitize planner-proposed arguments against the command's declared spec.
///
/// Numeric values are clamped to declared min/max and additionally capped
/// by the speed / turn-magnitude policy parameters; enum strings fall back
/// to the first declared option; booleans are coerced with a `false`
/// default. Extra proposed arguments beyond the spec are dropped.
pub fn sanitize_args(
    args: &[ArgValue],
    specs: &[ArgSpec],
    policy_params: &BTreeMap<String, f64>,
) -> Vec<ArgValue> {
    let default_speed = policy_params.get("default_speed").copied().unwrap_or(0.5);
    let default_turn_deg = policy_params
        .get("default_turn_degrees")
        .copied()
        .unwrap_or(12.0);

    let mut out = Vec::new();
    for (idx, spec) in specs.iter().enumerate() {
        let raw = match args.get(idx) {
            Some(v) => v,
            None => break,
        };
        let name = spec.name.to_lowercase();

        match spec.kind {
            ArgType::Int | ArgType::Float => {
                let mut num = match raw {
                    ArgValue::Bool(_) => 0.0,
                    other => other.as_f64().unwrap_or(0.0),
                };
                if name.contains("speed") || name.contains("throttle") || name.contains("power") {
                    if let Some(min) = spec.min {
                        num = num.max(min);
                    }
                    num = num.min(default_speed);
                }
                if name.contains("degree") || matches!(name.as_str(), "deg" | "degrees" | "angle")
                {
                    num = clamp(num, -default_turn_deg.abs(), default_turn_deg.abs());
                }
                if let Some(min) = spec.min {
                    num = num.max(min);
                }
                if let Some(max) = spec.max {
                    num = num.min(max);
                }
                out.push(if spec.kind == ArgType::Int {
                    ArgValue::Int(num.round() as i64)
                } else {
                    ArgValue::Float(num)
                });
            }
            ArgType::Bool => {
                let value = match raw {
                    ArgValue::Bool(b) => *b,
                    ArgValue::Text(s) => matches!(s.to_lowercase().as_str(), "true" | "1"),
                    _ => false,
                };
                out.push(ArgValue::Bool(value));
            }
            ArgType::String => {
                let text = match raw {
                    ArgValue::Text(s) => s.clone(),
                    ArgValue::Int(i) => i.to_string(),
                    ArgValue::Float(f) => f.to_string(),
                    ArgValue::Bool(b) => b.to_string(),
                };
                if spec.one_of.is_empty() {
                    out.push(ArgValue::Text(text));
                } else if spec.one_of.iter().any(|v| *v == text) {
                    out.push(ArgValue::Text(text));
                } else {
                    out.push(ArgValue::Text(spec.one_of[0].clone()));
                }
            }
        }
    }
    out
}
