//! The safety shield: a pure decision function evaluated before the planner
//! on every step.
//!
//! [`maybe_override`] inspects the tracker output and either vetoes the
//! planner with a safe recovery plan or returns `None` to let the step
//! proceed. It holds the only authority to replace a planned action.
//!
//! The steer-toward-home sign convention (subject right of home-center →
//! steer left) assumes a fixed camera/actuator orientation; verify against
//! the executor's left/right convention before trusting it on new hardware.

use std::collections::BTreeMap;

use helm_types::{
    ArgSpec, ArgType, ArgValue, BBox, CommandSpec, Manifest, PlanStep, ShieldDecision,
    TaskState, TrackerOutput, geometry::clamp, stop_plan,
};
use tracing::debug;

use crate::semantics::CapabilityMapping;

/// Floor for corrective-move durations, in milliseconds.
const MIN_CORRECTIVE_MS: f64 = 80.0;

/// Horizontal steering direction for corrective moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steer {
    Left,
    Right,
}

impl Steer {
    fn as_str(self) -> &'static str {
        match self {
            Steer::Left => "left",
            Steer::Right => "right",
        }
    }

    fn enum_code(self) -> &'static str {
        match self {
            Steer::Left => "L",
            Steer::Right => "R",
        }
    }

    fn sign(self) -> f64 {
        match self {
            Steer::Left => -1.0,
            Steer::Right => 1.0,
        }
    }
}

/// `true` iff the bbox sits fully inside the task's home region.
///
/// Used only by the reset-to-home phase, not by the per-step shield.
pub fn home_ok(bbox: Option<&BBox>, task: &TaskState) -> bool {
    match bbox {
        Some(b) => task.home_roi.contains(b),
        None => false,
    }
}

/// Return a shield override when the current observation is unsafe or
/// off-screen, otherwise `None` ("no override, proceed to planner").
pub fn maybe_override(
    tracker: &TrackerOutput,
    task: &TaskState,
    caps: &CapabilityMapping,
    manifest: &Manifest,
) -> Option<ShieldDecision> {
    let visible_min = task.safety.visible_conf_min;
    let margin_min = task.param("center_margin", 0.12);
    let max_step_ms = task.safety.max_step_ms;

    let bbox = match &tracker.bbox {
        Some(b) if tracker.visibility_confidence >= visible_min => *b,
        _ => {
            return Some(ShieldDecision {
                overridden: true,
                reason: "not_visible".to_string(),
                plan: stop_plan(),
            });
        }
    };

    if !task.camera_roi.contains(&bbox) {
        return Some(ShieldDecision {
            overridden: true,
            reason: "outside_roi".to_string(),
            plan: stop_plan(),
        });
    }

    if tracker.edge_margin < margin_min {
        let mobility = match &caps.mobility_target {
            Some(m) => m.as_str(),
            None => {
                return Some(ShieldDecision {
                    overridden: true,
                    reason: "edge_no_mobility".to_string(),
                    plan: stop_plan(),
                });
            }
        };

        // Steer back toward the home region's horizontal center.
        let (desired_x, _) = task.home_roi.center();
        let (cx, _) = bbox.center();
        let steer = if cx > desired_x { Steer::Left } else { Steer::Right };
        debug!(margin = tracker.edge_margin, steer = steer.as_str(), "subject near ROI edge");

        // Prefer strafe when available, otherwise turn.
        if let Some(token) = &caps.strafe_token {
            let cmd = match manifest.command_spec(mobility, token) {
                Some(c) => c,
                None => {
                    return Some(ShieldDecision {
                        overridden: true,
                        reason: "edge_strafe_missing_spec".to_string(),
                        plan: stop_plan(),
                    });
                }
            };
            return Some(corrective(
                mobility,
                token,
                cmd,
                task,
                steer,
                format!("edge_strafe_{}", steer.as_str()),
                task.param("strafe_duration_ms", 220.0),
                max_step_ms,
            ));
        }

        if let Some(token) = &caps.turn_token {
            let cmd = match manifest.command_spec(mobility, token) {
                Some(c) => c,
                None => {
                    return Some(ShieldDecision {
                        overridden: true,
                        reason: "edge_turn_missing_spec".to_string(),
                        plan: stop_plan(),
                    });
                }
            };
            return Some(corrective(
                mobility,
                token,
                cmd,
                task,
                steer,
                format!("edge_turn_{}", steer.as_str()),
                task.param("turn_duration_ms", 220.0),
                max_step_ms,
            ));
        }

        return Some(ShieldDecision {
            overridden: true,
            reason: "edge_no_motion_tokens".to_string(),
            plan: stop_plan(),
        });
    }

    None
}

#[allow(clippy::too_many_arguments)]
fn corrective(
    target: &str,
    token: &str,
    cmd: &CommandSpec,
    task: &TaskState,
    steer: Steer,
    reason: String,
    duration_ms: f64,
    max_step_ms: f64,
) -> ShieldDecision {
    let args = choose_arg_values(cmd, &task.policy_params, Some(steer));
    let duration = clamp(duration_ms, MIN_CORRECTIVE_MS, max_step_ms);
    ShieldDecision {
        overridden: true,
        reason,
        plan: vec![
            PlanStep::Run {
                target: target.to_string(),
                token: token.to_string(),
                args,
                duration_ms: Some(duration),
            },
            PlanStep::Stop,
        ],
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Argument synthesis
// ────────────────────────────────────────────────────────────────────────────

/// Synthesize safe argument values for a command from its declared spec and
/// the current policy parameters.
///
/// Speed-like numerics come from `default_speed`; angle-like numerics from
/// `default_turn_degrees`, signed by the steering hint; other numerics take
/// the declared midpoint. Enum strings honor an `L`/`R` steering hint when
/// the spec declares those values.
pub fn choose_arg_values(
    cmd: &CommandSpec,
    policy_params: &BTreeMap<String, f64>,
    hint: Option<Steer>,
) -> Vec<ArgValue> {
    cmd.args
        .iter()
        .map(|arg| choose_one(arg, policy_params, hint))
        .collect()
}

fn choose_one(arg: &ArgSpec, policy_params: &BTreeMap<String, f64>, hint: Option<Steer>) -> ArgValue {
    let name = arg.name.to_lowercase();
    let param = |key: &str, default: f64| policy_params.get(key).copied().unwrap_or(default);

    match arg.kind {
        ArgType::Int | ArgType::Float => {
            let value = if name.contains("speed") || name.contains("throttle") || name.contains("power")
            {
                let mut speed = param("default_speed", 0.5);
                if let (Some(min), Some(max)) = (arg.min, arg.max) {
                    speed = clamp(speed, min, max);
                }
                speed
            } else if name.contains("degree") || matches!(name.as_str(), "deg" | "degrees" | "angle")
            {
                let mag = param("default_turn_degrees", 12.0);
                let mut value = mag * hint.map(Steer::sign).unwrap_or(1.0);
                if let (Some(min), Some(max)) = (arg.min, arg.max) {
                    value = clamp(value, min, max);
                }
                value
            } else if let (Some(min), Some(max)) = (arg.min, arg.max) {
                (min + max) / 2.0
            } else {
                0.0
            };
            if arg.kind == ArgType::Int {
                ArgValue::Int(value as i64)
            } else {
                ArgValue::Float(value)
            }
        }
        ArgType::Bool => ArgValue::Bool(true),
        ArgType::String => {
            if arg.one_of.is_empty() {
                return ArgValue::Text("default".to_string());
            }
            if let Some(steer) = hint {
                let want = steer.enum_code();
                if arg.one_of.iter().any(|v| v == want) {
                    return ArgValue::Text(want.to_string());
                }
            }
            ArgValue::Text(arg.one_of[0].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::{SemanticsMap, classify_heuristic, infer_capabilities};
    use helm_types::Rect;
    use serde_json::json;

    fn manifest_with(commands: serde_json::Value) -> Manifest {
        Manifest::from_value(&json!({
            "nodes": [{"name": "base", "node_id": "base-1", "commands": commands}]
        }))
    }

    fn caps_for(manifest: &Manifest) -> CapabilityMapping {
        let semantics: SemanticsMap = classify_heuristic(manifest);
        infer_capabilities(manifest, &semantics)
    }

    fn visible_tracker(x: f64, margin: f64) -> TrackerOutput {
        TrackerOutput {
            bbox: BBox::clamped(x, 0.4, 0.1, 0.1),
            visibility_confidence: 0.8,
            edge_margin: margin,
            debug: Default::default(),
        }
    }

    fn strafe_manifest() -> Manifest {
        manifest_with(json!([
            {"token": "STRAFE", "args": [{"name": "dir", "type": "string", "enum": ["L", "R"]}]},
            {"token": "TURN", "args": [{"name": "degrees", "type": "int", "min": -90, "max": 90}]}
        ]))
    }

    #[test]
    fn missing_bbox_overrides_with_stop() {
        let manifest = strafe_manifest();
        let decision = maybe_override(
            &TrackerOutput::absent("no_motion_region"),
            &TaskState::default(),
            &caps_for(&manifest),
            &manifest,
        )
        .expect("must override");
        assert!(decision.overridden);
        assert_eq!(decision.reason, "not_visible");
        assert_eq!(decision.plan, stop_plan());
    }

    #[test]
    fn low_confidence_counts_as_not_visible() {
        let manifest = strafe_manifest();
        let mut tracker = visible_tracker(0.45, 0.3);
        tracker.visibility_confidence = 0.05; // below visible_conf_min 0.12
        let decision =
            maybe_override(&tracker, &TaskState::default(), &caps_for(&manifest), &manifest)
                .expect("must override");
        assert_eq!(decision.reason, "not_visible");
    }

    #[test]
    fn bbox_outside_camera_roi_stops() {
        let manifest = strafe_manifest();
        let mut task = TaskState::default();
        task.camera_roi = Rect {
            x: 0.25,
            y: 0.25,
            w: 0.5,
            h: 0.5,
        };
        // Visible but outside the ROI.
        let tracker = visible_tracker(0.05, 0.5);
        let decision =
            maybe_override(&tracker, &task, &caps_for(&manifest), &manifest).expect("must override");
        assert_eq!(decision.reason, "outside_roi");
        assert_eq!(decision.plan, stop_plan());
    }

    #[test]
    fn edge_prefers_strafe_and_terminates_with_stop() {
        let manifest = strafe_manifest();
        let tracker = visible_tracker(0.45, 0.01);
        let decision = maybe_override(
            &tracker,
            &TaskState::default(),
            &caps_for(&manifest),
            &manifest,
        )
        .expect("must override");
        assert!(decision.reason.starts_with("edge_strafe_"));
        assert_eq!(decision.plan.len(), 2);
        match &decision.plan[0] {
            PlanStep::Run {
                target,
                token,
                duration_ms,
                ..
            } => {
                assert_eq!(target, "base-1");
                assert_eq!(token, "STRAFE");
                let d = duration_ms.expect("corrective moves carry a duration");
                assert!((80.0..=800.0).contains(&d));
            }
            other => panic!("expected RUN, got {other:?}"),
        }
        assert!(decision.plan[1].is_stop());
    }

    #[test]
    fn edge_falls_back_to_turn_without_strafe() {
        let manifest = manifest_with(json!([
            {"token": "TURN", "args": [{"name": "degrees", "type": "int", "min": -90, "max": 90}]}
        ]));
        let tracker = visible_tracker(0.45, 0.01);
        let decision = maybe_override(
            &tracker,
            &TaskState::default(),
            &caps_for(&manifest),
            &manifest,
        )
        .expect("must override");
        assert!(decision.reason.starts_with("edge_turn_"));
        match &decision.plan[0] {
            PlanStep::Run { token, .. } => assert_eq!(token, "TURN"),
            other => panic!("expected RUN, got {other:?}"),
        }
        assert!(decision.plan[1].is_stop());
    }

    #[test]
    fn edge_with_no_motion_tokens_stops() {
        let manifest = manifest_with(json!([{"token": "FWD"}]));
        // FWD gives the node a mobility score but no turn/strafe token.
        let tracker = visible_tracker(0.45, 0.01);
        let decision = maybe_override(
            &tracker,
            &TaskState::default(),
            &caps_for(&manifest),
            &manifest,
        )
        .expect("must override");
        assert_eq!(decision.reason, "edge_no_motion_tokens");
        assert_eq!(decision.plan, stop_plan());
    }

    #[test]
    fn edge_without_mobility_stops() {
        let manifest = manifest_with(json!([{"token": "XYZZY"}]));
        let tracker = visible_tracker(0.45, 0.01);
        let decision = maybe_override(
            &tracker,
            &TaskState::default(),
            &caps_for(&manifest),
            &manifest,
        )
        .expect("must override");
        assert_eq!(decision.reason, "edge_no_mobility");
    }

    #[test]
    fn steer_direction_opposes_offset_from_home_center() {
        let manifest = strafe_manifest();
        let task = TaskState::default(); // home center x = 0.5
        let caps = caps_for(&manifest);

        // Subject right of home center → steer left.
        let decision =
            maybe_override(&visible_tracker(0.7, 0.01), &task, &caps, &manifest).unwrap();
        assert_eq!(decision.reason, "edge_strafe_left");
        match &decision.plan[0] {
            PlanStep::Run { args, .. } => assert_eq!(args[0], ArgValue::Text("L".into())),
            other => panic!("expected RUN, got {other:?}"),
        }

        // Subject left of home center → steer right.
        let decision =
            maybe_override(&visible_tracker(0.2, 0.01), &task, &caps, &manifest).unwrap();
        assert_eq!(decision.reason, "edge_strafe_right");
    }

    #[test]
    fn safe_observation_yields_no_override() {
        let manifest = strafe_manifest();
        let tracker = visible_tracker(0.45, 0.3);
        assert!(
            maybe_override(
                &tracker,
                &TaskState::default(),
                &caps_for(&manifest),
                &manifest
            )
            .is_none()
        );
    }

    #[test]
    fn home_ok_requires_full_containment() {
        let task = TaskState::default(); // home = (0.3, 0.25, 0.4, 0.5)
        let inside = BBox::clamped(0.4, 0.4, 0.1, 0.1).unwrap();
        let straddling = BBox::clamped(0.25, 0.4, 0.2, 0.1).unwrap();
        assert!(home_ok(Some(&inside), &task));
        assert!(!home_ok(Some(&straddling), &task));
        assert!(!home_ok(None, &task));
    }

    // ── choose_arg_values ────────────────────────────────────────────────────

    fn spec(name: &str, kind: ArgType) -> ArgSpec {
        ArgSpec {
            name: name.to_string(),
            kind,
            one_of: Vec::new(),
            min: None,
            max: None,
        }
    }

    #[test]
    fn speed_args_come_from_policy_and_respect_declared_bounds() {
        let mut cmd = CommandSpec {
            token: "FWD".into(),
            description: None,
            args: vec![ArgSpec {
                min: Some(0.0),
                max: Some(0.3),
                ..spec("speed", ArgType::Float)
            }],
            synonyms: Vec::new(),
            examples: Vec::new(),
        };
        let mut policy = BTreeMap::new();
        policy.insert("default_speed".to_string(), 0.5);
        let args = choose_arg_values(&cmd, &policy, None);
        assert_eq!(args, vec![ArgValue::Float(0.3)]);

        cmd.args[0].max = Some(1.0);
        let args = choose_arg_values(&cmd, &policy, None);
        assert_eq!(args, vec![ArgValue::Float(0.5)]);
    }

    #[test]
    fn degree_args_are_signed_by_the_steer_hint() {
        let cmd = CommandSpec {
            token: "TURN".into(),
            description: None,
            args: vec![ArgSpec {
                min: Some(-90.0),
                max: Some(90.0),
                ..spec("degrees", ArgType::Int)
            }],
            synonyms: Vec::new(),
            examples: Vec::new(),
        };
        let policy = BTreeMap::new();
        assert_eq!(
            choose_arg_values(&cmd, &policy, Some(Steer::Left)),
            vec![ArgValue::Int(-12)]
        );
        assert_eq!(
            choose_arg_values(&cmd, &policy, Some(Steer::Right)),
            vec![ArgValue::Int(12)]
        );
    }

    #[test]
    fn plain_numeric_args_default_to_midpoint_or_zero() {
        let cmd = CommandSpec {
            token: "SET".into(),
            description: None,
            args: vec![
                ArgSpec {
                    min: Some(2.0),
                    max: Some(6.0),
                    ..spec("level", ArgType::Float)
                },
                spec("offset", ArgType::Int),
            ],
            synonyms: Vec::new(),
            examples: Vec::new(),
        };
        let args = choose_arg_values(&cmd, &BTreeMap::new(), None);
        assert_eq!(args, vec![ArgValue::Float(4.0), ArgValue::Int(0)]);
    }

    #[test]
    fn bool_args_default_true_and_bare_strings_get_placeholder() {
        let cmd = CommandSpec {
            token: "CFG".into(),
            description: None,
            args: vec![spec("enabled", ArgType::Bool), spec("mode", ArgType::String)],
            synonyms: Vec::new(),
            examples: Vec::new(),
        };
        let args = choose_arg_values(&cmd, &BTreeMap::new(), None);
        assert_eq!(
            args,
            vec![ArgValue::Bool(true), ArgValue::Text("default".into())]
        );
    }

    #[test]
    fn enum_strings_honor_hint_then_first_option() {
        let cmd = CommandSpec {
            token: "STRAFE".into(),
            description: None,
            args: vec![ArgSpec {
                one_of: vec!["L".into(), "R".into()],
                ..spec("dir", ArgType::String)
            }],
            synonyms: Vec::new(),
            examples: Vec::new(),
        };
        assert_eq!(
            choose_arg_values(&cmd, &BTreeMap::new(), Some(Steer::Right)),
            vec![ArgValue::Text("R".into())]
        );
        assert_eq!(
            choose_arg_values(&cmd, &BTreeMap::new(), None),
            vec![ArgValue::Text("L".into())]
        );
    }
}
