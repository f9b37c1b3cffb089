//! Task state: the instruction, regions, safety limits, and the numeric
//! policy parameters steered by judge feedback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::{Rect, clamp};

/// Patches carrying more than this many parameter keys are rejected whole.
pub const MAX_PATCH_KEYS: usize = 32;

/// Generic clamp applied to parameters without declared bounds.
const GENERIC_PARAM_LIMIT: f64 = 1e6;

// ────────────────────────────────────────────────────────────────────────────
// Safety limits
// ────────────────────────────────────────────────────────────────────────────

/// Hard safety limits for one task. Every field has a conservative default
/// so a partial task file still yields a fully-bounded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Longest duration a single RUN step may request, in milliseconds.
    #[serde(default = "default_max_step_ms")]
    pub max_step_ms: f64,
    /// Wall-clock budget for one episode, in seconds.
    #[serde(default = "default_max_episode_s")]
    pub max_episode_s: f64,
    /// Visibility confidence below which the shield stops everything.
    #[serde(default = "default_visible_conf_min")]
    pub visible_conf_min: f64,
    #[serde(default = "default_stop_every_steps")]
    pub stop_every_steps: u32,
    /// Seconds the subject may stay lost before a stop is forced.
    #[serde(default = "default_lost_visible_stop_s")]
    pub lost_visible_stop_s: f64,
}

fn default_max_step_ms() -> f64 {
    800.0
}
fn default_max_episode_s() -> f64 {
    30.0
}
fn default_visible_conf_min() -> f64 {
    0.12
}
fn default_stop_every_steps() -> u32 {
    1
}
fn default_lost_visible_stop_s() -> f64 {
    1.0
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_step_ms: default_max_step_ms(),
            max_episode_s: default_max_episode_s(),
            visible_conf_min: default_visible_conf_min(),
            stop_every_steps: default_stop_every_steps(),
            lost_visible_stop_s: default_lost_visible_stop_s(),
        }
    }
}

/// Declared bounds for one policy parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub min: f64,
    pub max: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// TaskState
// ────────────────────────────────────────────────────────────────────────────

/// The mutable per-task configuration.
///
/// Mutated only through [`TaskState::apply_patch`] or parameter exploration,
/// always on the controller thread between attempts; persisted on change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub instruction: String,
    pub camera_roi: Rect,
    pub home_roi: Rect,
    pub safety: SafetyLimits,
    pub policy_params: BTreeMap<String, f64>,
    #[serde(default)]
    pub policy_param_bounds: BTreeMap<String, ParamBounds>,
}

impl Default for TaskState {
    fn default() -> Self {
        let mut policy_params = BTreeMap::new();
        policy_params.insert("default_duration_ms".to_string(), 350.0);
        policy_params.insert("default_speed".to_string(), 0.5);
        policy_params.insert("center_margin".to_string(), 0.12);
        policy_params.insert("turn_duration_ms".to_string(), 220.0);
        policy_params.insert("strafe_duration_ms".to_string(), 220.0);
        Self {
            task_id: "default".to_string(),
            instruction: String::new(),
            camera_roi: Rect::full(),
            home_roi: Rect {
                x: 0.3,
                y: 0.25,
                w: 0.4,
                h: 0.5,
            },
            safety: SafetyLimits::default(),
            policy_params,
            policy_param_bounds: BTreeMap::new(),
        }
    }
}

impl TaskState {
    /// Read a policy parameter with a fallback default.
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.policy_params.get(key).copied().unwrap_or(default)
    }

    /// Apply a constrained patch and return the list of applied keys.
    ///
    /// Only the `policy_params` object is honored. A patch carrying more
    /// than [`MAX_PATCH_KEYS`] entries is rejected whole. Non-numeric and
    /// boolean values are silently skipped; surviving values are clamped to
    /// the parameter's declared bounds when present, else to a generic
    /// safety range.
    pub fn apply_patch(&mut self, patch: &Value) -> Vec<String> {
        let mut applied = Vec::new();
        let params = match patch.get("policy_params").and_then(|v| v.as_object()) {
            Some(p) => p,
            None => return applied,
        };
        if params.len() > MAX_PATCH_KEYS {
            return applied;
        }
        for (key, raw) in params {
            if key.trim().is_empty() {
                continue;
            }
            // `as_f64` is None for booleans and strings.
            let value = match raw.as_f64() {
                Some(v) => v,
                None => continue,
            };
            let value = match self.policy_param_bounds.get(key) {
                Some(bounds) => clamp(value, bounds.min, bounds.max),
                None => clamp(value, -GENERIC_PARAM_LIMIT, GENERIC_PARAM_LIMIT),
            };
            self.policy_params.insert(key.clone(), value);
            applied.push(format!("policy_params.{key}"));
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_conservative() {
        let t = TaskState::default();
        assert_eq!(t.safety.max_step_ms, 800.0);
        assert_eq!(t.safety.visible_conf_min, 0.12);
        assert_eq!(t.param("default_speed", 0.0), 0.5);
        assert_eq!(t.param("center_margin", 0.0), 0.12);
    }

    #[test]
    fn patch_applies_numeric_and_skips_invalid_entries() {
        let mut t = TaskState::default();
        let applied = t.apply_patch(&json!({
            "policy_params": {"default_speed": 0.8, "x": "nope", "y": true}
        }));
        assert_eq!(applied, vec!["policy_params.default_speed"]);
        assert_eq!(t.param("default_speed", 0.0), 0.8);
        assert!(!t.policy_params.contains_key("x"));
        assert!(!t.policy_params.contains_key("y"));
    }

    #[test]
    fn oversized_patch_is_rejected_whole() {
        let mut t = TaskState::default();
        let before = t.policy_params.clone();
        let mut big = serde_json::Map::new();
        for i in 0..40 {
            big.insert(format!("p{i}"), json!(1.0));
        }
        let applied = t.apply_patch(&json!({"policy_params": big}));
        assert!(applied.is_empty());
        assert_eq!(t.policy_params, before);
    }

    #[test]
    fn patch_without_policy_params_is_noop() {
        let mut t = TaskState::default();
        assert!(t.apply_patch(&json!({"other": 1})).is_empty());
        assert!(t.apply_patch(&json!(null)).is_empty());
    }

    #[test]
    fn patch_clamps_to_declared_bounds() {
        let mut t = TaskState::default();
        t.policy_param_bounds.insert(
            "default_speed".to_string(),
            ParamBounds { min: 0.1, max: 0.6 },
        );
        t.apply_patch(&json!({"policy_params": {"default_speed": 5.0}}));
        assert_eq!(t.param("default_speed", 0.0), 0.6);
        t.apply_patch(&json!({"policy_params": {"default_speed": -5.0}}));
        assert_eq!(t.param("default_speed", 0.0), 0.1);
    }

    #[test]
    fn patch_without_bounds_uses_generic_clamp() {
        let mut t = TaskState::default();
        t.apply_patch(&json!({"policy_params": {"weird": 1e12}}));
        assert_eq!(t.param("weird", 0.0), 1e6);
    }

    #[test]
    fn blank_keys_are_skipped() {
        let mut t = TaskState::default();
        let applied = t.apply_patch(&json!({"policy_params": {"  ": 1.0, "ok": 2.0}}));
        assert_eq!(applied, vec!["policy_params.ok"]);
    }

    #[test]
    fn task_state_roundtrips_through_json() {
        let t = TaskState::default();
        let json = serde_json::to_string(&t).unwrap();
        let back: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
