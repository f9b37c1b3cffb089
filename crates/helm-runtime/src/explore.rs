//! Parameter exploration: best-effort perturbation when the judge offered
//! no usable patch.
//!
//! Multiplies a fixed whitelist of numeric parameters by `1 + N(0, sigma)`
//! where `sigma` is itself a policy parameter (`explore_sigma`), and clamps
//! each to a hardcoded reasonable range. Converting noisy episodic feedback
//! into bounded multiplicative nudges keeps the parameters from drifting
//! off to extremes.

use helm_types::TaskState;
use rand::Rng;
use tracing::debug;

/// Exploration is disabled when `explore_sigma` is at or below zero.
pub const DEFAULT_EXPLORE_SIGMA: f64 = 0.12;

/// Deltas below this floor do not count as a change.
const NOISE_FLOOR: f64 = 1e-9;

/// Sample from `N(0, sigma)` via the Box–Muller transform.
fn gaussian<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn perturb<R: Rng>(
    task: &mut TaskState,
    rng: &mut R,
    sigma: f64,
    key: &str,
    lo: f64,
    hi: f64,
    changed: &mut Vec<String>,
) {
    let Some(&value) = task.policy_params.get(key) else {
        return;
    };
    let factor = 1.0 + gaussian(rng, sigma);
    let next = (value * factor).clamp(lo, hi);
    if (next - value).abs() > NOISE_FLOOR {
        task.policy_params.insert(key.to_string(), next);
        changed.push(key.to_string());
    }
}

/// Perturb the whitelisted parameters in place and return the changed keys.
pub fn auto_explore<R: Rng>(task: &mut TaskState, rng: &mut R) -> Vec<String> {
    let sigma = task.param("explore_sigma", DEFAULT_EXPLORE_SIGMA);
    if sigma <= 0.0 {
        return Vec::new();
    }
    let max_step_ms = task.safety.max_step_ms;
    let mut changed = Vec::new();

    perturb(task, rng, sigma, "default_speed", 0.05, 1.0, &mut changed);
    perturb(task, rng, sigma, "default_duration_ms", 80.0, max_step_ms, &mut changed);
    perturb(task, rng, sigma, "turn_duration_ms", 80.0, max_step_ms, &mut changed);
    perturb(task, rng, sigma, "strafe_duration_ms", 80.0, max_step_ms, &mut changed);
    perturb(task, rng, sigma, "center_margin", 0.05, 0.25, &mut changed);

    debug!(?changed, sigma, "exploration pass complete");
    changed
}
