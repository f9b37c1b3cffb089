//! Judge verdicts: the structured outcome of evaluating one attempt.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether the attempt accomplished the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
    Uncertain,
}

/// Parameter tweaks the judge proposes after a failed attempt. Restricted
/// to a flat numeric map so it can be applied through the constrained
/// patch protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FixProposal {
    #[serde(default)]
    pub policy_params: BTreeMap<String, f64>,
}

/// The judge's full evaluation of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JudgeResult {
    pub verdict: Verdict,
    /// Task-completion score in [0, 1].
    pub score: f64,
    /// The judge's own confidence in the verdict, in [0, 1].
    pub confidence: f64,
    pub failure_modes: Vec<String>,
    pub what_went_wrong: String,
    #[serde(default)]
    pub fix_proposal: FixProposal,
}

impl JudgeResult {
    /// A degraded "no verdict" result. Judging never degrades to a false
    /// success or failure.
    pub fn uncertain(failure_mode: &str, what_went_wrong: &str) -> Self {
        Self {
            verdict: Verdict::Uncertain,
            score: 0.0,
            confidence: 0.0,
            failure_modes: vec![failure_mode.to_string()],
            what_went_wrong: what_went_wrong.to_string(),
            fix_proposal: FixProposal::default(),
        }
    }

    /// Clamp score and confidence into [0, 1].
    pub fn normalized(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Verdict::Success).unwrap(), r#""success""#);
        assert_eq!(serde_json::to_string(&Verdict::Uncertain).unwrap(), r#""uncertain""#);
    }

    #[test]
    fn uncertain_result_carries_failure_mode() {
        let r = JudgeResult::uncertain("missing_api_key", "credentials absent");
        assert_eq!(r.verdict, Verdict::Uncertain);
        assert_eq!(r.failure_modes, vec!["missing_api_key"]);
        assert!(r.fix_proposal.policy_params.is_empty());
    }

    #[test]
    fn normalized_clamps_score_and_confidence() {
        let mut r = JudgeResult::uncertain("x", "y");
        r.score = 1.7;
        r.confidence = -0.3;
        let r = r.normalized();
        assert_eq!(r.score, 1.0);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn judge_result_roundtrip() {
        let mut fix = FixProposal::default();
        fix.policy_params.insert("default_speed".to_string(), 0.4);
        let r = JudgeResult {
            verdict: Verdict::Failure,
            score: 0.2,
            confidence: 0.8,
            failure_modes: vec!["drifted_off_target".to_string()],
            what_went_wrong: "overshot the turn".to_string(),
            fix_proposal: fix,
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: JudgeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn missing_fix_proposal_defaults_to_empty() {
        let r: JudgeResult = serde_json::from_str(
            r#"{"verdict":"uncertain","score":0,"confidence":0,"failure_modes":[],"what_went_wrong":""}"#,
        )
        .unwrap();
        assert!(r.fix_proposal.policy_params.is_empty());
    }
}
