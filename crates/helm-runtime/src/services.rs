//! Capability interfaces over the completion service.
//!
//! The "ask an external service for structured JSON, fall back on failure"
//! pattern recurs for planning, judging, vision, and semantics refinement.
//! Each is modeled as a trait with one LLM-backed implementation here and
//! deterministic stubs in tests, so business logic never branches on
//! credential presence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use helm_kernel::KNOWN_TAGS;
use helm_perception::VisionService;
use helm_types::{
    ArgSpec, BBox, HelmError, JudgeResult, PlanStep, Rect, TrackerOutput, geometry::clamp,
};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::{LlmClient, StructuredRequest, UserPart};

const PLAN_TIMEOUT: Duration = Duration::from_secs(12);
const JUDGE_TIMEOUT: Duration = Duration::from_secs(20);
const VISION_TIMEOUT: Duration = Duration::from_secs(12);
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(20);

// ────────────────────────────────────────────────────────────────────────────
// Planning
// ────────────────────────────────────────────────────────────────────────────

/// Current observation offered to the planner.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub visible_conf: f64,
    pub edge_margin: f64,
    pub bbox: Option<BBox>,
    pub mobility_target: Option<String>,
    pub hint: String,
}

/// Everything the planning service sees for one step.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest {
    pub instruction: String,
    pub observation: Observation,
    /// Compacted manifest view (bounded command count, inferred tags).
    #[serde(rename = "system_manifest")]
    pub manifest_compact: Value,
    pub policy_params: BTreeMap<String, f64>,
    /// Upper bound for any step duration the service may propose.
    #[serde(skip)]
    pub max_step_ms: f64,
}

/// The planning service's raw (pre-normalization) answer.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerReply {
    pub reason: String,
    pub plan: Vec<PlanStep>,
}

/// External next-step planning capability.
#[async_trait]
pub trait PlanningService: Send + Sync {
    async fn propose(&self, request: &PlanRequest) -> Result<PlannerReply, HelmError>;
}

/// LLM-backed planner.
pub struct LlmPlanner {
    client: Arc<LlmClient>,
}

impl LlmPlanner {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

/// Schema restricting the planner to at most one RUN followed optionally by
/// STOP, with durations capped at `max_step_ms`.
fn planner_schema(max_step_ms: f64) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "reason": {"type": "string"},
            "plan": {
                "type": "array",
                "minItems": 1,
                "maxItems": 2,
                "items": {
                    "oneOf": [
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {"type": {"const": "STOP"}},
                            "required": ["type"]
                        },
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "type": {"const": "RUN"},
                                "target": {"type": "string"},
                                "token": {"type": "string"},
                                "args": {"type": "array"},
                                "duration_ms": {"type": "number", "minimum": 0, "maximum": max_step_ms}
                            },
                            "required": ["type", "target", "token", "args"]
                        }
                    ]
                }
            }
        },
        "required": ["reason", "plan"]
    })
}

const PLANNER_SYSTEM_TEXT: &str = "\
You are a robot action selector.\n\
You must select ONLY from the provided manifest commands.\n\
Return a short plan for the next step only (one RUN or STOP).\n\
Safety rules:\n\
- If the robot is not visible (bbox null) or edge_margin is low, prefer STOP.\n\
- Keep durations short.\n\
- If you need to move, choose locomotion-tagged commands on the mobility target when possible.\n\
Output strict JSON only.";

#[async_trait]
impl PlanningService for LlmPlanner {
    async fn propose(&self, request: &PlanRequest) -> Result<PlannerReply, HelmError> {
        let user_text = serde_json::to_string(request)
            .map_err(|e| HelmError::Validation(format!("plan request serialization: {e}")))?;
        let out = self
            .client
            .complete_json(&StructuredRequest {
                schema_name: "helm_next_step_plan",
                schema: planner_schema(request.max_step_ms),
                system_text: PLANNER_SYSTEM_TEXT.to_string(),
                user: vec![UserPart::Text(user_text)],
                timeout: PLAN_TIMEOUT,
            })
            .await?;
        serde_json::from_value(out)
            .map_err(|e| HelmError::Validation(format!("planner reply: {e}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Judging
// ────────────────────────────────────────────────────────────────────────────

/// Evidence bundle for one attempt evaluation.
pub struct JudgeRequest {
    pub instruction: String,
    /// Key frames, driver-encoded, already capped by the caller.
    pub frames: Vec<Vec<u8>>,
    pub executed_summary: Value,
    pub policy_params: BTreeMap<String, f64>,
}

/// External episode-judging capability.
#[async_trait]
pub trait JudgingService: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeResult, HelmError>;
}

/// LLM-backed judge.
pub struct LlmJudge {
    client: Arc<LlmClient>,
}

impl LlmJudge {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

const JUDGE_SYSTEM_TEXT: &str = "\
You are a strict robot judge.\n\
You are given an instruction, a summary of what actions were executed, and keyframes.\n\
Decide if the robot is doing the intended action correctly.\n\
If failure, explain what went wrong and propose minimal numeric parameter tweaks under fix_proposal.policy_params.\n\
If you are not confident from the evidence, output verdict=uncertain.\n\
Return strict JSON only.";

#[async_trait]
impl JudgingService for LlmJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeResult, HelmError> {
        let schema = serde_json::to_value(schema_for!(JudgeResult)).unwrap_or(Value::Null);

        let mut user = vec![
            UserPart::Text(format!("Instruction: {}", request.instruction)),
            UserPart::Text(format!(
                "Executed summary JSON: {}",
                request.executed_summary
            )),
            UserPart::Text(format!(
                "Current policy_params JSON: {}",
                serde_json::to_string(&request.policy_params).unwrap_or_default()
            )),
        ];
        for (idx, frame) in request.frames.iter().enumerate() {
            user.push(UserPart::Text(format!("Frame {idx}:")));
            user.push(UserPart::ImageJpeg(frame.clone()));
        }

        let out = self
            .client
            .complete_json(&StructuredRequest {
                schema_name: "helm_episode_judge",
                schema,
                system_text: JUDGE_SYSTEM_TEXT.to_string(),
                user,
                timeout: JUDGE_TIMEOUT,
            })
            .await?;
        let result: JudgeResult = serde_json::from_value(out)
            .map_err(|e| HelmError::Validation(format!("judge reply: {e}")))?;
        Ok(result.normalized())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vision fallback
// ────────────────────────────────────────────────────────────────────────────

/// The vision service's raw answer.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VisionReply {
    pub found: bool,
    pub confidence: f64,
    pub bbox: Option<BBox>,
}

/// Convert a vision reply into a tracker-shaped observation, clamping the
/// box and deriving the ROI edge margin.
pub fn vision_output(reply: &VisionReply, roi: &Rect) -> TrackerOutput {
    let raw = match (reply.found, &reply.bbox) {
        (true, Some(b)) => b,
        _ => return TrackerOutput::absent("vision_not_found"),
    };
    let bbox = match BBox::clamped(raw.x, raw.y, raw.w, raw.h) {
        Some(b) => b,
        None => return TrackerOutput::absent("vision_bad_bbox"),
    };
    let margin = clamp(
        (bbox.x - roi.x)
            .min(bbox.y - roi.y)
            .min((roi.x + roi.w) - (bbox.x + bbox.w))
            .min((roi.y + roi.h) - (bbox.y + bbox.h)),
        0.0,
        1.0,
    );
    let mut debug = BTreeMap::new();
    debug.insert("reason".to_string(), "vision_bbox".to_string());
    TrackerOutput {
        bbox: Some(bbox),
        visibility_confidence: clamp(reply.confidence, 0.0, 1.0),
        edge_margin: margin,
        debug,
    }
}

const VISION_SYSTEM_TEXT: &str = "\
You locate the robot/device being controlled in the camera frame.\n\
Return a single bounding box normalized [0..1].\n\
If you cannot confidently identify the robot, return found=false and bbox=null.\n\
Return strict JSON only.";

/// LLM-backed vision fallback.
pub struct LlmVision {
    client: Arc<LlmClient>,
}

impl LlmVision {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VisionService for LlmVision {
    async fn locate(
        &self,
        frame_encoded: &[u8],
        roi: &Rect,
        hint: &str,
    ) -> Result<TrackerOutput, HelmError> {
        let schema = serde_json::to_value(schema_for!(VisionReply)).unwrap_or(Value::Null);
        let out = self
            .client
            .complete_json(&StructuredRequest {
                schema_name: "helm_robot_bbox",
                schema,
                system_text: VISION_SYSTEM_TEXT.to_string(),
                user: vec![
                    UserPart::Text(format!("Hint about robot appearance/type: {hint}")),
                    UserPart::Text(format!(
                        "Camera ROI (normalized) the robot should be within: {}",
                        serde_json::to_string(roi).unwrap_or_default()
                    )),
                    UserPart::ImageJpeg(frame_encoded.to_vec()),
                ],
                timeout: VISION_TIMEOUT,
            })
            .await?;
        let reply: VisionReply = serde_json::from_value(out)
            .map_err(|e| HelmError::Validation(format!("vision reply: {e}")))?;
        Ok(vision_output(&reply, roi))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Semantics classification
// ────────────────────────────────────────────────────────────────────────────

/// Compact command view sent to the classification service.
#[derive(Debug, Clone, Serialize)]
pub struct CommandProfile {
    pub key: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub args: Vec<ArgSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

/// One classified command.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifiedCommand {
    pub key: String,
    pub tags: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    commands: Vec<ClassifiedCommand>,
}

/// External command-classification capability, constrained to the closed
/// tag vocabulary.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(
        &self,
        commands: &[CommandProfile],
    ) -> Result<Vec<ClassifiedCommand>, HelmError>;
}

const CLASSIFY_SYSTEM_TEXT: &str = "\
You classify robot command tokens into semantic tags.\n\
Return only the tags that are clearly supported by the command.\n\
If unsure, return ['generic.action'].\n\
Tags must be chosen from the allowed enum list.\n\
Confidence is 0..1.";

fn classify_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "commands": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "key": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string", "enum": KNOWN_TAGS}},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                    },
                    "required": ["key", "tags", "confidence"]
                }
            }
        },
        "required": ["commands"]
    })
}

/// LLM-backed command classifier.
pub struct LlmClassifier {
    client: Arc<LlmClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClassificationService for LlmClassifier {
    async fn classify(
        &self,
        commands: &[CommandProfile],
    ) -> Result<Vec<ClassifiedCommand>, HelmError> {
        let out = self
            .client
            .complete_json(&StructuredRequest {
                schema_name: "helm_command_semantics",
                schema: classify_schema(),
                system_text: CLASSIFY_SYSTEM_TEXT.to_string(),
                user: vec![UserPart::Text(format!(
                    "Commands JSON:\n{}",
                    serde_json::to_string(commands).unwrap_or_default()
                ))],
                timeout: CLASSIFY_TIMEOUT,
            })
            .await?;
        let reply: ClassifyReply = serde_json::from_value(out)
            .map_err(|e| HelmError::Validation(format!("classification reply: {e}")))?;

        // Defend the closed vocabulary even against a misbehaving service.
        Ok(reply
            .commands
            .into_iter()
            .map(|mut cmd| {
                cmd.tags.retain(|t| KNOWN_TAGS.contains(&t.as_str()));
                if cmd.tags.is_empty() {
                    cmd.tags.push("generic.action".to_string());
                }
                cmd.confidence = clamp(cmd.confidence, 0.0, 1.0);
                cmd
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_schema_embeds_the_duration_cap() {
        let schema = planner_schema(800.0);
        let text = schema.to_string();
        assert!(text.contains("\"maximum\":800.0"));
        assert!(text.contains("\"maxItems\":2"));
    }

    #[test]
    fn planner_reply_parses_run_then_stop() {
        let reply: PlannerReply = serde_json::from_value(json!({
            "reason": "advance toward target",
            "plan": [
                {"type": "RUN", "target": "base", "token": "FWD", "args": [0.4], "duration_ms": 300},
                {"type": "STOP"}
            ]
        }))
        .unwrap();
        assert_eq!(reply.plan.len(), 2);
        assert!(matches!(reply.plan[0], PlanStep::Run { .. }));
    }

    #[test]
    fn malformed_planner_reply_fails_to_parse() {
        let result: Result<PlannerReply, _> = serde_json::from_value(json!({
            "reason": "x",
            "plan": [{"type": "FLY"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn judge_schema_covers_the_result_shape() {
        let schema = serde_json::to_value(schema_for!(JudgeResult)).unwrap();
        let text = schema.to_string();
        assert!(text.contains("verdict"));
        assert!(text.contains("fix_proposal"));
        assert!(text.contains("uncertain"));
    }

    #[test]
    fn vision_output_maps_found_reply() {
        let reply = VisionReply {
            found: true,
            confidence: 1.4,
            bbox: BBox::clamped(0.4, 0.4, 0.2, 0.2),
        };
        let out = vision_output(&reply, &Rect::full());
        assert!(out.bbox.is_some());
        assert_eq!(out.visibility_confidence, 1.0); // clamped
        assert!((out.edge_margin - 0.4).abs() < 1e-12);
    }

    #[test]
    fn vision_output_treats_not_found_as_absent() {
        let reply = VisionReply {
            found: false,
            confidence: 0.9,
            bbox: BBox::clamped(0.4, 0.4, 0.2, 0.2),
        };
        let out = vision_output(&reply, &Rect::full());
        assert!(out.bbox.is_none());
        assert_eq!(
            out.debug.get("reason").map(String::as_str),
            Some("vision_not_found")
        );
    }

    #[test]
    fn vision_output_rejects_degenerate_boxes() {
        let reply = VisionReply {
            found: true,
            confidence: 0.9,
            bbox: Some(BBox {
                x: 1.0,
                y: 0.0,
                w: 0.5,
                h: 0.5,
            }),
        };
        let out = vision_output(&reply, &Rect::full());
        assert!(out.bbox.is_none());
        assert_eq!(
            out.debug.get("reason").map(String::as_str),
            Some("vision_bad_bbox")
        );
    }

    #[test]
    fn classify_schema_constrains_tags_to_known_vocabulary() {
        let text = classify_schema().to_string();
        assert!(text.contains("locomotion.forward"));
        assert!(text.contains("generic.action"));
    }
}
