//! Command semantics: classifying manifest commands into a closed tag
//! vocabulary and deriving a best-effort capability mapping from the result.
//!
//! Classification is two-tier. The deterministic heuristic here scans each
//! command's token and free text for keyword families and scores token
//! matches higher than free-text matches. An optional service refinement
//! pass (driven by `helm-runtime`) may later overwrite low-confidence
//! results; both tiers speak [`SemanticsRecord`].

use std::collections::BTreeSet;

use helm_types::{CommandSpec, Manifest};

pub use helm_types::semantics::{
    CapabilityMapping, SemanticsMap, SemanticsRecord, SemanticsSource,
};

/// The closed tag vocabulary. Service classification is constrained to
/// exactly this list.
pub const KNOWN_TAGS: &[&str] = &[
    // Mobility
    "locomotion.forward",
    "locomotion.backward",
    "locomotion.turn",
    "locomotion.strafe",
    // Manipulation
    "end_effector.grip",
    // Perception / IO
    "camera.snapshot",
    "light.set",
    "sound.play",
    "pose.set",
    "dance.step",
    // Safety
    "safety.estop",
    // Fallback
    "generic.action",
];

// ────────────────────────────────────────────────────────────────────────────
// Heuristic classification
// ────────────────────────────────────────────────────────────────────────────

/// Lower-cased bag of searchable text for one command: token, description,
/// synonyms, examples, argument names and enum values.
fn text_blob(cmd: &CommandSpec) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.push(cmd.token.trim());
    if let Some(desc) = &cmd.description {
        parts.push(desc.trim());
    }
    parts.extend(cmd.synonyms.iter().map(String::as_str));
    parts.extend(cmd.examples.iter().map(String::as_str));
    for arg in &cmd.args {
        parts.push(&arg.name);
        parts.extend(arg.one_of.iter().map(String::as_str));
    }
    parts.join(" ").to_lowercase()
}

/// Classify one command by keyword families.
///
/// A canonical token match scores higher than a free-text match; commands
/// matching nothing get `generic.action` at low confidence.
pub fn infer_tags_heuristic(cmd: &CommandSpec) -> (Vec<String>, f64) {
    let token = cmd.token_upper();
    let text = text_blob(cmd);
    let mut tags: BTreeSet<&str> = BTreeSet::new();
    let mut confidence: f64 = 0.45;

    let hit = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    let token_in = |options: &[&str]| options.iter().any(|o| *o == token);

    // Safety
    if token_in(&["ESTOP", "E_STOP", "EMERGENCY_STOP"])
        || hit(&["estop", "e-stop", "emergency stop"])
    {
        tags.insert("safety.estop");
        confidence = confidence.max(0.9);
    }

    // Mobility
    if token_in(&["FWD", "FORWARD"])
        || hit(&["forward", "move forward", "go forward", "drive forward"])
    {
        tags.insert("locomotion.forward");
        confidence = confidence.max(if token_in(&["FWD", "FORWARD"]) { 0.85 } else { 0.65 });
    }
    if token_in(&["BWD", "BACKWARD", "REV"])
        || hit(&["backward", "reverse", "move back", "go back"])
    {
        tags.insert("locomotion.backward");
        confidence = confidence.max(if token_in(&["BWD", "BACKWARD", "REV"]) {
            0.85
        } else {
            0.65
        });
    }
    if token_in(&["TURN", "ROTATE", "SPIN"]) || hit(&["turn", "rotate", "spin"]) {
        tags.insert("locomotion.turn");
        confidence = confidence.max(if token_in(&["TURN", "ROTATE", "SPIN"]) {
            0.85
        } else {
            0.65
        });
    }
    if token_in(&["STRAFE", "SLIDE"]) || hit(&["strafe", "slide", "lateral"]) {
        tags.insert("locomotion.strafe");
        confidence = confidence.max(if token_in(&["STRAFE", "SLIDE"]) { 0.8 } else { 0.6 });
    }

    // Manipulation
    if token_in(&["GRIP", "GRAB", "CLAW"]) || hit(&["grip", "gripper", "claw", "grab"]) {
        tags.insert("end_effector.grip");
        confidence = confidence.max(if token_in(&["GRIP", "GRAB", "CLAW"]) { 0.9 } else { 0.7 });
    }

    // Camera
    if token_in(&["SNAP", "SNAPSHOT", "CAMERA", "CAM"])
        || hit(&["camera", "snapshot", "take picture", "capture frame"])
    {
        tags.insert("camera.snapshot");
        confidence = confidence.max(if token_in(&["SNAP", "SNAPSHOT", "CAMERA", "CAM"]) {
            0.85
        } else {
            0.6
        });
    }

    // Other IO
    if token_in(&["LED", "LIGHT"]) || hit(&["led", "light"]) {
        tags.insert("light.set");
        confidence = confidence.max(0.7);
    }
    if token_in(&["BEEP", "SOUND"]) || hit(&["beep", "sound", "tone"]) {
        tags.insert("sound.play");
        confidence = confidence.max(0.65);
    }
    if token_in(&["POSE", "SERVO", "ANGLE"])
        || hit(&["pose", "servo", "joint", "angle", "position"])
    {
        tags.insert("pose.set");
        confidence = confidence.max(0.55);
    }
    if token == "DANCE" || hit(&["dance"]) {
        tags.insert("dance.step");
        confidence = confidence.max(0.55);
    }

    if tags.is_empty() {
        tags.insert("generic.action");
        confidence = 0.4;
    }

    (tags.into_iter().map(str::to_string).collect(), confidence)
}

// ────────────────────────────────────────────────────────────────────────────
// Capability mapping
// ────────────────────────────────────────────────────────────────────────────

/// Resolve capabilities from classified semantics.
///
/// The node exposing the most locomotion-tagged commands becomes the
/// mobility target; per direction tag, the highest-confidence command on
/// that node wins. Grip and e-stop are searched across *all* nodes. Ties
/// keep the first match in manifest iteration order.
pub fn infer_capabilities(manifest: &Manifest, semantics: &SemanticsMap) -> CapabilityMapping {
    let record = |key: &str| semantics.get(key);

    // Mobility target: most locomotion-tagged commands wins, first node on
    // ties.
    let mut mobility_target: Option<&str> = None;
    let mut best_score = 0usize;
    for node in &manifest.nodes {
        let score = node
            .commands
            .iter()
            .filter(|cmd| {
                let key = format!("{}:{}", node.node_id, cmd.token_upper());
                record(&key)
                    .map(|r| r.tags.iter().any(|t| t.starts_with("locomotion.")))
                    .unwrap_or(false)
            })
            .count();
        if score > best_score {
            best_score = score;
            mobility_target = Some(&node.node_id);
        }
    }

    let pick_on_node = |node_id: &str, want_tag: &str| -> Option<String> {
        let node = manifest.nodes.iter().find(|n| n.node_id == node_id)?;
        let mut best: Option<(f64, String)> = None;
        for cmd in &node.commands {
            let key = format!("{}:{}", node.node_id, cmd.token_upper());
            let rec = match record(&key) {
                Some(r) if r.has_tag(want_tag) => r,
                _ => continue,
            };
            if best.as_ref().map(|(c, _)| rec.confidence > *c).unwrap_or(true) {
                best = Some((rec.confidence, cmd.token_upper()));
            }
        }
        best.map(|(_, token)| token)
    };

    let pick_anywhere = |want_tag: &str| -> Option<(String, String)> {
        let mut best: Option<(f64, String, String)> = None;
        for handle in manifest.commands() {
            let rec = match record(&handle.key()) {
                Some(r) if r.has_tag(want_tag) => r,
                _ => continue,
            };
            if best.as_ref().map(|(c, _, _)| rec.confidence > *c).unwrap_or(true) {
                best = Some((
                    rec.confidence,
                    handle.node.node_id.clone(),
                    handle.command.token_upper(),
                ));
            }
        }
        best.map(|(_, target, token)| (target, token))
    };

    let (fwd, bwd, turn, strafe) = match mobility_target {
        Some(node_id) => (
            pick_on_node(node_id, "locomotion.forward"),
            pick_on_node(node_id, "locomotion.backward"),
            pick_on_node(node_id, "locomotion.turn"),
            pick_on_node(node_id, "locomotion.strafe"),
        ),
        None => (None, None, None, None),
    };

    let grip = pick_anywhere("end_effector.grip");
    let estop = pick_anywhere("safety.estop");

    CapabilityMapping {
        mobility_target: mobility_target.map(str::to_string),
        fwd_token: fwd,
        bwd_token: bwd,
        turn_token: turn,
        strafe_token: strafe,
        grip_target: grip.as_ref().map(|(t, _)| t.clone()),
        grip_token: grip.map(|(_, tok)| tok),
        estop_target: estop.as_ref().map(|(t, _)| t.clone()),
        estop_token: estop.map(|(_, tok)| tok),
    }
}

/// Heuristic-only semantics for a whole manifest; the runtime layers
/// caching and service refinement on top of this.
pub fn classify_heuristic(manifest: &Manifest) -> SemanticsMap {
    let mut out = SemanticsMap::new();
    for handle in manifest.commands() {
        let (tags, confidence) = infer_tags_heuristic(handle.command);
        out.insert(
            handle.key(),
            SemanticsRecord {
                tags,
                confidence,
                source: SemanticsSource::Heuristic,
            },
        );
    }
    out
}
