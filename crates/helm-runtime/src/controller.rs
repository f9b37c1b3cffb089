//! [`AttemptLoop`] – the closed-loop orchestrator.
//!
//! Drives repeated attempts toward the task instruction, each one a
//! **Reset-to-Home → Rollout → Persist → Judge → Adapt** cycle:
//!
//! 1. **Reset-to-Home** – deadline-bounded; reads frames, tracks, and
//!    issues shield-style corrective moves until the subject sits in the
//!    home region, the shield has no correction to offer, or time runs
//!    out.
//! 2. **Rollout** – up to `max_steps` steps within the episode time
//!    budget; each step captures, tracks (with the vision fallback),
//!    consults the shield, plans when the shield allows, executes
//!    remotely, and captures again. Stops early when the chosen plan
//!    leads with STOP.
//! 3. **Persist** – frames, step log, and a task-state snapshot go to a
//!    per-attempt directory; persistence failures are fatal.
//! 4. **Judge** – the cached episode judge evaluates the key frames.
//! 5. **Adapt** – apply the judge's patch, else explore parameters.
//!
//! A `success` verdict terminates the loop immediately. Whatever way the
//! loop exits, a final stop command goes to the executor and the camera is
//! released.
//!
//! Strictly single-threaded: every external call is awaited to completion
//! before the next begins; deadlines are checked between steps, never
//! preemptively inside a blocked call.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use helm_hal::{Camera, CameraFrame};
use helm_kernel::{home_ok, maybe_override};
use helm_memory::{JudgeStore, save_task_state, write_attempt};
use helm_middleware::Executor;
use helm_perception::{MotionTracker, PerceptionCache, VisionService};
use helm_types::{
    CapabilityMapping, HelmError, Manifest, PlanStep, SemanticsMap, StepRecord, TaskState,
    TrackerOutput, Verdict,
};

use crate::explore::auto_explore;
use crate::judge::EpisodeJudge;
use crate::planner;
use crate::services::{JudgingService, PlanningService};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`AttemptLoop`].
pub struct LoopConfig {
    /// Correlation id for the whole run; attempt ids derive from it.
    pub run_id: String,
    /// Attempt budget before the loop signals failure.
    pub attempts: u32,
    /// Step budget per episode.
    pub max_steps: u32,
    /// Reset-to-home phase timeout, in seconds.
    pub reset_timeout_s: f64,
    /// Root directory for per-attempt artifacts.
    pub out_dir: PathBuf,
    /// Appearance hint forwarded to the vision fallback.
    pub perception_hint: String,
    /// Perturb parameters when the judge offers no usable patch.
    pub auto_explore: bool,
    /// Pause between reset-phase corrective moves, in milliseconds.
    pub settle_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            run_id: format!("auto-{}", &Uuid::new_v4().simple().to_string()[..10]),
            attempts: 8,
            max_steps: 8,
            reset_timeout_s: 6.0,
            out_dir: PathBuf::from(".helm/episodes"),
            perception_hint: "robot device (the one being controlled)".to_string(),
            auto_explore: true,
            settle_ms: 50,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A judge verdict of `success` on the given attempt.
    Success { attempt: u32 },
    /// The attempt budget ran out without a success verdict.
    Exhausted { attempts: u32 },
    /// The operator requested shutdown between steps/attempts.
    Aborted,
}

// ─────────────────────────────────────────────────────────────────────────────
// AttemptLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every subsystem handle needed to run attempts end to end.
pub struct AttemptLoop {
    config: LoopConfig,
    camera: Box<dyn Camera>,
    tracker: MotionTracker,
    perception: PerceptionCache,
    vision: Arc<dyn VisionService>,
    planner_service: Arc<dyn PlanningService>,
    judge: EpisodeJudge,
    executor: Arc<dyn Executor>,
    manifest: Manifest,
    semantics: SemanticsMap,
    caps: CapabilityMapping,
    task: TaskState,
    /// When set, the task state is re-persisted here after every change.
    task_path: Option<PathBuf>,
    rng: StdRng,
    shutdown: Arc<AtomicBool>,
}

#[allow(clippy::too_many_arguments)]
impl AttemptLoop {
    /// Wire up a loop.
    ///
    /// # Errors
    ///
    /// [`HelmError::Configuration`] when the task carries no instruction —
    /// there is nothing to drive toward.
    pub fn new(
        config: LoopConfig,
        camera: Box<dyn Camera>,
        vision: Arc<dyn VisionService>,
        planner_service: Arc<dyn PlanningService>,
        judging_service: Arc<dyn JudgingService>,
        judge_store: JudgeStore,
        executor: Arc<dyn Executor>,
        manifest: Manifest,
        semantics: SemanticsMap,
        caps: CapabilityMapping,
        task: TaskState,
        task_path: Option<PathBuf>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, HelmError> {
        if task.instruction.trim().is_empty() {
            return Err(HelmError::Configuration(
                "an instruction is required (set it on the command line or in the task file)"
                    .to_string(),
            ));
        }
        Ok(Self {
            config,
            camera,
            tracker: MotionTracker::new(),
            perception: PerceptionCache::default(),
            vision,
            planner_service,
            judge: EpisodeJudge::new(judging_service, judge_store),
            executor,
            manifest,
            semantics,
            caps,
            task,
            task_path,
            rng: StdRng::from_entropy(),
            shutdown,
        })
    }

    /// Fix the exploration RNG, for reproducible runs and tests.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn task(&self) -> &TaskState {
        &self.task
    }

    /// Run attempts until success, exhaustion, or shutdown.
    ///
    /// A final stop command and camera release always happen on the way
    /// out, regardless of how the loop terminated; the stop failure is
    /// swallowed at this point.
    pub async fn run(&mut self) -> Result<RunOutcome, HelmError> {
        let outcome = self.drive().await;
        if let Err(err) = self.executor.stop(&self.config.run_id).await {
            warn!(error = %err, "final stop failed (ignored at shutdown)");
        }
        self.camera.release();
        outcome
    }

    async fn drive(&mut self) -> Result<RunOutcome, HelmError> {
        info!(
            run_id = %self.config.run_id,
            instruction = %self.task.instruction,
            attempts = self.config.attempts,
            "autonomy run starting"
        );
        if let Some(snapshot) = self.executor.telemetry().await {
            debug!(%snapshot, "executor telemetry");
        }

        for attempt in 0..self.config.attempts {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested; aborting before attempt {attempt}");
                return Ok(RunOutcome::Aborted);
            }
            let attempt_id = format!("{}-a{attempt}", self.config.run_id);
            info!(%attempt_id, attempt, "attempt starting");

            self.reset_to_home(&attempt_id).await?;
            let (frames, steps) = self.rollout(&attempt_id).await?;

            let dir = write_attempt(&self.config.out_dir, &attempt_id, &frames, &steps, &self.task)?;
            debug!(dir = %dir.display(), "attempt persisted");

            // The judge sees the tail of the step log plus the capability
            // snapshot, mirroring what actually ran.
            let tail_start = steps.len().saturating_sub(6);
            let summary = json!({"steps": &steps[tail_start..], "caps": &self.caps});
            let verdict = self
                .judge
                .evaluate(&self.task.instruction, &frames, &summary, &self.task.policy_params)
                .await?;
            info!(
                %attempt_id,
                verdict = ?verdict.verdict,
                score = verdict.score,
                confidence = verdict.confidence,
                failure_modes = ?verdict.failure_modes,
                "attempt judged"
            );

            if verdict.verdict == Verdict::Success {
                info!(%attempt_id, attempt, "instruction accomplished");
                return Ok(RunOutcome::Success { attempt });
            }

            // Adapt: judge patch first, exploration as the fallback.
            let patch = json!({"policy_params": &verdict.fix_proposal.policy_params});
            let applied = self.task.apply_patch(&patch);
            if !applied.is_empty() {
                info!(%attempt_id, ?applied, "judge patch applied");
                self.persist_task()?;
            } else if self.config.auto_explore {
                let changed = auto_explore(&mut self.task, &mut self.rng);
                info!(%attempt_id, ?changed, "parameter exploration");
                if !changed.is_empty() {
                    self.persist_task()?;
                }
            } else {
                debug!(%attempt_id, "no patch applied and exploration disabled");
            }
        }

        info!(attempts = self.config.attempts, "attempt budget exhausted");
        Ok(RunOutcome::Exhausted {
            attempts: self.config.attempts,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phases
    // ─────────────────────────────────────────────────────────────────────

    /// Track the current frame, consulting the vision fallback when motion
    /// detection comes up empty.
    async fn observe(&mut self, frame: &CameraFrame) -> TrackerOutput {
        let out = self.tracker.update(frame, &self.task.camera_roi);
        if out.bbox.is_some() {
            return out;
        }
        self.perception
            .resolve(
                self.vision.as_ref(),
                &frame.encoded,
                &self.task.camera_roi,
                &self.config.perception_hint,
                Utc::now().timestamp_millis(),
            )
            .await
    }

    /// Best-effort reset: nudge the subject back into the home region.
    async fn reset_to_home(&mut self, attempt_id: &str) -> Result<(), HelmError> {
        let deadline =
            Instant::now() + Duration::from_secs_f64(self.config.reset_timeout_s.max(0.0));
        while Instant::now() < deadline {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let frame = self.camera.capture()?;
            let obs = self.observe(&frame).await;
            if home_ok(obs.bbox.as_ref(), &self.task) {
                debug!(attempt_id, "subject is home");
                break;
            }
            let decision = match maybe_override(&obs, &self.task, &self.caps, &self.manifest) {
                Some(d) => d,
                // Not at an edge but not home either: nothing safe to do.
                None => break,
            };
            debug!(attempt_id, reason = %decision.reason, "reset corrective move");
            self.executor.execute_plan(&decision.plan, attempt_id).await?;
            // Throttle so the executor is not saturated with corrections.
            sleep(Duration::from_millis(self.config.settle_ms)).await;
        }
        Ok(())
    }

    /// One episode: capture → track → shield-or-plan → execute → capture.
    async fn rollout(
        &mut self,
        attempt_id: &str,
    ) -> Result<(Vec<Vec<u8>>, Vec<StepRecord>), HelmError> {
        let mut frames: Vec<Vec<u8>> = Vec::new();
        let mut steps: Vec<StepRecord> = Vec::new();
        let max_steps = self.config.max_steps as usize;
        let deadline =
            Instant::now() + Duration::from_secs_f64(self.task.safety.max_episode_s.max(0.0));

        for step_idx in 0..max_steps {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            if Instant::now() > deadline {
                info!(attempt_id, step = step_idx, "episode time budget expired");
                break;
            }

            let frame_before = self.camera.capture()?;
            if step_idx == 0 || step_idx == max_steps / 2 {
                frames.push(frame_before.encoded.clone());
            }

            let obs = self.observe(&frame_before).await;

            let (plan, reason, overridden) =
                match maybe_override(&obs, &self.task, &self.caps, &self.manifest) {
                    Some(decision) => {
                        (decision.plan, format!("shield:{}", decision.reason), true)
                    }
                    None => {
                        let (mut plan, mut reason) = planner::next_step(
                            self.planner_service.as_ref(),
                            &self.task.instruction,
                            &self.manifest,
                            &self.semantics,
                            &self.caps,
                            &obs,
                            &self.task,
                        )
                        .await;
                        // A planner STOP may still be an explicit "stop"
                        // instruction; give the fallback a chance to say so.
                        if plan.first().map(PlanStep::is_stop).unwrap_or(false) {
                            let (fb_plan, fb_reason) =
                                planner::fallback_plan(&self.task.instruction);
                            if fb_reason != "fallback_noop" {
                                plan = fb_plan;
                                reason = fb_reason;
                            }
                        }
                        (plan, reason, false)
                    }
                };

            info!(attempt_id, step = step_idx, reason = %reason, overridden, "step");
            steps.push(StepRecord {
                step: step_idx,
                tracker: obs,
                plan: plan.clone(),
                reason,
                overridden,
            });

            self.executor.execute_plan(&plan, attempt_id).await?;

            let frame_after = self.camera.capture()?;
            if step_idx + 1 == max_steps {
                frames.push(frame_after.encoded.clone());
            }

            if plan.first().map(PlanStep::is_stop).unwrap_or(false) {
                break;
            }
        }

        // The judge always gets at least a start and an end frame.
        if frames.is_empty() {
            let frame = self.camera.capture()?;
            frames.push(frame.encoded.clone());
            frames.push(frame.encoded);
        } else if frames.len() == 1 {
            frames.push(frames[0].clone());
        }

        Ok((frames, steps))
    }

    fn persist_task(&self) -> Result<(), HelmError> {
        if let Some(path) = &self.task_path {
            save_task_state(path, &self.task)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
