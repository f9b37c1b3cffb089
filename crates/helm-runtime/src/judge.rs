//! Cached episode judge.
//!
//! Wraps the [`JudgingService`] with content-addressed caching: identical
//! (instruction, frame-set) pairs never re-invoke the external service.
//! Degraded paths produce an `uncertain` verdict — judging never degrades
//! to a false success or failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use helm_memory::{JudgeStore, judge_digest};
use helm_types::{HelmError, JudgeResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::services::{JudgeRequest, JudgingService};

/// At most this many key frames are sent to the service.
pub const MAX_JUDGE_FRAMES: usize = 8;

pub struct EpisodeJudge {
    service: Arc<dyn JudgingService>,
    store: JudgeStore,
}

impl EpisodeJudge {
    pub fn new(service: Arc<dyn JudgingService>, store: JudgeStore) -> Self {
        Self { service, store }
    }

    /// Evaluate one completed attempt.
    ///
    /// Only successful service verdicts enter the cache: degraded results
    /// (`missing_api_key`, `judge_call_failed`) are synthesized fresh each
    /// time so restored credentials take effect immediately.
    ///
    /// # Errors
    ///
    /// [`HelmError::Persistence`] when the verdict cannot be cached —
    /// silently losing attempt evidence would undermine adaptation.
    pub async fn evaluate(
        &self,
        instruction: &str,
        frames: &[Vec<u8>],
        executed_summary: &Value,
        policy_params: &BTreeMap<String, f64>,
    ) -> Result<JudgeResult, HelmError> {
        let frames: Vec<Vec<u8>> = frames
            .iter()
            .filter(|f| !f.is_empty())
            .take(MAX_JUDGE_FRAMES)
            .cloned()
            .collect();

        let key = judge_digest(instruction, &frames);
        if let Some(cached) = self.store.get(&key) {
            debug!(%key, "judge verdict served from cache");
            return Ok(cached);
        }

        let request = JudgeRequest {
            instruction: instruction.to_string(),
            frames,
            executed_summary: executed_summary.clone(),
            policy_params: policy_params.clone(),
        };
        let result = match self.service.judge(&request).await {
            Ok(result) => result,
            Err(HelmError::Configuration(details)) => {
                debug!(%details, "judge disabled");
                return Ok(JudgeResult::uncertain(
                    "missing_api_key",
                    "LLM credentials missing; judge disabled.",
                ));
            }
            Err(err) => {
                warn!(error = %err, "judge call failed");
                return Ok(JudgeResult::uncertain("judge_call_failed", &err.to_string()));
            }
        };

        self.store.put(&key, &result)?;
        info!(%key, verdict = ?result.verdict, score = result.score, "attempt judged");
        Ok(result)
    }
}
