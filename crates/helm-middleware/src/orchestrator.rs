//! HTTP adapter to the remote actuator orchestrator.
//!
//! The orchestrator speaks a small JSON API:
//!
//! | Call | Failure policy |
//! |------|----------------|
//! | `GET /status` | fatal — the manifest is required to operate |
//! | `GET /telemetry` | best-effort — absence and errors are swallowed |
//! | `POST /execute_plan` | fatal for the current operation |
//! | `POST /stop` | caller swallows failures at shutdown |
//!
//! Every call is blocking-synchronous from the control loop's point of
//! view, with an explicit per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use helm_types::{HelmError, PlanStep};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// The slice of the orchestrator API the control loop uses per step.
///
/// [`OrchestratorClient`] is the one real implementation; deterministic
/// stubs implement this for controller tests.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit a plan for execution. Failure is fatal for the current
    /// operation.
    async fn execute_plan(&self, plan: &[PlanStep], correlation_id: &str)
    -> Result<(), HelmError>;

    /// Halt all motion. Callers at shutdown swallow the error.
    async fn stop(&self, correlation_id: &str) -> Result<(), HelmError>;

    /// Best-effort telemetry snapshot; every failure collapses to `None`.
    async fn telemetry(&self) -> Option<Value>;
}

/// Default timeout for status/execute/stop calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Telemetry polling is sub-second best-effort.
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct ExecuteBody<'a> {
    plan: &'a [PlanStep],
    correlation_id: &'a str,
}

/// Client for the remote command-execution service.
pub struct OrchestratorClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OrchestratorClient {
    /// Create a client for `base_url` (e.g. `"http://127.0.0.1:5055"`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, timeout: Duration) -> Result<Value, HelmError> {
        let body: Value = self
            .client
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| HelmError::transport(path, e))?
            .error_for_status()
            .map_err(|e| HelmError::transport(path, e))?
            .json()
            .await
            .map_err(|e| HelmError::transport(path, e))?;
        Ok(body)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &impl Serialize,
        correlation_id: Option<&str>,
    ) -> Result<Value, HelmError> {
        let mut request = self.client.post(self.url(path)).timeout(self.timeout).json(body);
        if let Some(id) = correlation_id {
            request = request.header("X-Correlation-Id", id);
        }
        let reply: Value = request
            .send()
            .await
            .map_err(|e| HelmError::transport(path, e))?
            .error_for_status()
            .map_err(|e| HelmError::transport(path, e))?
            .json()
            .await
            .map_err(|e| HelmError::transport(path, e))?;
        Ok(reply)
    }

    fn require_ok(path: &str, body: Value) -> Result<Value, HelmError> {
        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(body)
        } else {
            Err(HelmError::transport(path, format!("not ok: {body}")))
        }
    }

    /// Fetch executor status; returns the raw system manifest value.
    ///
    /// # Errors
    ///
    /// [`HelmError::Transport`] on any failure or a non-`ok` reply — the
    /// manifest is required to operate.
    pub async fn status(&self) -> Result<Value, HelmError> {
        let body = Self::require_ok("/status", self.get_json("/status", self.timeout).await?)?;
        Ok(body.get("system_manifest").cloned().unwrap_or(Value::Null))
    }

}

#[async_trait]
impl Executor for OrchestratorClient {
    async fn execute_plan(
        &self,
        plan: &[PlanStep],
        correlation_id: &str,
    ) -> Result<(), HelmError> {
        debug!(correlation_id, steps = plan.len(), "executing plan");
        let body = ExecuteBody {
            plan,
            correlation_id,
        };
        Self::require_ok(
            "/execute_plan",
            self.post_json("/execute_plan", &body, Some(correlation_id)).await?,
        )?;
        Ok(())
    }

    async fn stop(&self, correlation_id: &str) -> Result<(), HelmError> {
        let result = self
            .post_json("/stop", &serde_json::json!({}), Some(correlation_id))
            .await
            .and_then(|body| Self::require_ok("/stop", body));
        if let Err(err) = &result {
            warn!(error = %err, "stop request failed");
        }
        result.map(|_| ())
    }

    async fn telemetry(&self) -> Option<Value> {
        match self.get_json("/telemetry", TELEMETRY_TIMEOUT).await {
            Ok(body) if body.get("ok").and_then(Value::as_bool).unwrap_or(false) => {
                body.get("telemetry_snapshot").cloned().filter(Value::is_object)
            }
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "telemetry poll failed (ignored)");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = OrchestratorClient::new("http://127.0.0.1:5055/");
        assert_eq!(client.base_url(), "http://127.0.0.1:5055");
        assert_eq!(client.url("/status"), "http://127.0.0.1:5055/status");
    }

    #[test]
    fn require_ok_accepts_only_true_ok() {
        assert!(
            OrchestratorClient::require_ok("/status", serde_json::json!({"ok": true})).is_ok()
        );
        for body in [
            serde_json::json!({"ok": false}),
            serde_json::json!({}),
            serde_json::json!({"ok": "yes"}),
        ] {
            assert!(matches!(
                OrchestratorClient::require_ok("/status", body),
                Err(HelmError::Transport { .. })
            ));
        }
    }

    #[test]
    fn execute_body_serializes_plan_inline() {
        let plan = vec![PlanStep::Stop];
        let body = ExecuteBody {
            plan: &plan,
            correlation_id: "run-1",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"plan":[{"type":"STOP"}],"correlation_id":"run-1"}"#);
    }

    #[tokio::test]
    async fn unreachable_executor_is_a_transport_failure() {
        // Reserved TEST-NET address: connection fails fast without a server.
        let client = OrchestratorClient::new("http://192.0.2.1:1");
        let result = client.execute_plan(&[PlanStep::Stop], "run-1").await;
        assert!(matches!(result, Err(HelmError::Transport { .. })));
    }

    #[tokio::test]
    async fn unreachable_telemetry_is_swallowed() {
        let client = OrchestratorClient::new("http://192.0.2.1:1");
        assert!(client.telemetry().await.is_none());
    }
}
