//! Structured-output LLM client.
//!
//! Planning, judging, vision fallback, and semantics refinement all use the
//! same request shape: system instructions + user content (text and/or
//! inline images) + a strict JSON schema constraining the response. This
//! client speaks that one request against an OpenAI-compatible
//! `/v1/responses` endpoint.
//!
//! Failure taxonomy: a missing API key is [`HelmError::Configuration`]
//! (callers degrade to their documented safe default), an HTTP failure is
//! [`HelmError::Transport`], and a non-conforming body is
//! [`HelmError::Validation`].

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use helm_types::HelmError;
use serde_json::{Value, json};
use tracing::debug;

/// Default endpoint of the completion service.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";

/// One piece of user content in a structured request.
#[derive(Debug, Clone)]
pub enum UserPart {
    Text(String),
    /// Raw encoded image bytes; sent inline as a base64 data URL.
    ImageJpeg(Vec<u8>),
}

/// A schema-constrained completion request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub schema_name: &'static str,
    pub schema: Value,
    pub system_text: String,
    pub user: Vec<UserPart>,
    pub timeout: Duration,
}

/// Client for the structured-output completion endpoint.
///
/// Construct once and share across planner, judge, vision, and semantics
/// callers; the API key is read once at startup and passed in explicitly.
pub struct LlmClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `true` when an API key is configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run one structured completion and return the parsed JSON object.
    pub async fn complete_json(&self, request: &StructuredRequest) -> Result<Value, HelmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| HelmError::Configuration("LLM API key is not configured".into()))?;

        let user_content: Vec<Value> = request
            .user
            .iter()
            .map(|part| match part {
                UserPart::Text(text) => json!({"type": "input_text", "text": text}),
                UserPart::ImageJpeg(bytes) => {
                    let b64 = BASE64_STANDARD.encode(bytes);
                    json!({
                        "type": "input_image",
                        "image_url": format!("data:image/jpeg;base64,{b64}")
                    })
                }
            })
            .collect();

        let payload = json!({
            "model": self.model,
            "temperature": 0.0,
            "input": [
                {"role": "system", "content": [{"type": "input_text", "text": request.system_text}]},
                {"role": "user", "content": user_content}
            ],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema
                }
            }
        });

        let endpoint = format!("{}/v1/responses", self.base_url);
        debug!(schema = request.schema_name, "structured completion request");
        let raw: Value = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| HelmError::transport("/v1/responses", e))?
            .error_for_status()
            .map_err(|e| HelmError::transport("/v1/responses", e))?
            .json()
            .await
            .map_err(|e| HelmError::transport("/v1/responses", e))?;

        let text = extract_output_text(&raw).ok_or_else(|| {
            HelmError::Validation(format!(
                "{}: completion carried no output text",
                request.schema_name
            ))
        })?;
        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            HelmError::Validation(format!("{}: non-JSON output: {e}", request.schema_name))
        })?;
        if !parsed.is_object() {
            return Err(HelmError::Validation(format!(
                "{}: output is not a JSON object",
                request.schema_name
            )));
        }
        Ok(parsed)
    }
}

/// Pull the assistant's text out of a responses-API payload: the flat
/// `output_text` field when present, else the first non-empty text part of
/// the `output` array.
pub fn extract_output_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.to_string());
        }
    }
    for item in payload.get("output")?.as_array()? {
        let content = match item.get("content").and_then(Value::as_array) {
            Some(c) => c,
            None => continue,
        };
        for part in content {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return Some(text.to_string());
                }
            }
        }
    }
    None
}
