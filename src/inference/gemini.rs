//! Gemini API client
//!
//! Implements [`InferenceService`] over the generateContent REST endpoint.
//! Uses a long-lived reqwest::Client for connection pooling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use reqwest::Client;
use std::time::Duration;
use async_trait::async_trait;
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, StageResult, TaskSpec};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point at another generateContent host (proxies, local gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The key travels in a header; it must never appear in the URL
    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn invoke(&self, task: TaskSpec) -> crate::Result<StageResult> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::InferenceError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let structured = task.response_schema.is_some();
        let request = build_request(task.clone());

        info!(task = %task.kind, model = %self.model, "Calling Gemini API");

        let response = self.client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                OrchestrationError::InferenceError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::InferenceError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::MalformedResult(format!("Gemini parse error: {}", e))
        })?;

        let text = extract_text(&gemini_response)?;

        debug!(task = %task.kind, chars = text.len(), "Gemini response received");

        if structured {
            let value: Value = StageResult::Text(text).into_structured()?;
            Ok(StageResult::Structured(value))
        } else {
            Ok(StageResult::Text(text))
        }
    }
}

fn build_request(task: TaskSpec) -> GeminiRequest {
    let generation_config = GenerationConfig {
        temperature: 0.4,
        response_mime_type: task
            .response_schema
            .as_ref()
            .map(|_| "application/json".to_string()),
        response_schema: task.response_schema,
    };

    let tools = if task.grounded_search {
        Some(vec![Tool {
            google_search: serde_json::json!({}),
        }])
    } else {
        None
    };

    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part { text: task.prompt }],
        }],
        generation_config,
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: task.system_instruction,
            }],
        },
        tools,
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(response: &GeminiResponse) -> crate::Result<String> {
    let candidate = response.candidates.first().ok_or_else(|| {
        OrchestrationError::InferenceError("No response from Gemini API".to_string())
    })?;

    let text: String = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(OrchestrationError::MalformedResult(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::TaskKind;

    #[test]
    fn test_structured_request_serialization() {
        let task = TaskSpec::structured(
            TaskKind::RiskProfile,
            "You are an expert Financial Risk Analyst.",
            "Answers: {}",
            serde_json::json!({ "type": "OBJECT" }),
        );

        let json = serde_json::to_value(build_request(task)).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(json.get("tools").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Answers: {}");
    }

    #[test]
    fn test_search_request_serialization() {
        let task = TaskSpec::text(TaskKind::MarketScan, "sys", "VIX?").with_search();
        let json = serde_json::to_value(build_request(task)).unwrap();
        assert!(json["tools"][0].get("googleSearch").is_some());
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_endpoint_carries_no_key() {
        let client = GeminiClient::new(
            "AIzaSECRETKEY123".to_string(),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let endpoint = client.endpoint();
        assert!(endpoint.ends_with("/gemini-2.5-flash:generateContent"));
        assert!(!endpoint.contains("AIzaSECRETKEY123"));
    }

    #[tokio::test]
    async fn test_transport_error_hides_key() {
        // Nothing listens on the discard port; the send fails locally
        let client = GeminiClient::new(
            "AIzaSECRETKEY123".to_string(),
            "gemini-2.5-flash".to_string(),
            Duration::from_millis(500),
        )
        .unwrap()
        .with_base_url("http://127.0.0.1:9/v1beta/models");

        let task = TaskSpec::text(TaskKind::Report, "sys", "prompt");
        let err = client.invoke(task).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InferenceError(_)));
        assert!(!err.to_string().contains("AIzaSECRETKEY123"));
        assert!(!err.to_string().contains("127.0.0.1"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] },
                "finishReason": "STOP"
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(extract_text(&response).unwrap(), "Hello world");

        let empty: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(extract_text(&empty).is_err());
    }
}
