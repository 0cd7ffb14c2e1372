//! Inference service boundary
//!
//! Stages describe their work as a [`TaskSpec`]; an [`InferenceService`]
//! turns it into either structured JSON or free text.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Which task an inference call serves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    RiskProfile,
    MarketScan,
    PortfolioDesign,
    Simulation,
    Report,
    Tutor,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::RiskProfile => "risk_profile",
            TaskKind::MarketScan => "market_scan",
            TaskKind::PortfolioDesign => "portfolio_design",
            TaskKind::Simulation => "simulation",
            TaskKind::Report => "report",
            TaskKind::Tutor => "tutor",
        };
        write!(f, "{}", s)
    }
}

/// A single request to the inference service
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub system_instruction: String,
    pub prompt: String,
    /// When set, the service must answer with JSON matching this schema
    pub response_schema: Option<Value>,
    /// Allow the service to ground its answer with live web search
    pub grounded_search: bool,
}

impl TaskSpec {
    pub fn text(kind: TaskKind, system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            response_schema: None,
            grounded_search: false,
        }
    }

    pub fn structured(
        kind: TaskKind,
        system_instruction: impl Into<String>,
        prompt: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            response_schema: Some(schema),
            ..Self::text(kind, system_instruction, prompt)
        }
    }

    pub fn with_search(mut self) -> Self {
        self.grounded_search = true;
        self
    }
}

/// Raw answer from the inference service
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Structured(Value),
    Text(String),
}

impl StageResult {
    /// Decode into the stage's output shape
    pub fn into_structured<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            StageResult::Structured(value) => value,
            StageResult::Text(text) => {
                let cleaned = strip_code_fence(&text);
                serde_json::from_str(cleaned).map_err(|e| {
                    OrchestrationError::MalformedResult(format!(
                        "Expected JSON: {} | raw={}",
                        e, text
                    ))
                })?
            }
        };

        serde_json::from_value(value)
            .map_err(|e| OrchestrationError::MalformedResult(format!("Unexpected shape: {}", e)))
    }

    /// Free text; blank answers are rejected
    pub fn into_text(self) -> Result<String> {
        let text = match self {
            StageResult::Text(text) => text,
            StageResult::Structured(Value::String(text)) => text,
            StageResult::Structured(other) => other.to_string(),
        };

        if text.trim().is_empty() {
            return Err(OrchestrationError::MalformedResult(
                "Empty text response".to_string(),
            ));
        }

        Ok(text)
    }
}

fn strip_code_fence(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Trait for the external inference collaborator
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn invoke(&self, task: TaskSpec) -> Result<StageResult>;
}

type Responder = Arc<dyn Fn(&TaskSpec) -> Result<StageResult> + Send + Sync>;

/// Mock inference for development & testing
/// Keeps system functional without LLM dependency
pub struct MockInference {
    responders: HashMap<TaskKind, Responder>,
    delays: HashMap<TaskKind, Duration>,
    remaining_failures: Mutex<HashMap<TaskKind, usize>>,
    calls: Mutex<HashMap<TaskKind, usize>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
            delays: HashMap::new(),
            remaining_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fixed answer for `kind`
    pub fn with_response(self, kind: TaskKind, result: StageResult) -> Self {
        self.with_responder(kind, move |_| Ok(result.clone()))
    }

    /// Answer computed from the task
    pub fn with_responder<F>(mut self, kind: TaskKind, responder: F) -> Self
    where
        F: Fn(&TaskSpec) -> Result<StageResult> + Send + Sync + 'static,
    {
        self.responders.insert(kind, Arc::new(responder));
        self
    }

    pub fn with_delay(mut self, kind: TaskKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    /// Fail the next `times` calls for `kind`
    pub fn fail_times(mut self, kind: TaskKind, times: usize) -> Self {
        self.remaining_failures.get_mut().insert(kind, times);
        self
    }

    pub fn always_fail(self, kind: TaskKind) -> Self {
        self.fail_times(kind, usize::MAX)
    }

    /// Number of calls received for `kind`, failed ones included
    pub async fn calls(&self, kind: TaskKind) -> usize {
        self.calls.lock().await.get(&kind).copied().unwrap_or(0)
    }
}

impl Default for MockInference {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceService for MockInference {
    async fn invoke(&self, task: TaskSpec) -> Result<StageResult> {
        *self.calls.lock().await.entry(task.kind).or_insert(0) += 1;

        if let Some(delay) = self.delays.get(&task.kind) {
            tokio::time::sleep(*delay).await;
        }

        {
            let mut failures = self.remaining_failures.lock().await;
            if let Some(remaining) = failures.get_mut(&task.kind) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    return Err(OrchestrationError::InferenceError(format!(
                        "Scripted failure for {}",
                        task.kind
                    )));
                }
            }
        }

        match self.responders.get(&task.kind) {
            Some(responder) => responder(&task),
            None => Ok(canned_result(task.kind)),
        }
    }
}

/// Deterministic default answers, one per task kind
pub fn canned_result(kind: TaskKind) -> StageResult {
    match kind {
        TaskKind::RiskProfile => StageResult::Structured(json!({
            "score": 58,
            "level": "Moderate",
            "explanation": "Medium horizon with a hold-through-drawdown attitude.",
            "contradictions": []
        })),
        TaskKind::MarketScan => StageResult::Text(
            "Sentiment: Neutral. S&P 500 5,210; TAIEX 20,400; US 10Y 4.25%; USD/TWD 32.1; VIX 15.3."
                .to_string(),
        ),
        TaskKind::PortfolioDesign => StageResult::Structured(json!([
            {
                "name": "Balanced Core",
                "description": "Recommended allocation for a moderate profile.",
                "expectedReturn": 6.5,
                "volatility": 10.5,
                "assets": [
                    { "name": "Vanguard Total Stock Market", "ticker": "VTI", "category": "Stocks", "percentage": 45, "reasoning": "Broad US equity exposure." },
                    { "name": "Yuanta Taiwan Top 50", "ticker": "0050.TW", "category": "Stocks", "percentage": 15, "reasoning": "Local large-cap exposure." },
                    { "name": "Vanguard Total Bond Market", "ticker": "BND", "category": "Bonds", "percentage": 35, "reasoning": "Yields are attractive at current levels." },
                    { "name": "Cash Reserve", "ticker": "CASH", "category": "Cash", "percentage": 5, "reasoning": "Liquidity buffer." }
                ]
            },
            {
                "name": "Income Tilt",
                "description": "Alternative with a higher yield focus.",
                "expectedReturn": 5.5,
                "volatility": 8.0,
                "assets": [
                    { "name": "Schwab US Dividend Equity", "ticker": "SCHD", "category": "Stocks", "percentage": 40, "reasoning": "Dividend growth." },
                    { "name": "iShares 7-10 Year Treasury", "ticker": "IEF", "category": "Bonds", "percentage": 50, "reasoning": "Duration at elevated yields." },
                    { "name": "Vanguard Real Estate", "ticker": "VNQ", "category": "Real Estate", "percentage": 10, "reasoning": "Income diversification." }
                ]
            }
        ])),
        TaskKind::Simulation => {
            let points: Vec<Value> = (0..=10u32)
                .map(|year| {
                    let y = year as i32;
                    let mut point = json!({
                        "year": year,
                        "optimistic": round2(100.0 * 1.09f64.powi(y)),
                        "expected": round2(100.0 * 1.065f64.powi(y)),
                        "pessimistic": round2(100.0 * 1.02f64.powi(y)),
                    });
                    if year == 4 {
                        point["shockEvent"] = json!(round2(100.0 * 1.065f64.powi(y) * 0.7));
                    }
                    point
                })
                .collect();
            StageResult::Structured(Value::Array(points))
        }
        TaskKind::Report => StageResult::Text(
            "# Investment Report\n\n## Executive Summary\nA moderate, globally diversified allocation.\n"
                .to_string(),
        ),
        TaskKind::Tutor => StageResult::Text(
            "Think of volatility as how bumpy the ride is, not where you end up.".to_string(),
        ),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PortfolioRecommendation, RiskAnalysisResult, SimulationPoint};

    #[test]
    fn test_canned_results_decode() {
        let risk: RiskAnalysisResult = canned_result(TaskKind::RiskProfile)
            .into_structured()
            .unwrap();
        assert_eq!(risk.score, 58.0);

        let portfolios: Vec<PortfolioRecommendation> = canned_result(TaskKind::PortfolioDesign)
            .into_structured()
            .unwrap();
        assert_eq!(portfolios.len(), 2);
        assert_eq!(portfolios[0].total_allocation(), 100.0);

        let points: Vec<SimulationPoint> = canned_result(TaskKind::Simulation)
            .into_structured()
            .unwrap();
        assert_eq!(points.len(), 11);
        assert!(points[4].shock_event.is_some());
    }

    #[test]
    fn test_fenced_text_is_parsed_as_json() {
        let result = StageResult::Text("```json\n{\"score\": 10, \"level\": \"Conservative\", \"explanation\": \"x\"}\n```".to_string());
        let risk: RiskAnalysisResult = result.into_structured().unwrap();
        assert_eq!(risk.score, 10.0);
    }

    #[test]
    fn test_bad_shapes_are_malformed() {
        let result = StageResult::Text("not json".to_string());
        let err = result.into_structured::<RiskAnalysisResult>().unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedResult(_)));

        let err = StageResult::Text("   ".to_string()).into_text().unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedResult(_)));
    }

    #[tokio::test]
    async fn test_mock_scripted_failures_then_success() {
        let mock = MockInference::new().fail_times(TaskKind::Report, 1);
        let task = TaskSpec::text(TaskKind::Report, "sys", "prompt");

        assert!(mock.invoke(task.clone()).await.is_err());
        assert!(mock.invoke(task).await.is_ok());
        assert_eq!(mock.calls(TaskKind::Report).await, 2);
        assert_eq!(mock.calls(TaskKind::Tutor).await, 0);
    }
}
