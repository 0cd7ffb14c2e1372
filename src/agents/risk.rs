//! Risk profiling stage

use crate::agents::{Stage, StageOutput, StageOverrides};
use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, TaskKind, TaskSpec};
use crate::message::AgentId;
use crate::models::{Language, RiskAnalysisResult};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const REQUIRES: &[BlackboardField] = &[BlackboardField::MissionInputs];

pub struct RiskStage {
    inference: Arc<dyn InferenceService>,
    language: Language,
}

impl RiskStage {
    pub fn new(inference: Arc<dyn InferenceService>, language: Language) -> Self {
        Self {
            inference,
            language,
        }
    }

    fn build_task(&self, answers_json: &str) -> TaskSpec {
        let prompt = format!(
            r#"Analyze the following user investment questionnaire answers and determine their risk profile.

Answers: {}

Task:
1. Determine a Risk Score (0-100).
2. Assign a Risk Level (Conservative, Moderate, Growth, Aggressive).
   Note: The 'level' field MUST be one of these English enum strings.
3. Check for contradictions between answers.
4. Provide a brief explanation."#,
            answers_json
        );

        TaskSpec::structured(
            TaskKind::RiskProfile,
            format!(
                "You are an expert Financial Risk Analyst.{}",
                self.language.instruction()
            ),
            prompt,
            response_schema(),
        )
    }
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "NUMBER" },
            "level": { "type": "STRING", "enum": ["Conservative", "Moderate", "Growth", "Aggressive"] },
            "explanation": { "type": "STRING" },
            "contradictions": { "type": "ARRAY", "items": { "type": "STRING" } },
            "warning": { "type": "STRING" }
        },
        "required": ["score", "level", "explanation"]
    })
}

fn validate(result: &RiskAnalysisResult) -> Result<()> {
    if !result.score.is_finite() || !(0.0..=100.0).contains(&result.score) {
        return Err(OrchestrationError::MalformedResult(format!(
            "Risk score {} outside 0-100",
            result.score
        )));
    }
    if result.explanation.trim().is_empty() {
        return Err(OrchestrationError::MalformedResult(
            "Risk explanation is empty".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Stage for RiskStage {
    fn id(&self) -> AgentId {
        AgentId::Risk
    }

    fn name(&self) -> &'static str {
        "Risk Analysis Agent"
    }

    fn requires(&self) -> &'static [BlackboardField] {
        REQUIRES
    }

    fn produces(&self) -> BlackboardField {
        BlackboardField::RiskResult
    }

    async fn produce(&self, board: &Blackboard, _overrides: &StageOverrides) -> Result<StageOutput> {
        let inputs = board.mission_inputs().ok_or_else(|| {
            OrchestrationError::InvalidInput("Mission inputs missing".to_string())
        })?;

        let answers_json = serde_json::to_string(&inputs.answers)?;
        let result: RiskAnalysisResult = self
            .inference
            .invoke(self.build_task(&answers_json))
            .await?
            .into_structured()?;

        validate(&result)?;

        let summary = format!(
            "Risk profile established: {} ({:.0}/100).",
            result.level, result.score
        );

        Ok(StageOutput {
            payload: Payload::RiskResult(result),
            summary,
        })
    }
}
