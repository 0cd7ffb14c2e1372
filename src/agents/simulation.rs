//! Outcome simulation stage

use crate::agents::{check_horizon, Stage, StageOutput, StageOverrides};
use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, TaskKind, TaskSpec};
use crate::message::AgentId;
use crate::models::{PortfolioRecommendation, SimulationPoint};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const REQUIRES: &[BlackboardField] = &[BlackboardField::Portfolios];

pub struct SimulationStage {
    inference: Arc<dyn InferenceService>,
    years: u32,
}

impl SimulationStage {
    pub fn new(inference: Arc<dyn InferenceService>, years: u32) -> Self {
        Self { inference, years }
    }

    fn build_task(&self, portfolio_json: &str, years: u32) -> TaskSpec {
        let prompt = format!(
            r#"Run a Monte Carlo style simulation for this portfolio over {} years.
Portfolio: {}

Generate 3 scenarios: optimistic, expected, pessimistic.
Include 'shockEvent' (e.g. 2008 Financial Crisis or Covid crash magnitude) in one random year.
Start value 100.

If the expected return is given as a decimal (0.07) treat it as 7%; if given as a percentage (7) treat it as 7%.
Output values are asset values (e.g. 107.5)."#,
            years, portfolio_json
        );

        TaskSpec::structured(
            TaskKind::Simulation,
            "You are a Quantitative Analyst.",
            prompt,
            response_schema(),
        )
    }
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "year": { "type": "INTEGER" },
                "optimistic": { "type": "NUMBER" },
                "expected": { "type": "NUMBER" },
                "pessimistic": { "type": "NUMBER" },
                "shockEvent": { "type": "NUMBER", "nullable": true }
            },
            "required": ["year", "optimistic", "expected", "pessimistic"]
        }
    })
}

fn horizon(requested: Option<u32>, default: u32) -> Result<u32> {
    check_horizon(requested.unwrap_or(default))
}

#[async_trait]
impl Stage for SimulationStage {
    fn id(&self) -> AgentId {
        AgentId::Simulation
    }

    fn name(&self) -> &'static str {
        "Simulation Agent"
    }

    fn requires(&self) -> &'static [BlackboardField] {
        REQUIRES
    }

    fn produces(&self) -> BlackboardField {
        BlackboardField::Simulation
    }

    async fn produce(&self, board: &Blackboard, overrides: &StageOverrides) -> Result<StageOutput> {
        let portfolio: &PortfolioRecommendation = board
            .portfolios()
            .and_then(|p| p.first())
            .ok_or_else(|| OrchestrationError::InvalidInput("No portfolio to simulate".to_string()))?;
        let years = horizon(overrides.horizon_years, self.years)?;

        let portfolio_json = serde_json::to_string(portfolio)?;
        let mut points: Vec<SimulationPoint> = self
            .inference
            .invoke(self.build_task(&portfolio_json, years))
            .await?
            .into_structured()?;

        if points.is_empty() {
            return Err(OrchestrationError::MalformedResult(
                "Simulation returned no points".to_string(),
            ));
        }
        points.sort_by_key(|p| p.year);

        let summary = match points.last() {
            Some(last) => format!(
                "Simulated '{}' over {} years: expected value {:.1} (range {:.1}-{:.1}).",
                portfolio.name, years, last.expected, last.pessimistic, last.optimistic
            ),
            None => format!("Simulated '{}' over {} years.", portfolio.name, years),
        };

        Ok(StageOutput {
            payload: Payload::Simulation(points),
            summary,
        })
    }
}
