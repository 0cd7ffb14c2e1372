//! Report synthesis stage. Terminal: its commit also completes the mission.

use crate::agents::{Stage, StageOutput, StageOverrides};
use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, TaskKind, TaskSpec};
use crate::message::{AgentId, MessageKind};
use crate::models::Language;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

const REQUIRES: &[BlackboardField] = &[
    BlackboardField::RiskResult,
    BlackboardField::Portfolios,
    BlackboardField::Simulation,
];

pub struct ReportStage {
    inference: Arc<dyn InferenceService>,
    language: Language,
}

impl ReportStage {
    pub fn new(inference: Arc<dyn InferenceService>, language: Language) -> Self {
        Self {
            inference,
            language,
        }
    }

    fn build_prompt(board: &Blackboard) -> Result<String> {
        let risk = serde_json::to_string(&board.risk_result())?;
        let portfolios = serde_json::to_string(&board.portfolios())?;
        let final_point = serde_json::to_string(&board.simulation().and_then(|s| s.last()))?;
        let market = board.market_context().unwrap_or_default();

        Ok(format!(
            r#"Generate a comprehensive investment report in Markdown format.

**Executive Inputs**:
1. Risk Profile: {}
2. Real-Time Market Analysis: "{}"
3. Recommended Portfolios: {}
4. Simulation Summary (Final Year): {}

**Report Structure**:
1. **Executive Summary**
2. **Market Pulse**: the real-time data retrieved (indices, VIX, etc.)
3. **Risk Analysis**: why the user fits this profile
4. **Portfolio Strategy**: the recommended assets and why they fit the market pulse
5. **Future Outlook**: the simulation results
6. **Actionable Next Steps**"#,
            risk, market, portfolios, final_point
        ))
    }
}

#[async_trait]
impl Stage for ReportStage {
    fn id(&self) -> AgentId {
        AgentId::Report
    }

    fn name(&self) -> &'static str {
        "Report Agent"
    }

    fn requires(&self) -> &'static [BlackboardField] {
        REQUIRES
    }

    fn produces(&self) -> BlackboardField {
        BlackboardField::Report
    }

    fn emits(&self) -> MessageKind {
        MessageKind::MissionComplete
    }

    async fn produce(&self, board: &Blackboard, _overrides: &StageOverrides) -> Result<StageOutput> {
        if !board.has_all(REQUIRES) {
            return Err(OrchestrationError::InvalidInput(
                "Report inputs incomplete".to_string(),
            ));
        }

        let task = TaskSpec::text(
            TaskKind::Report,
            format!(
                "You are a Senior Investment Advisor writing a formal report.{}",
                self.language.instruction()
            ),
            Self::build_prompt(board)?,
        );

        let report = self.inference.invoke(task).await?.into_text()?;

        Ok(StageOutput {
            payload: Payload::Report(report),
            summary: "Investment report ready. Mission complete.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{canned_result, MockInference};
    use crate::models::{PortfolioRecommendation, RiskAnalysisResult, SimulationPoint};

    fn complete_board(with_market: bool) -> Blackboard {
        let mut board = Blackboard::new();
        let risk: RiskAnalysisResult = canned_result(TaskKind::RiskProfile).into_structured().unwrap();
        let portfolios: Vec<PortfolioRecommendation> =
            canned_result(TaskKind::PortfolioDesign).into_structured().unwrap();
        let points: Vec<SimulationPoint> = canned_result(TaskKind::Simulation).into_structured().unwrap();
        board.merge(Payload::RiskResult(risk));
        board.merge(Payload::Portfolios(portfolios));
        board.merge(Payload::Simulation(points));
        if with_market {
            board.merge(Payload::MarketContext("VIX 15".to_string()));
        }
        board
    }

    #[test]
    fn test_prompt_uses_final_simulation_year() {
        let prompt = ReportStage::build_prompt(&complete_board(true)).unwrap();
        assert!(prompt.contains("\"year\":10"));
        assert!(!prompt.contains("\"year\":9,"));
        assert!(prompt.contains("VIX 15"));
    }

    #[tokio::test]
    async fn test_runs_without_market_context() {
        let stage = ReportStage::new(Arc::new(MockInference::new()), Language::En);
        let output = stage
            .produce(&complete_board(false), &StageOverrides::default())
            .await
            .unwrap();
        assert_eq!(output.payload.field(), BlackboardField::Report);
        assert_eq!(stage.emits(), MessageKind::MissionComplete);
    }
}
