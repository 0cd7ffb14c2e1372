//! Portfolio design stage: the join point of risk and market analysis

use crate::agents::{Stage, StageOutput, StageOverrides};
use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, TaskKind, TaskSpec};
use crate::message::AgentId;
use crate::models::{Language, MarketPreference, PortfolioRecommendation, RiskAnalysisResult};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const REQUIRES: &[BlackboardField] = &[BlackboardField::RiskResult, BlackboardField::MarketContext];

const DEFAULT_PREFERENCES: &str = "No specific preferences.";

pub struct PortfolioStage {
    inference: Arc<dyn InferenceService>,
    language: Language,
}

impl PortfolioStage {
    pub fn new(inference: Arc<dyn InferenceService>, language: Language) -> Self {
        Self {
            inference,
            language,
        }
    }

    fn build_task(
        &self,
        risk: &RiskAnalysisResult,
        market: MarketPreference,
        market_context: &str,
        preferences: &str,
    ) -> TaskSpec {
        let prompt = format!(
            r#"Act as a Senior Portfolio Manager.

**Real-Time Market Context provided by the Market Data Agent**:
"{}"

**User Profile**:
- Risk Level: {} ({:.0}/100)
- Market Preference: {}
- User Preferences: {}
- Constraint: {}

Task:
Design 2 distinct investment portfolios based on the risk profile and the market data.
1. **Recommended Portfolio**: matches the risk profile.
2. **Alternative Portfolio**: a different strategic approach (e.g. higher yield vs higher growth).

Formatting rules:
1. 'category' MUST be one of ['Stocks', 'Bonds', 'Cash', 'Commodities', 'Real Estate', 'Crypto'].
2. 'reasoning' MUST explain why the asset fits the market context above.
3. 'expectedReturn' and 'volatility' MUST be PERCENTAGES (8.5 for 8.5%, NOT 0.085)."#,
            market_context,
            risk.level,
            risk.score,
            market,
            preferences,
            market_constraint(market),
        );

        TaskSpec::structured(
            TaskKind::PortfolioDesign,
            format!(
                "You are a Portfolio Manager. Construct portfolios using real tickers based on the provided market data.{}",
                self.language.instruction()
            ),
            prompt,
            response_schema(),
        )
    }
}

fn market_constraint(market: MarketPreference) -> &'static str {
    match market {
        MarketPreference::Tw => "STRICT: use ONLY Taiwan Stock Exchange (TWSE) or TPEx tickers (e.g. 2330.TW, 0050.TW). Do NOT recommend US stocks.",
        MarketPreference::Us => "STRICT: use ONLY US market tickers (e.g. AAPL, VTI, BND). Do NOT recommend Taiwan stocks.",
        MarketPreference::Both => "Build a globally diversified portfolio mixing US tickers for global exposure and Taiwan tickers (e.g. 2330.TW) for local exposure.",
    }
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "description": { "type": "STRING" },
                "expectedReturn": { "type": "NUMBER", "description": "Annual return percentage (e.g. 7.5 for 7.5%)" },
                "volatility": { "type": "NUMBER", "description": "Annual volatility percentage (e.g. 12.5 for 12.5%)" },
                "assets": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "name": { "type": "STRING" },
                            "ticker": { "type": "STRING" },
                            "category": { "type": "STRING", "enum": ["Stocks", "Bonds", "Cash", "Commodities", "Real Estate", "Crypto"] },
                            "percentage": { "type": "NUMBER" },
                            "reasoning": { "type": "STRING" }
                        },
                        "required": ["name", "ticker", "category", "percentage", "reasoning"]
                    }
                }
            },
            "required": ["name", "description", "assets", "expectedReturn", "volatility"]
        }
    })
}

fn validate(portfolios: &[PortfolioRecommendation]) -> Result<()> {
    if portfolios.is_empty() {
        return Err(OrchestrationError::MalformedResult(
            "No portfolios returned".to_string(),
        ));
    }

    for p in portfolios {
        if p.assets.is_empty() {
            return Err(OrchestrationError::MalformedResult(format!(
                "Portfolio '{}' has no assets",
                p.name
            )));
        }
        if !p.expected_return.is_finite() || !p.volatility.is_finite() {
            return Err(OrchestrationError::MalformedResult(format!(
                "Portfolio '{}' has non-numeric return or volatility",
                p.name
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl Stage for PortfolioStage {
    fn id(&self) -> AgentId {
        AgentId::Portfolio
    }

    fn name(&self) -> &'static str {
        "Portfolio Design Agent"
    }

    fn requires(&self) -> &'static [BlackboardField] {
        REQUIRES
    }

    fn produces(&self) -> BlackboardField {
        BlackboardField::Portfolios
    }

    async fn produce(&self, board: &Blackboard, overrides: &StageOverrides) -> Result<StageOutput> {
        let risk = board.risk_result().ok_or_else(|| {
            OrchestrationError::InvalidInput("Risk result missing".to_string())
        })?;
        let market = board
            .mission_inputs()
            .map(|inputs| inputs.market)
            .unwrap_or_default();
        let market_context = board.market_context().unwrap_or_default();
        let preferences = overrides
            .preferences
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PREFERENCES);

        let portfolios: Vec<PortfolioRecommendation> = self
            .inference
            .invoke(self.build_task(risk, market, market_context, preferences))
            .await?
            .into_structured()?;

        validate(&portfolios)?;

        let summary = format!(
            "Designed {} portfolio(s); recommended: {}.",
            portfolios.len(),
            portfolios[0].name
        );

        Ok(StageOutput {
            payload: Payload::Portfolios(portfolios),
            summary,
        })
    }
}
