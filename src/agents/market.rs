//! Market context stage, grounded by live search

use crate::agents::{Stage, StageOutput, StageOverrides};
use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::inference::{InferenceService, TaskKind, TaskSpec};
use crate::message::AgentId;
use crate::models::{Language, MarketPreference};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

const REQUIRES: &[BlackboardField] = &[BlackboardField::MissionInputs];

pub struct MarketStage {
    inference: Arc<dyn InferenceService>,
    language: Language,
}

impl MarketStage {
    pub fn new(inference: Arc<dyn InferenceService>, language: Language) -> Self {
        Self {
            inference,
            language,
        }
    }

    fn build_task(&self, market: MarketPreference) -> TaskSpec {
        let prompt = format!(
            r#"You are a Market Data Agent. Fetch REAL-TIME financial data to support investment decisions.

Search reliable sources such as Yahoo Finance or Bloomberg for:
1. Current index levels for: {}.
2. Current CBOE VIX (Volatility Index).
3. Top 3 financial news headlines today affecting these markets.

Summarize the market sentiment (Bullish/Bearish/Neutral) and the key data points.
Keep the summary concise but data-rich."#,
            search_focus(market)
        );

        TaskSpec::text(
            TaskKind::MarketScan,
            format!(
                "You are a professional Market Data Analyst. You MUST use web search to find the latest market data. Do not hallucinate numbers.{}",
                self.language.instruction()
            ),
            prompt,
        )
        .with_search()
    }
}

pub(crate) fn search_focus(market: MarketPreference) -> &'static str {
    match market {
        MarketPreference::Tw => "Taiwan Stock Exchange (TAIEX), USD/TWD exchange rate",
        MarketPreference::Us => "S&P 500, NASDAQ 100, US 10Y Treasury Yield",
        MarketPreference::Both => "S&P 500, TAIEX, US 10Y Treasury Yield, USD/TWD",
    }
}

#[async_trait]
impl Stage for MarketStage {
    fn id(&self) -> AgentId {
        AgentId::Market
    }

    fn name(&self) -> &'static str {
        "Market Data Agent"
    }

    fn requires(&self) -> &'static [BlackboardField] {
        REQUIRES
    }

    fn produces(&self) -> BlackboardField {
        BlackboardField::MarketContext
    }

    async fn produce(&self, board: &Blackboard, _overrides: &StageOverrides) -> Result<StageOutput> {
        let market = board
            .mission_inputs()
            .map(|inputs| inputs.market)
            .unwrap_or_default();

        let context = self
            .inference
            .invoke(self.build_task(market))
            .await?
            .into_text()?;

        Ok(StageOutput {
            payload: Payload::MarketContext(context),
            summary: format!("Market context retrieved for {} markets.", market),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{MockInference, StageResult};
    use crate::models::MissionInputs;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_search_focus_follows_preference() {
        let mock = MockInference::new().with_responder(TaskKind::MarketScan, |task| {
            assert!(task.grounded_search);
            assert!(task.prompt.contains("TAIEX"));
            assert!(!task.prompt.contains("NASDAQ"));
            Ok(StageResult::Text("TAIEX 20,400, sentiment Bullish".to_string()))
        });
        let stage = MarketStage::new(Arc::new(mock), Language::En);

        let mut answers = BTreeMap::new();
        answers.insert("q1".to_string(), "growth".to_string());
        let board = Blackboard::for_mission(MissionInputs::new(answers, MarketPreference::Tw));

        let output = stage.produce(&board, &StageOverrides::default()).await.unwrap();
        assert_eq!(
            output.payload,
            Payload::MarketContext("TAIEX 20,400, sentiment Bullish".to_string())
        );
        assert_eq!(output.summary, "Market context retrieved for TW markets.");
    }

    #[test]
    fn test_both_covers_all_indices() {
        let focus = search_focus(MarketPreference::Both);
        for needle in ["S&P 500", "TAIEX", "US 10Y", "USD/TWD"] {
            assert!(focus.contains(needle));
        }
    }
}
