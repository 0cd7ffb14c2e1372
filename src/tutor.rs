//! Education tutor
//!
//! Quick Q&A outside the mission cascade. Answers are grounded in whatever
//! the current blackboard holds but never written back to it.

use crate::blackboard::Blackboard;
use crate::error::OrchestrationError;
use crate::inference::{InferenceService, StageResult, TaskKind, TaskSpec};
use crate::models::Language;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const CONTEXT_PREVIEW_CHARS: usize = 50;
const FALLBACK_ANSWER: &str = "I couldn't explain that right now.";

/// Tutor answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorResponse {
    pub answer: String,
    pub context_used: String,
}

pub struct Tutor {
    inference: Arc<dyn InferenceService>,
    language: Language,
}

impl Tutor {
    pub fn new(inference: Arc<dyn InferenceService>, language: Language) -> Self {
        Self {
            inference,
            language,
        }
    }

    /// Explain a financial concept in plain terms
    pub async fn explain(
        &self,
        query: &str,
        board: &Blackboard,
        focus: Option<&str>,
    ) -> Result<TutorResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "Tutor query cannot be empty".to_string(),
            ));
        }

        let context = build_context(board, focus);
        info!(focus = focus.unwrap_or("overview"), "Tutor query");

        let task = TaskSpec::text(
            TaskKind::Tutor,
            format!(
                "You are a helpful Investment Tutor. Explain financial concepts simply (ELI5).{}",
                self.language.instruction()
            ),
            format!("User Query: \"{}\"\nContext: {}", query, context),
        );

        let answer = match self.inference.invoke(task).await? {
            StageResult::Text(text) if !text.trim().is_empty() => text,
            StageResult::Structured(value) => value.to_string(),
            StageResult::Text(_) => {
                warn!("Tutor returned empty text");
                FALLBACK_ANSWER.to_string()
            }
        };

        Ok(TutorResponse {
            answer,
            context_used: context,
        })
    }
}

/// One-line summary of what the user is looking at
pub fn build_context(board: &Blackboard, focus: Option<&str>) -> String {
    let mut ctx = format!(
        "User is currently viewing the {} tab. ",
        focus.filter(|f| !f.trim().is_empty()).unwrap_or("overview")
    );

    if let Some(risk) = board.risk_result() {
        ctx.push_str(&format!("Risk Profile: {}. ", risk.level));
    }
    if let Some(market) = board.market_context() {
        let preview: String = market.chars().take(CONTEXT_PREVIEW_CHARS).collect();
        ctx.push_str(&format!("Market Context: {}... ", preview));
    }
    if let Some(first) = board.portfolios().and_then(|p| p.first()) {
        ctx.push_str(&format!("Portfolio selected: {}. ", first.name));
    }

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Payload;
    use crate::inference::MockInference;
    use crate::models::{RiskAnalysisResult, RiskLevel};

    #[test]
    fn test_context_on_empty_board() {
        let ctx = build_context(&Blackboard::new(), None);
        assert_eq!(ctx, "User is currently viewing the overview tab. ");
    }

    #[test]
    fn test_context_truncates_market_on_char_boundary() {
        let mut board = Blackboard::new();
        board.merge(Payload::RiskResult(RiskAnalysisResult {
            score: 30.0,
            level: RiskLevel::Conservative,
            explanation: "Short horizon".to_string(),
            contradictions: vec![],
            warning: None,
        }));
        board.merge(Payload::MarketContext("加權指數".repeat(30)));

        let ctx = build_context(&board, Some("market"));
        assert!(ctx.starts_with("User is currently viewing the market tab. "));
        assert!(ctx.contains("Risk Profile: Conservative. "));
        assert!(ctx.contains(&format!("Market Context: {}... ", "加權指數".repeat(13).chars().take(50).collect::<String>())));
    }

    #[tokio::test]
    async fn test_explain_sends_query_and_context() {
        let mock = MockInference::new().with_responder(TaskKind::Tutor, |task| {
            assert!(task.prompt.starts_with("User Query: \"What is VIX?\""));
            assert!(task.system_instruction.contains("ELI5"));
            assert!(task.system_instruction.contains("Traditional Chinese"));
            Ok(StageResult::Text("VIX measures expected volatility.".to_string()))
        });
        let tutor = Tutor::new(Arc::new(mock), Language::ZhTw);

        let response = tutor
            .explain("What is VIX?", &Blackboard::new(), Some("report"))
            .await
            .unwrap();
        assert_eq!(response.answer, "VIX measures expected volatility.");
        assert!(response.context_used.contains("report tab"));
    }

    #[tokio::test]
    async fn test_blank_answer_falls_back() {
        let mock = MockInference::new().with_response(TaskKind::Tutor, StageResult::Text("  ".to_string()));
        let tutor = Tutor::new(Arc::new(mock), Language::En);

        let response = tutor.explain("ETF?", &Blackboard::new(), None).await.unwrap();
        assert_eq!(response.answer, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let tutor = Tutor::new(Arc::new(MockInference::new()), Language::En);
        let err = tutor.explain("   ", &Blackboard::new(), None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidInput(_)));
    }
}
