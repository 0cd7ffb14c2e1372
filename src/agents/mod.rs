//! Agent trait and the five pipeline stages
//!
//! An agent inspects each broadcast message together with the blackboard and
//! decides on its own whether to act. Stages only describe what they need,
//! what they produce and how to produce it; [`StageAgent`] supplies the guard
//! and commit protocol shared by all of them.

use crate::blackboard::{Blackboard, BlackboardField, Payload};
use crate::error::OrchestrationError;
use crate::inference::InferenceService;
use crate::message::{AgentId, Message, MessageKind};
use crate::models::Language;
use crate::orchestrator::BlackboardView;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub mod market;
pub mod portfolio;
pub mod report;
pub mod risk;
pub mod simulation;

pub use market::MarketStage;
pub use portfolio::PortfolioStage;
pub use report::ReportStage;
pub use risk::RiskStage;
pub use simulation::SimulationStage;

/// Trait for an autonomous agent on the bus
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;

    fn name(&self) -> &'static str;

    /// React to `message`. `Ok(None)` means the agent's guard did not pass,
    /// which is not an error.
    async fn evaluate(&self, message: &Message, board: &BlackboardView) -> Result<Option<Message>>;

    /// Manual re-run that ignores whether the output already exists.
    /// Agents without a re-run path return `Ok(None)`.
    async fn rerun(
        &self,
        _board: &BlackboardView,
        _overrides: &StageOverrides,
    ) -> Result<Option<Message>> {
        Ok(None)
    }
}

/// Longest simulation horizon accepted from config or a re-run
pub const MAX_HORIZON_YEARS: u32 = 50;

/// Reject horizons outside `1..=MAX_HORIZON_YEARS`
pub fn check_horizon(years: u32) -> Result<u32> {
    if years == 0 || years > MAX_HORIZON_YEARS {
        return Err(OrchestrationError::InvalidInput(format!(
            "Simulation horizon must be 1-{} years, got {}",
            MAX_HORIZON_YEARS, years
        )));
    }
    Ok(years)
}

/// Per-run adjustments accepted by manual re-runs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageOverrides {
    #[serde(default)]
    pub preferences: Option<String>,
    #[serde(default)]
    pub horizon_years: Option<u32>,
}

impl StageOverrides {
    /// Caller-side checks, run before any stage is invoked
    pub fn validate(&self) -> Result<()> {
        if let Some(years) = self.horizon_years {
            check_horizon(years)?;
        }
        Ok(())
    }
}

/// Shared stage configuration
#[derive(Debug, Clone, Copy)]
pub struct StageSettings {
    pub language: Language,
    pub simulation_years: u32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            language: Language::En,
            simulation_years: 10,
        }
    }
}

/// What a stage hands back after a successful inference call
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub payload: Payload,
    pub summary: String,
}

/// One pipeline stage: owns exactly one blackboard field
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> AgentId;

    fn name(&self) -> &'static str;

    /// Fields that must be present before the stage may run
    fn requires(&self) -> &'static [BlackboardField];

    fn produces(&self) -> BlackboardField;

    fn emits(&self) -> MessageKind {
        MessageKind::DataAvailable
    }

    async fn produce(&self, board: &Blackboard, overrides: &StageOverrides) -> Result<StageOutput>;
}

/// Adapts a [`Stage`] to the [`Agent`] contract
pub struct StageAgent<S> {
    stage: S,
}

impl<S: Stage> StageAgent<S> {
    pub fn new(stage: S) -> Self {
        Self { stage }
    }

    /// Preconditions present and own output still absent
    pub fn guard_open(&self, board: &Blackboard) -> bool {
        board.has_all(self.stage.requires()) && !board.has(self.stage.produces())
    }

    async fn run_stage(&self, board: &Blackboard, overrides: &StageOverrides) -> Result<StageOutput> {
        let output = self.stage.produce(board, overrides).await?;

        if output.payload.field() != self.stage.produces() {
            return Err(OrchestrationError::MalformedResult(format!(
                "{} produced {} instead of {}",
                self.stage.name(),
                output.payload.field(),
                self.stage.produces()
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl<S: Stage> Agent for StageAgent<S> {
    fn id(&self) -> AgentId {
        self.stage.id()
    }

    fn name(&self) -> &'static str {
        self.stage.name()
    }

    async fn evaluate(&self, message: &Message, view: &BlackboardView) -> Result<Option<Message>> {
        let Some(board) = view.current().await else {
            return Ok(None);
        };

        if !self.guard_open(&board) {
            return Ok(None);
        }

        debug!(
            agent = %self.stage.id(),
            trigger = ?message.kind(),
            "Guard open, invoking stage"
        );
        view.announce(self.stage.id()).await;

        let output = self.run_stage(&board, &StageOverrides::default()).await?;

        // The inference call suspended; the field may have been committed meanwhile.
        match view.current().await {
            Some(fresh) if !fresh.has(self.stage.produces()) => {}
            _ => {
                debug!(agent = %self.stage.id(), "Output superseded before commit, dropping");
                return Ok(None);
            }
        }

        Ok(Some(Message::broadcast(
            self.stage.id(),
            self.stage.emits(),
            output.summary,
            Some(output.payload),
        )))
    }

    async fn rerun(
        &self,
        view: &BlackboardView,
        overrides: &StageOverrides,
    ) -> Result<Option<Message>> {
        let Some(board) = view.current().await else {
            return Ok(None);
        };

        if !board.has_all(self.stage.requires()) {
            return Ok(None);
        }

        view.announce(self.stage.id()).await;
        let output = self.run_stage(&board, overrides).await?;

        Ok(Some(Message::broadcast(
            self.stage.id(),
            self.stage.emits(),
            format!("Manual re-run: {}", output.summary),
            Some(output.payload),
        )))
    }
}

/// The fixed five-stage pipeline, in registry order
pub fn create_default_agents(
    inference: Arc<dyn InferenceService>,
    settings: StageSettings,
) -> Vec<Arc<dyn Agent>> {
    let risk: Arc<dyn Agent> = Arc::new(StageAgent::new(RiskStage::new(
        inference.clone(),
        settings.language,
    )));
    let market: Arc<dyn Agent> = Arc::new(StageAgent::new(MarketStage::new(
        inference.clone(),
        settings.language,
    )));
    let portfolio: Arc<dyn Agent> = Arc::new(StageAgent::new(PortfolioStage::new(
        inference.clone(),
        settings.language,
    )));
    let simulation: Arc<dyn Agent> = Arc::new(StageAgent::new(SimulationStage::new(
        inference.clone(),
        settings.simulation_years,
    )));
    let report: Arc<dyn Agent> = Arc::new(StageAgent::new(ReportStage::new(
        inference,
        settings.language,
    )));

    vec![risk, market, portfolio, simulation, report]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{MockInference, TaskKind};
    use crate::models::{MarketPreference, MissionInputs};
    use std::collections::BTreeMap;

    fn inputs() -> MissionInputs {
        let mut answers = BTreeMap::new();
        answers.insert("q1".to_string(), "moderate".to_string());
        MissionInputs::new(answers, MarketPreference::Us)
    }

    fn start() -> Message {
        Message::broadcast(AgentId::System, MessageKind::MissionStart, "start", None)
    }

    #[tokio::test]
    async fn test_guard_passes_then_emits_owned_field() {
        let mock = Arc::new(MockInference::new());
        let agent = StageAgent::new(RiskStage::new(mock.clone(), Language::En));
        let view = BlackboardView::detached(Blackboard::for_mission(inputs()));

        let reply = agent.evaluate(&start(), &view).await.unwrap().unwrap();
        assert_eq!(reply.from(), AgentId::Risk);
        assert_eq!(reply.kind(), MessageKind::DataAvailable);
        assert_eq!(
            reply.payload().map(|p| p.field()),
            Some(BlackboardField::RiskResult)
        );
        assert_eq!(mock.calls(TaskKind::RiskProfile).await, 1);
    }

    #[tokio::test]
    async fn test_guard_skips_without_calling_inference() {
        let mock = Arc::new(MockInference::new());
        let agent = StageAgent::new(PortfolioStage::new(mock.clone(), Language::En));
        let view = BlackboardView::detached(Blackboard::for_mission(inputs()));

        let reply = agent.evaluate(&start(), &view).await.unwrap();
        assert!(reply.is_none());
        assert_eq!(mock.calls(TaskKind::PortfolioDesign).await, 0);
    }

    #[tokio::test]
    async fn test_guard_skips_when_output_present() {
        let mock = Arc::new(MockInference::new());
        let agent = StageAgent::new(MarketStage::new(mock.clone(), Language::En));
        let mut board = Blackboard::for_mission(inputs());
        board.merge(Payload::MarketContext("already here".to_string()));
        let view = BlackboardView::detached(board);

        assert!(agent.evaluate(&start(), &view).await.unwrap().is_none());
        assert_eq!(mock.calls(TaskKind::MarketScan).await, 0);
    }

    #[tokio::test]
    async fn test_inference_failure_propagates() {
        let mock = Arc::new(MockInference::new().always_fail(TaskKind::MarketScan));
        let agent = StageAgent::new(MarketStage::new(mock, Language::En));
        let view = BlackboardView::detached(Blackboard::for_mission(inputs()));

        let err = agent.evaluate(&start(), &view).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InferenceError(_)));
    }

    #[tokio::test]
    async fn test_rerun_ignores_existing_output() {
        let mock = Arc::new(MockInference::new());
        let agent = StageAgent::new(MarketStage::new(mock.clone(), Language::En));
        let mut board = Blackboard::for_mission(inputs());
        board.merge(Payload::MarketContext("stale".to_string()));
        let view = BlackboardView::detached(board);

        let reply = agent
            .rerun(&view, &StageOverrides::default())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.summary().starts_with("Manual re-run"));
        assert_eq!(mock.calls(TaskKind::MarketScan).await, 1);
    }

    #[test]
    fn test_override_horizon_bounds() {
        let within = StageOverrides {
            preferences: Some("ESG only".to_string()),
            horizon_years: Some(MAX_HORIZON_YEARS),
        };
        assert!(within.validate().is_ok());
        assert!(StageOverrides::default().validate().is_ok());

        for years in [0, MAX_HORIZON_YEARS + 1] {
            let out_of_range = StageOverrides {
                preferences: None,
                horizon_years: Some(years),
            };
            assert!(matches!(
                out_of_range.validate(),
                Err(OrchestrationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_default_registry_order() {
        let agents = create_default_agents(Arc::new(MockInference::new()), StageSettings::default());
        let ids: Vec<AgentId> = agents.iter().map(|a| a.id()).collect();
        assert_eq!(ids, AgentId::STAGES.to_vec());
    }
}
