//! Mission controller
//!
//! The only path that resets the blackboard and log. Manual overrides and
//! re-runs commit directly, skipping the cascade guard.

use super::{MissionStatus, Orchestrator};
use crate::agents::StageOverrides;
use crate::audit::MessageLog;
use crate::blackboard::{Blackboard, Payload};
use crate::error::OrchestrationError;
use crate::message::{AgentId, Message, MessageKind};
use crate::models::MissionInputs;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MISSION_START_SUMMARY: &str = "Mission Start: Analyze user risk and generate investment strategy.";

/// How a mission settled
#[derive(Debug, Clone, Serialize)]
pub struct MissionOutcome {
    pub generation: u64,
    pub status: MissionStatus,
    /// Messages committed by this mission; zero once superseded
    pub dispatched: usize,
    pub log_len: usize,
}

/// The MISSION_START broadcast carrying the inputs
pub fn seed_message(inputs: MissionInputs) -> Message {
    Message::broadcast(
        AgentId::System,
        MessageKind::MissionStart,
        MISSION_START_SUMMARY,
        Some(Payload::MissionInputs(inputs)),
    )
}

fn mission_replaced() -> OrchestrationError {
    OrchestrationError::InvalidInput("Mission replaced during re-run".to_string())
}

impl Orchestrator {
    /// Reset state for a new mission and run its cascade to completion.
    ///
    /// Only invalid inputs are returned as errors; stalls and faults are
    /// reported through the outcome status and the log.
    pub async fn start_mission(&self, inputs: MissionInputs) -> Result<MissionOutcome> {
        let (generation, seed) = self.reset(inputs).await?;
        Ok(self.drive(seed, generation).await)
    }

    /// Reset now, run the cascade in the background. Returns the new generation.
    pub async fn spawn_mission(
        self: &Arc<Self>,
        inputs: MissionInputs,
    ) -> Result<(u64, JoinHandle<MissionOutcome>)> {
        let (generation, seed) = self.reset(inputs).await?;
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.drive(seed, generation).await });
        Ok((generation, handle))
    }

    async fn reset(&self, inputs: MissionInputs) -> Result<(u64, Message)> {
        inputs.validate()?;

        let mut state = self.state.write().await;
        if state.status == MissionStatus::Running {
            warn!(generation = state.generation, "Replacing a running mission");
        }

        state.generation += 1;
        state.status = MissionStatus::Running;
        state.blackboard = Blackboard::new();
        state.log = MessageLog::new();
        state.active_agent = None;
        state.dispatched = 0;
        state.failed.clear();

        info!(
            generation = state.generation,
            market = %inputs.market,
            answers = inputs.answers.len(),
            "Mission started"
        );

        Ok((state.generation, seed_message(inputs)))
    }

    async fn drive(&self, seed: Message, generation: u64) -> MissionOutcome {
        // Faults are already recorded in state by run_cascade
        let _ = self.run_cascade(seed, generation).await;

        let state = self.state.read().await;
        if state.generation != generation {
            debug!(generation, current = state.generation, "Mission superseded");
            return MissionOutcome {
                generation,
                status: MissionStatus::Superseded,
                dispatched: 0,
                log_len: 0,
            };
        }

        info!(
            generation,
            status = ?state.status,
            dispatched = state.dispatched,
            "Mission settled"
        );

        MissionOutcome {
            generation,
            status: state.status,
            dispatched: state.dispatched,
            log_len: state.log.len(),
        }
    }

    /// Overwrite one field out of band. No guard, no fan-out.
    pub async fn force_set_field(&self, payload: Payload) {
        let summary = format!("Manual override: {}", payload.field());
        let message = Message::broadcast(
            AgentId::System,
            MessageKind::DataAvailable,
            summary,
            Some(payload),
        );
        let generation = self.generation().await;
        self.force_commit(message, generation).await;
    }

    /// Run one stage against the current board even if its output exists.
    ///
    /// Rejected requests leave the log and board untouched; only a failure of
    /// the stage's own work is logged as AGENT_FAILURE.
    pub async fn rerun_stage(&self, agent_id: AgentId, overrides: StageOverrides) -> Result<Payload> {
        let agent = self
            .find_agent(agent_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownAgent(agent_id.to_string()))?;
        overrides.validate()?;

        let generation = self.generation().await;
        let view = self.view(generation);

        let reply = match agent.rerun(&view, &overrides).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_stage_failure() {
                    let failure =
                        Message::failure(agent_id, format!("{} re-run failed: {}", agent.name(), e));
                    self.force_commit(failure, generation).await;
                }
                return Err(e);
            }
        };

        let message = match reply {
            Some(message) => message,
            None if !view.is_current().await => return Err(mission_replaced()),
            None => {
                return Err(OrchestrationError::InvalidInput(format!(
                    "{} cannot run: preconditions not met",
                    agent.name()
                )))
            }
        };

        let payload = message.payload().cloned().ok_or_else(|| {
            OrchestrationError::MalformedResult(format!("{} returned no payload", agent.name()))
        })?;

        if !self.force_commit(message, generation).await {
            return Err(mission_replaced());
        }

        Ok(payload)
    }

    /// Merge and log without the write-once check. Returns whether it landed.
    async fn force_commit(&self, message: Message, generation: u64) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(generation, from = %message.from(), "Discarding override for a replaced mission");
            return false;
        }

        if let Some(payload) = message.payload() {
            info!(from = %message.from(), field = %payload.field(), "Field overridden");
            state.blackboard.merge(payload.clone());
            state.failed.remove(&message.from());
        }
        match message.kind() {
            MessageKind::AgentFailure => {
                state.failed.insert(message.from());
            }
            MessageKind::MissionComplete => {
                info!(generation, "Mission completed by re-run");
                state.status = MissionStatus::Completed;
            }
            _ => {}
        }
        if state.active_agent == Some(message.from()) {
            state.active_agent = None;
        }
        state.log.append(message);
        true
    }
}
