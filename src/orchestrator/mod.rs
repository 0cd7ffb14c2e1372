//! Reactive scheduler
//!
//! DISPATCH: LOG → MERGE → (COMPLETE? stop) → FAN-OUT → RECURSE
//!
//! Every dispatched message is appended to the log and merged into the
//! blackboard under one lock, then offered to every registered agent
//! concurrently. Replies are dispatched recursively; a dispatch returns only
//! once its whole sub-cascade has settled.

use crate::agents::Agent;
use crate::audit::MessageLog;
use crate::blackboard::Blackboard;
use crate::error::OrchestrationError;
use crate::message::{AgentId, Message, MessageKind};
use crate::Result;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

pub mod mission;

pub use mission::{seed_message, MissionOutcome};

const DEFAULT_MAX_CASCADE_DEPTH: usize = 16;
const DEFAULT_MAX_DISPATCHES: usize = 64;

/// Ceilings that turn a runaway cascade into an [`OrchestrationError::OrchestrationFault`]
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_cascade_depth: usize,
    pub max_dispatches: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            max_dispatches: DEFAULT_MAX_DISPATCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Idle,
    Running,
    Completed,
    /// Cascade settled without completion; a stage failed or never activated
    Stalled,
    Faulted,
    /// A newer mission replaced this one before it settled
    Superseded,
}

/// Everything that belongs to the current mission, guarded by one lock
#[derive(Debug)]
pub(crate) struct MissionState {
    pub(crate) generation: u64,
    pub(crate) status: MissionStatus,
    pub(crate) blackboard: Blackboard,
    pub(crate) log: MessageLog,
    pub(crate) active_agent: Option<AgentId>,
    pub(crate) dispatched: usize,
    /// Stages that reported a failure this mission; not re-activated
    pub(crate) failed: BTreeSet<AgentId>,
}

impl MissionState {
    fn idle() -> Self {
        Self {
            generation: 0,
            status: MissionStatus::Idle,
            blackboard: Blackboard::new(),
            log: MessageLog::new(),
            active_agent: None,
            dispatched: 0,
            failed: BTreeSet::new(),
        }
    }
}

/// Read-only window onto the blackboard of one mission generation
#[derive(Clone)]
pub struct BlackboardView {
    state: Arc<RwLock<MissionState>>,
    generation: u64,
}

impl BlackboardView {
    pub(crate) fn new(state: Arc<RwLock<MissionState>>, generation: u64) -> Self {
        Self { state, generation }
    }

    /// View over a standalone board, outside any orchestrator
    pub fn detached(board: Blackboard) -> Self {
        let mut state = MissionState::idle();
        state.blackboard = board;
        Self::new(Arc::new(RwLock::new(state)), 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Latest committed board, or `None` once the mission has been replaced
    pub async fn current(&self) -> Option<Blackboard> {
        let state = self.state.read().await;
        (state.generation == self.generation).then(|| state.blackboard.clone())
    }

    pub async fn is_current(&self) -> bool {
        self.state.read().await.generation == self.generation
    }

    /// Best-effort "who is working" marker; last writer wins
    pub async fn announce(&self, agent: AgentId) {
        let mut state = self.state.write().await;
        if state.generation == self.generation {
            state.active_agent = Some(agent);
        }
    }
}

/// Main orchestrator that owns the blackboard and the agent registry
pub struct Orchestrator {
    agents: Vec<Arc<dyn Agent>>,
    state: Arc<RwLock<MissionState>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(agents: Vec<Arc<dyn Agent>>, config: OrchestratorConfig) -> Self {
        Self {
            agents,
            state: Arc::new(RwLock::new(MissionState::idle())),
            config,
        }
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id()).collect()
    }

    pub(crate) fn find_agent(&self, id: AgentId) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub(crate) fn view(&self, generation: u64) -> BlackboardView {
        BlackboardView::new(self.state.clone(), generation)
    }

    /// Dispatch a message into the current mission and wait for its cascade
    pub async fn dispatch(&self, message: Message) -> Result<()> {
        let generation = self.generation().await;
        self.run_cascade(message, generation).await
    }

    pub async fn current_blackboard(&self) -> Blackboard {
        self.state.read().await.blackboard.clone()
    }

    pub async fn message_log(&self) -> Vec<Message> {
        self.state.read().await.log.entries().to_vec()
    }

    pub async fn log_fingerprint(&self) -> String {
        self.state.read().await.log.fingerprint()
    }

    pub async fn active_agent(&self) -> Option<AgentId> {
        self.state.read().await.active_agent
    }

    pub async fn status(&self) -> MissionStatus {
        self.state.read().await.status
    }

    pub async fn is_active(&self) -> bool {
        self.status().await == MissionStatus::Running
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    async fn has_failed(&self, agent: AgentId, generation: u64) -> bool {
        let state = self.state.read().await;
        state.generation == generation && state.failed.contains(&agent)
    }

    /// Top-level cascade: settles mission status once the tree has drained
    pub(crate) async fn run_cascade(&self, seed: Message, generation: u64) -> Result<()> {
        let result = self.dispatch_at(seed, generation, 0).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            return result;
        }
        state.active_agent = None;

        match &result {
            Ok(()) => {
                if state.status == MissionStatus::Running {
                    warn!(generation, "Cascade settled without completion, mission stalled");
                    state.status = MissionStatus::Stalled;
                }
            }
            Err(e) => {
                error!(generation, error = %e, "Cascade aborted");
                state.status = MissionStatus::Faulted;
                state
                    .log
                    .append(Message::failure(AgentId::System, format!("Cascade aborted: {}", e)));
            }
        }

        result
    }

    fn dispatch_at(
        &self,
        message: Message,
        generation: u64,
        depth: usize,
    ) -> BoxFuture<'_, Result<()>> {
        async move {
            if !self.commit(&message, generation, depth).await? {
                return Ok(());
            }

            let view = self.view(generation);
            let reactions = self
                .agents
                .iter()
                .map(|agent| self.react(agent.as_ref(), &message, &view, generation, depth));

            try_join_all(reactions).await?;
            Ok(())
        }
        .boxed()
    }

    /// Log and merge under the lock. Returns whether the message should fan out.
    async fn commit(&self, message: &Message, generation: u64, depth: usize) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                from = %message.from(),
                "Discarding message from a replaced mission"
            );
            return Ok(false);
        }

        if depth > self.config.max_cascade_depth {
            return Err(OrchestrationError::OrchestrationFault(format!(
                "Cascade depth {} exceeds ceiling {}",
                depth, self.config.max_cascade_depth
            )));
        }

        if state.dispatched >= self.config.max_dispatches {
            return Err(OrchestrationError::OrchestrationFault(format!(
                "Mission exceeded {} dispatches",
                self.config.max_dispatches
            )));
        }

        // Write-once per mission for stage output; force-set bypasses this path.
        if message.from() != AgentId::System {
            if message.payload().is_some() && state.failed.contains(&message.from()) {
                debug!(from = %message.from(), "Stage already failed this mission, dropping late output");
                return Ok(false);
            }
            if let Some(payload) = message.payload() {
                if state.blackboard.has(payload.field()) {
                    debug!(
                        from = %message.from(),
                        field = %payload.field(),
                        "Field already committed, dropping duplicate"
                    );
                    return Ok(false);
                }
            }
        }

        state.dispatched += 1;
        state.log.append(message.clone());
        if let Some(payload) = message.payload() {
            state.blackboard.merge(payload.clone());
        }

        debug!(
            generation,
            depth,
            from = %message.from(),
            kind = ?message.kind(),
            "Dispatched"
        );

        match message.kind() {
            MessageKind::MissionComplete => {
                info!(generation, from = %message.from(), "Mission complete");
                state.status = MissionStatus::Completed;
                state.active_agent = None;
                Ok(false)
            }
            MessageKind::AgentFailure => {
                state.failed.insert(message.from());
                warn!(generation, from = %message.from(), summary = %message.summary(), "Agent failure logged");
                Ok(false)
            }
            MessageKind::MissionStart | MessageKind::DataAvailable => {
                if let Some(payload) = message.payload() {
                    info!(generation, from = %message.from(), field = %payload.field(), "Committed");
                }
                Ok(true)
            }
        }
    }

    async fn react(
        &self,
        agent: &dyn Agent,
        message: &Message,
        view: &BlackboardView,
        generation: u64,
        depth: usize,
    ) -> Result<()> {
        if self.has_failed(agent.id(), generation).await {
            return Ok(());
        }

        match agent.evaluate(message, view).await {
            Ok(None) => Ok(()),
            Ok(Some(reply)) => self.dispatch_at(reply, generation, depth + 1).await,
            Err(e) if e.is_fault() => Err(e),
            // Contained at the fan-out boundary so siblings keep running
            Err(e) => {
                warn!(agent = %agent.id(), error = %e, stage_failure = e.is_stage_failure(), "Agent failed");
                let failure = Message::failure(agent.id(), format!("{} failed: {}", agent.name(), e));
                self.dispatch_at(failure, generation, depth + 1).await
            }
        }
    }
}
