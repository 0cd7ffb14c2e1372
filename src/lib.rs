//! Advisor Swarm
//!
//! A blackboard-driven multi-agent investment advisor:
//! - Five autonomous stages watch a shared blackboard and a message bus
//! - Each stage decides for itself when its inputs are ready
//! - Every dispatched message is logged in order and fingerprinted
//! - Stale work from a replaced mission never lands on the new one
//!
//! REACTIVE LOOP:
//! SEED → LOG → MERGE → FAN-OUT → (stage reacts?) → DISPATCH → ... → COMPLETE

pub mod agents;
pub mod api;
pub mod audit;
pub mod blackboard;
pub mod config;
pub mod error;
pub mod inference;
pub mod message;
pub mod models;
pub mod orchestrator;
pub mod questionnaire;
pub mod tutor;

pub use error::Result;

// Re-export common types
pub use agents::{create_default_agents, Agent, StageOverrides, StageSettings};
pub use blackboard::{Blackboard, BlackboardField, Payload};
pub use config::AppConfig;
pub use error::OrchestrationError;
pub use inference::{InferenceService, MockInference, StageResult, TaskKind, TaskSpec};
pub use message::{AgentId, Message, MessageKind, Recipient};
pub use models::*;
pub use orchestrator::{BlackboardView, MissionOutcome, MissionStatus, Orchestrator, OrchestratorConfig};
