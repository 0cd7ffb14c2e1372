//! Bus messages exchanged between the system and the stage agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::blackboard::Payload;

/// Identity of a message sender or recipient
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    System,
    Risk,
    Market,
    Portfolio,
    Simulation,
    Report,
}

impl AgentId {
    pub const STAGES: [AgentId; 5] = [
        AgentId::Risk,
        AgentId::Market,
        AgentId::Portfolio,
        AgentId::Simulation,
        AgentId::Report,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "system" => Some(AgentId::System),
            "risk" => Some(AgentId::Risk),
            "market" => Some(AgentId::Market),
            "portfolio" => Some(AgentId::Portfolio),
            "simulation" => Some(AgentId::Simulation),
            "report" => Some(AgentId::Report),
            _ => None,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentId::System => "System",
            AgentId::Risk => "Risk",
            AgentId::Market => "Market",
            AgentId::Portfolio => "Portfolio",
            AgentId::Simulation => "Simulation",
            AgentId::Report => "Report",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "scope", content = "agent")]
pub enum Recipient {
    Broadcast,
    Agent(AgentId),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    MissionStart,
    DataAvailable,
    MissionComplete,
    AgentFailure,
}

impl MessageKind {
    fn fallback_summary(&self) -> &'static str {
        match self {
            MessageKind::MissionStart => "Mission started.",
            MessageKind::DataAvailable => "New data available on the blackboard.",
            MessageKind::MissionComplete => "Mission complete.",
            MessageKind::AgentFailure => "Agent failed.",
        }
    }
}

/// Immutable record of one event on the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: Uuid,
    from: AgentId,
    to: Recipient,
    kind: MessageKind,
    summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Payload>,
    created_at: DateTime<Utc>,
}

impl Message {
    /// A blank summary is replaced by the kind's default description.
    pub fn new(
        from: AgentId,
        to: Recipient,
        kind: MessageKind,
        summary: impl Into<String>,
        payload: Option<Payload>,
    ) -> Self {
        let summary = summary.into();
        let summary = if summary.trim().is_empty() {
            kind.fallback_summary().to_string()
        } else {
            summary
        };

        Self {
            id: Uuid::new_v4(),
            from,
            to,
            kind,
            summary,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn broadcast(
        from: AgentId,
        kind: MessageKind,
        summary: impl Into<String>,
        payload: Option<Payload>,
    ) -> Self {
        Self::new(from, Recipient::Broadcast, kind, summary, payload)
    }

    /// Failure report addressed to the system
    pub fn failure(agent: AgentId, summary: impl Into<String>) -> Self {
        Self::new(
            agent,
            Recipient::Agent(AgentId::System),
            MessageKind::AgentFailure,
            summary,
            None,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn from(&self) -> AgentId {
        self.from
    }

    pub fn to(&self) -> Recipient {
        self.to
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_summary_gets_fallback() {
        let msg = Message::broadcast(AgentId::Risk, MessageKind::DataAvailable, "   ", None);
        assert!(!msg.summary().is_empty());
        assert_eq!(msg.summary(), "New data available on the blackboard.");
    }

    #[test]
    fn test_failure_is_addressed_to_system() {
        let msg = Message::failure(AgentId::Portfolio, "boom");
        assert_eq!(msg.kind(), MessageKind::AgentFailure);
        assert_eq!(msg.from(), AgentId::Portfolio);
        assert_eq!(msg.to(), Recipient::Agent(AgentId::System));
        assert!(msg.payload().is_none());
    }

    #[test]
    fn test_kind_wire_format() {
        let json = serde_json::to_string(&MessageKind::MissionComplete).unwrap();
        assert_eq!(json, "\"MISSION_COMPLETE\"");

        let msg = Message::broadcast(AgentId::System, MessageKind::MissionStart, "go", None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["from"], "system");
        assert_eq!(value["to"]["scope"], "broadcast");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_agent_id_parse_roundtrip() {
        for id in AgentId::STAGES {
            assert_eq!(AgentId::parse(&id.to_string()), Some(id));
        }
        assert_eq!(AgentId::parse("unknown"), None);
    }
}
