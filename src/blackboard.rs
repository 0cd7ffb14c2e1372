//! The blackboard: shared mission state, merge-updated from message payloads

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{MissionInputs, PortfolioRecommendation, RiskAnalysisResult, SimulationPoint};

/// Addressable fields of the blackboard
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum BlackboardField {
    MissionInputs,
    RiskResult,
    MarketContext,
    Portfolios,
    Simulation,
    Report,
}

impl BlackboardField {
    pub const ALL: [BlackboardField; 6] = [
        BlackboardField::MissionInputs,
        BlackboardField::RiskResult,
        BlackboardField::MarketContext,
        BlackboardField::Portfolios,
        BlackboardField::Simulation,
        BlackboardField::Report,
    ];
}

impl fmt::Display for BlackboardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlackboardField::MissionInputs => "missionInputs",
            BlackboardField::RiskResult => "riskResult",
            BlackboardField::MarketContext => "marketContext",
            BlackboardField::Portfolios => "portfolios",
            BlackboardField::Simulation => "simulation",
            BlackboardField::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// One whole-value contribution to a single blackboard field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum Payload {
    MissionInputs(MissionInputs),
    RiskResult(RiskAnalysisResult),
    MarketContext(String),
    Portfolios(Vec<PortfolioRecommendation>),
    Simulation(Vec<SimulationPoint>),
    Report(String),
}

impl Payload {
    pub fn field(&self) -> BlackboardField {
        match self {
            Payload::MissionInputs(_) => BlackboardField::MissionInputs,
            Payload::RiskResult(_) => BlackboardField::RiskResult,
            Payload::MarketContext(_) => BlackboardField::MarketContext,
            Payload::Portfolios(_) => BlackboardField::Portfolios,
            Payload::Simulation(_) => BlackboardField::Simulation,
            Payload::Report(_) => BlackboardField::Report,
        }
    }
}

/// Shared mission record. Every field is replaced whole, never patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blackboard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mission_inputs: Option<MissionInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    risk_result: Option<RiskAnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    market_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    portfolios: Option<Vec<PortfolioRecommendation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    simulation: Option<Vec<SimulationPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report: Option<String>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh board holding only the mission inputs
    pub fn for_mission(inputs: MissionInputs) -> Self {
        Self {
            mission_inputs: Some(inputs),
            ..Self::default()
        }
    }

    /// Overwrite the field named by the payload
    pub fn merge(&mut self, payload: Payload) {
        match payload {
            Payload::MissionInputs(v) => self.mission_inputs = Some(v),
            Payload::RiskResult(v) => self.risk_result = Some(v),
            Payload::MarketContext(v) => self.market_context = Some(v),
            Payload::Portfolios(v) => self.portfolios = Some(v),
            Payload::Simulation(v) => self.simulation = Some(v),
            Payload::Report(v) => self.report = Some(v),
        }
    }

    /// A field counts as present only when it holds a non-empty value.
    pub fn has(&self, field: BlackboardField) -> bool {
        match field {
            BlackboardField::MissionInputs => self.mission_inputs.is_some(),
            BlackboardField::RiskResult => self.risk_result.is_some(),
            BlackboardField::MarketContext => non_blank(self.market_context.as_deref()),
            BlackboardField::Portfolios => self.portfolios.as_ref().is_some_and(|v| !v.is_empty()),
            BlackboardField::Simulation => self.simulation.as_ref().is_some_and(|v| !v.is_empty()),
            BlackboardField::Report => non_blank(self.report.as_deref()),
        }
    }

    pub fn has_all(&self, fields: &[BlackboardField]) -> bool {
        fields.iter().all(|f| self.has(*f))
    }

    pub fn populated_fields(&self) -> Vec<BlackboardField> {
        BlackboardField::ALL
            .into_iter()
            .filter(|f| self.has(*f))
            .collect()
    }

    pub fn mission_inputs(&self) -> Option<&MissionInputs> {
        self.mission_inputs.as_ref()
    }

    pub fn risk_result(&self) -> Option<&RiskAnalysisResult> {
        self.risk_result.as_ref()
    }

    pub fn market_context(&self) -> Option<&str> {
        self.market_context.as_deref()
    }

    pub fn portfolios(&self) -> Option<&[PortfolioRecommendation]> {
        self.portfolios.as_deref()
    }

    pub fn simulation(&self) -> Option<&[SimulationPoint]> {
        self.simulation.as_deref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketPreference, RiskLevel};
    use std::collections::BTreeMap;

    fn inputs() -> MissionInputs {
        let mut answers = BTreeMap::new();
        answers.insert("q1".to_string(), "growth".to_string());
        MissionInputs::new(answers, MarketPreference::Both)
    }

    fn risk() -> RiskAnalysisResult {
        RiskAnalysisResult {
            score: 64.0,
            level: RiskLevel::Growth,
            explanation: "Long horizon".to_string(),
            contradictions: vec![],
            warning: None,
        }
    }

    #[test]
    fn test_for_mission_only_sets_inputs() {
        let board = Blackboard::for_mission(inputs());
        assert_eq!(board.populated_fields(), vec![BlackboardField::MissionInputs]);
    }

    #[test]
    fn test_merge_replaces_whole_value() {
        let mut board = Blackboard::for_mission(inputs());
        board.merge(Payload::MarketContext("first".to_string()));
        board.merge(Payload::MarketContext("second".to_string()));
        assert_eq!(board.market_context(), Some("second"));

        board.merge(Payload::RiskResult(risk()));
        assert!(board.has_all(&[BlackboardField::RiskResult, BlackboardField::MarketContext]));
    }

    #[test]
    fn test_empty_values_do_not_count_as_present() {
        let mut board = Blackboard::new();
        board.merge(Payload::Portfolios(vec![]));
        board.merge(Payload::Report("  ".to_string()));
        assert!(!board.has(BlackboardField::Portfolios));
        assert!(!board.has(BlackboardField::Report));
    }

    #[test]
    fn test_payload_wire_format() {
        let payload = Payload::MarketContext("VIX 14".to_string());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["field"], "marketContext");
        assert_eq!(value["value"], "VIX 14");

        let back: Payload = serde_json::from_value(value).unwrap();
        assert_eq!(back.field(), BlackboardField::MarketContext);
    }
}
