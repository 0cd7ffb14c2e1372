//! Core data models for the advisor swarm

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::OrchestrationError;
use crate::Result;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketPreference {
    Tw,
    Us,
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Growth,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetCategory {
    Stocks,
    Bonds,
    Cash,
    Commodities,
    #[serde(rename = "Real Estate")]
    RealEstate,
    Crypto,
}

/// Output language requested from the inference service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    /// Directive appended to system instructions
    pub fn instruction(&self) -> &'static str {
        match self {
            Language::En => " Output the final response in English.",
            Language::ZhTw => {
                " IMPORTANT: Output the final response in Traditional Chinese (繁體中文)."
            }
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Language::En),
            "zh-tw" | "zh_tw" | "zh" => Some(Language::ZhTw),
            _ => None,
        }
    }
}

//
// ================= Mission Inputs =================
//

/// Questionnaire answers plus market preference that seed a mission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionInputs {
    pub answers: BTreeMap<String, String>,
    pub market: MarketPreference,
}

impl MissionInputs {
    pub fn new(answers: BTreeMap<String, String>, market: MarketPreference) -> Self {
        Self { answers, market }
    }

    pub fn validate(&self) -> Result<()> {
        if self.answers.is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "Mission requires at least one questionnaire answer".to_string(),
            ));
        }

        if let Some((id, _)) = self.answers.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(OrchestrationError::InvalidInput(format!(
                "Answer for {} is empty",
                id
            )));
        }

        Ok(())
    }
}

//
// ================= Stage Outputs =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAnalysisResult {
    pub score: f64,
    pub level: RiskLevel,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contradictions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAsset {
    pub name: String,
    pub ticker: String,
    pub category: AssetCategory,
    pub percentage: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRecommendation {
    pub name: String,
    pub description: String,
    pub assets: Vec<PortfolioAsset>,
    /// Annual percentage, 7.5 means 7.5%
    pub expected_return: f64,
    /// Annual percentage
    pub volatility: f64,
}

impl PortfolioRecommendation {
    pub fn total_allocation(&self) -> f64 {
        self.assets.iter().map(|a| a.percentage).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPoint {
    #[serde(deserialize_with = "whole_year")]
    pub year: u32,
    pub optimistic: f64,
    pub expected: f64,
    pub pessimistic: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_event: Option<f64>,
}

/// Accepts `3` as well as `3.0`; rejects fractions and negatives
fn whole_year<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 && raw <= u32::MAX as f64 {
        Ok(raw as u32)
    } else {
        Err(serde::de::Error::custom(format!(
            "year must be a whole non-negative number, got {}",
            raw
        )))
    }
}

impl fmt::Display for MarketPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketPreference::Tw => "TW",
            MarketPreference::Us => "US",
            MarketPreference::Both => "BOTH",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Conservative => "Conservative",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::Growth => "Growth",
            RiskLevel::Aggressive => "Aggressive",
        };
        write!(f, "{}", s)
    }
}
