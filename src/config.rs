//! Environment configuration

use crate::agents::{check_horizon, StageSettings, MAX_HORIZON_YEARS};
use crate::error::OrchestrationError;
use crate::inference::{GeminiClient, InferenceService, MockInference};
use crate::models::Language;
use crate::orchestrator::OrchestratorConfig;
use crate::Result;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub language: Language,
    pub port: u16,
    pub max_cascade_depth: usize,
    pub max_dispatches: usize,
    pub simulation_years: u32,
    pub inference_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        let stages = StageSettings::default();
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            language: stages.language,
            port: 8080,
            max_cascade_depth: orchestrator.max_cascade_depth,
            max_dispatches: orchestrator.max_dispatches,
            simulation_years: stages.simulation_years,
            inference_timeout: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Load `.env` then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let language = match get("ADVISOR_LANGUAGE") {
            Some(raw) => Language::parse(&raw).ok_or_else(|| {
                OrchestrationError::ConfigError(format!("ADVISOR_LANGUAGE: unsupported '{}'", raw))
            })?,
            None => defaults.language,
        };

        let port_raw = get("PORT").or_else(|| get("API_PORT"));
        let port = parse_or("PORT", port_raw, defaults.port)?;

        let simulation_years = parse_or(
            "SIMULATION_YEARS",
            get("SIMULATION_YEARS"),
            defaults.simulation_years,
        )?;
        check_horizon(simulation_years).map_err(|_| {
            OrchestrationError::ConfigError(format!(
                "SIMULATION_YEARS: must be 1-{}, got {}",
                MAX_HORIZON_YEARS, simulation_years
            ))
        })?;

        let timeout_secs = parse_or(
            "INFERENCE_TIMEOUT_SECS",
            get("INFERENCE_TIMEOUT_SECS"),
            defaults.inference_timeout.as_secs(),
        )?;

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            language,
            port,
            max_cascade_depth: parse_or(
                "MAX_CASCADE_DEPTH",
                get("MAX_CASCADE_DEPTH"),
                defaults.max_cascade_depth,
            )?,
            max_dispatches: parse_or("MAX_DISPATCHES", get("MAX_DISPATCHES"), defaults.max_dispatches)?,
            simulation_years,
            inference_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_cascade_depth: self.max_cascade_depth,
            max_dispatches: self.max_dispatches,
        }
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            language: self.language,
            simulation_years: self.simulation_years,
        }
    }

    /// Gemini when a key is configured, the offline mock otherwise
    pub fn inference_service(&self) -> Result<Arc<dyn InferenceService>> {
        match &self.gemini_api_key {
            Some(key) => {
                info!(model = %self.gemini_model, "Using Gemini inference");
                let client = GeminiClient::new(key.clone(), self.gemini_model.clone(), self.inference_timeout)?;
                Ok(Arc::new(client))
            }
            None => {
                warn!("GEMINI_API_KEY not set, falling back to mock inference");
                Ok(Arc::new(MockInference::new()))
            }
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{}: cannot parse '{}'", key, value))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_cascade_depth, 16);
        assert_eq!(config.max_dispatches, 64);
        assert_eq!(config.simulation_years, 10);
        assert_eq!(config.language, Language::En);
    }

    #[test]
    fn test_api_port_fallback_and_language() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_PORT", "9090"),
            ("ADVISOR_LANGUAGE", "zh-TW"),
            ("GEMINI_API_KEY", "  "),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.language, Language::ZhTw);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let err = AppConfig::from_lookup(lookup(&[("MAX_DISPATCHES", "lots")])).unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));

        let err = AppConfig::from_lookup(lookup(&[("ADVISOR_LANGUAGE", "fr")])).unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));
    }

    #[test]
    fn test_simulation_years_out_of_range_is_config_error() {
        for raw in ["0", "99"] {
            let err = AppConfig::from_lookup(lookup(&[("SIMULATION_YEARS", raw)])).unwrap_err();
            match err {
                OrchestrationError::ConfigError(msg) => assert!(msg.contains("SIMULATION_YEARS")),
                other => panic!("unexpected error {:?}", other),
            }
        }

        let config = AppConfig::from_lookup(lookup(&[("SIMULATION_YEARS", "50")])).unwrap();
        assert_eq!(config.simulation_years, MAX_HORIZON_YEARS);
    }
}
