//! Engine configuration.
//!
//! Defaults are usable as-is. `from_env` overlays `STOCKLEDGER_*` variables;
//! unparsable values are logged and ignored.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use stockledger_core::{DomainError, Money};
use stockledger_inventory::ConsumptionPolicy;
use stockledger_observability::ObservabilityConfig;
use stockledger_planning::{AbcThresholds, PlanningSettings};

use crate::command_dispatcher::DEFAULT_MAX_CONFLICT_RETRIES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl From<DomainError> for ConfigError {
    fn from(value: DomainError) -> Self {
        ConfigError::Invalid(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_conflict_retries: u32,
    pub default_policy: ConsumptionPolicy,
    pub planning: PlanningSettings,
    pub abc: AbcThresholds,
    pub observability: ObservabilityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            default_policy: ConsumptionPolicy::Fifo,
            planning: PlanningSettings::default(),
            abc: AbcThresholds::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `STOCKLEDGER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("STOCKLEDGER_{name}"));

        overlay(&mut cfg.max_conflict_retries, "MAX_CONFLICT_RETRIES", var("MAX_CONFLICT_RETRIES"));
        overlay(&mut cfg.default_policy, "DEFAULT_POLICY", var("DEFAULT_POLICY"));

        let p = &mut cfg.planning;
        overlay(&mut p.window_days, "WINDOW_DAYS", var("WINDOW_DAYS"));
        overlay(&mut p.annual_window_days, "ANNUAL_WINDOW_DAYS", var("ANNUAL_WINDOW_DAYS"));
        let mut ordering_minor = p.ordering_cost.minor();
        overlay(&mut ordering_minor, "ORDERING_COST", var("ORDERING_COST"));
        p.ordering_cost = Money::from_minor(ordering_minor);
        overlay(&mut p.holding_cost_rate, "HOLDING_COST_RATE", var("HOLDING_COST_RATE"));
        overlay(&mut p.variability_threshold, "VARIABILITY_THRESHOLD", var("VARIABILITY_THRESHOLD"));
        overlay(&mut p.variability_buffer_ratio, "VARIABILITY_BUFFER_RATIO", var("VARIABILITY_BUFFER_RATIO"));
        overlay(&mut p.class_a_multiplier, "CLASS_A_MULTIPLIER", var("CLASS_A_MULTIPLIER"));
        overlay(&mut p.class_c_multiplier, "CLASS_C_MULTIPLIER", var("CLASS_C_MULTIPLIER"));

        overlay(&mut cfg.abc.a_threshold, "ABC_A_THRESHOLD", var("ABC_A_THRESHOLD"));
        overlay(&mut cfg.abc.b_threshold, "ABC_B_THRESHOLD", var("ABC_B_THRESHOLD"));

        overlay(&mut cfg.observability.json, "LOG_JSON", var("LOG_JSON"));
        if let Some(filter) = var("LOG_FILTER") {
            cfg.observability.filter = filter;
        }
        cfg
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.planning.validate()?;
        self.abc.validate()?;
        if self.observability.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log filter cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Install the tracing subscriber described by `observability`. Idempotent.
    pub fn init_observability(&self) {
        stockledger_observability::init_with(&self.observability);
    }
}

fn overlay<T: FromStr>(slot: &mut T, name: &str, raw: Option<String>) {
    let Some(raw) = raw else { return };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(variable = %format!("STOCKLEDGER_{name}"), value = %raw, "ignoring unparsable config value"),
    }
}
