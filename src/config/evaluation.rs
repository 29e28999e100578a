use super::traits::ConfigSection;
use crate::error::EvolutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Concurrent evaluations. Each worker drives one heavyweight external process.
    pub workers: usize,
    /// Per-genome evaluation budget; fractions allowed.
    pub timeout_secs: f64,
    /// Purge invalid genomes before selection instead of keeping them at fitness 0.
    pub ignore_invalid_strategies: bool,
    /// Stop waiting for an evaluation once its timeout elapses.
    pub abandon_timed_out: bool,
    pub cancel_policy: CancelPolicy,
    pub poll_interval_ms: u64,
    /// Opaque settings handed to the evaluation collaborator.
    pub settings: BTreeMap<String, String>,
}

/// What happens to in-flight evaluations when a stop is requested mid-generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    FinishInFlight,
    Abandon,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_secs: 300.0,
            ignore_invalid_strategies: false,
            abandon_timed_out: true,
            cancel_policy: CancelPolicy::FinishInFlight,
            poll_interval_ms: 200,
            settings: BTreeMap::new(),
        }
    }
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        if self.workers == 0 {
            return Err(EvolutionError::Configuration(
                "At least one evaluation worker is required".to_string(),
            ));
        }
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(EvolutionError::Configuration(
                "Evaluation timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
