use super::traits::ConfigSection;
use crate::error::EvolutionError;
use serde::{Deserialize, Serialize};

/// Structural limits every genome must respect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenomeConfig {
    pub min_indicators: usize,
    pub max_indicators: usize,
    pub min_conditions: usize,
    pub max_conditions: usize,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            min_indicators: 2,
            max_indicators: 6,
            min_conditions: 1,
            max_conditions: 4,
        }
    }
}

impl ConfigSection for GenomeConfig {
    fn section_name() -> &'static str {
        "genome"
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        if self.min_indicators == 0 || self.min_indicators > self.max_indicators {
            return Err(EvolutionError::Configuration(format!(
                "Indicator bounds must satisfy 1 <= min <= max, got [{}, {}]",
                self.min_indicators, self.max_indicators
            )));
        }
        if self.min_conditions == 0 || self.min_conditions > self.max_conditions {
            return Err(EvolutionError::Configuration(format!(
                "Condition bounds must satisfy 1 <= min <= max, got [{}, {}]",
                self.min_conditions, self.max_conditions
            )));
        }
        Ok(())
    }
}
