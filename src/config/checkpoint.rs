use super::traits::ConfigSection;
use crate::error::EvolutionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint every N generations; 0 disables periodic checkpoints.
    pub interval: u32,
    pub directory: PathBuf,
    /// Abort the run when a checkpoint cannot be written after one retry.
    pub fatal_on_failure: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            directory: PathBuf::from("checkpoints"),
            fatal_on_failure: false,
        }
    }
}

impl CheckpointConfig {
    pub fn is_due(&self, generation: u32) -> bool {
        self.interval > 0 && generation % self.interval == 0
    }
}

impl ConfigSection for CheckpointConfig {
    fn section_name() -> &'static str {
        "checkpoint"
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        if self.directory.as_os_str().is_empty() {
            return Err(EvolutionError::Configuration(
                "Checkpoint directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
