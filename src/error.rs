use crate::engines::generation::genome::GeneViolation;
use crate::types::GenomeId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Invalid genome {id}: {violation}")]
    InvalidGenome {
        id: GenomeId,
        #[source]
        violation: GeneViolation,
    },

    #[error("Selection precondition violated: {0}")]
    SelectionPrecondition(String),

    #[error("Duplicate genome id: {0}")]
    DuplicateGenomeId(GenomeId),

    #[error("Unknown genome: {0}")]
    UnknownGenome(GenomeId),

    #[error("Evaluation of {id} timed out after {elapsed:?}")]
    EvaluationTimeout { id: GenomeId, elapsed: Duration },

    #[error("Evaluation of {id} failed: {reason}")]
    EvaluationError { id: GenomeId, reason: String },

    #[error("Insufficient trades: got {trades}, {required} required")]
    InsufficientTrades { trades: u64, required: u64 },

    #[error("Checkpoint I/O error at {}: {source}", path.display())]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported checkpoint format version {found} (expected {expected})")]
    CheckpointVersion { found: u32, expected: u32 },

    #[error("Fitness must be a finite value in [0, 1], got {0}")]
    InvalidFitness(f64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Genome generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Run aborted at generation {generation}: {source}")]
    RunAborted {
        generation: u32,
        #[source]
        source: Box<EvolutionError>,
        last_checkpoint: Option<PathBuf>,
    },
}

impl EvolutionError {
    /// Errors scoped to a single genome. These are recorded against the
    /// genome (fitness 0, invalid) and never abort a generation.
    pub fn is_genome_local(&self) -> bool {
        matches!(
            self,
            EvolutionError::InvalidGenome { .. }
                | EvolutionError::EvaluationTimeout { .. }
                | EvolutionError::EvaluationError { .. }
                | EvolutionError::InsufficientTrades { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EvolutionError>;
