//! Evolutionary search over trading-strategy genomes.
//!
//! Strategy synthesis and backtesting are collaborators supplied by the
//! caller; this crate owns the population, the genetic operators, fitness
//! scoring, parallel evaluation dispatch and checkpointing.

pub mod config;
pub mod engines;
pub mod error;
pub mod storage;
pub mod types;

pub use config::{AppConfig, ConfigManager};
pub use engines::evaluation::{
    EvaluationFailure, EvaluationRequest, StrategyArtifact, StrategyEvaluator, StrategySynthesizer,
};
pub use engines::generation::{EvolutionEngine, Genome, RunSummary, TerminationReason};
pub use error::{EvolutionError, Result};
pub use types::{GenomeId, Metric, RawMetrics};
