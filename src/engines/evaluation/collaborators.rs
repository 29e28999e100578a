//! Boundaries to the systems that turn a genome into something runnable and
//! measure how it performs. Both are opaque to the engine: it only sees an
//! artifact reference going in and raw metrics or a failure coming out.

use crate::config::EvaluationConfig;
use crate::engines::generation::genome::Genome;
use crate::types::{GenomeId, RawMetrics};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reference to an executable strategy produced from a genome. The engine
/// never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyArtifact {
    pub reference: String,
}

impl StrategyArtifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into() }
    }
}

/// Turns a genome into an executable strategy.
pub trait StrategySynthesizer: Send + Sync {
    fn synthesize(&self, genome: &Genome) -> anyhow::Result<StrategyArtifact>;
}

/// Uses the genome id as the artifact reference. Suits evaluators that work
/// from the genome id alone.
pub struct PassthroughSynthesizer;

impl StrategySynthesizer for PassthroughSynthesizer {
    fn synthesize(&self, genome: &Genome) -> anyhow::Result<StrategyArtifact> {
        Ok(StrategyArtifact::new(genome.id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub genome_id: GenomeId,
    pub artifact: &'a StrategyArtifact,
    /// Budget the evaluator should honour.
    pub timeout: Duration,
    pub config: &'a EvaluationConfig,
}

#[derive(Error, Debug)]
pub enum EvaluationFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

/// Runs one genome's strategy and reports its raw metrics. May be slow and
/// may fail; it is called concurrently from the worker pool.
pub trait StrategyEvaluator: Send + Sync {
    fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<RawMetrics, EvaluationFailure>;
}

impl<F> StrategyEvaluator for F
where
    F: Fn(&EvaluationRequest<'_>) -> Result<RawMetrics, EvaluationFailure> + Send + Sync,
{
    fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<RawMetrics, EvaluationFailure> {
        self(request)
    }
}
