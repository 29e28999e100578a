//! Hand-off points for durable run records. The engine writes genomes,
//! per-genome results and per-generation statistics; it never reads them
//! back.

use crate::engines::evaluation::fitness::FitnessScore;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::stats::GenerationStats;
use crate::types::{GenomeId, RawMetrics};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Result of one genome's evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub genome_id: GenomeId,
    pub generation: u32,
    pub fitness: f64,
    pub valid: bool,
    pub metrics: Option<RawMetrics>,
    pub score: Option<FitnessScore>,
    /// Why the genome was marked invalid, if it was.
    pub failure: Option<String>,
}

/// Persistence collaborator. Failures are logged by the engine and never
/// stop a run.
pub trait RunRecorder: Send {
    fn record_genome(&mut self, genome: &Genome) -> anyhow::Result<()>;
    fn record_result(&mut self, record: &EvaluationRecord) -> anyhow::Result<()>;
    fn record_generation_stats(&mut self, stats: &GenerationStats) -> anyhow::Result<()>;
}

pub struct NullRecorder;

impl RunRecorder for NullRecorder {
    fn record_genome(&mut self, _genome: &Genome) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_result(&mut self, _record: &EvaluationRecord) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_generation_stats(&mut self, _stats: &GenerationStats) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    pub genomes: Vec<Genome>,
    pub results: Vec<EvaluationRecord>,
    pub stats: Vec<GenerationStats>,
}

/// Keeps everything in memory behind a shared handle, so the caller can
/// inspect records while or after the engine owns the recorder.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    log: Arc<Mutex<RecordLog>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RecordLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl RunRecorder for MemoryRecorder {
    fn record_genome(&mut self, genome: &Genome) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .genomes
            .push(genome.clone());
        Ok(())
    }

    fn record_result(&mut self, record: &EvaluationRecord) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .push(record.clone());
        Ok(())
    }

    fn record_generation_stats(&mut self, stats: &GenerationStats) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .push(stats.clone());
        Ok(())
    }
}
