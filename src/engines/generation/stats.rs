use crate::engines::generation::diversity::indicator_diversity;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::operators::rank_order;
use crate::types::GenomeId;
use serde::{Deserialize, Serialize};

/// Outcome counts for one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTally {
    pub dispatched: usize,
    pub scored: usize,
    pub invalid_genomes: usize,
    pub timeouts: usize,
    pub errors: usize,
    pub insufficient_trades: usize,
    /// Skipped because the run was stopped before they started.
    pub cancelled: usize,
}

impl EvaluationTally {
    pub fn failures(&self) -> usize {
        self.invalid_genomes + self.timeouts + self.errors + self.insufficient_trades
    }
}

/// Aggregate view of one generation after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u32,
    pub population: usize,
    pub valid: usize,
    pub invalid: usize,
    pub purged: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub std_fitness: f64,
    pub diversity: f64,
    pub best_genome: Option<GenomeId>,
    pub evaluation: EvaluationTally,
}

impl GenerationStats {
    /// Summarise the scored members of a generation. Unscored genomes are
    /// left out of the fitness figures.
    pub fn from_members<'a, I>(generation: u32, members: I, evaluation: EvaluationTally) -> Self
    where
        I: IntoIterator<Item = &'a Genome>,
        I::IntoIter: Clone,
    {
        let members = members.into_iter();
        let population = members.clone().count();
        let valid = members.clone().filter(|g| g.valid).count();

        let scored: Vec<&Genome> = members.clone().filter(|g| g.fitness.is_some()).collect();
        let fitness: Vec<f64> = scored.iter().map(|g| g.fitness_or_zero()).collect();

        let (best_fitness, avg_fitness, worst_fitness, std_fitness) = if fitness.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let n = fitness.len() as f64;
            let best = fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let worst = fitness.iter().copied().fold(f64::INFINITY, f64::min);
            let avg = fitness.iter().sum::<f64>() / n;
            let variance = fitness.iter().map(|f| (f - avg).powi(2)).sum::<f64>() / n;
            (best, avg, worst, variance.sqrt())
        };

        let best_genome = scored
            .iter()
            .copied()
            .min_by(|a, b| rank_order(a, b))
            .map(|g| g.id);

        Self {
            generation,
            population,
            valid,
            invalid: population - valid,
            purged: 0,
            best_fitness,
            avg_fitness,
            worst_fitness,
            std_fitness,
            diversity: indicator_diversity(members),
            best_genome,
            evaluation,
        }
    }
}
