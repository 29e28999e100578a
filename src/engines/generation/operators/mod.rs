//! Genetic operators: selection, crossover and mutation.
//!
//! All operators take a seedable random source and return new genomes; none
//! of them touch the population they read from.

pub mod crossover;
pub mod mutation;
pub mod selection;

pub use crossover::{apply_mask, apply_swaps, split_mask, Crossover, CrossoverMask, Recombination};
pub use mutation::Mutator;
pub use selection::rank_order;

use crate::config::{EvolutionConfig, GenomeConfig, SelectionMethod};
use crate::engines::generation::catalog::IndicatorCatalog;
use crate::engines::generation::genome::Genome;
use crate::error::Result;
use crate::types::GenomeIdAllocator;
use rand::Rng;

/// Operator set configured for one run.
#[derive(Debug, Clone)]
pub struct GeneticOperators {
    selection_method: SelectionMethod,
    tournament_size: usize,
    elite_size: usize,
    crossover_rate: f64,
    mutation_rate: f64,
    limits: GenomeConfig,
    crossover: Crossover,
    mutator: Mutator,
}

impl GeneticOperators {
    pub fn from_config(
        evolution: &EvolutionConfig,
        limits: &GenomeConfig,
        catalog: IndicatorCatalog,
    ) -> Self {
        Self {
            selection_method: evolution.selection_method,
            tournament_size: evolution.tournament_size,
            elite_size: evolution.elite_size,
            crossover_rate: evolution.crossover_rate,
            mutation_rate: evolution.mutation_rate,
            limits: limits.clone(),
            crossover: Crossover::new(evolution.crossover_method, evolution.crossover_points),
            mutator: Mutator::new(
                catalog,
                limits.clone(),
                evolution.gene_mutation_rate(),
                evolution.mutation_strength,
                evolution.max_mutation_retries,
            ),
        }
    }

    pub fn select_parent<'a, R: Rng + ?Sized>(
        &self,
        candidates: &[&'a Genome],
        rng: &mut R,
    ) -> Result<&'a Genome> {
        selection::select(
            self.selection_method,
            candidates,
            self.tournament_size,
            self.elite_size,
            rng,
        )
    }

    /// Produce offspring in pairs for `generation`. An odd `count` leaves
    /// the last slot to [`Population::advance`](crate::engines::generation::population::Population::advance),
    /// which pads with a mutation-only child.
    pub fn breed<R: Rng + ?Sized>(
        &self,
        parents: &[&Genome],
        count: usize,
        generation: u32,
        ids: &mut GenomeIdAllocator,
        rng: &mut R,
    ) -> Result<Vec<Genome>> {
        let mut offspring = Vec::with_capacity(count);
        while offspring.len() + 2 <= count {
            let p1 = self.select_parent(parents, rng)?;
            let p2 = self.select_parent(parents, rng)?;

            let (a, b) = if rng.gen_bool(self.crossover_rate) {
                self.crossover.cross(p1, p2, generation, &self.limits, ids, rng)
            } else {
                (p1.derive(ids.next_id(), generation), p2.derive(ids.next_id(), generation))
            };

            for child in [a, b] {
                let child = if rng.gen_bool(self.mutation_rate) {
                    self.mutator.mutate(&child, rng)
                } else {
                    child
                };
                offspring.push(child);
            }
        }
        Ok(offspring)
    }

    /// One tournament-selected parent, copied under a fresh id and mutated.
    pub fn mutation_only_child<R: Rng + ?Sized>(
        &self,
        parents: &[&Genome],
        generation: u32,
        ids: &mut GenomeIdAllocator,
        rng: &mut R,
    ) -> Result<Genome> {
        let parent = selection::tournament(parents, self.tournament_size, rng)?;
        let child = parent.derive(ids.next_id(), generation);
        Ok(self.mutator.mutate(&child, rng))
    }
}
