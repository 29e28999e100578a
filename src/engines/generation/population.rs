//! Population manager.
//!
//! Owns the genomes of the current generation and their fitness. Only the
//! coordinating thread mutates a `Population`; evaluation workers hand their
//! results back and the engine records them here one at a time.

use crate::engines::generation::generator::GenomeGenerator;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::operators::{rank_order, GeneticOperators};
use crate::error::{EvolutionError, Result};
use crate::types::{GenomeId, GenomeIdAllocator};
use log::debug;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized population state, enough to rebuild it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub generation: u32,
    pub size: usize,
    pub next_genome_id: u64,
    /// Ordered by id.
    pub genomes: Vec<Genome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    generation: u32,
    size: usize,
    members: BTreeMap<GenomeId, Genome>,
    fitness_index: BTreeMap<GenomeId, f64>,
    ids: GenomeIdAllocator,
}

impl Population {
    pub fn new(size: usize) -> Self {
        Self {
            generation: 0,
            size,
            members: BTreeMap::new(),
            fitness_index: BTreeMap::new(),
            ids: GenomeIdAllocator::new(),
        }
    }

    /// Generation 0 filled with `size` freshly generated genomes.
    pub fn initialize(
        size: usize,
        generator: &dyn GenomeGenerator,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let mut population = Self::new(size);
        for _ in 0..size {
            let genes = generator.generate(rng)?;
            let id = population.ids.next_id();
            population.add(Genome::seed(id, 0, genes))?;
        }
        Ok(population)
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: GenomeId) -> Option<&Genome> {
        self.members.get(&id)
    }

    pub fn fitness(&self, id: GenomeId) -> Option<f64> {
        self.fitness_index.get(&id).copied()
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &Genome> + Clone {
        self.members.values()
    }

    /// Copy of the id allocator, for handing out ids while members are borrowed.
    pub fn id_allocator(&self) -> GenomeIdAllocator {
        self.ids
    }

    pub fn ids_mut(&mut self) -> &mut GenomeIdAllocator {
        &mut self.ids
    }

    pub fn add(&mut self, genome: Genome) -> Result<()> {
        if self.members.contains_key(&genome.id) {
            return Err(EvolutionError::DuplicateGenomeId(genome.id));
        }
        self.ids.observe(genome.id);
        if let Some(fitness) = genome.fitness {
            self.fitness_index.insert(genome.id, fitness);
        }
        self.members.insert(genome.id, genome);
        Ok(())
    }

    pub fn set_fitness(&mut self, id: GenomeId, score: f64) -> Result<()> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(EvolutionError::InvalidFitness(score));
        }
        let genome = self
            .members
            .get_mut(&id)
            .ok_or(EvolutionError::UnknownGenome(id))?;
        genome.fitness = Some(score);
        self.fitness_index.insert(id, score);
        Ok(())
    }

    /// Record a failed evaluation: fitness 0 and `valid = false`.
    pub fn mark_invalid(&mut self, id: GenomeId) -> Result<()> {
        let genome = self
            .members
            .get_mut(&id)
            .ok_or(EvolutionError::UnknownGenome(id))?;
        genome.fitness = Some(0.0);
        genome.valid = false;
        self.fitness_index.insert(id, 0.0);
        Ok(())
    }

    /// Genomes by fitness descending, ties by id ascending, unscored last.
    pub fn top_n(&self, n: usize) -> Vec<&Genome> {
        let mut ranked: Vec<&Genome> = self.members.values().collect();
        ranked.sort_by(|a, b| rank_order(a, b));
        ranked.truncate(n);
        ranked
    }

    pub fn evaluated(&self) -> Vec<&Genome> {
        self.members.values().filter(|g| g.is_evaluated()).collect()
    }

    pub fn unevaluated(&self) -> Vec<&Genome> {
        self.members.values().filter(|g| !g.is_evaluated()).collect()
    }

    /// Drop every genome marked invalid. Returns how many were removed.
    pub fn purge_invalid(&mut self) -> usize {
        let before = self.members.len();
        self.members.retain(|_, g| g.valid);
        let members = &self.members;
        self.fitness_index.retain(|id, _| members.contains_key(id));
        before - self.members.len()
    }

    /// Replace the members with `elite ∪ offspring`, sized to exactly
    /// `size`, and move to the next generation.
    ///
    /// Surplus offspring are dropped. A shortfall is made up with
    /// mutation-only children of tournament-selected current members.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        mut elite: Vec<Genome>,
        offspring: Vec<Genome>,
        operators: &GeneticOperators,
        rng: &mut R,
    ) -> Result<()> {
        let next_generation = self.generation + 1;
        elite.truncate(self.size);

        let mut next = BTreeMap::new();
        for genome in elite.into_iter().chain(offspring) {
            if next.len() >= self.size {
                break;
            }
            if next.contains_key(&genome.id) {
                return Err(EvolutionError::DuplicateGenomeId(genome.id));
            }
            self.ids.observe(genome.id);
            next.insert(genome.id, genome);
        }

        if next.len() < self.size {
            let parents: Vec<&Genome> = self.members.values().filter(|g| g.is_evaluated()).collect();
            let missing = self.size - next.len();
            debug!("Padding generation {} with {} mutation-only children", next_generation, missing);
            for _ in 0..missing {
                let child = operators.mutation_only_child(&parents, next_generation, &mut self.ids, rng)?;
                next.insert(child.id, child);
            }
        }

        self.fitness_index = next
            .values()
            .filter_map(|g| g.fitness.map(|f| (g.id, f)))
            .collect();
        self.members = next;
        self.generation = next_generation;
        Ok(())
    }

    pub fn checkpoint(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            generation: self.generation,
            size: self.size,
            next_genome_id: self.ids.peek(),
            genomes: self.members.values().cloned().collect(),
        }
    }

    pub fn restore(snapshot: PopulationSnapshot) -> Result<Self> {
        let mut population = Self::new(snapshot.size);
        population.generation = snapshot.generation;
        population.ids = GenomeIdAllocator::starting_at(snapshot.next_genome_id);
        for genome in snapshot.genomes {
            population.add(genome)?;
        }
        Ok(population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvolutionConfig, GenomeConfig};
    use crate::engines::generation::catalog::IndicatorCatalog;
    use crate::engines::generation::generator::RandomGenomeGenerator;
    use crate::engines::generation::genome::tests::sample_genes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn genome(id: u64) -> Genome {
        Genome::seed(GenomeId(id), 0, sample_genes(&["rsi", "mfi"]))
    }

    fn scored_population(fitness: &[f64]) -> Population {
        let mut population = Population::new(fitness.len());
        for (i, f) in fitness.iter().enumerate() {
            population.add(genome(i as u64)).unwrap();
            population.set_fitness(GenomeId(i as u64), *f).unwrap();
        }
        population
    }

    fn operators() -> GeneticOperators {
        GeneticOperators::from_config(
            &EvolutionConfig::default(),
            &GenomeConfig::default(),
            IndicatorCatalog::standard(),
        )
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut population = Population::new(2);
        population.add(genome(1)).unwrap();
        assert!(matches!(
            population.add(genome(1)),
            Err(EvolutionError::DuplicateGenomeId(GenomeId(1)))
        ));
    }

    #[test]
    fn test_set_fitness_checks() {
        let mut population = Population::new(2);
        population.add(genome(1)).unwrap();
        assert!(matches!(
            population.set_fitness(GenomeId(7), 0.5),
            Err(EvolutionError::UnknownGenome(GenomeId(7)))
        ));
        assert!(matches!(
            population.set_fitness(GenomeId(1), 1.5),
            Err(EvolutionError::InvalidFitness(_))
        ));
        assert!(population.set_fitness(GenomeId(1), f64::NAN).is_err());

        population.set_fitness(GenomeId(1), 0.25).unwrap();
        assert_eq!(population.fitness(GenomeId(1)), Some(0.25));
        assert_eq!(population.get(GenomeId(1)).unwrap().fitness, Some(0.25));
    }

    #[test]
    fn test_top_n_order() {
        let population = scored_population(&[0.3, 0.9, 0.3, 0.1]);
        let ids: Vec<GenomeId> = population.top_n(3).iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GenomeId(1), GenomeId(0), GenomeId(2)]);
        assert_eq!(population.top_n(10).len(), 4);
    }

    #[test]
    fn test_mark_invalid_and_purge() {
        let mut population = scored_population(&[0.3, 0.9, 0.5]);
        population.mark_invalid(GenomeId(1)).unwrap();
        assert_eq!(population.fitness(GenomeId(1)), Some(0.0));
        assert!(!population.get(GenomeId(1)).unwrap().valid);

        assert_eq!(population.purge_invalid(), 1);
        assert_eq!(population.len(), 2);
        assert_eq!(population.fitness(GenomeId(1)), None);
    }

    #[test]
    fn test_advance_keeps_elite_and_pads() {
        let mut population = scored_population(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        let elite: Vec<Genome> = population.top_n(2).into_iter().cloned().collect();
        let before: Vec<Genome> = elite.clone();

        // only one offspring for three open slots
        let id = population.ids_mut().next_id();
        let child = population.get(GenomeId(0)).unwrap().derive(id, 1);
        population
            .advance(elite, vec![child], &operators(), &mut StdRng::seed_from_u64(4))
            .unwrap();

        assert_eq!(population.generation(), 1);
        assert_eq!(population.len(), 5);
        for genome in &before {
            assert_eq!(population.get(genome.id), Some(genome));
        }
        assert_eq!(population.unevaluated().len(), 3);
        assert_eq!(population.evaluated().len(), 2);
        for genome in population.unevaluated() {
            assert_eq!(genome.generation, 1);
            assert_eq!(genome.parent_ids.len(), 1);
        }
    }

    #[test]
    fn test_advance_truncates_surplus() {
        let mut population = scored_population(&[0.1, 0.2, 0.3]);
        let offspring: Vec<Genome> = (0..5)
            .map(|_| {
                let id = population.ids_mut().next_id();
                population.get(GenomeId(0)).unwrap().derive(id, 1)
            })
            .collect();
        population
            .advance(Vec::new(), offspring, &operators(), &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(population.len(), 3);
    }

    #[test]
    fn test_advance_rejects_duplicate_ids() {
        let mut population = scored_population(&[0.1, 0.2, 0.3]);
        let elite: Vec<Genome> = population.top_n(1).into_iter().cloned().collect();
        let offspring = elite.clone();
        let result = population.advance(elite, offspring, &operators(), &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EvolutionError::DuplicateGenomeId(_))));
    }

    #[test]
    fn test_checkpoint_restore_identical() {
        let generator = RandomGenomeGenerator::new(IndicatorCatalog::standard(), GenomeConfig::default());
        let mut rng = StdRng::seed_from_u64(77);
        let mut population = Population::initialize(6, &generator, &mut rng).unwrap();
        population.set_fitness(GenomeId(2), 0.123456789).unwrap();
        population.mark_invalid(GenomeId(4)).unwrap();

        let json = serde_json::to_string(&population.checkpoint()).unwrap();
        let snapshot: PopulationSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Population::restore(snapshot).unwrap();

        assert_eq!(restored, population);
        assert_eq!(restored.checkpoint(), population.checkpoint());
    }

    #[test]
    fn test_ids_continue_after_restore() {
        let mut population = scored_population(&[0.5, 0.6]);
        let mut restored = Population::restore(population.checkpoint()).unwrap();
        assert_eq!(restored.ids_mut().next_id(), population.ids_mut().next_id());
    }
}
