//! Point mutation over all three gene categories.

use crate::config::GenomeConfig;
use crate::engines::generation::catalog::IndicatorCatalog;
use crate::engines::generation::genome::{
    BoundedParam, Comparator, ConditionSide, Genes, Genome, Operand,
};
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Mutator {
    catalog: IndicatorCatalog,
    limits: GenomeConfig,
    /// Probability applied independently to every gene.
    gene_rate: f64,
    /// Relative perturbation bound for the first attempt.
    strength: f64,
    max_retries: usize,
}

fn perturb<R: Rng + ?Sized>(param: &mut BoundedParam, magnitude: f64, rng: &mut R) {
    if magnitude <= 0.0 {
        return;
    }
    // relative to the current value; parameters sitting at zero move by a share of their range
    let base = if param.value.abs() > f64::EPSILON { param.value.abs() } else { param.span() };
    let delta = base * rng.gen_range(-magnitude..=magnitude);
    param.set(param.value + delta);
}

impl Mutator {
    pub fn new(
        catalog: IndicatorCatalog,
        limits: GenomeConfig,
        gene_rate: f64,
        strength: f64,
        max_retries: usize,
    ) -> Self {
        Self {
            catalog,
            limits,
            gene_rate: gene_rate.clamp(0.0, 1.0),
            strength: strength.max(0.0),
            max_retries,
        }
    }

    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.gene_rate)
    }

    /// Mutate `genome`'s genes, keeping its id and lineage. If no attempt
    /// yields a valid payload, an unmodified clone is returned.
    pub fn mutate<R: Rng + ?Sized>(&self, genome: &Genome, rng: &mut R) -> Genome {
        let mut magnitude = self.strength;
        for attempt in 0..=self.max_retries {
            let mut genes = genome.genes.clone();
            self.mutate_genes(&mut genes, magnitude, rng);
            self.repair(&mut genes, rng);

            match genes.check(&self.limits) {
                Ok(()) => return genome.with_genes(genes),
                Err(violation) => {
                    debug!(
                        "Mutation of {} attempt {} rejected: {}",
                        genome.id, attempt, violation
                    );
                    magnitude *= 0.5;
                }
            }
        }
        genome.clone()
    }

    fn mutate_genes<R: Rng + ?Sized>(&self, genes: &mut Genes, magnitude: f64, rng: &mut R) {
        for param in genes.parameters.values_mut() {
            if self.roll(rng) {
                perturb(param, magnitude, rng);
            }
        }
        for indicator in &mut genes.indicators {
            for param in indicator.params.values_mut() {
                if self.roll(rng) {
                    perturb(param, magnitude, rng);
                }
            }
        }

        if self.roll(rng) {
            self.add_indicator(genes, rng);
        }
        if self.roll(rng) {
            self.remove_indicator(genes, rng);
        }
        if self.roll(rng) {
            self.replace_indicator(genes, rng);
        }

        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            for index in 0..genes.conditions(side).len() {
                if self.roll(rng) {
                    self.alter_condition(genes, side, index, magnitude, rng);
                }
            }
        }
    }

    fn add_indicator<R: Rng + ?Sized>(&self, genes: &mut Genes, rng: &mut R) {
        if genes.indicators.len() >= self.limits.max_indicators {
            return;
        }
        let present: Vec<String> = genes.indicators.iter().map(|i| i.key.clone()).collect();
        let exclude: Vec<&str> = present.iter().map(String::as_str).collect();
        if let Some(spec) = self.catalog.choose_excluding(&exclude, None, rng) {
            genes.indicators.push(spec.instantiate(rng));
        }
    }

    fn remove_indicator<R: Rng + ?Sized>(&self, genes: &mut Genes, rng: &mut R) {
        if genes.indicators.len() <= self.limits.min_indicators {
            return;
        }
        let key = match genes.indicators.choose(rng) {
            Some(indicator) => indicator.key.clone(),
            None => return,
        };
        genes.remove_indicator(&key);
    }

    /// Swap one indicator for a compatible one and re-point its conditions.
    fn replace_indicator<R: Rng + ?Sized>(&self, genes: &mut Genes, rng: &mut R) {
        if genes.indicators.is_empty() {
            return;
        }
        let position = rng.gen_range(0..genes.indicators.len());
        let old_key = genes.indicators[position].key.clone();
        let old_spec = match self.catalog.get(&old_key) {
            Some(spec) => spec,
            None => return,
        };

        let present: Vec<String> = genes.indicators.iter().map(|i| i.key.clone()).collect();
        let exclude: Vec<&str> = present.iter().map(String::as_str).collect();
        let replacement = match self.catalog.choose_excluding(&exclude, Some(old_spec), rng) {
            Some(spec) => spec,
            None => return,
        };

        genes.indicators[position] = replacement.instantiate(rng);
        let range = replacement.output_range;
        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            for condition in genes.conditions_mut(side) {
                condition.rename_indicator(&old_key, replacement.key);
                if condition.indicator == replacement.key {
                    if let (Operand::Threshold(t), Some((lo, hi))) = (&mut condition.operand, range) {
                        *t = t.clamp(lo, hi);
                    }
                }
            }
        }
    }

    fn alter_condition<R: Rng + ?Sized>(
        &self,
        genes: &mut Genes,
        side: ConditionSide,
        index: usize,
        magnitude: f64,
        rng: &mut R,
    ) {
        let range = genes
            .conditions(side)
            .get(index)
            .and_then(|c| self.catalog.threshold_range(&c.indicator));
        let condition = match genes.conditions_mut(side).get_mut(index) {
            Some(condition) => condition,
            None => return,
        };

        match (rng.gen_range(0..3), &mut condition.operand) {
            (0, Operand::Threshold(t)) => {
                let (lo, hi) = range.unwrap_or((f64::MIN, f64::MAX));
                let base = if t.abs() > f64::EPSILON { t.abs() } else { (hi - lo).min(1.0) };
                let moved = *t + base * rng.gen_range(-magnitude..=magnitude);
                *t = moved.clamp(lo, hi);
            }
            (1, _) => condition.connective = condition.connective.flipped(),
            _ => {
                let others: Vec<Comparator> = Comparator::ALL
                    .iter()
                    .copied()
                    .filter(|c| *c != condition.comparator)
                    .collect();
                if let Some(comparator) = others.choose(rng) {
                    condition.comparator = *comparator;
                }
            }
        }
    }

    /// Remove whatever breaks a structural rule, then top conditions back up.
    fn repair<R: Rng + ?Sized>(&self, genes: &mut Genes, rng: &mut R) {
        genes.dedup_indicators();
        genes.indicators.truncate(self.limits.max_indicators);
        genes.clamp_parameters();
        genes.prune_dangling_conditions();

        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            genes.conditions_mut(side).truncate(self.limits.max_conditions);
            while genes.conditions(side).len() < self.limits.min_conditions {
                match self.catalog.random_condition(&genes.indicators, rng) {
                    Some(condition) => genes.conditions_mut(side).push(condition),
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::generator::{GenomeGenerator, RandomGenomeGenerator};
    use crate::engines::generation::genome::tests::sample_genes;
    use crate::types::GenomeId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mutator(rate: f64) -> Mutator {
        Mutator::new(IndicatorCatalog::standard(), GenomeConfig::default(), rate, 0.15, 3)
    }

    fn random_genome(seed: u64) -> Genome {
        let generator = RandomGenomeGenerator::new(IndicatorCatalog::standard(), GenomeConfig::default());
        let genes = generator.generate(&mut StdRng::seed_from_u64(seed)).unwrap();
        Genome::seed(GenomeId(seed), 0, genes)
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let genome = random_genome(1);
        let mutated = mutator(0.0).mutate(&genome, &mut StdRng::seed_from_u64(3));
        assert_eq!(mutated, genome);
    }

    #[test]
    fn test_mutation_keeps_identity_and_lineage() {
        let genome = random_genome(2);
        let mutated = mutator(1.0).mutate(&genome, &mut StdRng::seed_from_u64(3));
        assert_eq!(mutated.id, genome.id);
        assert_eq!(mutated.parent_ids, genome.parent_ids);
    }

    #[test]
    fn test_full_rate_mutations_stay_valid() {
        let limits = GenomeConfig::default();
        let m = mutator(1.0);
        let mut rng = StdRng::seed_from_u64(99);
        let mut changed = 0;
        for seed in 0..100 {
            let genome = random_genome(seed);
            let mutated = m.mutate(&genome, &mut rng);
            assert!(mutated.validate(&limits).is_ok(), "{:?}", mutated.validate(&limits));
            if mutated.genes != genome.genes {
                changed += 1;
            }
        }
        assert!(changed > 80);
    }

    #[test]
    fn test_parameters_perturbed_within_bounds() {
        let genome = Genome::seed(GenomeId(1), 0, sample_genes(&["rsi", "mfi"]));
        let m = Mutator::new(IndicatorCatalog::standard(), GenomeConfig::default(), 1.0, 10.0, 0);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let mutated = m.mutate(&genome, &mut rng);
            let stoploss = mutated.genes.parameters["stoploss"];
            assert!(stoploss.in_range());
        }
    }

    #[test]
    fn test_removal_cascades_and_conditions_refilled() {
        let limits = GenomeConfig { min_indicators: 1, ..GenomeConfig::default() };
        let m = Mutator::new(IndicatorCatalog::standard(), limits.clone(), 0.5, 0.15, 3);
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let genome = Genome::seed(GenomeId(1), 0, sample_genes(&["rsi", "mfi"]));
            let mutated = m.mutate(&genome, &mut rng);
            assert!(mutated.validate(&limits).is_ok());
            assert!(!mutated.genes.entry_conditions.is_empty());
            assert!(!mutated.genes.exit_conditions.is_empty());
        }
    }

    #[test]
    fn test_unrepairable_genome_returned_unchanged() {
        // One indicator below the minimum and nothing in the catalog to add.
        let m = Mutator::new(IndicatorCatalog::new(Vec::new()), GenomeConfig::default(), 1.0, 0.15, 2);
        let genome = Genome::seed(GenomeId(4), 0, sample_genes(&["x"]));
        let mutated = m.mutate(&genome, &mut StdRng::seed_from_u64(1));
        assert_eq!(mutated, genome);
    }
}
