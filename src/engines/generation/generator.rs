use crate::config::GenomeConfig;
use crate::engines::generation::catalog::IndicatorCatalog;
use crate::engines::generation::genome::{BoundedParam, Condition, ConditionSide, Genes};
use crate::error::{EvolutionError, Result};
use rand::seq::index;
use rand::{Rng, RngCore};
use std::collections::BTreeMap;

/// Source of fresh gene payloads for generation 0 and for immigrants.
pub trait GenomeGenerator: Send {
    fn generate(&self, rng: &mut dyn RngCore) -> Result<Genes>;
}

/// Strategy-level parameters every random genome starts with: (name, min, max).
const STRATEGY_PARAMETERS: &[(&str, f64, f64)] = &[
    ("stoploss", -0.25, -0.03),
    ("minimal_roi", 0.01, 0.20),
    ("trailing_stop_offset", 0.0, 0.05),
];

pub struct RandomGenomeGenerator {
    catalog: IndicatorCatalog,
    limits: GenomeConfig,
}

impl RandomGenomeGenerator {
    pub fn new(catalog: IndicatorCatalog, limits: GenomeConfig) -> Self {
        Self { catalog, limits }
    }

    fn random_conditions(
        &self,
        genes: &Genes,
        rng: &mut dyn RngCore,
    ) -> Vec<Condition> {
        let count = rng.gen_range(self.limits.min_conditions..=self.limits.max_conditions);
        (0..count)
            .filter_map(|_| self.catalog.random_condition(&genes.indicators, rng))
            .collect()
    }
}

impl GenomeGenerator for RandomGenomeGenerator {
    fn generate(&self, rng: &mut dyn RngCore) -> Result<Genes> {
        let available = self.catalog.len();
        if available < self.limits.min_indicators {
            return Err(EvolutionError::Generation(format!(
                "Catalog has {} indicators, genomes need at least {}",
                available, self.limits.min_indicators
            )));
        }

        let max = self.limits.max_indicators.min(available);
        let count = rng.gen_range(self.limits.min_indicators..=max);
        let mut genes = Genes {
            indicators: index::sample(rng, available, count)
                .into_iter()
                .map(|i| self.catalog.specs()[i].instantiate(rng))
                .collect(),
            ..Genes::default()
        };

        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            let conditions = self.random_conditions(&genes, rng);
            *genes.conditions_mut(side) = conditions;
        }

        genes.parameters = STRATEGY_PARAMETERS
            .iter()
            .map(|&(name, min, max)| {
                (name.to_string(), BoundedParam::new(rng.gen_range(min..=max), min, max))
            })
            .collect::<BTreeMap<_, _>>();

        genes.check(&self.limits).map_err(|v| EvolutionError::Generation(v.to_string()))?;
        Ok(genes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_genes_respect_limits() {
        let limits = GenomeConfig::default();
        let generator = RandomGenomeGenerator::new(IndicatorCatalog::standard(), limits.clone());
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let genes = generator.generate(&mut rng).unwrap();
            assert!(genes.check(&limits).is_ok());
            assert!(genes.parameters.contains_key("stoploss"));
        }
    }

    #[test]
    fn test_same_seed_same_genes() {
        let generator = RandomGenomeGenerator::new(IndicatorCatalog::standard(), GenomeConfig::default());
        let a = generator.generate(&mut StdRng::seed_from_u64(5)).unwrap();
        let b = generator.generate(&mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_catalog_rejected() {
        let catalog = IndicatorCatalog::new(IndicatorCatalog::standard().specs()[..1].to_vec());
        let generator = RandomGenomeGenerator::new(catalog, GenomeConfig::default());
        let result = generator.generate(&mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EvolutionError::Generation(_))));
    }
}
