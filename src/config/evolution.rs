use super::traits::{check_probability, ConfigSection};
use crate::error::EvolutionError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub elite_size: usize,
    pub max_generations: u32,
    /// Probability that an offspring is mutated at all.
    pub mutation_rate: f64,
    /// Per-gene mutation probability; falls back to `mutation_rate`.
    pub gene_mutation_rate: Option<f64>,
    /// Relative perturbation bound for numeric genes (0.15 = ±15%).
    pub mutation_strength: f64,
    pub max_mutation_retries: usize,
    pub crossover_rate: f64,
    pub crossover_method: CrossoverMethod,
    /// Cut points used by `CrossoverMethod::MultiPoint`.
    pub crossover_points: usize,
    pub selection_method: SelectionMethod,
    pub tournament_size: usize,
    /// Share of offspring slots filled with fresh random genomes.
    pub immigrant_rate: f64,
    /// Stop after this many generations without best-fitness improvement.
    pub convergence_patience: Option<usize>,
    pub convergence_tolerance: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Tournament,
    Roulette,
    Rank,
    Elite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverMethod {
    SinglePoint,
    MultiPoint,
    Uniform,
    /// Exchange one or two indicators between the parents.
    IndicatorSwap,
    /// Pick single-point, uniform or indicator swap per pairing.
    Mixed,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            elite_size: 10,
            max_generations: 1000,
            mutation_rate: 0.20,
            gene_mutation_rate: None,
            mutation_strength: 0.15,
            max_mutation_retries: 3,
            crossover_rate: 0.70,
            crossover_method: CrossoverMethod::SinglePoint,
            crossover_points: 2,
            selection_method: SelectionMethod::Tournament,
            tournament_size: 5,
            immigrant_rate: 0.0,
            convergence_patience: None,
            convergence_tolerance: 1e-6,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    pub fn gene_mutation_rate(&self) -> f64 {
        self.gene_mutation_rate.unwrap_or(self.mutation_rate)
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size < 2 {
            return Err(EvolutionError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.elite_size >= self.population_size {
            return Err(EvolutionError::Configuration(format!(
                "Elite size ({}) must be smaller than population size ({})",
                self.elite_size, self.population_size
            )));
        }
        if self.max_generations == 0 {
            return Err(EvolutionError::Configuration(
                "max_generations must be at least 1".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(EvolutionError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        if self.crossover_points == 0 {
            return Err(EvolutionError::Configuration(
                "crossover_points must be at least 1".to_string(),
            ));
        }
        if !self.convergence_tolerance.is_finite() || self.convergence_tolerance < 0.0 {
            return Err(EvolutionError::Configuration(
                "convergence_tolerance must be a non-negative number".to_string(),
            ));
        }

        let section = Self::section_name();
        check_probability(section, "mutation_rate", self.mutation_rate)?;
        check_probability(section, "gene_mutation_rate", self.gene_mutation_rate())?;
        check_probability(section, "mutation_strength", self.mutation_strength)?;
        check_probability(section, "crossover_rate", self.crossover_rate)?;
        check_probability(section, "immigrant_rate", self.immigrant_rate)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_elite_must_leave_room_for_offspring() {
        let config = EvolutionConfig {
            population_size: 10,
            elite_size: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EvolutionError::Configuration(_))));
    }

    #[test]
    fn test_rates_out_of_range() {
        let config = EvolutionConfig {
            crossover_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvolutionConfig {
            gene_mutation_rate: Some(-0.1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
