use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use strategy_evolver::config::{FitnessConfig, GenomeConfig};
use strategy_evolver::engines::evaluation::FitnessEvaluator;
use strategy_evolver::engines::generation::operators::selection::tournament;
use strategy_evolver::engines::generation::operators::{apply_mask, split_mask, CrossoverMask, Mutator};
use strategy_evolver::engines::generation::{
    Genes, Genome, GenomeGenerator, IndicatorCatalog, IndicatorGene, IndicatorKind, Population,
    RandomGenomeGenerator,
};
use strategy_evolver::types::{GenomeId, RawMetrics};

fn bare_genes(prefix: &str, n: usize) -> Genes {
    Genes {
        indicators: (0..n)
            .map(|i| IndicatorGene {
                key: format!("{}{}", prefix, i),
                kind: IndicatorKind::Momentum,
                params: BTreeMap::new(),
            })
            .collect(),
        ..Genes::default()
    }
}

fn keys(genes: &Genes) -> Vec<String> {
    genes.indicators.iter().map(|g| g.key.clone()).collect()
}

proptest! {
    #[test]
    fn test_top_n_orders_by_fitness_then_id(
        scores in prop::collection::vec(prop::option::of(0.0f64..=1.0), 1..30),
        n in 0usize..40,
    ) {
        let mut population = Population::new(scores.len());
        for (i, score) in scores.iter().enumerate() {
            let id = GenomeId(i as u64);
            population.add(Genome::seed(id, 0, Genes::default())).unwrap();
            if let Some(score) = score {
                population.set_fitness(id, *score).unwrap();
            }
        }

        let top = population.top_n(n);
        prop_assert_eq!(top.len(), n.min(scores.len()));
        for pair in top.windows(2) {
            match (pair[0].fitness, pair[1].fitness) {
                (Some(a), Some(b)) => {
                    prop_assert!(a > b || (a == b && pair[0].id < pair[1].id));
                }
                (Some(_), None) => {}
                (None, None) => prop_assert!(pair[0].id < pair[1].id),
                (None, Some(_)) => prop_assert!(false, "unscored genome ranked above a scored one"),
            }
        }
    }

    #[test]
    fn test_mutation_keeps_genomes_valid(seed in any::<u64>()) {
        let limits = GenomeConfig::default();
        let catalog = IndicatorCatalog::standard();
        let generator = RandomGenomeGenerator::new(catalog.clone(), limits.clone());
        let mut rng = StdRng::seed_from_u64(seed);

        let genome = Genome::seed(GenomeId(1), 0, generator.generate(&mut rng).unwrap());
        let mutator = Mutator::new(catalog, limits.clone(), 1.0, 1.0, 3);
        let mutated = mutator.mutate(&genome, &mut rng);

        prop_assert_eq!(mutated.id, genome.id);
        prop_assert!(mutated.validate(&limits).is_ok());
        for (_, param) in mutated.genes.parameters.iter() {
            prop_assert!(param.in_range());
        }
        for indicator in &mutated.genes.indicators {
            prop_assert!(indicator.params.values().all(|p| p.in_range()));
        }
    }

    #[test]
    fn test_fitness_stays_in_unit_range(
        profit in any::<f64>(),
        sharpe in any::<f64>(),
        max_drawdown in any::<f64>(),
        win_rate in any::<f64>(),
        trade_count in 1u64..1000,
        stability in any::<f64>(),
    ) {
        let evaluator = FitnessEvaluator::new(FitnessConfig::default());
        let score = evaluator
            .score(&RawMetrics { profit, sharpe, max_drawdown, win_rate, trade_count, stability })
            .unwrap();
        prop_assert!(score.fitness.is_finite());
        prop_assert!((0.0..=1.0).contains(&score.fitness));
    }

    #[test]
    fn test_single_point_split_swaps_tails(n in 1usize..8, cut in 0usize..8) {
        let k = cut.min(n);
        let p1 = bare_genes("a", n);
        let p2 = bare_genes("b", n);
        let mask = CrossoverMask {
            indicators: split_mask(n, k),
            ..CrossoverMask::default()
        };

        let (a, b) = apply_mask(&p1, &p2, &mask);
        let expected_a: Vec<String> = (0..n)
            .map(|i| if i < k { format!("a{}", i) } else { format!("b{}", i) })
            .collect();
        let expected_b: Vec<String> = (0..n)
            .map(|i| if i < k { format!("b{}", i) } else { format!("a{}", i) })
            .collect();
        prop_assert_eq!(keys(&a), expected_a);
        prop_assert_eq!(keys(&b), expected_b);
    }
}

#[test]
fn test_tournament_of_one_is_uniform() {
    let genomes: Vec<Genome> = (0..5)
        .map(|i| {
            let mut genome = Genome::seed(GenomeId(i), 0, Genes::default());
            genome.fitness = Some(i as f64 / 10.0);
            genome
        })
        .collect();
    let candidates: Vec<&Genome> = genomes.iter().collect();

    let mut rng = StdRng::seed_from_u64(2024);
    let mut counts = [0usize; 5];
    for _ in 0..10_000 {
        let picked = tournament(&candidates, 1, &mut rng).unwrap();
        counts[picked.id.0 as usize] += 1;
    }
    for count in counts {
        assert!((1700..=2300).contains(&count), "{:?}", counts);
    }
}
