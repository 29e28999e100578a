//! Parent selection.
//!
//! Every function here takes the candidate set by reference and never touches
//! the population. All candidates must already carry a fitness value; an
//! unevaluated candidate is reported as `SelectionPrecondition`.

use crate::config::SelectionMethod;
use crate::engines::generation::genome::Genome;
use crate::error::{EvolutionError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::cmp::Ordering;

/// Keeps every roulette weight strictly positive.
pub const ROULETTE_EPSILON: f64 = 1e-6;

/// Ranking order: fitness descending, then genome id ascending.
/// Unevaluated genomes sort after evaluated ones.
pub fn rank_order(a: &Genome, b: &Genome) -> Ordering {
    match (a.fitness, b.fitness) {
        (Some(fa), Some(fb)) => fb.partial_cmp(&fa).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn fitness_values(candidates: &[&Genome]) -> Result<Vec<f64>> {
    if candidates.is_empty() {
        return Err(EvolutionError::SelectionPrecondition(
            "cannot select from an empty candidate set".to_string(),
        ));
    }
    candidates
        .iter()
        .map(|g| {
            g.fitness.ok_or_else(|| {
                EvolutionError::SelectionPrecondition(format!("genome {} has no fitness", g.id))
            })
        })
        .collect()
}

/// Best of `k` sampled candidates; without replacement unless the pool is smaller than `k`.
pub fn tournament<'a, R: Rng + ?Sized>(
    candidates: &[&'a Genome],
    k: usize,
    rng: &mut R,
) -> Result<&'a Genome> {
    fitness_values(candidates)?;
    let n = candidates.len();
    let k = k.max(1);

    let contestants: Vec<usize> = if n >= k {
        index::sample(rng, n, k).into_vec()
    } else {
        (0..k).map(|_| rng.gen_range(0..n)).collect()
    };

    let winner = contestants
        .into_iter()
        .map(|i| candidates[i])
        .min_by(|a, b| rank_order(a, b))
        .ok_or_else(|| EvolutionError::SelectionPrecondition("empty tournament".to_string()))?;
    Ok(winner)
}

/// Fitness-proportionate selection on `fitness - min + epsilon`.
pub fn roulette<'a, R: Rng + ?Sized>(candidates: &[&'a Genome], rng: &mut R) -> Result<&'a Genome> {
    let fitness = fitness_values(candidates)?;
    let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = fitness.iter().map(|f| f - min + ROULETTE_EPSILON).collect();
    weighted_pick(candidates, &weights, rng)
}

/// Selection probability proportional to rank position (worst = 1, best = n).
pub fn rank<'a, R: Rng + ?Sized>(candidates: &[&'a Genome], rng: &mut R) -> Result<&'a Genome> {
    fitness_values(candidates)?;
    let mut ordered: Vec<&'a Genome> = candidates.to_vec();
    // worst first, so the best candidate gets the largest weight
    ordered.sort_by(|a, b| rank_order(b, a));
    let weights: Vec<f64> = (1..=ordered.len()).map(|r| r as f64).collect();
    weighted_pick(&ordered, &weights, rng)
}

/// Top `n` candidates, deterministic.
pub fn elite<'a>(candidates: &[&'a Genome], n: usize) -> Result<Vec<&'a Genome>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    fitness_values(candidates)?;
    let mut ordered: Vec<&'a Genome> = candidates.to_vec();
    ordered.sort_by(|a, b| rank_order(a, b));
    ordered.truncate(n);
    Ok(ordered)
}

fn weighted_pick<'a, R: Rng + ?Sized>(
    candidates: &[&'a Genome],
    weights: &[f64],
    rng: &mut R,
) -> Result<&'a Genome> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| EvolutionError::SelectionPrecondition(format!("invalid weights: {}", e)))?;
    Ok(candidates[dist.sample(rng)])
}

/// Pick one parent with the configured method. `Elite` draws uniformly from
/// the top `elite_size` candidates.
pub fn select<'a, R: Rng + ?Sized>(
    method: SelectionMethod,
    candidates: &[&'a Genome],
    tournament_size: usize,
    elite_size: usize,
    rng: &mut R,
) -> Result<&'a Genome> {
    match method {
        SelectionMethod::Tournament => tournament(candidates, tournament_size, rng),
        SelectionMethod::Roulette => roulette(candidates, rng),
        SelectionMethod::Rank => rank(candidates, rng),
        SelectionMethod::Elite => {
            let pool = elite(candidates, elite_size.max(1))?;
            pool.choose(rng).copied().ok_or_else(|| {
                EvolutionError::SelectionPrecondition("empty elite pool".to_string())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::genome::tests::sample_genes;
    use crate::types::GenomeId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn scored(id: u64, fitness: f64) -> Genome {
        let mut g = Genome::seed(GenomeId(id), 0, sample_genes(&["rsi", "mfi"]));
        g.fitness = Some(fitness);
        g
    }

    #[test]
    fn test_unevaluated_candidate_rejected() {
        let a = scored(1, 0.5);
        let b = Genome::seed(GenomeId(2), 0, sample_genes(&["rsi", "mfi"]));
        let pool = vec![&a, &b];
        let mut rng = StdRng::seed_from_u64(0);

        for method in [
            SelectionMethod::Tournament,
            SelectionMethod::Roulette,
            SelectionMethod::Rank,
            SelectionMethod::Elite,
        ] {
            let result = select(method, &pool, 2, 1, &mut rng);
            assert!(matches!(result, Err(EvolutionError::SelectionPrecondition(_))));
        }
    }

    #[test]
    fn test_empty_pool_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(tournament(&[], 3, &mut rng).is_err());
        assert!(roulette(&[], &mut rng).is_err());
    }

    #[test]
    fn test_full_tournament_picks_best_with_id_tiebreak() {
        let genomes = vec![scored(5, 0.9), scored(2, 0.9), scored(8, 0.1)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let winner = tournament(&pool, 3, &mut rng).unwrap();
            assert_eq!(winner.id, GenomeId(2));
        }
    }

    #[test]
    fn test_tournament_with_replacement_when_pool_small() {
        let genomes = vec![scored(1, 0.2), scored(2, 0.4)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        let winner = tournament(&pool, 5, &mut rng).unwrap();
        assert!(winner.id == GenomeId(1) || winner.id == GenomeId(2));
    }

    #[test]
    fn test_roulette_gives_every_member_a_chance() {
        let genomes = vec![scored(1, 0.0), scored(2, 0.0), scored(3, 0.0)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(4);
        let mut counts: HashMap<GenomeId, usize> = HashMap::new();
        for _ in 0..3000 {
            *counts.entry(roulette(&pool, &mut rng).unwrap().id).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c > 800));
    }

    #[test]
    fn test_roulette_favours_fitter() {
        let genomes = vec![scored(1, 0.1), scored(2, 0.9)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(4);
        let wins = (0..2000)
            .filter(|_| roulette(&pool, &mut rng).unwrap().id == GenomeId(2))
            .count();
        assert!(wins > 1900);
    }

    #[test]
    fn test_rank_ignores_fitness_scale() {
        // An outlier should not dominate: rank weights are 1 and 2.
        let genomes = vec![scored(1, 0.001), scored(2, 1.0)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(21);
        let wins = (0..3000)
            .filter(|_| rank(&pool, &mut rng).unwrap().id == GenomeId(2))
            .count();
        let share = wins as f64 / 3000.0;
        assert!((share - 2.0 / 3.0).abs() < 0.05, "share = {}", share);
    }

    #[test]
    fn test_elite_is_sorted_and_stable() {
        let genomes = vec![scored(4, 0.5), scored(1, 0.8), scored(3, 0.5), scored(2, 0.1)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let ids: Vec<GenomeId> = elite(&pool, 3).unwrap().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GenomeId(1), GenomeId(3), GenomeId(4)]);
        assert_eq!(elite(&pool, 10).unwrap().len(), 4);
    }

    #[test]
    fn test_elite_method_draws_from_top() {
        let genomes = vec![scored(1, 0.9), scored(2, 0.8), scored(3, 0.1), scored(4, 0.0)];
        let pool: Vec<&Genome> = genomes.iter().collect();
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            let pick = select(SelectionMethod::Elite, &pool, 3, 2, &mut rng).unwrap();
            assert!(pick.id == GenomeId(1) || pick.id == GenomeId(2));
        }
    }
}
