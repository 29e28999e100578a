use crate::engines::generation::genome::Genome;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Jaccard distance between two indicator key sets: 0 for identical sets,
/// 1 for disjoint ones.
pub fn jaccard_distance(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    1.0 - intersection as f64 / union as f64
}

/// Mean pairwise Jaccard distance over the genomes' indicator sets.
pub fn indicator_diversity<'a, I>(genomes: I) -> f64
where
    I: IntoIterator<Item = &'a Genome>,
{
    let sets: Vec<BTreeSet<&str>> = genomes.into_iter().map(|g| g.genes.indicator_keys()).collect();
    if sets.len() < 2 {
        return 0.0;
    }

    // rows in parallel, summed in order so the result is reproducible
    let rows: Vec<f64> = (0..sets.len())
        .into_par_iter()
        .map(|i| sets[i + 1..].iter().map(|other| jaccard_distance(&sets[i], other)).sum::<f64>())
        .collect();
    let pairs = sets.len() * (sets.len() - 1) / 2;
    rows.iter().sum::<f64>() / pairs as f64
}
