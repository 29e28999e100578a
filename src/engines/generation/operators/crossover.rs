//! Two-parent recombination.
//!
//! The positional variants reduce to a [`CrossoverMask`]: one boolean per
//! list position. Where the mask is `true` child A takes the first parent's
//! gene and child B the second's; where it is `false` they swap. Indicator
//! swap instead exchanges one or two indicators in place. Given a
//! [`Recombination`] the result is fully deterministic.

use crate::config::{CrossoverMethod, GenomeConfig};
use crate::engines::generation::genome::{Genes, Genome};
use crate::types::GenomeIdAllocator;
use log::debug;
use rand::seq::index;
use rand::Rng;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossoverMask {
    pub indicators: Vec<bool>,
    pub entry: Vec<bool>,
    pub exit: Vec<bool>,
    /// Indexed by parameter name in sorted order over both parents.
    pub parameters: Vec<bool>,
}

/// `true` for positions before `k`, `false` from `k` on.
pub fn split_mask(len: usize, k: usize) -> Vec<bool> {
    (0..len).map(|i| i < k).collect()
}

fn cut_point<R: Rng + ?Sized>(min_len: usize, rng: &mut R) -> usize {
    if min_len >= 2 {
        rng.gen_range(1..min_len)
    } else {
        min_len
    }
}

fn multi_point_mask<R: Rng + ?Sized>(
    len: usize,
    min_len: usize,
    points: usize,
    rng: &mut R,
) -> Vec<bool> {
    let slots = min_len.saturating_sub(1);
    let mut cuts: Vec<usize> = index::sample(rng, slots, points.min(slots))
        .into_iter()
        .map(|c| c + 1)
        .collect();
    cuts.sort_unstable();

    let mut take_first = true;
    let mut next_cut = cuts.into_iter().peekable();
    (0..len)
        .map(|i| {
            while next_cut.next_if(|&c| c == i).is_some() {
                take_first = !take_first;
            }
            take_first
        })
        .collect()
}

fn recombine<T: Clone>(a: &[T], b: &[T], mask: &[bool]) -> (Vec<T>, Vec<T>) {
    let len = a.len().max(b.len());
    let mut first = Vec::with_capacity(len);
    let mut second = Vec::with_capacity(len);
    for i in 0..len {
        let (to_first, to_second) = if mask.get(i).copied().unwrap_or(false) {
            (a.get(i), b.get(i))
        } else {
            (b.get(i), a.get(i))
        };
        first.extend(to_first.cloned());
        second.extend(to_second.cloned());
    }
    (first, second)
}

fn parameter_names<'a>(p1: &'a Genes, p2: &'a Genes) -> Vec<&'a String> {
    p1.parameters
        .keys()
        .chain(p2.parameters.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Apply `mask` to two gene payloads, returning (child A, child B) before repair.
pub fn apply_mask(p1: &Genes, p2: &Genes, mask: &CrossoverMask) -> (Genes, Genes) {
    let (ind_a, ind_b) = recombine(&p1.indicators, &p2.indicators, &mask.indicators);
    let (entry_a, entry_b) = recombine(&p1.entry_conditions, &p2.entry_conditions, &mask.entry);
    let (exit_a, exit_b) = recombine(&p1.exit_conditions, &p2.exit_conditions, &mask.exit);

    let mut params_a = p1.parameters.clone();
    let mut params_b = p2.parameters.clone();
    for (i, name) in parameter_names(p1, p2).into_iter().enumerate() {
        let keep = mask.parameters.get(i).copied().unwrap_or(false);
        let (src_a, src_b) = if keep { (p1, p2) } else { (p2, p1) };
        if let Some(param) = src_a.parameters.get(name).or_else(|| src_b.parameters.get(name)) {
            params_a.insert(name.clone(), *param);
        }
        if let Some(param) = src_b.parameters.get(name).or_else(|| src_a.parameters.get(name)) {
            params_b.insert(name.clone(), *param);
        }
    }

    (
        Genes {
            indicators: ind_a,
            entry_conditions: entry_a,
            exit_conditions: exit_a,
            parameters: params_a,
        },
        Genes {
            indicators: ind_b,
            entry_conditions: entry_b,
            exit_conditions: exit_b,
            parameters: params_b,
        },
    )
}

/// Exchange indicators at `(first parent index, second parent index)`.
/// A swap is skipped on the side that already carries the incoming key.
pub fn apply_swaps(p1: &Genes, p2: &Genes, pairs: &[(usize, usize)]) -> (Genes, Genes) {
    let mut a = p1.clone();
    let mut b = p2.clone();
    for &(i, j) in pairs {
        let (Some(from_first), Some(from_second)) =
            (a.indicators.get(i).cloned(), b.indicators.get(j).cloned())
        else {
            continue;
        };
        if !a.has_indicator(&from_second.key) {
            a.indicators[i] = from_second;
        }
        if !b.has_indicator(&from_first.key) {
            b.indicators[j] = from_first;
        }
    }
    (a, b)
}

/// A fully drawn crossover, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recombination {
    Mask(CrossoverMask),
    Swap(Vec<(usize, usize)>),
}

const MIXED_VARIANTS: [CrossoverMethod; 3] = [
    CrossoverMethod::SinglePoint,
    CrossoverMethod::Uniform,
    CrossoverMethod::IndicatorSwap,
];

#[derive(Debug, Clone)]
pub struct Crossover {
    method: CrossoverMethod,
    points: usize,
}

impl Crossover {
    pub fn new(method: CrossoverMethod, points: usize) -> Self {
        Self { method, points: points.max(1) }
    }

    pub fn method(&self) -> CrossoverMethod {
        self.method
    }

    /// The variant used for one pairing; `Mixed` draws uniformly.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> CrossoverMethod {
        match self.method {
            CrossoverMethod::Mixed => MIXED_VARIANTS[rng.gen_range(0..MIXED_VARIANTS.len())],
            method => method,
        }
    }

    /// Draw a mask for `p1` x `p2`. Each list gets its own split.
    pub fn mask<R: Rng + ?Sized>(
        &self,
        method: CrossoverMethod,
        p1: &Genes,
        p2: &Genes,
        rng: &mut R,
    ) -> CrossoverMask {
        let lens = |a: usize, b: usize| (a.max(b), a.min(b));
        let params = parameter_names(p1, p2).len();

        let mut list = |(len, min_len): (usize, usize)| -> Vec<bool> {
            match method {
                CrossoverMethod::SinglePoint => split_mask(len, cut_point(min_len, rng)),
                CrossoverMethod::MultiPoint => multi_point_mask(len, min_len, self.points, rng),
                CrossoverMethod::Uniform => (0..len).map(|_| rng.gen_bool(0.5)).collect(),
                // not positional: both parents pass through whole
                CrossoverMethod::IndicatorSwap | CrossoverMethod::Mixed => vec![true; len],
            }
        };

        CrossoverMask {
            indicators: list(lens(p1.indicators.len(), p2.indicators.len())),
            entry: list(lens(p1.entry_conditions.len(), p2.entry_conditions.len())),
            exit: list(lens(p1.exit_conditions.len(), p2.exit_conditions.len())),
            parameters: list((params, params)),
        }
    }

    /// One or two random index pairs, none if either side has no indicators.
    pub fn swap_pairs<R: Rng + ?Sized>(&self, p1: &Genes, p2: &Genes, rng: &mut R) -> Vec<(usize, usize)> {
        if p1.indicators.is_empty() || p2.indicators.is_empty() {
            return Vec::new();
        }
        let swaps = rng.gen_range(1..=2);
        (0..swaps)
            .map(|_| {
                (
                    rng.gen_range(0..p1.indicators.len()),
                    rng.gen_range(0..p2.indicators.len()),
                )
            })
            .collect()
    }

    pub fn plan<R: Rng + ?Sized>(&self, p1: &Genes, p2: &Genes, rng: &mut R) -> Recombination {
        match self.resolve(rng) {
            CrossoverMethod::IndicatorSwap => Recombination::Swap(self.swap_pairs(p1, p2, rng)),
            method => Recombination::Mask(self.mask(method, p1, p2, rng)),
        }
    }

    /// Recombine with an explicit plan. Children get fresh ids, both parents
    /// as lineage, and `generation`. Conditions left without their indicator
    /// are dropped; if either child still breaks a structural rule, both
    /// parents are returned as plain derived copies.
    pub fn cross_with(
        &self,
        p1: &Genome,
        p2: &Genome,
        plan: &Recombination,
        generation: u32,
        limits: &GenomeConfig,
        ids: &mut GenomeIdAllocator,
    ) -> (Genome, Genome) {
        let (mut a, mut b) = match plan {
            Recombination::Mask(mask) => apply_mask(&p1.genes, &p2.genes, mask),
            Recombination::Swap(pairs) => apply_swaps(&p1.genes, &p2.genes, pairs),
        };
        for genes in [&mut a, &mut b] {
            genes.dedup_indicators();
            genes.prune_dangling_conditions();
        }

        let usable = |g: &Genes| {
            !g.indicators.is_empty()
                && !g.entry_conditions.is_empty()
                && !g.exit_conditions.is_empty()
                && g.check(limits).is_ok()
        };

        if usable(&a) && usable(&b) {
            let parents = vec![p1.id, p2.id];
            (
                Genome::new(ids.next_id(), generation, parents.clone(), a),
                Genome::new(ids.next_id(), generation, parents, b),
            )
        } else {
            debug!("Crossover {} x {} produced an unusable child, keeping parents", p1.id, p2.id);
            (p1.derive(ids.next_id(), generation), p2.derive(ids.next_id(), generation))
        }
    }

    pub fn cross<R: Rng + ?Sized>(
        &self,
        p1: &Genome,
        p2: &Genome,
        generation: u32,
        limits: &GenomeConfig,
        ids: &mut GenomeIdAllocator,
        rng: &mut R,
    ) -> (Genome, Genome) {
        let plan = self.plan(&p1.genes, &p2.genes, rng);
        self.cross_with(p1, p2, &plan, generation, limits, ids)
    }
}
