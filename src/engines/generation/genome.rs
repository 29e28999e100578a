//! Structured genome for one candidate trading strategy.
//!
//! A genome carries three kinds of genetic material:
//! - **indicators**: a set of technical indicators, each with bounded parameters
//! - **conditions**: ordered entry/exit predicates comparing indicators with
//!   thresholds, price, or other indicators
//! - **parameters**: named strategy-level numbers with declared valid ranges
//!
//! Genomes are value objects. Only the genetic operators build new gene
//! payloads, and they always return a new [`Genome`] rather than editing one
//! that already lives in a population.

use crate::config::GenomeConfig;
use crate::error::{EvolutionError, Result};
use crate::types::GenomeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// A number constrained to a declared range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedParam {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub integer: bool,
}

impl BoundedParam {
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max, integer: false }
    }

    pub fn integer(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max, integer: true }
    }

    pub fn in_range(&self) -> bool {
        self.value.is_finite() && self.value >= self.min && self.value <= self.max
    }

    /// Clamp (and round, for integer parameters) a candidate value into range.
    pub fn clamped(&self, value: f64) -> f64 {
        let value = if value.is_nan() { self.value } else { value };
        let value = value.clamp(self.min, self.max);
        if self.integer {
            value.round().clamp(self.min, self.max)
        } else {
            value
        }
    }

    pub fn set(&mut self, value: f64) {
        self.value = self.clamped(value);
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Indicator families; replacement during mutation stays within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Momentum,
    Trend,
    Volatility,
    Volume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorGene {
    pub key: String,
    pub kind: IndicatorKind,
    pub params: BTreeMap<String, BoundedParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Indicator(String),
    Price,
    Threshold(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    LessThan,
    CrossesAbove,
    CrossesBelow,
}

impl Comparator {
    pub const ALL: [Comparator; 4] = [
        Comparator::GreaterThan,
        Comparator::LessThan,
        Comparator::CrossesAbove,
        Comparator::CrossesBelow,
    ];
}

/// How a condition combines with the one before it. Ignored on the first condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn flipped(self) -> Self {
        match self {
            Connective::And => Connective::Or,
            Connective::Or => Connective::And,
        }
    }
}

/// `indicator <comparator> operand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub indicator: String,
    pub comparator: Comparator,
    pub operand: Operand,
    pub connective: Connective,
}

impl Condition {
    /// Indicator keys this predicate depends on.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        let right = match &self.operand {
            Operand::Indicator(key) => Some(key.as_str()),
            _ => None,
        };
        std::iter::once(self.indicator.as_str()).chain(right)
    }

    pub fn references_key(&self, key: &str) -> bool {
        self.references().any(|k| k == key)
    }

    /// Point every reference to `from` at `to` instead.
    pub fn rename_indicator(&mut self, from: &str, to: &str) {
        if self.indicator == from {
            self.indicator = to.to_string();
        }
        if let Operand::Indicator(key) = &mut self.operand {
            if key == from {
                *key = to.to_string();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSide {
    Entry,
    Exit,
}

impl fmt::Display for ConditionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionSide::Entry => f.write_str("entry"),
            ConditionSide::Exit => f.write_str("exit"),
        }
    }
}

/// First structural rule a gene payload breaks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneViolation {
    #[error("{count} indicators, at least {min} required")]
    TooFewIndicators { count: usize, min: usize },

    #[error("{count} indicators, at most {max} allowed")]
    TooManyIndicators { count: usize, max: usize },

    #[error("indicator '{0}' appears more than once")]
    DuplicateIndicator(String),

    #[error("{side} condition {index} references missing indicator '{key}'")]
    DanglingReference { side: ConditionSide, index: usize, key: String },

    #[error("{count} {side} conditions, at least {min} required")]
    TooFewConditions { side: ConditionSide, count: usize, min: usize },

    #[error("{count} {side} conditions, at most {max} allowed")]
    TooManyConditions { side: ConditionSide, count: usize, max: usize },

    #[error("parameter '{owner}.{name}' = {value} outside [{min}, {max}]")]
    ParameterOutOfRange { owner: String, name: String, value: f64, min: f64, max: f64 },

    #[error("{side} condition {index} has a non-finite threshold")]
    NonFiniteThreshold { side: ConditionSide, index: usize },
}

/// Owner name used for strategy-level parameters in violations.
pub const STRATEGY_PARAMS: &str = "strategy";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genes {
    pub indicators: Vec<IndicatorGene>,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
    pub parameters: BTreeMap<String, BoundedParam>,
}

impl Genes {
    pub fn indicator(&self, key: &str) -> Option<&IndicatorGene> {
        self.indicators.iter().find(|i| i.key == key)
    }

    pub fn has_indicator(&self, key: &str) -> bool {
        self.indicator(key).is_some()
    }

    pub fn indicator_keys(&self) -> BTreeSet<&str> {
        self.indicators.iter().map(|i| i.key.as_str()).collect()
    }

    pub fn conditions(&self, side: ConditionSide) -> &Vec<Condition> {
        match side {
            ConditionSide::Entry => &self.entry_conditions,
            ConditionSide::Exit => &self.exit_conditions,
        }
    }

    pub fn conditions_mut(&mut self, side: ConditionSide) -> &mut Vec<Condition> {
        match side {
            ConditionSide::Entry => &mut self.entry_conditions,
            ConditionSide::Exit => &mut self.exit_conditions,
        }
    }

    /// Check every structural invariant, reporting the first violation found.
    pub fn check(&self, limits: &GenomeConfig) -> std::result::Result<(), GeneViolation> {
        let count = self.indicators.len();
        if count < limits.min_indicators {
            return Err(GeneViolation::TooFewIndicators { count, min: limits.min_indicators });
        }
        if count > limits.max_indicators {
            return Err(GeneViolation::TooManyIndicators { count, max: limits.max_indicators });
        }

        let mut seen = BTreeSet::new();
        for indicator in &self.indicators {
            if !seen.insert(indicator.key.as_str()) {
                return Err(GeneViolation::DuplicateIndicator(indicator.key.clone()));
            }
            check_params(&indicator.key, &indicator.params)?;
        }
        check_params(STRATEGY_PARAMS, &self.parameters)?;

        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            let conditions = self.conditions(side);
            let count = conditions.len();
            if count < limits.min_conditions {
                return Err(GeneViolation::TooFewConditions { side, count, min: limits.min_conditions });
            }
            if count > limits.max_conditions {
                return Err(GeneViolation::TooManyConditions { side, count, max: limits.max_conditions });
            }
            for (index, condition) in conditions.iter().enumerate() {
                if let Some(key) = condition.references().find(|k| !seen.contains(k)) {
                    return Err(GeneViolation::DanglingReference {
                        side,
                        index,
                        key: key.to_string(),
                    });
                }
                if let Operand::Threshold(t) = condition.operand {
                    if !t.is_finite() {
                        return Err(GeneViolation::NonFiniteThreshold { side, index });
                    }
                }
            }
        }

        Ok(())
    }

    /// Drop repeated indicator keys, keeping the first occurrence.
    pub fn dedup_indicators(&mut self) -> usize {
        let before = self.indicators.len();
        let mut seen = BTreeSet::new();
        self.indicators.retain(|i| seen.insert(i.key.clone()));
        before - self.indicators.len()
    }

    /// Remove conditions that reference indicators not in the genome.
    pub fn prune_dangling_conditions(&mut self) -> usize {
        let keys: BTreeSet<String> = self.indicators.iter().map(|i| i.key.clone()).collect();
        let mut removed = 0;
        for side in [ConditionSide::Entry, ConditionSide::Exit] {
            let conditions = self.conditions_mut(side);
            let before = conditions.len();
            conditions.retain(|c| c.references().all(|k| keys.contains(k)));
            removed += before - conditions.len();
        }
        removed
    }

    /// Remove an indicator and every condition depending on it.
    pub fn remove_indicator(&mut self, key: &str) -> Option<IndicatorGene> {
        let position = self.indicators.iter().position(|i| i.key == key)?;
        let removed = self.indicators.remove(position);
        self.entry_conditions.retain(|c| !c.references_key(key));
        self.exit_conditions.retain(|c| !c.references_key(key));
        Some(removed)
    }

    /// Clamp every parameter back into its declared range.
    pub fn clamp_parameters(&mut self) {
        for param in self.parameters.values_mut() {
            let value = param.value;
            param.set(value);
        }
        for indicator in &mut self.indicators {
            for param in indicator.params.values_mut() {
                let value = param.value;
                param.set(value);
            }
        }
    }

    /// Canonical text form, equal for equal payloads.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn check_params(
    owner: &str,
    params: &BTreeMap<String, BoundedParam>,
) -> std::result::Result<(), GeneViolation> {
    for (name, param) in params {
        if !param.in_range() {
            return Err(GeneViolation::ParameterOutOfRange {
                owner: owner.to_string(),
                name: name.clone(),
                value: param.value,
                min: param.min,
                max: param.max,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub id: GenomeId,
    /// Generation this genome was created in.
    pub generation: u32,
    /// Empty for random genomes, one parent for mutation-only, two for crossover.
    pub parent_ids: Vec<GenomeId>,
    pub genes: Genes,
    pub fitness: Option<f64>,
    pub valid: bool,
}

impl Genome {
    pub fn new(id: GenomeId, generation: u32, parent_ids: Vec<GenomeId>, genes: Genes) -> Self {
        Self {
            id,
            generation,
            parent_ids,
            genes,
            fitness: None,
            valid: true,
        }
    }

    /// A parentless genome, as produced by random synthesis.
    pub fn seed(id: GenomeId, generation: u32, genes: Genes) -> Self {
        Self::new(id, generation, Vec::new(), genes)
    }

    /// Deep copy under a fresh id whose only parent is `self`. Evaluation
    /// state is reset. Use `clone()` to keep id and lineage.
    pub fn derive(&self, id: GenomeId, generation: u32) -> Genome {
        Genome::new(id, generation, vec![self.id], self.genes.clone())
    }

    pub fn with_genes(&self, genes: Genes) -> Genome {
        Genome { genes, ..self.clone() }
    }

    pub fn validate(&self, limits: &GenomeConfig) -> Result<()> {
        self.genes
            .check(limits)
            .map_err(|violation| EvolutionError::InvalidGenome { id: self.id, violation })
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn fitness_or_zero(&self) -> f64 {
        self.fitness.unwrap_or(0.0)
    }
}
