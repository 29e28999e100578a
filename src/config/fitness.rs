use super::traits::{check_probability, ConfigSection};
use crate::error::EvolutionError;
use crate::types::Metric;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    pub weights: MetricWeights,
    pub bounds: MetricBounds,
    pub min_trades_required: u64,
    /// Penalty applied at zero trades; shrinks linearly to 0 at `min_trades_required`.
    pub max_trade_penalty: f64,
}

/// Weight of each normalized component. Expected, not required, to sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeights {
    pub profit: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: f64,
    pub stability: f64,
}

/// Min-max normalization bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricBounds {
    pub profit: Bounds,
    pub sharpe: Bounds,
    pub max_drawdown: Bounds,
    pub win_rate: Bounds,
    pub trade_count: Bounds,
    pub stability: Bounds,
}

impl Bounds {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }
}

impl MetricWeights {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Profit => self.profit,
            Metric::Sharpe => self.sharpe,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::WinRate => self.win_rate,
            Metric::TradeCount => self.trade_count,
            Metric::Stability => self.stability,
        }
    }

    pub fn total(&self) -> f64 {
        Metric::ALL.iter().map(|m| self.get(*m)).sum()
    }
}

impl MetricBounds {
    pub fn get(&self, metric: Metric) -> Bounds {
        match metric {
            Metric::Profit => self.profit,
            Metric::Sharpe => self.sharpe,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::WinRate => self.win_rate,
            Metric::TradeCount => self.trade_count,
            Metric::Stability => self.stability,
        }
    }
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            profit: 0.30,
            sharpe: 0.10,
            max_drawdown: 0.25,
            win_rate: 0.15,
            trade_count: 0.05,
            stability: 0.15,
        }
    }
}

impl Default for MetricBounds {
    fn default() -> Self {
        Self {
            profit: Bounds::new(-50.0, 100.0),
            sharpe: Bounds::new(-2.0, 4.0),
            max_drawdown: Bounds::new(0.0, 1.0),
            win_rate: Bounds::new(0.0, 100.0),
            trade_count: Bounds::new(0.0, 200.0),
            stability: Bounds::new(0.0, 1.0),
        }
    }
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            weights: MetricWeights::default(),
            bounds: MetricBounds::default(),
            min_trades_required: 30,
            max_trade_penalty: 0.5,
        }
    }
}

impl ConfigSection for FitnessConfig {
    fn section_name() -> &'static str {
        "fitness"
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        for metric in Metric::ALL {
            let weight = self.weights.get(metric);
            if !weight.is_finite() || weight < 0.0 {
                return Err(EvolutionError::Configuration(format!(
                    "Weight for {} must be a non-negative number, got {}",
                    metric, weight
                )));
            }
            let bounds = self.bounds.get(metric);
            if !(bounds.lo.is_finite() && bounds.hi.is_finite()) || bounds.hi <= bounds.lo {
                return Err(EvolutionError::Configuration(format!(
                    "Bounds for {} must satisfy lo < hi, got ({}, {})",
                    metric, bounds.lo, bounds.hi
                )));
            }
        }
        check_probability(Self::section_name(), "max_trade_penalty", self.max_trade_penalty)
    }
}
