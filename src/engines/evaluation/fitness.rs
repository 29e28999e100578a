//! Raw metrics to a single fitness value in [0, 1].

use crate::config::{Bounds, FitnessConfig};
use crate::error::{EvolutionError, Result};
use crate::types::{Metric, RawMetrics};
use log::warn;
use serde::{Deserialize, Serialize};

/// Per-metric scores after normalization, each in [0, 1] with higher better.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessComponents {
    pub profit: f64,
    pub sharpe: f64,
    pub max_drawdown: f64, // Already inverted
    pub win_rate: f64,
    pub trade_count: f64,
    pub stability: f64,
}

impl FitnessComponents {
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

    fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Profit => &mut self.profit,
            Metric::Sharpe => &mut self.sharpe,
            Metric::MaxDrawdown => &mut self.max_drawdown,
            Metric::WinRate => &mut self.win_rate,
            Metric::TradeCount => &mut self.trade_count,
            Metric::Stability => &mut self.stability,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessScore {
    pub fitness: f64,
    pub components: FitnessComponents,
    pub weighted_sum: f64,
    pub trade_penalty: f64,
}

/// Min-max scale into [0, 1], clamping outliers. NaN scores as the worst value.
pub fn normalize(value: f64, bounds: Bounds) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let span = bounds.hi - bounds.lo;
    if span <= 0.0 {
        return if value >= bounds.hi { 1.0 } else { 0.0 };
    }
    ((value - bounds.lo) / span).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    config: FitnessConfig,
}

impl FitnessEvaluator {
    pub fn new(config: FitnessConfig) -> Self {
        let total = config.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            warn!("Fitness weights sum to {:.4}, not 1; scores are still capped at 1", total);
        }
        Self { config }
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Linear penalty: the full `max_trade_penalty` at zero trades, nothing
    /// once `min_trades_required` is reached.
    pub fn trade_penalty(&self, trades: u64) -> f64 {
        let required = self.config.min_trades_required;
        if required == 0 || trades >= required {
            return 0.0;
        }
        self.config.max_trade_penalty * (1.0 - trades as f64 / required as f64)
    }

    pub fn components(&self, metrics: &RawMetrics) -> FitnessComponents {
        let mut components = FitnessComponents::default();
        for metric in Metric::ALL {
            let bounds = self.config.bounds.get(metric);
            let score = match metric {
                Metric::MaxDrawdown => {
                    let drawdown = metrics.max_drawdown;
                    if drawdown.is_nan() {
                        0.0
                    } else {
                        1.0 - normalize(drawdown.abs(), bounds)
                    }
                }
                _ => normalize(metrics.get(metric), bounds),
            };
            components.set(metric, score);
        }
        components
    }

    /// Score one genome's metrics. Zero trades is reported as
    /// `InsufficientTrades` so the caller can mark the genome invalid.
    pub fn score(&self, metrics: &RawMetrics) -> Result<FitnessScore> {
        if metrics.trade_count == 0 {
            return Err(EvolutionError::InsufficientTrades {
                trades: 0,
                required: self.config.min_trades_required,
            });
        }

        let components = self.components(metrics);
        let weighted_sum: f64 = Metric::ALL
            .iter()
            .map(|m| self.config.weights.get(*m) * components.get(*m))
            .sum();
        let trade_penalty = self.trade_penalty(metrics.trade_count);

        let fitness = (weighted_sum - trade_penalty).clamp(0.0, 1.0);
        let fitness = if fitness.is_finite() { fitness } else { 0.0 };

        Ok(FitnessScore {
            fitness,
            components,
            weighted_sum,
            trade_penalty,
        })
    }
}
