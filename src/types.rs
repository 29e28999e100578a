use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a genome, unique within a run.
///
/// Ids are handed out by a monotonic [`GenomeIdAllocator`], so ordering by id
/// is ordering by creation. Selection and ranking use the id as the
/// deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenomeId(pub u64);

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{:06}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenomeIdAllocator {
    next: u64,
}

impl GenomeIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> GenomeId {
        let id = GenomeId(self.next);
        self.next += 1;
        id
    }

    /// The id the next call to `next_id` will return.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Make sure ids already in use are never handed out again.
    pub fn observe(&mut self, id: GenomeId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }
}

/// Performance dimensions reported by the evaluation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Profit,
    Sharpe,
    MaxDrawdown,
    WinRate,
    TradeCount,
    Stability,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Profit,
        Metric::Sharpe,
        Metric::MaxDrawdown,
        Metric::WinRate,
        Metric::TradeCount,
        Metric::Stability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Profit => "profit",
            Metric::Sharpe => "sharpe",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::WinRate => "win_rate",
            Metric::TradeCount => "trade_count",
            Metric::Stability => "stability",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw metrics for one evaluated genome
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawMetrics {
    pub profit: f64,        // Total profit, percent
    pub sharpe: f64,        // Sharpe-like ratio
    pub max_drawdown: f64,  // Maximum drawdown as a fraction; sign is ignored
    pub win_rate: f64,      // Percent of winning trades
    pub trade_count: u64,
    pub stability: f64,     // Composite stability measure
}

impl RawMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Profit => self.profit,
            Metric::Sharpe => self.sharpe,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::WinRate => self.win_rate,
            Metric::TradeCount => self.trade_count as f64,
            Metric::Stability => self.stability,
        }
    }
}
