//! Library of indicators genomes can draw from.

use crate::engines::generation::genome::{
    BoundedParam, Comparator, Condition, Connective, IndicatorGene, IndicatorKind, Operand,
};
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub integer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSpec {
    pub key: &'static str,
    pub kind: IndicatorKind,
    pub params: &'static [ParamSpec],
    /// Value range for bounded oscillators. `None` means the indicator follows
    /// price and is compared against price or other price-like indicators.
    pub output_range: Option<(f64, f64)>,
}

const fn int(name: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec { name, min, max, default, integer: true }
}

const fn float(name: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec { name, min, max, default, integer: false }
}

const STANDARD: &[IndicatorSpec] = &[
    IndicatorSpec {
        key: "rsi",
        kind: IndicatorKind::Momentum,
        params: &[int("period", 7.0, 21.0, 14.0)],
        output_range: Some((0.0, 100.0)),
    },
    IndicatorSpec {
        key: "macd",
        kind: IndicatorKind::Trend,
        params: &[
            int("fast", 8.0, 16.0, 12.0),
            int("slow", 20.0, 30.0, 26.0),
            int("signal", 7.0, 12.0, 9.0),
        ],
        output_range: Some((-5.0, 5.0)),
    },
    IndicatorSpec {
        key: "bb",
        kind: IndicatorKind::Volatility,
        params: &[int("period", 15.0, 25.0, 20.0), float("std", 1.5, 2.5, 2.0)],
        output_range: None,
    },
    IndicatorSpec {
        key: "ema",
        kind: IndicatorKind::Trend,
        params: &[int("period", 5.0, 50.0, 20.0)],
        output_range: None,
    },
    IndicatorSpec {
        key: "sma",
        kind: IndicatorKind::Trend,
        params: &[int("period", 10.0, 100.0, 50.0)],
        output_range: None,
    },
    IndicatorSpec {
        key: "adx",
        kind: IndicatorKind::Trend,
        params: &[int("period", 10.0, 20.0, 14.0)],
        output_range: Some((0.0, 100.0)),
    },
    IndicatorSpec {
        key: "cci",
        kind: IndicatorKind::Momentum,
        params: &[int("period", 10.0, 30.0, 20.0)],
        output_range: Some((-200.0, 200.0)),
    },
    IndicatorSpec {
        key: "mfi",
        kind: IndicatorKind::Volume,
        params: &[int("period", 10.0, 20.0, 14.0)],
        output_range: Some((0.0, 100.0)),
    },
    IndicatorSpec {
        key: "stoch",
        kind: IndicatorKind::Momentum,
        params: &[
            int("fastk", 3.0, 7.0, 5.0),
            int("slowk", 2.0, 5.0, 3.0),
            int("slowd", 2.0, 5.0, 3.0),
        ],
        output_range: Some((0.0, 100.0)),
    },
    IndicatorSpec {
        key: "atr",
        kind: IndicatorKind::Volatility,
        params: &[int("period", 10.0, 20.0, 14.0)],
        output_range: Some((0.0, 10.0)),
    },
];

impl IndicatorSpec {
    /// Same family and same scale, so conditions can be re-pointed safely.
    pub fn compatible_with(&self, other: &IndicatorSpec) -> bool {
        self.kind == other.kind && self.output_range.is_some() == other.output_range.is_some()
    }

    pub fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R) -> IndicatorGene {
        let params = self
            .params
            .iter()
            .map(|p| {
                let param = if p.integer {
                    let value = rng.gen_range(p.min as i64..=p.max as i64) as f64;
                    BoundedParam::integer(value, p.min, p.max)
                } else {
                    BoundedParam::new(rng.gen_range(p.min..=p.max), p.min, p.max)
                };
                (p.name.to_string(), param)
            })
            .collect();

        IndicatorGene {
            key: self.key.to_string(),
            kind: self.kind,
            params,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorCatalog {
    specs: Vec<IndicatorSpec>,
}

impl Default for IndicatorCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl IndicatorCatalog {
    /// RSI, MACD, Bollinger Bands, EMA, SMA, ADX, CCI, MFI, Stochastic, ATR
    pub fn standard() -> Self {
        Self { specs: STANDARD.to_vec() }
    }

    pub fn new(specs: Vec<IndicatorSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[IndicatorSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&IndicatorSpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    /// Pick a spec whose key is not in `exclude`, optionally restricted to
    /// specs compatible with `like`.
    pub fn choose_excluding<R: Rng + ?Sized>(
        &self,
        exclude: &[&str],
        like: Option<&IndicatorSpec>,
        rng: &mut R,
    ) -> Option<&IndicatorSpec> {
        let candidates: Vec<&IndicatorSpec> = self
            .specs
            .iter()
            .filter(|s| !exclude.contains(&s.key))
            .filter(|s| like.map_or(true, |l| l.compatible_with(s)))
            .collect();
        candidates.choose(rng).copied()
    }

    /// Threshold range for conditions on `key`, if it is a bounded indicator.
    pub fn threshold_range(&self, key: &str) -> Option<(f64, f64)> {
        self.get(key).and_then(|s| s.output_range)
    }

    /// Build a random predicate over the given indicators. Bounded indicators
    /// are compared with a threshold; price-like ones with price or another
    /// price-like indicator.
    pub fn random_condition<R: Rng + ?Sized>(
        &self,
        indicators: &[IndicatorGene],
        rng: &mut R,
    ) -> Option<Condition> {
        let left = indicators.choose(rng)?;
        let comparator = *Comparator::ALL.choose(rng)?;
        let connective = if rng.gen_bool(0.5) { Connective::And } else { Connective::Or };

        let operand = match self.threshold_range(&left.key) {
            Some((lo, hi)) => Operand::Threshold(rng.gen_range(lo..=hi)),
            None => {
                let peers: Vec<&IndicatorGene> = indicators
                    .iter()
                    .filter(|i| i.key != left.key && self.threshold_range(&i.key).is_none())
                    .collect();
                match peers.choose(rng) {
                    Some(peer) if rng.gen_bool(0.5) => Operand::Indicator(peer.key.clone()),
                    _ => Operand::Price,
                }
            }
        };

        Some(Condition {
            indicator: left.key.clone(),
            comparator,
            operand,
            connective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_instantiate_respects_ranges() {
        let catalog = IndicatorCatalog::standard();
        let mut rng = StdRng::seed_from_u64(7);
        for spec in catalog.specs() {
            for _ in 0..20 {
                let gene = spec.instantiate(&mut rng);
                assert_eq!(gene.params.len(), spec.params.len());
                assert!(gene.params.values().all(|p| p.in_range()));
            }
        }
    }

    #[test]
    fn test_compatible_replacement_stays_in_family() {
        let catalog = IndicatorCatalog::standard();
        let mut rng = StdRng::seed_from_u64(11);
        let rsi = catalog.get("rsi").unwrap();
        for _ in 0..50 {
            let spec = catalog.choose_excluding(&["rsi"], Some(rsi), &mut rng).unwrap();
            assert_eq!(spec.kind, IndicatorKind::Momentum);
            assert!(spec.output_range.is_some());
            assert_ne!(spec.key, "rsi");
        }

        // Bollinger Bands has no price-following volatility peer
        let bb = catalog.get("bb").unwrap();
        assert!(catalog.choose_excluding(&["bb"], Some(bb), &mut rng).is_none());
    }

    #[test]
    fn test_random_condition_references_given_indicators() {
        let catalog = IndicatorCatalog::standard();
        let mut rng = StdRng::seed_from_u64(3);
        let indicators = vec![
            catalog.get("ema").unwrap().instantiate(&mut rng),
            catalog.get("sma").unwrap().instantiate(&mut rng),
            catalog.get("rsi").unwrap().instantiate(&mut rng),
        ];
        for _ in 0..100 {
            let condition = catalog.random_condition(&indicators, &mut rng).unwrap();
            for key in condition.references() {
                assert!(indicators.iter().any(|i| i.key == key));
            }
            if condition.indicator == "rsi" {
                match condition.operand {
                    Operand::Threshold(t) => assert!((0.0..=100.0).contains(&t)),
                    ref other => panic!("rsi compared against {:?}", other),
                }
            }
        }
        assert!(catalog.random_condition(&[], &mut rng).is_none());
    }
}
