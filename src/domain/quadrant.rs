//! Macro quadrants, their asset universes and leverage multipliers.
//!
//! Definitions are immutable value objects built once at startup and
//! injected into the engine.

use crate::domain::error::QuadtraderError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quadrant {
    /// Fixed total order used to break equal scores: earlier wins.
    pub const PRIORITY: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    pub fn priority(self) -> usize {
        match self {
            Quadrant::Q1 => 0,
            Quadrant::Q2 => 1,
            Quadrant::Q3 => 2,
            Quadrant::Q4 => 3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Quadrant::Q1 => "Growth up, Inflation down (Goldilocks)",
            Quadrant::Q2 => "Growth up, Inflation up (Reflation)",
            Quadrant::Q3 => "Growth down, Inflation up (Stagflation)",
            Quadrant::Q4 => "Growth down, Inflation down (Deflation)",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quadrant::Q1 => "Q1",
            Quadrant::Q2 => "Q2",
            Quadrant::Q3 => "Q3",
            Quadrant::Q4 => "Q4",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Quadrant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "Q1" => Ok(Quadrant::Q1),
            "Q2" => Ok(Quadrant::Q2),
            "Q3" => Ok(Quadrant::Q3),
            "Q4" => Ok(Quadrant::Q4),
            other => Err(format!("unknown quadrant '{other}'")),
        }
    }
}

/// Static universe of one quadrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantUniverse {
    /// Allocatable tickers with their static reference weight.
    pub assets: BTreeMap<String, f64>,
    /// Tickers whose momentum scores the quadrant.
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantDefinitions {
    quadrants: BTreeMap<Quadrant, QuadrantUniverse>,
}

impl QuadrantDefinitions {
    pub fn new(quadrants: BTreeMap<Quadrant, QuadrantUniverse>) -> Result<Self, QuadtraderError> {
        for q in Quadrant::PRIORITY {
            let Some(universe) = quadrants.get(&q) else {
                return Err(QuadtraderError::ConfigInconsistency {
                    reason: format!("quadrant {q} is not defined"),
                });
            };
            if universe.assets.is_empty() {
                return Err(QuadtraderError::ConfigInconsistency {
                    reason: format!("quadrant {q} has no assets"),
                });
            }
            if universe.indicators.is_empty() {
                return Err(QuadtraderError::ConfigInconsistency {
                    reason: format!("quadrant {q} has no indicator tickers"),
                });
            }
        }
        Ok(QuadrantDefinitions { quadrants })
    }

    pub fn universe(&self, quadrant: Quadrant) -> &QuadrantUniverse {
        &self.quadrants[&quadrant]
    }

    pub fn assets(&self, quadrant: Quadrant) -> impl Iterator<Item = &str> {
        self.quadrants[&quadrant].assets.keys().map(String::as_str)
    }

    pub fn indicators(&self, quadrant: Quadrant) -> &[String] {
        &self.quadrants[&quadrant].indicators
    }

    /// Quadrants whose allocatable set contains `ticker`.
    pub fn quadrants_of(&self, ticker: &str) -> Vec<Quadrant> {
        self.quadrants
            .iter()
            .filter(|(_, u)| u.assets.contains_key(ticker))
            .map(|(q, _)| *q)
            .collect()
    }

    /// Every ticker the engine needs prices for.
    pub fn all_tickers(&self) -> BTreeSet<String> {
        self.quadrants
            .values()
            .flat_map(|u| u.assets.keys().cloned().chain(u.indicators.iter().cloned()))
            .collect()
    }

    /// The production universe the strategy was designed around.
    pub fn production() -> Self {
        fn universe(assets: &[(&str, f64)], indicators: &[&str]) -> QuadrantUniverse {
            QuadrantUniverse {
                assets: assets.iter().map(|(t, w)| (t.to_string(), *w)).collect(),
                indicators: indicators.iter().map(|t| t.to_string()).collect(),
            }
        }

        let mut quadrants = BTreeMap::new();
        quadrants.insert(
            Quadrant::Q1,
            universe(
                &[
                    ("QQQ", 0.60 * 0.50),
                    ("ARKK", 0.60 * 0.35),
                    ("IWM", 0.60 * 0.15),
                    ("XLC", 0.15 * 0.50),
                    ("XLY", 0.15 * 0.50),
                    ("TLT", 0.10 * 0.50),
                    ("LQD", 0.10 * 0.50),
                ],
                &["QQQ", "VUG", "IWM", "BTC-USD"],
            ),
        );
        quadrants.insert(
            Quadrant::Q2,
            universe(
                &[
                    ("XLE", 0.35 * 0.25),
                    ("DBC", 0.35 * 0.25),
                    ("CPER", 0.35 * 0.25),
                    ("GCC", 0.35 * 0.25),
                    ("XLF", 0.30 * 0.333),
                    ("XLI", 0.30 * 0.333),
                    ("XLB", 0.30 * 0.334),
                    ("XOP", 0.15 * 0.333),
                    ("FCG", 0.15 * 0.333),
                    ("USO", 0.15 * 0.334),
                    ("VNQ", 0.10 * 0.50),
                    ("PAVE", 0.10 * 0.50),
                    ("VTV", 0.10 * 0.50),
                    ("IWD", 0.10 * 0.50),
                ],
                &["XLE", "DBC"],
            ),
        );
        quadrants.insert(
            Quadrant::Q3,
            universe(
                &[
                    ("FCG", 0.25 * 0.333),
                    ("XLE", 0.25 * 0.333),
                    ("XOP", 0.25 * 0.334),
                    ("GLD", 0.30 * 0.167),
                    ("DBC", 0.30 * 0.167),
                    ("CPER", 0.30 * 0.167),
                    ("DBA", 0.30 * 0.167),
                    ("REMX", 0.30 * 0.167),
                    ("URA", 0.30 * 0.165),
                    ("TIP", 0.20 * 0.50),
                    ("VTIP", 0.20 * 0.50),
                    ("VNQ", 0.10 * 0.50),
                    ("PAVE", 0.10 * 0.50),
                    ("XLV", 0.15 * 0.333),
                    ("XLU", 0.15 * 0.333),
                ],
                &["GLD", "LIT"],
            ),
        );
        quadrants.insert(
            Quadrant::Q4,
            universe(
                &[
                    ("VGLT", 0.50 * 0.50),
                    ("IEF", 0.50 * 0.50),
                    ("LQD", 0.20 * 0.50),
                    ("MUB", 0.20 * 0.50),
                    ("XLU", 0.15 * 0.333),
                    ("XLP", 0.15 * 0.333),
                    ("XLV", 0.15 * 0.334),
                ],
                &["TLT", "XLU", "VIXY"],
            ),
        );

        QuadrantDefinitions { quadrants }
    }
}

/// Per-quadrant leverage multiplier applied to a selected quadrant's weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageTable {
    multipliers: BTreeMap<Quadrant, f64>,
}

impl LeverageTable {
    pub fn new(multipliers: BTreeMap<Quadrant, f64>) -> Result<Self, QuadtraderError> {
        for q in Quadrant::PRIORITY {
            match multipliers.get(&q) {
                None => {
                    return Err(QuadtraderError::ConfigInconsistency {
                        reason: format!("leverage table is missing {q}"),
                    })
                }
                Some(m) if !m.is_finite() || *m < 0.0 => {
                    return Err(QuadtraderError::ConfigInconsistency {
                        reason: format!("leverage for {q} must be a non-negative number"),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(LeverageTable { multipliers })
    }

    pub fn multiplier(&self, quadrant: Quadrant) -> f64 {
        self.multipliers[&quadrant]
    }
}

impl Default for LeverageTable {
    /// The strongest regime (Q1) is overweighted; the others run at 1x.
    fn default() -> Self {
        LeverageTable {
            multipliers: [
                (Quadrant::Q1, 1.5),
                (Quadrant::Q2, 1.0),
                (Quadrant::Q3, 1.0),
                (Quadrant::Q4, 1.0),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_total_order() {
        let mut seen: Vec<usize> = Quadrant::PRIORITY.iter().map(|q| q.priority()).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn quadrant_parse_and_display() {
        assert_eq!("q3".parse::<Quadrant>(), Ok(Quadrant::Q3));
        assert_eq!(Quadrant::Q4.to_string(), "Q4");
        assert!("Q5".parse::<Quadrant>().is_err());
    }

    #[test]
    fn production_definitions_are_complete() {
        let defs = QuadrantDefinitions::production();
        for q in Quadrant::PRIORITY {
            assert!(defs.assets(q).count() > 0);
            assert!(!defs.indicators(q).is_empty());
        }
        assert!(defs.all_tickers().contains("BTC-USD"));
    }

    #[test]
    fn shared_ticker_belongs_to_several_quadrants() {
        let defs = QuadrantDefinitions::production();
        assert_eq!(defs.quadrants_of("XLE"), vec![Quadrant::Q2, Quadrant::Q3]);
        assert!(defs.quadrants_of("SPY").is_empty());
    }

    #[test]
    fn definitions_reject_missing_quadrant() {
        let mut map = BTreeMap::new();
        map.insert(
            Quadrant::Q1,
            QuadrantUniverse {
                assets: [("QQQ".to_string(), 1.0)].into_iter().collect(),
                indicators: vec!["QQQ".into()],
            },
        );
        let err = QuadrantDefinitions::new(map).unwrap_err();
        assert!(matches!(err, QuadtraderError::ConfigInconsistency { .. }));
    }

    #[test]
    fn leverage_table_requires_every_quadrant() {
        let partial: BTreeMap<Quadrant, f64> = [(Quadrant::Q1, 2.0)].into_iter().collect();
        assert!(LeverageTable::new(partial).is_err());

        let table = LeverageTable::default();
        assert!((table.multiplier(Quadrant::Q1) - 1.5).abs() < f64::EPSILON);
        assert!((table.multiplier(Quadrant::Q4) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn leverage_table_rejects_negative() {
        let table: BTreeMap<Quadrant, f64> = Quadrant::PRIORITY
            .iter()
            .map(|q| (*q, if *q == Quadrant::Q2 { -1.0 } else { 1.0 }))
            .collect();
        assert!(LeverageTable::new(table).is_err());
    }
}
