//! Volatility-weighted allocation inside the two selected quadrants.
//!
//! Per selected quadrant q with leverage m:
//! 1. keep tickers of q with a defined, finite, positive volatility
//! 2. direct:  w_i = m * v_i / Σv
//!    inverse: w_i = m * (1/v_i) / Σ(1/v)
//! 3. trend filter: w_i is admitted only if price > EMA; otherwise it stays
//!    in cash (never redistributed)
//! 4. a ticker selected through both quadrants receives the sum
//!
//! Optionally the admitted set is cut to the N largest weights and rescaled
//! so the total is unchanged.

use crate::domain::market_data::MarketData;
use crate::domain::quadrant::{LeverageTable, Quadrant, QuadrantDefinitions};
use crate::domain::regime::TopQuadrantPair;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// More capital to higher-volatility assets.
    #[default]
    Direct,
    /// Risk-parity style, more capital to calmer assets.
    Inverse,
}

impl FromStr for WeightingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(WeightingMode::Direct),
            "inverse" => Ok(WeightingMode::Inverse),
            other => Err(format!(
                "unknown weighting mode '{other}', expected direct or inverse"
            )),
        }
    }
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingMode::Direct => write!(f, "direct"),
            WeightingMode::Inverse => write!(f, "inverse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub ticker: String,
    pub date: NaiveDate,
    pub annualized_stdev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendStatus {
    pub ticker: String,
    pub date: NaiveDate,
    pub price: f64,
    pub ema: f64,
    pub above_ema: bool,
}

/// Why a ticker of a selected quadrant received no weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exclusion {
    /// Volatility undefined, non-finite or zero.
    NoVolatility,
    /// Price at or below its EMA, or EMA undefined.
    BelowTrend,
    /// Dropped by the position cap.
    PositionCap,
}

/// Target weights for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub date: NaiveDate,
    pub weights: BTreeMap<String, f64>,
    /// Sum of the selected quadrants' leverage.
    pub budget: f64,
    /// Weight computed for tickers that failed the trend filter.
    pub filtered: BTreeMap<String, f64>,
    pub excluded: BTreeMap<String, Exclusion>,
}

impl TargetAllocation {
    pub fn weight(&self, ticker: &str) -> f64 {
        self.weights.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn cash_fraction(&self) -> f64 {
        self.budget - self.total_weight()
    }
}

/// Normalised weights (summing to 1) for the given volatilities.
/// Tickers with unusable volatility are skipped.
pub fn volatility_weights(vols: &[(String, f64)], mode: WeightingMode) -> BTreeMap<String, f64> {
    let scores: Vec<(&String, f64)> = vols
        .iter()
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .map(|(t, v)| {
            let s = match mode {
                WeightingMode::Direct => *v,
                WeightingMode::Inverse => 1.0 / v,
            };
            (t, s)
        })
        .collect();

    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    if !(total > 0.0) || !total.is_finite() {
        return BTreeMap::new();
    }
    scores
        .into_iter()
        .map(|(t, s)| (t.clone(), s / total))
        .collect()
}

/// Keep the `max` largest weights and rescale them to the original total.
/// Equal weights keep the alphabetically first ticker. Returns the dropped
/// tickers.
pub fn cap_positions(weights: &mut BTreeMap<String, f64>, max: usize) -> Vec<String> {
    if weights.len() <= max {
        return Vec::new();
    }
    let total: f64 = weights.values().sum();
    let mut ranked: Vec<(String, f64)> = weights.iter().map(|(t, w)| (t.clone(), *w)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let dropped: Vec<String> = ranked[max..].iter().map(|(t, _)| t.clone()).collect();
    ranked.truncate(max);

    let kept_total: f64 = ranked.iter().map(|(_, w)| w).sum();
    weights.clear();
    if kept_total > 0.0 {
        let scale = total / kept_total;
        weights.extend(ranked.into_iter().map(|(t, w)| (t, w * scale)));
    }
    dropped
}

pub struct VolatilityAllocator<'a> {
    definitions: &'a QuadrantDefinitions,
    leverage: &'a LeverageTable,
    mode: WeightingMode,
    max_positions: Option<usize>,
}

impl<'a> VolatilityAllocator<'a> {
    pub fn new(
        definitions: &'a QuadrantDefinitions,
        leverage: &'a LeverageTable,
        mode: WeightingMode,
        max_positions: Option<usize>,
    ) -> Self {
        VolatilityAllocator {
            definitions,
            leverage,
            mode,
            max_positions,
        }
    }

    pub fn volatility_profiles(
        &self,
        market: &MarketData,
        idx: usize,
        quadrant: Quadrant,
    ) -> Vec<VolatilityProfile> {
        let Some(date) = market.date(idx) else {
            return Vec::new();
        };
        self.definitions
            .assets(quadrant)
            .filter_map(|ticker| {
                market.volatility(ticker, idx).map(|v| VolatilityProfile {
                    ticker: ticker.to_string(),
                    date,
                    annualized_stdev: v,
                })
            })
            .collect()
    }

    pub fn trend_status(&self, market: &MarketData, ticker: &str, idx: usize) -> Option<TrendStatus> {
        let price = market.close(ticker, idx)?;
        let ema = market.ema(ticker, idx)?;
        Some(TrendStatus {
            ticker: ticker.to_string(),
            date: market.date(idx)?,
            price,
            ema,
            above_ema: price > ema,
        })
    }

    pub fn allocate(&self, market: &MarketData, idx: usize, pair: &TopQuadrantPair) -> TargetAllocation {
        let mut allocation = TargetAllocation {
            date: pair.date,
            weights: BTreeMap::new(),
            budget: pair.leverage_budget(self.leverage),
            filtered: BTreeMap::new(),
            excluded: BTreeMap::new(),
        };

        for quadrant in pair.quadrants() {
            let multiplier = self.leverage.multiplier(quadrant);
            let vols: Vec<(String, f64)> = self
                .volatility_profiles(market, idx, quadrant)
                .into_iter()
                .map(|p| (p.ticker, p.annualized_stdev))
                .collect();
            let weights = volatility_weights(&vols, self.mode);

            for ticker in self.definitions.assets(quadrant) {
                let Some(share) = weights.get(ticker) else {
                    allocation
                        .excluded
                        .entry(ticker.to_string())
                        .or_insert(Exclusion::NoVolatility);
                    continue;
                };
                let weight = share * multiplier;
                let passes = self
                    .trend_status(market, ticker, idx)
                    .is_some_and(|t| t.above_ema);
                if passes {
                    *allocation.weights.entry(ticker.to_string()).or_insert(0.0) += weight;
                } else {
                    *allocation.filtered.entry(ticker.to_string()).or_insert(0.0) += weight;
                    allocation
                        .excluded
                        .insert(ticker.to_string(), Exclusion::BelowTrend);
                }
            }
        }

        for ticker in allocation.weights.keys() {
            allocation.excluded.remove(ticker);
        }

        if let Some(max) = self.max_positions {
            for ticker in cap_positions(&mut allocation.weights, max) {
                allocation.excluded.insert(ticker, Exclusion::PositionCap);
            }
        }

        allocation
    }
}
