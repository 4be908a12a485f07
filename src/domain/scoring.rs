//! Quadrant momentum scoring.
//!
//! score(q, t) = mean over q's indicator tickers of (C[t] / C[t-L] - 1),
//! skipping tickers without a valid momentum value at `t`. A quadrant with
//! no valid indicator scores 0. Dates before `L` sessions have elapsed are
//! warmup and produce no scores at all.

use crate::domain::market_data::MarketData;
use crate::domain::quadrant::{Quadrant, QuadrantDefinitions};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantScore {
    pub quadrant: Quadrant,
    pub date: NaiveDate,
    /// Fraction, 0.05 = 5%.
    pub score: f64,
    /// Indicator tickers that contributed to the mean.
    pub contributors: usize,
}

pub struct MomentumScorer<'a> {
    definitions: &'a QuadrantDefinitions,
    lookback: usize,
}

impl<'a> MomentumScorer<'a> {
    pub fn new(definitions: &'a QuadrantDefinitions, lookback: usize) -> Self {
        MomentumScorer {
            definitions,
            lookback,
        }
    }

    pub fn is_warm(&self, idx: usize) -> bool {
        idx >= self.lookback
    }

    /// Scores of all four quadrants in priority order, or `None` during warmup.
    pub fn score(&self, market: &MarketData, idx: usize) -> Option<Vec<QuadrantScore>> {
        if !self.is_warm(idx) {
            return None;
        }
        let date = market.date(idx)?;

        let scores = Quadrant::PRIORITY
            .into_iter()
            .map(|quadrant| {
                let returns: Vec<f64> = self
                    .definitions
                    .indicators(quadrant)
                    .iter()
                    .filter_map(|ticker| market.momentum(ticker, idx))
                    .collect();
                let score = if returns.is_empty() {
                    0.0
                } else {
                    returns.iter().sum::<f64>() / returns.len() as f64
                };
                QuadrantScore {
                    quadrant,
                    date,
                    score,
                    contributors: returns.len(),
                }
            })
            .collect();

        Some(scores)
    }
}
