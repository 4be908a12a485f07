//! Portfolio snapshots and equity tracking.

use crate::domain::position::Position;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Holdings after the close of `date`.
///
/// `cash_fraction = leverage_budget - Σ weights`; allocation that was
/// filtered, rejected or is still pending sits here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub date: NaiveDate,
    pub leverage_budget: f64,
    pub cash_fraction: f64,
    pub positions: BTreeMap<String, Position>,
    pub equity_value: f64,
}

impl PortfolioState {
    pub fn new(
        date: NaiveDate,
        leverage_budget: f64,
        positions: BTreeMap<String, Position>,
        equity_value: f64,
    ) -> Self {
        let invested: f64 = positions.values().map(Position::weight).sum();
        PortfolioState {
            date,
            leverage_budget,
            cash_fraction: leverage_budget - invested,
            positions,
            equity_value,
        }
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(t, p)| (t.clone(), p.weight()))
            .collect()
    }

    pub fn invested_weight(&self) -> f64 {
        self.positions.values().map(Position::weight).sum()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Dollar value held in each ticker.
    pub fn notional(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(t, p)| (t.clone(), p.weight() * self.equity_value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position(ticker: &str, weight: f64) -> Position {
        Position::open(
            ticker,
            weight,
            100.0,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            None,
            None,
        )
    }

    fn state(weights: &[(&str, f64)], budget: f64) -> PortfolioState {
        let positions = weights
            .iter()
            .map(|(t, w)| (t.to_string(), sample_position(t, *w)))
            .collect();
        PortfolioState::new(
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
            budget,
            positions,
            100_000.0,
        )
    }

    #[test]
    fn empty_portfolio_is_all_cash() {
        let s = state(&[], 2.5);
        assert!((s.cash_fraction - 2.5).abs() < f64::EPSILON);
        assert_eq!(s.position_count(), 0);
    }

    #[test]
    fn cash_plus_weights_equals_budget() {
        let s = state(&[("GLD", 0.6), ("TLT", 0.9)], 2.5);
        assert!((s.cash_fraction + s.invested_weight() - 2.5).abs() < 1e-12);
        assert!((s.cash_fraction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn notional_scales_with_equity() {
        let s = state(&[("GLD", 0.25)], 1.0);
        assert!((s.notional()["GLD"] - 25_000.0).abs() < 1e-9);
        assert!((s.weights()["GLD"] - 0.25).abs() < f64::EPSILON);
    }
}
