//! Price table with the indicator series the engine reads.
//!
//! All indicators are causal: the value at index `t` depends only on
//! prices at or before `t`, so computing them once over the whole table
//! is equivalent to recomputing them on every truncated prefix.

use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::momentum::calculate_momentum;
use crate::domain::indicator::volatility::calculate_volatility;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::price_table::PriceTable;
use crate::domain::quadrant::Quadrant;
use crate::domain::strategy::StrategyConfig;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct TickerIndicators {
    ema: Option<IndicatorSeries>,
    momentum: Option<IndicatorSeries>,
    volatility: Option<IndicatorSeries>,
    atr: Option<IndicatorSeries>,
}

#[derive(Debug)]
pub struct MarketData {
    table: PriceTable,
    indicators: HashMap<String, TickerIndicators>,
}

impl MarketData {
    /// Computes momentum for indicator tickers and EMA, volatility and ATR
    /// for allocatable tickers.
    pub fn new(table: PriceTable, config: &StrategyConfig) -> Self {
        let mut indicators: HashMap<String, TickerIndicators> = HashMap::new();
        let dates = table.dates.clone();

        for q in Quadrant::PRIORITY {
            for ticker in config.quadrants.indicators(q) {
                if let Some(series) = table.get(ticker) {
                    let entry = indicators.entry(ticker.clone()).or_default();
                    if entry.momentum.is_none() {
                        entry.momentum = Some(calculate_momentum(
                            &dates,
                            &series.close,
                            config.momentum_lookback_days,
                        ));
                    }
                }
            }
            for ticker in config.quadrants.assets(q) {
                let Some(series) = table.get(ticker) else {
                    continue;
                };
                let entry = indicators.entry(ticker.to_string()).or_default();
                if entry.ema.is_some() {
                    continue;
                }
                entry.ema = Some(calculate_ema(&dates, &series.close, config.ema_period));
                entry.volatility = Some(calculate_volatility(
                    &dates,
                    &series.close,
                    config.volatility_lookback_days,
                ));
                entry.atr = Some(calculate_atr(&dates, series, config.atr_period));
            }
        }

        debug!(
            tickers = indicators.len(),
            sessions = dates.len(),
            "indicators computed"
        );

        MarketData { table, indicators }
    }

    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.table.dates
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn date(&self, idx: usize) -> Option<NaiveDate> {
        self.table.dates.get(idx).copied()
    }

    pub fn close(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.table.close(ticker, idx)
    }

    /// Session low, falling back to the close for close-only sources.
    pub fn low_or_close(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.table.low(ticker, idx).or_else(|| self.close(ticker, idx))
    }

    /// Simple return from `idx - 1` to `idx`; `None` if either close is missing.
    pub fn daily_return(&self, ticker: &str, idx: usize) -> Option<f64> {
        if idx == 0 {
            return None;
        }
        let prev = self.close(ticker, idx - 1)?;
        let curr = self.close(ticker, idx)?;
        (prev > 0.0).then(|| curr / prev - 1.0)
    }

    pub fn ema(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.indicators.get(ticker)?.ema.as_ref()?.get(idx)
    }

    pub fn momentum(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.indicators.get(ticker)?.momentum.as_ref()?.get(idx)
    }

    pub fn volatility(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.indicators.get(ticker)?.volatility.as_ref()?.get(idx)
    }

    pub fn atr(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.indicators.get(ticker)?.atr.as_ref()?.get(idx)
    }

    /// `price > EMA`, or `None` while either side is undefined.
    pub fn above_trend(&self, ticker: &str, idx: usize) -> Option<bool> {
        let price = self.close(ticker, idx)?;
        let ema = self.ema(ticker, idx)?;
        Some(price > ema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PriceBar;
    use crate::domain::price_table::FillPolicy;
    use crate::domain::quadrant::{Quadrant, QuadrantDefinitions, QuadrantUniverse};
    use std::collections::BTreeMap;

    fn tiny_config() -> StrategyConfig {
        let universe = |asset: &str| QuadrantUniverse {
            assets: [(asset.to_string(), 1.0)].into_iter().collect(),
            indicators: vec![asset.to_string()],
        };
        let quadrants: BTreeMap<Quadrant, QuadrantUniverse> = [
            (Quadrant::Q1, universe("AAA")),
            (Quadrant::Q2, universe("BBB")),
            (Quadrant::Q3, universe("CCC")),
            (Quadrant::Q4, universe("DDD")),
        ]
        .into_iter()
        .collect();
        StrategyConfig {
            momentum_lookback_days: 2,
            ema_period: 2,
            volatility_lookback_days: 2,
            atr_period: 2,
            quadrants: QuadrantDefinitions::new(quadrants).unwrap(),
            ..StrategyConfig::default()
        }
    }

    fn market(prices: &[f64]) -> MarketData {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<PriceBar> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceBar::from_close("AAA", start + chrono::Duration::days(i as i64), *p))
            .collect();
        MarketData::new(PriceTable::from_bars(&bars, FillPolicy::Forward), &tiny_config())
    }

    #[test]
    fn indicators_are_exposed_per_ticker() {
        let m = market(&[100.0, 102.0, 104.0, 103.0]);
        assert!(m.ema("AAA", 0).is_none());
        assert!((m.ema("AAA", 1).unwrap() - 101.0).abs() < 1e-9);
        assert!((m.momentum("AAA", 2).unwrap() - 0.04).abs() < 1e-9);
        assert!(m.volatility("AAA", 2).is_some());
        assert!(m.atr("AAA", 2).is_some());
        assert!(m.ema("BBB", 3).is_none());
    }

    #[test]
    fn trend_and_returns() {
        let m = market(&[100.0, 102.0, 104.0, 90.0]);
        assert_eq!(m.above_trend("AAA", 0), None);
        assert_eq!(m.above_trend("AAA", 2), Some(true));
        assert_eq!(m.above_trend("AAA", 3), Some(false));
        assert!((m.daily_return("AAA", 1).unwrap() - 0.02).abs() < 1e-12);
        assert_eq!(m.daily_return("AAA", 0), None);
    }

    #[test]
    fn low_falls_back_to_close() {
        let m = market(&[100.0, 101.0]);
        assert_eq!(m.low_or_close("AAA", 1), Some(101.0));
        assert_eq!(m.low_or_close("ZZZ", 1), None);
    }
}
