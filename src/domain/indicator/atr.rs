//! Average True Range with Wilder smoothing.
//!
//! TR[i] = max(H - L, |H - C[i-1]|, |L - C[i-1]|); the first observation has
//! no previous close and contributes no true range. The seed is the mean of
//! the first `period` true ranges, then ATR[i] = (ATR[i-1]*(n-1) + TR[i]) / n.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::price_table::TickerSeries;
use chrono::NaiveDate;

pub fn calculate_atr(dates: &[NaiveDate], series: &TickerSeries, period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Atr(period), dates);
    }

    let mut values = Vec::with_capacity(dates.len());
    let mut prev_close: Option<f64> = None;
    let mut atr: Option<f64> = None;
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;

    for (i, &date) in dates.iter().enumerate() {
        let close = series.close.get(i).copied().flatten();
        let tr = match (close, prev_close) {
            (Some(c), Some(pc)) => {
                let high = series.high[i].unwrap_or(c);
                let low = series.low[i].unwrap_or(c);
                Some(true_range(high, low, pc))
            }
            _ => None,
        };
        if close.is_some() {
            prev_close = close;
        }

        let Some(tr) = tr else {
            values.push(IndicatorPoint::invalid(date));
            continue;
        };

        match atr {
            Some(prev) => {
                let next = (prev * (period - 1) as f64 + tr) / period as f64;
                atr = Some(next);
                values.push(IndicatorPoint::valid(date, next));
            }
            None => {
                seed_sum += tr;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    atr = Some(seed);
                    values.push(IndicatorPoint::valid(date, seed));
                } else {
                    values.push(IndicatorPoint::invalid(date));
                }
            }
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::dates;

    fn ohlc(rows: &[(f64, f64, f64)]) -> TickerSeries {
        TickerSeries {
            high: rows.iter().map(|r| Some(r.0)).collect(),
            low: rows.iter().map(|r| Some(r.1)).collect(),
            close: rows.iter().map(|r| Some(r.2)).collect(),
        }
    }

    #[test]
    fn atr_warmup() {
        let s = ohlc(&[(110.0, 90.0, 100.0); 5]);
        let series = calculate_atr(&dates(5), &s, 3);
        assert_eq!(series.values.len(), 5);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(!series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn atr_seed_is_average() {
        let s = ohlc(&[
            (110.0, 100.0, 105.0),
            (115.0, 105.0, 110.0),
            (120.0, 110.0, 115.0),
        ]);
        let series = calculate_atr(&dates(3), &s, 2);
        assert!((series.get(2).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let s = ohlc(&[
            (110.0, 100.0, 105.0),
            (115.0, 105.0, 110.0),
            (120.0, 110.0, 115.0),
            (130.0, 110.0, 120.0),
        ]);
        let series = calculate_atr(&dates(4), &s, 2);
        let seed = 10.0;
        let expected = (seed * 1.0 + 20.0) / 2.0;
        assert!((series.get(3).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_close_only_uses_close_moves() {
        let closes = [100.0, 102.0, 99.0, 100.0];
        let s = ohlc(&closes.map(|c| (c, c, c)));
        let series = calculate_atr(&dates(4), &s, 3);
        let expected = (2.0 + 3.0 + 1.0) / 3.0;
        assert!((series.get(3).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_zero_period() {
        let s = ohlc(&[(110.0, 90.0, 100.0); 3]);
        let series = calculate_atr(&dates(3), &s, 0);
        assert_eq!(series.valid_count(), 0);
    }
}
