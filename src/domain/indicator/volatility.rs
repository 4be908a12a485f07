//! Rolling annualized volatility of daily returns.
//!
//! r[i] = C[i] / C[i-1] - 1
//! VOL(n)[i] = sample_stddev(r[i-n+1..=i]) * sqrt(252)
//! Warmup: valid once n consecutive returns exist (n + 1 closes).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use chrono::NaiveDate;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn daily_returns(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let r = if i == 0 {
            None
        } else {
            match (closes[i - 1], closes[i]) {
                (Some(prev), Some(curr)) if prev > 0.0 => Some(curr / prev - 1.0),
                _ => None,
            }
        };
        out.push(r);
    }
    out
}

pub fn calculate_volatility(
    dates: &[NaiveDate],
    closes: &[Option<f64>],
    period: usize,
) -> IndicatorSeries {
    if period < 2 {
        return IndicatorSeries::empty(IndicatorType::Volatility(period), dates);
    }

    let returns = daily_returns(closes);
    let mut values = Vec::with_capacity(dates.len());

    for (i, &date) in dates.iter().enumerate() {
        if i < period {
            values.push(IndicatorPoint::invalid(date));
            continue;
        }
        let window = &returns[i + 1 - period..=i];
        let observed: Option<Vec<f64>> = window.iter().copied().collect();
        let Some(window) = observed else {
            values.push(IndicatorPoint::invalid(date));
            continue;
        };

        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        values.push(IndicatorPoint::valid(
            date,
            variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt(),
        ));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Volatility(period),
        values,
    }
}
