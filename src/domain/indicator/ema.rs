//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: the first (n-1) observed closes are invalid. Dates before the
//! ticker's first observation are invalid as well.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use chrono::NaiveDate;

pub fn calculate_ema(dates: &[NaiveDate], closes: &[Option<f64>], period: usize) -> IndicatorSeries {
    if period == 0 || closes.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(period), dates);
    }

    let mut values = Vec::with_capacity(closes.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema: Option<f64> = None;
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;

    for (&date, close) in dates.iter().zip(closes) {
        let Some(close) = *close else {
            if ema.is_none() {
                seed_sum = 0.0;
                seed_count = 0;
            }
            values.push(IndicatorPoint::invalid(date));
            continue;
        };

        match ema {
            Some(prev) => {
                let next = close * k + prev * (1.0 - k);
                ema = Some(next);
                values.push(IndicatorPoint::valid(date, next));
            }
            None => {
                seed_sum += close;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    ema = Some(seed);
                    values.push(IndicatorPoint::valid(date, seed));
                } else {
                    values.push(IndicatorPoint::invalid(date));
                }
            }
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}
