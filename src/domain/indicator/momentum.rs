//! Trailing momentum (rate of change as a fraction).
//!
//! MOMENTUM(n)[i] = C[i] / C[i-n] - 1
//! Warmup: index i is invalid until both C[i] and C[i-n] exist.
//! A non-positive base price is a data gap, not a zero return.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use chrono::NaiveDate;

pub fn calculate_momentum(
    dates: &[NaiveDate],
    closes: &[Option<f64>],
    period: usize,
) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Momentum(period), dates);
    }

    let values = dates
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            if i < period {
                return IndicatorPoint::invalid(date);
            }
            match (closes[i - period], closes[i]) {
                (Some(base), Some(curr)) if base > 0.0 => {
                    IndicatorPoint::valid(date, curr / base - 1.0)
                }
                _ => IndicatorPoint::invalid(date),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Momentum(period),
        values,
    }
}
