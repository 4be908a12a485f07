//! Technical indicators over date-aligned price series.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Every calculation reads a ticker's aligned closes (`None` = no data) and
//! marks points invalid while the warmup window is incomplete or the inputs
//! contain a gap. Invalid points are never fed to allocation decisions.

pub mod atr;
pub mod ema;
pub mod momentum;
pub mod volatility;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

impl IndicatorPoint {
    pub(crate) fn invalid(date: NaiveDate) -> Self {
        IndicatorPoint {
            date,
            valid: false,
            value: 0.0,
        }
    }

    pub(crate) fn valid(date: NaiveDate, value: f64) -> Self {
        IndicatorPoint {
            date,
            valid: value.is_finite(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Momentum(usize),
    Volatility(usize),
    Atr(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn empty(indicator_type: IndicatorType, dates: &[NaiveDate]) -> Self {
        IndicatorSeries {
            indicator_type,
            values: dates.iter().map(|d| IndicatorPoint::invalid(*d)).collect(),
        }
    }

    /// Value at `idx` if it is past warmup and was computed from real data.
    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values
            .get(idx)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|p| p.valid).count()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Momentum(period) => write!(f, "MOMENTUM({})", period),
            IndicatorType::Volatility(period) => write!(f, "VOLATILITY({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
        }
    }
}
