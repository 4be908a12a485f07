//! Date-aligned price table and unified timeline.
//!
//! Every ticker is laid out on the same timeline (the union of all bar
//! dates). Gaps are forward-filled; leading gaps stay empty unless the
//! caller opts into backward filling.

use crate::domain::price::PriceBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Carry the last observation forward. Leading gaps stay missing.
    #[default]
    Forward,
    /// Forward fill, then back-fill leading gaps with the first observation.
    /// Leaks the first observed price into earlier dates.
    ForwardBackward,
}

impl FromStr for FillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "ffill" => Ok(FillPolicy::Forward),
            "forward_backward" | "ffill_bfill" => Ok(FillPolicy::ForwardBackward),
            other => Err(format!("unknown fill policy '{other}'")),
        }
    }
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillPolicy::Forward => write!(f, "forward"),
            FillPolicy::ForwardBackward => write!(f, "forward_backward"),
        }
    }
}

/// Aligned series of one ticker. `None` marks a date without data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickerSeries {
    pub close: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
}

impl TickerSeries {
    fn with_len(len: usize) -> Self {
        TickerSeries {
            close: vec![None; len],
            high: vec![None; len],
            low: vec![None; len],
        }
    }

    fn fill(&mut self, policy: FillPolicy) {
        for series in [&mut self.close, &mut self.high, &mut self.low] {
            forward_fill(series);
            if policy == FillPolicy::ForwardBackward {
                backward_fill(series);
            }
        }
    }

    fn truncated(&self, len: usize) -> Self {
        TickerSeries {
            close: self.close[..len].to_vec(),
            high: self.high[..len].to_vec(),
            low: self.low[..len].to_vec(),
        }
    }

    pub fn first_valid(&self) -> Option<usize> {
        self.close.iter().position(|c| c.is_some())
    }
}

fn forward_fill(series: &mut [Option<f64>]) {
    let mut last = None;
    for v in series.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
}

fn backward_fill(series: &mut [Option<f64>]) {
    let mut next = None;
    for v in series.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceTable {
    pub dates: Vec<NaiveDate>,
    pub series: BTreeMap<String, TickerSeries>,
    date_index: HashMap<NaiveDate, usize>,
}

impl PriceTable {
    /// Build an aligned table from raw bars of any number of tickers.
    ///
    /// Bars with non-finite or non-positive closes are dropped before
    /// alignment and filled like any other gap.
    pub fn from_bars(bars: &[PriceBar], policy: FillPolicy) -> Self {
        let dates = build_unified_timeline(bars);
        let date_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut series: BTreeMap<String, TickerSeries> = BTreeMap::new();
        for bar in bars {
            let entry = series
                .entry(bar.ticker.clone())
                .or_insert_with(|| TickerSeries::with_len(dates.len()));
            if !bar.is_usable() {
                continue;
            }
            let i = date_index[&bar.date];
            entry.close[i] = Some(bar.close);
            entry.high[i] = Some(bar.high.max(bar.close));
            entry.low[i] = Some(bar.low.min(bar.close));
        }

        for s in series.values_mut() {
            s.fill(policy);
        }

        PriceTable {
            dates,
            series,
            date_index,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.series.contains_key(ticker)
    }

    pub fn get(&self, ticker: &str) -> Option<&TickerSeries> {
        self.series.get(ticker)
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn close(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.series.get(ticker)?.close.get(idx).copied().flatten()
    }

    pub fn low(&self, ticker: &str, idx: usize) -> Option<f64> {
        self.series.get(ticker)?.low.get(idx).copied().flatten()
    }

    /// The table as it looked at the close of `dates[len - 1]`.
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.dates.len());
        let dates = self.dates[..len].to_vec();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        PriceTable {
            dates,
            series: self
                .series
                .iter()
                .map(|(t, s)| (t.clone(), s.truncated(len)))
                .collect(),
            date_index,
        }
    }
}

pub fn build_unified_timeline(bars: &[PriceBar]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = bars.iter().map(|bar| bar.date).collect();
    unique_dates.into_iter().collect()
}
