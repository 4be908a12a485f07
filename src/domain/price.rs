//! Daily price bar representation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily observation for a ticker.
///
/// Sources that only publish closes set `high` and `low` equal to `close`;
/// the true range then reduces to the close-to-close move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    pub fn from_close(ticker: &str, date: NaiveDate, close: f64) -> Self {
        PriceBar {
            ticker: ticker.to_string(),
            date,
            high: close,
            low: close,
            close,
        }
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_usable(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
