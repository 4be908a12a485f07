//! Price provider port trait.

use crate::domain::error::QuadtraderError;
use crate::domain::price::PriceBar;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Source of daily bars.
///
/// Implementations may return partial or missing series for some tickers;
/// a ticker with no data at all simply contributes no bars.
pub trait PricePort {
    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuadtraderError>;
}
