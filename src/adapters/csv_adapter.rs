//! CSV file price adapter.
//!
//! One file per ticker, `<TICKER>.csv`, with a header row. Required columns
//! are `date` (YYYY-MM-DD) and `close`; `high` and `low` are optional and
//! fall back to the close. Column order does not matter.

use crate::domain::error::QuadtraderError;
use crate::domain::price::PriceBar;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

struct Columns {
    date: usize,
    close: usize,
    high: Option<usize>,
    low: Option<usize>,
}

impl Columns {
    fn from_headers(ticker: &str, headers: &csv::StringRecord) -> Result<Self, QuadtraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let missing = |name: &str| QuadtraderError::DataGap {
            ticker: ticker.to_string(),
            reason: format!("missing {name} column"),
        };
        Ok(Columns {
            date: find("date").ok_or_else(|| missing("date"))?,
            close: find("close").ok_or_else(|| missing("close"))?,
            high: find("high"),
            low: find("low"),
        })
    }
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    /// Tickers that have a file in the price directory.
    pub fn list_tickers(&self) -> Result<Vec<String>, QuadtraderError> {
        let mut tickers = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(ticker) = name.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    fn read_ticker(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuadtraderError> {
        let path = self.csv_path(ticker);
        let mut rdr = csv::Reader::from_path(&path)?;
        let columns = Columns::from_headers(ticker, rdr.headers()?)?;

        let parse = |field: &str, what: &str, line: usize| -> Result<f64, QuadtraderError> {
            field
                .trim()
                .parse::<f64>()
                .map_err(|e| QuadtraderError::DataGap {
                    ticker: ticker.to_string(),
                    reason: format!("invalid {what} value on line {line}: {e}"),
                })
        };

        let mut bars = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let line = i + 2;

            let date_str = record.get(columns.date).unwrap_or("").trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                QuadtraderError::DataGap {
                    ticker: ticker.to_string(),
                    reason: format!("invalid date '{date_str}' on line {line}: {e}"),
                }
            })?;
            if date < start_date || date > end_date {
                continue;
            }

            let close_str = record.get(columns.close).unwrap_or("").trim();
            if close_str.is_empty() {
                continue;
            }
            let close = parse(close_str, "close", line)?;

            let optional = |idx: Option<usize>, what: &str| -> Result<f64, QuadtraderError> {
                match idx.and_then(|i| record.get(i)).map(str::trim) {
                    Some(s) if !s.is_empty() => parse(s, what, line),
                    _ => Ok(close),
                }
            };
            let high = optional(columns.high, "high")?;
            let low = optional(columns.low, "low")?;

            bars.push(PriceBar {
                ticker: ticker.to_string(),
                date,
                high,
                low,
                close,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl PricePort for CsvPriceAdapter {
    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuadtraderError> {
        let mut bars = Vec::new();
        for ticker in tickers {
            if !self.csv_path(ticker).exists() {
                warn!(%ticker, "no price file, ticker skipped");
                continue;
            }
            let ticker_bars = self.read_ticker(ticker, start_date, end_date)?;
            debug!(%ticker, bars = ticker_bars.len(), "loaded prices");
            bars.extend(ticker_bars);
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("GLD.csv"),
            "date,high,low,close\n\
             2024-01-16,186.0,183.0,185.0\n\
             2024-01-15,185.0,182.0,184.0\n\
             2024-01-17,187.0,184.5,186.5\n",
        )
        .unwrap();
        fs::write(
            path.join("TLT.csv"),
            "Date,Close\n2024-01-15,92.5\n2024-01-16,\n2024-01-17,93.1\n",
        )
        .unwrap();

        (dir, path)
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    fn set(tickers: &[&str]) -> BTreeSet<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn reads_ohlc_columns_sorted_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let (start, end) = range();
        let bars = adapter.get_prices(&set(&["GLD"]), start, end).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bars[0].high, 185.0);
        assert_eq!(bars[0].low, 182.0);
        assert_eq!(bars[0].close, 184.0);
    }

    #[test]
    fn close_only_file_uses_close_for_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let (start, end) = range();
        let bars = adapter.get_prices(&set(&["TLT"]), start, end).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].high, 93.1);
        assert_eq!(bars[1].low, 93.1);
    }

    #[test]
    fn filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let bars = adapter.get_prices(&set(&["GLD"]), day, day).unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, day);
    }

    #[test]
    fn missing_file_is_partial_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        let (start, end) = range();
        let bars = adapter.get_prices(&set(&["GLD", "XYZ"]), start, end).unwrap();
        assert!(bars.iter().all(|b| b.ticker == "GLD"));
        assert_eq!(bars.len(), 3);
    }

    #[test]
    fn garbage_close_is_data_gap_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("BAD.csv"), "date,close\n2024-01-15,abc\n").unwrap();
        let adapter = CsvPriceAdapter::new(dir.path().to_path_buf());
        let (start, end) = range();
        let err = adapter.get_prices(&set(&["BAD"]), start, end).unwrap_err();
        assert!(matches!(err, QuadtraderError::DataGap { .. }));
    }

    #[test]
    fn list_tickers_returns_files() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvPriceAdapter::new(path);
        assert_eq!(adapter.list_tickers().unwrap(), vec!["GLD", "TLT"]);
    }
}
