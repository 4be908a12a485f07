//! SQLite price store.
//!
//! Holds daily bars in a single `prices` table keyed by `(ticker, date)`.
//! Populated with `quadtrader import` and read through [`PricePort`].

use crate::domain::error::QuadtraderError;
use crate::domain::price::PriceBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::BTreeSet;

fn pool_error(e: r2d2::Error) -> QuadtraderError {
    QuadtraderError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> QuadtraderError {
    QuadtraderError::Database {
        reason: e.to_string(),
    }
}

pub struct SqlitePriceAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlitePriceAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuadtraderError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| QuadtraderError::missing("sqlite", "path"))?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, QuadtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn initialize_schema(&self) -> Result<(), QuadtraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prices (
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                PRIMARY KEY (ticker, date)
            );
            CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);",
        )
        .map_err(query_error)?;

        Ok(())
    }

    /// Upserts `bars` in one transaction; returns the number written.
    pub fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, QuadtraderError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, date, high, low, close)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bar.ticker,
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.high,
                    bar.low,
                    bar.close
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(bars.len())
    }

    pub fn list_tickers(&self) -> Result<Vec<String>, QuadtraderError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM prices ORDER BY ticker")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;

        let mut tickers = Vec::new();
        for row in rows {
            tickers.push(row.map_err(query_error)?);
        }
        Ok(tickers)
    }

    /// First date, last date and bar count stored for `ticker`.
    pub fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuadtraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| QuadtraderError::Database {
                reason: e.to_string(),
            })
        };

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse(&min)?, parse(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl PricePort for SqlitePriceAdapter {
    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuadtraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let start_str = start_date.format("%Y-%m-%d").to_string();
        let end_str = end_date.format("%Y-%m-%d").to_string();

        let mut stmt = conn
            .prepare(
                "SELECT ticker, date, high, low, close
                 FROM prices
                 WHERE ticker = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for ticker in tickers {
            let rows = stmt
                .query_map(params![ticker, start_str, end_str], |row| {
                    let date_str: String = row.get(1)?;
                    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            date_str.len(),
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(PriceBar {
                        ticker: row.get(0)?,
                        date,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                    })
                })
                .map_err(query_error)?;

            for row in rows {
                bars.push(row.map_err(query_error)?);
            }
        }

        Ok(bars)
    }
}
