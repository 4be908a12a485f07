#![allow(dead_code)]

use chrono::NaiveDate;
use quadtrader::domain::error::QuadtraderError;
use quadtrader::domain::execution::{Fill, OrderSide};
use quadtrader::domain::market_data::MarketData;
use quadtrader::domain::price::PriceBar;
use quadtrader::domain::price_table::{FillPolicy, PriceTable};
use quadtrader::domain::quadrant::{Quadrant, QuadrantDefinitions, QuadrantUniverse};
use quadtrader::domain::strategy::StrategyConfig;
use quadtrader::ports::broker_port::BrokerPort;
use quadtrader::ports::price_port::PricePort;
use std::collections::{BTreeMap, BTreeSet};

pub const TICKERS: [&str; 4] = ["AAA", "BBB", "CCC", "DDD"];

pub struct MockPricePort {
    pub bars: Vec<PriceBar>,
    pub error: Option<String>,
}

impl MockPricePort {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars, error: None }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl PricePort for MockPricePort {
    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuadtraderError> {
        if let Some(reason) = &self.error {
            return Err(QuadtraderError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| tickers.contains(&b.ticker) && b.date >= start_date && b.date <= end_date)
            .cloned()
            .collect())
    }
}

/// Fills at fixed prices; tickers in `rejecting` always fail.
pub struct MockBroker {
    pub cash: f64,
    pub positions: BTreeMap<String, f64>,
    pub prices: BTreeMap<String, f64>,
    pub rejecting: BTreeSet<String>,
    pub orders: Vec<(String, OrderSide, f64)>,
}

impl MockBroker {
    pub fn new(cash: f64, prices: &[(&str, f64)]) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            prices: prices.iter().map(|(t, p)| (t.to_string(), *p)).collect(),
            rejecting: BTreeSet::new(),
            orders: Vec::new(),
        }
    }

    pub fn rejecting(mut self, ticker: &str) -> Self {
        self.rejecting.insert(ticker.to_string());
        self
    }
}

impl BrokerPort for MockBroker {
    fn get_positions(&self) -> Result<BTreeMap<String, f64>, QuadtraderError> {
        Ok(self.positions.clone())
    }

    fn get_account_value(&self) -> Result<f64, QuadtraderError> {
        Ok(self.cash
            + self
                .positions
                .iter()
                .map(|(t, q)| q * self.prices.get(t).copied().unwrap_or(0.0))
                .sum::<f64>())
    }

    fn place_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, QuadtraderError> {
        self.orders.push((ticker.to_string(), side, quantity));
        if self.rejecting.contains(ticker) {
            return Err(QuadtraderError::Execution {
                ticker: ticker.to_string(),
                reason: "rejected by broker".into(),
            });
        }
        let price = self.prices[ticker];
        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        *self.positions.entry(ticker.to_string()).or_insert(0.0) += signed;
        self.cash -= signed * price;
        Ok(Fill {
            ticker: ticker.to_string(),
            side,
            quantity,
            price,
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One ticker per quadrant, used as both asset and indicator.
pub fn single_ticker_quadrants() -> QuadrantDefinitions {
    let universe = |t: &str| QuadrantUniverse {
        assets: [(t.to_string(), 1.0)].into_iter().collect(),
        indicators: vec![t.to_string()],
    };
    let quadrants: BTreeMap<Quadrant, QuadrantUniverse> = Quadrant::PRIORITY
        .into_iter()
        .zip(TICKERS)
        .map(|(q, t)| (q, universe(t)))
        .collect();
    QuadrantDefinitions::new(quadrants).unwrap()
}

pub fn test_strategy() -> StrategyConfig {
    StrategyConfig {
        momentum_lookback_days: 3,
        ema_period: 3,
        volatility_lookback_days: 3,
        atr_period: 3,
        max_positions: None,
        quadrants: single_ticker_quadrants(),
        ..StrategyConfig::default()
    }
}

/// Bars from daily returns, one path per ticker, starting 2024-01-01.
pub fn bars_from_returns(paths: &[(&str, f64, Vec<f64>)]) -> Vec<PriceBar> {
    let start = date(2024, 1, 1);
    let mut bars = Vec::new();
    for (ticker, first, returns) in paths {
        let mut close = *first;
        bars.push(PriceBar::from_close(ticker, start, close));
        for (i, r) in returns.iter().enumerate() {
            close *= 1.0 + r;
            let d = start + chrono::Duration::days(i as i64 + 1);
            bars.push(PriceBar {
                ticker: ticker.to_string(),
                date: d,
                high: close * 1.01,
                low: close * 0.99,
                close,
            });
        }
    }
    bars
}

/// AAA and BBB trend up with a wiggle, CCC and DDD trend down.
pub fn trending_bars(n: usize) -> Vec<PriceBar> {
    let start = date(2024, 1, 1);
    let mut bars = Vec::new();
    for i in 0..n {
        let d = start + chrono::Duration::days(i as i64);
        let wiggle = if i % 2 == 0 { 0.0 } else { 0.3 };
        bars.push(PriceBar::from_close("AAA", d, 100.0 + 2.0 * i as f64 + wiggle));
        bars.push(PriceBar::from_close("BBB", d, 50.0 + i as f64 + wiggle));
        bars.push(PriceBar::from_close("CCC", d, 40.0 - 0.5 * i as f64));
        bars.push(PriceBar::from_close("DDD", d, 30.0 - 0.5 * i as f64));
    }
    bars
}

/// AAA and BBB lead for `n / 2` sessions, then CCC and DDD take over.
pub fn rotating_bars(n: usize) -> Vec<PriceBar> {
    let half = n / 2;
    let up = |i: usize| if i % 2 == 0 { 0.02 } else { 0.01 };
    let down = |i: usize| if i % 2 == 0 { -0.02 } else { -0.005 };
    let path = |lead: bool| -> Vec<f64> {
        (1..n)
            .map(|i| if (i < half) == lead { up(i) } else { down(i) })
            .collect()
    };
    bars_from_returns(&[
        ("AAA", 100.0, path(true)),
        ("BBB", 50.0, path(true)),
        ("CCC", 40.0, path(false)),
        ("DDD", 30.0, path(false)),
    ])
}

pub fn table(bars: &[PriceBar]) -> PriceTable {
    PriceTable::from_bars(bars, FillPolicy::Forward)
}

pub fn market(strategy: &StrategyConfig, bars: &[PriceBar]) -> MarketData {
    MarketData::new(table(bars), strategy)
}

/// INI overriding every quadrant with the single-ticker universe.
pub fn quadrant_sections() -> String {
    let mut out = String::new();
    for (q, t) in ["Q1", "Q2", "Q3", "Q4"].iter().zip(TICKERS) {
        out.push_str(&format!("[quadrant.{q}]\nassets = {t}:1.0\nindicators = {t}\n\n"));
    }
    out
}

pub fn strategy_ini() -> String {
    format!(
        "[strategy]\n\
         momentum_lookback_days = 3\n\
         ema_period = 3\n\
         volatility_lookback_days = 3\n\
         atr_period = 3\n\
         max_positions = 0\n\
         entry_confirmation_lag_days = 1\n\
         \n{}",
        quadrant_sections()
    )
}

/// Writes `<TICKER>.csv` files for `bars` into `dir`.
pub fn write_price_csvs(dir: &std::path::Path, bars: &[PriceBar]) {
    let mut by_ticker: BTreeMap<&str, Vec<&PriceBar>> = BTreeMap::new();
    for bar in bars {
        by_ticker.entry(bar.ticker.as_str()).or_default().push(bar);
    }
    for (ticker, rows) in by_ticker {
        let mut content = String::from("date,high,low,close\n");
        for b in rows {
            content.push_str(&format!("{},{},{},{}\n", b.date, b.high, b.low, b.close));
        }
        std::fs::write(dir.join(format!("{ticker}.csv")), content).unwrap();
    }
}
