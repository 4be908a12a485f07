//! Open positions and closed trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An open position sized as a fraction of equity.
///
/// The stop is set once at entry and cannot be changed afterwards; only the
/// weight is mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    weight: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    stop_price: Option<f64>,
    pub atr_at_entry: Option<f64>,
}

impl Position {
    pub fn open(
        ticker: &str,
        weight: f64,
        entry_price: f64,
        entry_date: NaiveDate,
        stop_price: Option<f64>,
        atr_at_entry: Option<f64>,
    ) -> Self {
        Position {
            ticker: ticker.to_string(),
            weight,
            entry_price,
            entry_date,
            stop_price,
            atr_at_entry,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn stop_price(&self) -> Option<f64> {
        self.stop_price
    }

    pub fn should_stop_loss(&self, low: f64) -> bool {
        self.stop_price.is_some_and(|stop| low <= stop)
    }

    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.entry_price > 0.0 {
            price / self.entry_price - 1.0
        } else {
            0.0
        }
    }

    pub fn close(self, exit_price: f64, exit_date: NaiveDate, exit_reason: ExitReason) -> ClosedTrade {
        ClosedTrade {
            return_pct: self.unrealized_return(exit_price),
            ticker: self.ticker,
            weight: self.weight,
            entry_price: self.entry_price,
            exit_price,
            entry_date: self.entry_date,
            exit_date,
            exit_reason,
        }
    }
}

/// Why a position was closed, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// The ticker left the active top-2 quadrants.
    Rotation,
    /// Price fell to or below its EMA.
    TrendFilter,
    /// The session low breached the static stop.
    StopLoss,
    /// A rebalance assigned zero weight for another reason.
    ZeroTarget,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Rotation => "rotation",
            ExitReason::TrendFilter => "trend",
            ExitReason::StopLoss => "stop",
            ExitReason::ZeroTarget => "zero target",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticker: String,
    pub weight: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub exit_reason: ExitReason,
    /// Price return of the position over its life.
    pub return_pct: f64,
}

impl ClosedTrade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}
