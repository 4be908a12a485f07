//! ATR stop placement and exit evaluation.
//!
//! `stop = entry_price - k * ATR_at_entry`, fixed for the life of the
//! position. Exits are checked in priority order: rotation out of the top-2,
//! trend filter failure, stop breach by the session low.

use crate::domain::position::{ExitReason, Position};

/// Per-session facts an exit decision needs for one held ticker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitCheck {
    /// Ticker belongs to one of the selected quadrants.
    pub in_selected_quadrants: bool,
    /// `Some(price > EMA)`; `None` if undefined.
    pub above_trend: Option<bool>,
    /// Session low (or close when lows are not available).
    pub low: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTracker {
    multiplier: f64,
}

impl StopTracker {
    pub fn new(multiplier: f64) -> Self {
        StopTracker { multiplier }
    }

    pub fn is_enabled(&self) -> bool {
        self.multiplier > 0.0
    }

    /// Stop for a new entry; `None` if stops are disabled or ATR is undefined.
    pub fn stop_for(&self, entry_price: f64, atr: Option<f64>) -> Option<f64> {
        if !self.is_enabled() {
            return None;
        }
        let atr = atr.filter(|a| a.is_finite() && *a >= 0.0)?;
        Some(entry_price - self.multiplier * atr)
    }

    pub fn evaluate(&self, position: &Position, check: &ExitCheck) -> Option<ExitReason> {
        if !check.in_selected_quadrants {
            return Some(ExitReason::Rotation);
        }
        if check.above_trend != Some(true) {
            return Some(ExitReason::TrendFilter);
        }
        if check.low.is_some_and(|low| position.should_stop_loss(low)) {
            return Some(ExitReason::StopLoss);
        }
        None
    }
}
