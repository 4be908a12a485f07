//! Two-phase live operation.
//!
//! The signal phase runs after the close of session `t` and calls
//! `rebalance(t)`. The confirm phase runs with data through `t + 1` and calls
//! `confirm(t + 1)`. Between the two the full engine state lives in an
//! [`EngineSnapshot`] behind a [`StateStorePort`].
//!
//! Both phases are idempotent per session date: running one twice for the
//! same date returns the stored report and leaves the snapshot untouched.
//! If the confirm phase was skipped, the next signal phase confirms the
//! session first so the call sequence matches the backtest.

use crate::domain::engine::{ConfirmReport, EngineState, RebalanceReport, RotationEngine};
use crate::domain::error::QuadtraderError;
use crate::domain::execution::ExecutionReport;
use crate::domain::market_data::MarketData;
use crate::domain::strategy::StrategyConfig;
use crate::ports::notifier_port::NotifierPort;
use crate::ports::state_store_port::StateStorePort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub state: EngineState,
    pub last_signal: Option<RebalanceReport>,
    pub last_confirm: Option<ConfirmReport>,
}

impl EngineSnapshot {
    pub fn new(required_lag: u32) -> Self {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            state: EngineState::new(required_lag),
            last_signal: None,
            last_confirm: None,
        }
    }

    /// Target weights of the held positions.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.state.weights()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutcome {
    pub report: RebalanceReport,
    /// Confirmation run first because the confirm phase was skipped.
    pub catch_up: Option<ConfirmReport>,
    /// The session had already been processed; nothing changed.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOutcome {
    pub report: ConfirmReport,
    pub weights: BTreeMap<String, f64>,
    pub replayed: bool,
}

fn load_snapshot(
    store: &dyn StateStorePort,
    config: &StrategyConfig,
) -> Result<EngineSnapshot, QuadtraderError> {
    match store.load()? {
        Some(snapshot) if snapshot.version != SNAPSHOT_VERSION => {
            Err(QuadtraderError::Persistence {
                reason: format!(
                    "snapshot version {} not supported (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            })
        }
        Some(snapshot) => Ok(snapshot),
        None => {
            info!("no saved state, starting fresh");
            Ok(EngineSnapshot::new(config.entry_confirmation_lag_days))
        }
    }
}

fn latest_session(market: &MarketData) -> Result<(usize, NaiveDate), QuadtraderError> {
    let idx = market.len().checked_sub(1).ok_or(QuadtraderError::NoData {
        ticker: "*".into(),
    })?;
    let date = market.date(idx).ok_or(QuadtraderError::NoData {
        ticker: "*".into(),
    })?;
    Ok((idx, date))
}

fn sequence_error(phase: &str, date: NaiveDate, after: NaiveDate) -> QuadtraderError {
    QuadtraderError::Sequence {
        reason: format!("{phase} for {date} cannot follow a session processed on {after}"),
    }
}

/// Rebalance decision for the latest session of `market`.
pub fn signal_phase(
    config: &StrategyConfig,
    market: &MarketData,
    store: &dyn StateStorePort,
) -> Result<SignalOutcome, QuadtraderError> {
    let (idx, date) = latest_session(market)?;
    let snapshot = load_snapshot(store, config)?;

    if snapshot.state.last_rebalanced_date == Some(date) {
        if let Some(report) = snapshot.last_signal {
            info!(%date, "signal already generated, replaying");
            return Ok(SignalOutcome {
                report,
                catch_up: None,
                replayed: true,
            });
        }
    }
    if let Some(last) = snapshot.state.last_rebalanced_date {
        if date < last {
            return Err(sequence_error("signal", date, last));
        }
    }
    if let Some(last) = snapshot.state.last_confirmed_date {
        if date < last {
            return Err(sequence_error("signal", date, last));
        }
    }

    let mut last_confirm = snapshot.last_confirm;
    let mut engine = RotationEngine::with_state(config, snapshot.state);

    let catch_up = if engine.state().last_confirmed_date != Some(date) {
        let report = engine.confirm(market, idx);
        if let Some(r) = &report {
            if !r.confirmed.is_empty() || !r.rejected.is_empty() {
                info!(
                    %date,
                    confirmed = r.confirmed.len(),
                    rejected = r.rejected.len(),
                    "confirmed pending entries before signal"
                );
            }
            last_confirm = Some(r.clone());
        }
        report
    } else {
        None
    };

    let report = engine
        .rebalance(market, idx)
        .ok_or(QuadtraderError::NoData {
            ticker: "*".into(),
        })?;

    store.save(&EngineSnapshot {
        version: SNAPSHOT_VERSION,
        state: engine.into_state(),
        last_signal: Some(report.clone()),
        last_confirm,
    })?;

    Ok(SignalOutcome {
        report,
        catch_up,
        replayed: false,
    })
}

/// Resolves pending entries against the latest session of `market`.
pub fn confirm_phase(
    config: &StrategyConfig,
    market: &MarketData,
    store: &dyn StateStorePort,
) -> Result<ConfirmOutcome, QuadtraderError> {
    let (idx, date) = latest_session(market)?;
    let snapshot = load_snapshot(store, config)?;

    if snapshot.state.last_confirmed_date == Some(date) {
        if let Some(report) = snapshot.last_confirm.clone() {
            info!(%date, "entries already confirmed, replaying");
            return Ok(ConfirmOutcome {
                report,
                weights: snapshot.weights(),
                replayed: true,
            });
        }
    }
    if let Some(last) = snapshot.state.last_rebalanced_date {
        if date <= last {
            return Err(sequence_error("confirm", date, last));
        }
    }
    if let Some(last) = snapshot.state.last_confirmed_date {
        if date < last {
            return Err(sequence_error("confirm", date, last));
        }
    }

    let last_signal = snapshot.last_signal;
    let mut engine = RotationEngine::with_state(config, snapshot.state);
    let report = engine
        .confirm(market, idx)
        .ok_or(QuadtraderError::NoData {
            ticker: "*".into(),
        })?;

    let state = engine.into_state();
    let weights = state.weights();
    store.save(&EngineSnapshot {
        version: SNAPSHOT_VERSION,
        state,
        last_signal,
        last_confirm: Some(report.clone()),
    })?;

    info!(
        %date,
        confirmed = report.confirmed.len(),
        rejected = report.rejected.len(),
        waiting = report.waiting.len(),
        "confirm phase complete"
    );

    Ok(ConfirmOutcome {
        report,
        weights,
        replayed: false,
    })
}

/// Sends `message`, logging instead of failing.
pub fn notify(notifier: &dyn NotifierPort, message: &str) {
    if let Err(e) = notifier.notify(message) {
        warn!(error = %e, "notification failed");
    }
}

pub fn format_signal_summary(report: &RebalanceReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Signal for {}", report.date);

    match &report.signal.pair {
        Some(pair) => {
            let _ = writeln!(
                out,
                "Regime: {} ({}) + {} ({})",
                pair.primary,
                pair.primary.description(),
                pair.secondary,
                pair.secondary.description()
            );
        }
        None => {
            let _ = writeln!(out, "Regime: warming up");
        }
    }
    if let Some(scores) = &report.signal.scores {
        let line: Vec<String> = scores
            .iter()
            .map(|s| format!("{} {:+.2}%", s.quadrant, s.score * 100.0))
            .collect();
        let _ = writeln!(out, "Scores: {}", line.join(", "));
    }
    let _ = writeln!(out, "Leverage: {:.2}x", report.leverage_budget);

    match &report.trigger {
        Some(reason) => {
            let _ = writeln!(out, "Rebalance: {reason}");
        }
        None => {
            let _ = writeln!(out, "Rebalance: none");
        }
    }
    for trade in &report.exits {
        let _ = writeln!(
            out,
            "  EXIT {} ({}) {:+.2}%",
            trade.ticker,
            trade.exit_reason,
            trade.return_pct * 100.0
        );
    }
    for change in &report.adjusted {
        let _ = writeln!(
            out,
            "  ADJUST {} {:.2}% -> {:.2}%",
            change.ticker,
            change.from * 100.0,
            change.to * 100.0
        );
    }
    for entry in &report.new_pending {
        let _ = writeln!(
            out,
            "  PENDING {} {:.2}% (EMA {:.2})",
            entry.ticker,
            entry.target_weight * 100.0,
            entry.ema_at_signal
        );
    }
    let _ = writeln!(
        out,
        "Holdings: {} positions, cash {:.2}%",
        report.positions.len(),
        report.cash_fraction() * 100.0
    );
    out
}

pub fn format_confirm_summary(report: &ConfirmReport, execution: Option<&ExecutionReport>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Confirmation for {}", report.date);

    for position in &report.confirmed {
        let stop = position
            .stop_price()
            .map_or_else(|| "none".to_string(), |s| format!("{s:.2}"));
        let _ = writeln!(
            out,
            "  CONFIRMED {} {:.2}% @ {:.2} stop {}",
            position.ticker,
            position.weight() * 100.0,
            position.entry_price,
            stop
        );
    }
    for rejected in &report.rejected {
        let _ = writeln!(out, "  REJECTED {} ({})", rejected.entry.ticker, rejected.reason);
    }
    for entry in &report.waiting {
        let _ = writeln!(
            out,
            "  WAITING {} day {}",
            entry.ticker, entry.days_waiting
        );
    }
    if report.confirmed.is_empty() && report.rejected.is_empty() && report.waiting.is_empty() {
        let _ = writeln!(out, "  nothing pending");
    }

    if let Some(exec) = execution {
        let _ = writeln!(
            out,
            "Orders: {} filled, {} skipped, {} failed",
            exec.fills.len(),
            exec.plan.skipped.len(),
            exec.error_count()
        );
        for fill in &exec.fills {
            let _ = writeln!(
                out,
                "  {} {:.4} {} @ {:.2}",
                fill.side, fill.quantity, fill.ticker, fill.price
            );
        }
        for failure in &exec.failures {
            let _ = writeln!(
                out,
                "  FAILED {} after {} attempts: {}",
                failure.ticker, failure.attempts, failure.reason
            );
        }
    }
    out
}
