//! Portfolio simulator over historical prices.
//!
//! Session loop for `t` in the window:
//! 1. equity[t] = equity[t-1] * (1 + Σ w[t-1] * r[t]) using the weights held
//!    after the previous close (T-1 lag; cash earns nothing)
//! 2. engine.confirm(t), engine.rebalance(t)
//! 3. trading costs on Σ|w[t] - w[t-1]| are charged against equity[t]

use crate::domain::config_validation::{parse_optional_date, validate_backtest_config};
use crate::domain::confirmation::RejectReason;
use crate::domain::engine::{EngineStats, RotationEngine};
use crate::domain::error::QuadtraderError;
use crate::domain::market_data::MarketData;
use crate::domain::portfolio::{EquityPoint, PortfolioState};
use crate::domain::position::ClosedTrade;
use crate::domain::quadrant::Quadrant;
use crate::domain::rebalance::TriggerReason;
use crate::domain::regime::TopQuadrantPair;
use crate::domain::scoring::QuadrantScore;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_date: None,
            end_date: None,
            initial_capital: 100_000.0,
            risk_free_rate: 0.0,
        }
    }
}

impl BacktestConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuadtraderError> {
        validate_backtest_config(config)?;
        Ok(BacktestConfig {
            start_date: parse_optional_date(config, "start_date")?,
            end_date: parse_optional_date(config, "end_date")?,
            initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
            risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryEventKind {
    Proposed,
    Confirmed,
    Rejected(RejectReason),
}

/// One transition of the entry state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryEvent {
    pub date: NaiveDate,
    pub ticker: String,
    pub kind: EntryEventKind,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub regime: Option<(Quadrant, Quadrant)>,
    /// Weights held after this session's close; they earn the next return.
    pub weights: BTreeMap<String, f64>,
    pub leverage_budget: f64,
    pub cash_fraction: f64,
    pub equity: f64,
    pub daily_return: f64,
    pub cost: f64,
    pub trigger: Option<TriggerReason>,
}

/// Read-only outcome of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: StrategyConfig,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub scores: Vec<QuadrantScore>,
    pub pairs: Vec<TopQuadrantPair>,
    pub daily: Vec<DailyRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
    pub entry_log: Vec<EntryEvent>,
    pub stats: EngineStats,
    pub total_costs: f64,
    pub final_state: Option<PortfolioState>,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.initial_capital, |p| p.equity)
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_capital > 0.0 {
            self.final_equity() / self.initial_capital - 1.0
        } else {
            0.0
        }
    }

    /// Session-over-session returns of the equity curve.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.equity_curve
            .windows(2)
            .map(|w| {
                if w[0].equity > 0.0 {
                    w[1].equity / w[0].equity - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Index range `[first, last]` of the sessions inside the configured window.
pub fn session_window(market: &MarketData, config: &BacktestConfig) -> Option<(usize, usize)> {
    let dates = market.dates();
    let first = dates
        .iter()
        .position(|d| config.start_date.is_none_or(|s| *d >= s))?;
    let last = dates
        .iter()
        .rposition(|d| config.end_date.is_none_or(|e| *d <= e))?;
    (first <= last).then_some((first, last))
}

pub fn run_backtest(
    market: &MarketData,
    strategy: &StrategyConfig,
    config: &BacktestConfig,
) -> Result<BacktestResult, QuadtraderError> {
    let (first, last) = session_window(market, config).ok_or(QuadtraderError::WarmupIncomplete {
        available: market.len(),
        required: strategy.warmup_days(),
    })?;
    if last + 1 <= strategy.warmup_days() {
        return Err(QuadtraderError::WarmupIncomplete {
            available: last + 1,
            required: strategy.warmup_days() + 1,
        });
    }

    let mut engine = RotationEngine::new(strategy);
    let cost_rate = strategy.cost_per_leg_bps / 10_000.0;

    let mut result = BacktestResult {
        strategy: strategy.clone(),
        initial_capital: config.initial_capital,
        risk_free_rate: config.risk_free_rate,
        scores: Vec::new(),
        pairs: Vec::new(),
        daily: Vec::with_capacity(last - first + 1),
        equity_curve: Vec::with_capacity(last - first + 1),
        trades: Vec::new(),
        entry_log: Vec::new(),
        stats: EngineStats::default(),
        total_costs: 0.0,
        final_state: None,
    };

    let mut equity = config.initial_capital;
    let mut held: BTreeMap<String, f64> = BTreeMap::new();

    for idx in first..=last {
        let daily_return: f64 = if idx > first {
            held.iter()
                .map(|(ticker, w)| w * market.daily_return(ticker, idx).unwrap_or(0.0))
                .sum()
        } else {
            0.0
        };
        equity = (equity * (1.0 + daily_return)).max(0.0);

        let Some((confirm, report)) = engine.step(market, idx) else {
            continue;
        };
        let date = report.date;

        for position in &confirm.confirmed {
            result.entry_log.push(EntryEvent {
                date,
                ticker: position.ticker.clone(),
                kind: EntryEventKind::Confirmed,
                weight: position.weight(),
            });
        }
        for rejected in &confirm.rejected {
            result.entry_log.push(EntryEvent {
                date,
                ticker: rejected.entry.ticker.clone(),
                kind: EntryEventKind::Rejected(rejected.reason),
                weight: rejected.entry.target_weight,
            });
        }
        for pending in &report.new_pending {
            result.entry_log.push(EntryEvent {
                date,
                ticker: pending.ticker.clone(),
                kind: EntryEventKind::Proposed,
                weight: pending.target_weight,
            });
        }

        let weights = report.weights();
        let turnover: f64 = weights
            .keys()
            .chain(held.keys())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|t| {
                (weights.get(t).copied().unwrap_or(0.0) - held.get(t).copied().unwrap_or(0.0)).abs()
            })
            .sum();
        let cost = turnover * equity * cost_rate;
        equity = (equity - cost).max(0.0);
        result.total_costs += cost;

        if let Some(scores) = &report.signal.scores {
            result.scores.extend(scores.iter().cloned());
        }
        if let Some(pair) = &report.signal.pair {
            result.pairs.push(pair.clone());
        }
        result.trades.extend(report.exits.iter().cloned());
        result.daily.push(DailyRecord {
            date,
            regime: report.signal.pair.as_ref().map(|p| (p.primary, p.secondary)),
            weights: weights.clone(),
            leverage_budget: report.leverage_budget,
            cash_fraction: report.cash_fraction(),
            equity,
            daily_return,
            cost,
            trigger: report.trigger.clone(),
        });
        result.equity_curve.push(EquityPoint { date, equity });
        result.final_state = Some(PortfolioState::new(
            date,
            report.leverage_budget,
            report.positions,
            equity,
        ));
        held = weights;
    }

    result.stats = engine.into_state().stats;

    info!(
        sessions = result.daily.len(),
        rebalances = result.stats.rebalances,
        confirmed = result.stats.entries_confirmed,
        rejected = result.stats.entries_rejected,
        final_equity = result.final_equity(),
        "backtest complete"
    );

    Ok(result)
}
