//! Regime rotation engine.
//!
//! A session `t` is processed in two halves, both reading data through `t`
//! only:
//!
//! 1. [`RotationEngine::confirm`] advances pending entries with the
//!    session's trend status and opens confirmed positions at the session's
//!    target weight.
//! 2. [`RotationEngine::rebalance`] scores quadrants, applies exits
//!    (rotation, trend, stop), evaluates the rebalance trigger, re-weights
//!    holdings and creates new pending entries.
//!
//! The backtest calls both halves for every session. The live flow calls
//! `rebalance(t)` after the close and `confirm(t + 1)` before the next open.
//! Both produce the same call sequence on the same data.

use crate::domain::allocation::{TargetAllocation, VolatilityAllocator};
use crate::domain::confirmation::{
    EntryConfirmationEngine, EntryOutcome, PendingEntry, RejectReason, SessionView,
};
use crate::domain::market_data::MarketData;
use crate::domain::position::{ClosedTrade, ExitReason, Position};
use crate::domain::quadrant::Quadrant;
use crate::domain::rebalance::{RebalanceTrigger, TriggerReason};
use crate::domain::regime::{select_top_pair, TopQuadrantPair};
use crate::domain::scoring::{MomentumScorer, QuadrantScore};
use crate::domain::stops::{ExitCheck, StopTracker};
use crate::domain::strategy::StrategyConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Leverage budget while no regime has been selected yet.
pub const UNALLOCATED_BUDGET: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub sessions: usize,
    pub rebalances: usize,
    pub entries_proposed: usize,
    pub entries_confirmed: usize,
    pub entries_rejected: usize,
    pub rejected_below_trend: usize,
    pub rejected_no_data: usize,
    pub rejected_untargeted: usize,
    pub stops_hit: usize,
    pub exits: usize,
    pub adjustments: usize,
}

impl EngineStats {
    /// Rejected / (confirmed + rejected), 0 when nothing was resolved.
    pub fn rejection_rate(&self) -> f64 {
        let resolved = self.entries_confirmed + self.entries_rejected;
        if resolved == 0 {
            0.0
        } else {
            self.entries_rejected as f64 / resolved as f64
        }
    }

    fn record_rejection(&mut self, reason: RejectReason) {
        self.entries_rejected += 1;
        match reason {
            RejectReason::BelowTrend => self.rejected_below_trend += 1,
            RejectReason::NoData => self.rejected_no_data += 1,
            RejectReason::NoLongerTargeted => self.rejected_untargeted += 1,
        }
    }
}

/// Everything the engine carries from one session to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub positions: BTreeMap<String, Position>,
    pub confirmation: EntryConfirmationEngine,
    pub trigger: RebalanceTrigger,
    pub last_pair: Option<TopQuadrantPair>,
    pub last_confirmed_date: Option<NaiveDate>,
    pub confirmed_on_last_date: usize,
    pub last_rebalanced_date: Option<NaiveDate>,
    pub stats: EngineStats,
}

impl EngineState {
    pub fn new(required_lag: u32) -> Self {
        EngineState {
            positions: BTreeMap::new(),
            confirmation: EntryConfirmationEngine::new(required_lag),
            trigger: RebalanceTrigger::new(),
            last_pair: None,
            last_confirmed_date: None,
            confirmed_on_last_date: 0,
            last_rebalanced_date: None,
            stats: EngineStats::default(),
        }
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(t, p)| (t.clone(), p.weight()))
            .collect()
    }
}

/// Scores, regime and target allocation of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSignal {
    pub date: NaiveDate,
    pub scores: Option<Vec<QuadrantScore>>,
    pub pair: Option<TopQuadrantPair>,
    pub allocation: Option<TargetAllocation>,
}

impl SessionSignal {
    pub fn target_weight(&self, ticker: &str) -> f64 {
        self.allocation.as_ref().map_or(0.0, |a| a.weight(ticker))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub entry: PendingEntry,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmReport {
    pub date: NaiveDate,
    pub confirmed: Vec<Position>,
    pub rejected: Vec<RejectedEntry>,
    pub waiting: Vec<PendingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
    pub ticker: String,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub date: NaiveDate,
    pub signal: SessionSignal,
    pub trigger: Option<TriggerReason>,
    pub exits: Vec<ClosedTrade>,
    pub adjusted: Vec<WeightChange>,
    pub new_pending: Vec<PendingEntry>,
    pub positions: BTreeMap<String, Position>,
    pub leverage_budget: f64,
}

impl RebalanceReport {
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(t, p)| (t.clone(), p.weight()))
            .collect()
    }

    pub fn cash_fraction(&self) -> f64 {
        self.leverage_budget - self.positions.values().map(Position::weight).sum::<f64>()
    }
}

pub struct RotationEngine<'a> {
    config: &'a StrategyConfig,
    scorer: MomentumScorer<'a>,
    allocator: VolatilityAllocator<'a>,
    stops: StopTracker,
    state: EngineState,
}

impl<'a> RotationEngine<'a> {
    pub fn new(config: &'a StrategyConfig) -> Self {
        Self::with_state(config, EngineState::new(config.entry_confirmation_lag_days))
    }

    /// Resume from a persisted state.
    pub fn with_state(config: &'a StrategyConfig, state: EngineState) -> Self {
        RotationEngine {
            config,
            scorer: MomentumScorer::new(&config.quadrants, config.momentum_lookback_days),
            allocator: VolatilityAllocator::new(
                &config.quadrants,
                &config.leverage,
                config.weighting_mode,
                config.max_positions,
            ),
            stops: StopTracker::new(config.atr_stop_multiplier),
            state,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn into_state(self) -> EngineState {
        self.state
    }

    /// Scores, top pair and target weights for session `idx`.
    pub fn signal(&self, market: &MarketData, idx: usize) -> Option<SessionSignal> {
        let date = market.date(idx)?;
        let scores = self.scorer.score(market, idx);
        let pair = scores.as_deref().and_then(select_top_pair);
        let allocation = pair
            .as_ref()
            .map(|p| self.allocator.allocate(market, idx, p));
        Some(SessionSignal {
            date,
            scores,
            pair,
            allocation,
        })
    }

    /// First half of a session: resolve pending entries.
    pub fn confirm(&mut self, market: &MarketData, idx: usize) -> Option<ConfirmReport> {
        let signal = self.signal(market, idx)?;
        let date = signal.date;

        let outcomes = self.state.confirmation.advance(|ticker| SessionView {
            above_trend: market.above_trend(ticker, idx),
            target_weight: signal.target_weight(ticker),
        });

        let mut report = ConfirmReport {
            date,
            confirmed: Vec::new(),
            rejected: Vec::new(),
            waiting: Vec::new(),
        };

        for outcome in outcomes {
            match outcome {
                EntryOutcome::Confirmed { entry, weight } => {
                    let Some(price) = market.close(&entry.ticker, idx) else {
                        self.state.stats.record_rejection(RejectReason::NoData);
                        report.rejected.push(RejectedEntry {
                            entry,
                            reason: RejectReason::NoData,
                        });
                        continue;
                    };
                    let atr = market.atr(&entry.ticker, idx);
                    let stop = self.stops.stop_for(price, atr);
                    let position = Position::open(&entry.ticker, weight, price, date, stop, atr);
                    debug!(
                        ticker = %entry.ticker,
                        weight,
                        price,
                        stop = ?stop,
                        waited = entry.days_waiting,
                        "entry confirmed"
                    );
                    self.state.stats.entries_confirmed += 1;
                    self.state
                        .positions
                        .insert(entry.ticker.clone(), position.clone());
                    report.confirmed.push(position);
                }
                EntryOutcome::Rejected { entry, reason } => {
                    debug!(ticker = %entry.ticker, %reason, "entry rejected");
                    self.state.stats.record_rejection(reason);
                    report.rejected.push(RejectedEntry { entry, reason });
                }
                EntryOutcome::Waiting(entry) => report.waiting.push(entry),
            }
        }

        self.state.last_confirmed_date = Some(date);
        self.state.confirmed_on_last_date = report.confirmed.len();
        Some(report)
    }

    /// Second half of a session: exits, trigger, re-weighting, new entries.
    pub fn rebalance(&mut self, market: &MarketData, idx: usize) -> Option<RebalanceReport> {
        let signal = self.signal(market, idx)?;
        let date = signal.date;
        self.state.stats.sessions += 1;
        self.state.last_rebalanced_date = Some(date);

        let (Some(pair), Some(allocation)) = (signal.pair.clone(), signal.allocation.clone()) else {
            return Some(RebalanceReport {
                date,
                signal,
                trigger: None,
                exits: Vec::new(),
                adjusted: Vec::new(),
                new_pending: Vec::new(),
                positions: self.state.positions.clone(),
                leverage_budget: UNALLOCATED_BUDGET,
            });
        };

        let mut exits = self.apply_exits(market, idx, date, &pair);
        let stop_exits = exits
            .iter()
            .filter(|t| t.exit_reason == ExitReason::StopLoss)
            .count();

        let trends: BTreeMap<String, bool> = self
            .tracked_tickers()
            .into_iter()
            .filter_map(|t| market.above_trend(&t, idx).map(|above| (t, above)))
            .collect();
        let confirmed_today = if self.state.last_confirmed_date == Some(date) {
            self.state.confirmed_on_last_date
        } else {
            0
        };
        let trigger = self
            .state
            .trigger
            .evaluate(&pair, &trends, confirmed_today, stop_exits);

        let mut adjusted = Vec::new();
        let mut new_pending = Vec::new();

        if let Some(reason) = &trigger {
            self.state.stats.rebalances += 1;
            info!(
                %date,
                primary = %pair.primary,
                secondary = %pair.secondary,
                %reason,
                "rebalance"
            );

            let held: Vec<String> = self.state.positions.keys().cloned().collect();
            for ticker in held {
                let target = allocation.weight(&ticker);
                if target <= 0.0 {
                    if let Some(trade) = self.close_position(market, idx, &ticker, ExitReason::ZeroTarget) {
                        exits.push(trade);
                    }
                    continue;
                }
                let Some(position) = self.state.positions.get_mut(&ticker) else {
                    continue;
                };
                let from = position.weight();
                if (target - from).abs() > self.config.min_trade_delta {
                    position.set_weight(target);
                    self.state.stats.adjustments += 1;
                    adjusted.push(WeightChange {
                        ticker,
                        from,
                        to: target,
                    });
                }
            }

            for (ticker, weight) in &allocation.weights {
                if self.state.positions.contains_key(ticker) {
                    continue;
                }
                let Some(ema) = market.ema(ticker, idx) else {
                    continue;
                };
                if let Some(entry) = self.state.confirmation.propose(ticker, *weight, ema, date) {
                    self.state.stats.entries_proposed += 1;
                    new_pending.push(entry.clone());
                }
            }
        }

        self.state.last_pair = Some(pair.clone());

        Some(RebalanceReport {
            date,
            trigger,
            exits,
            adjusted,
            new_pending,
            positions: self.state.positions.clone(),
            leverage_budget: pair.leverage_budget(&self.config.leverage),
            signal,
        })
    }

    /// Both halves of session `idx`, in backtest order.
    pub fn step(
        &mut self,
        market: &MarketData,
        idx: usize,
    ) -> Option<(ConfirmReport, RebalanceReport)> {
        let confirm = self.confirm(market, idx)?;
        let rebalance = self.rebalance(market, idx)?;
        Some((confirm, rebalance))
    }

    fn tracked_tickers(&self) -> BTreeSet<String> {
        Quadrant::PRIORITY
            .into_iter()
            .flat_map(|q| self.config.quadrants.assets(q).map(str::to_string))
            .collect()
    }

    fn apply_exits(
        &mut self,
        market: &MarketData,
        idx: usize,
        date: NaiveDate,
        pair: &TopQuadrantPair,
    ) -> Vec<ClosedTrade> {
        let selected: BTreeSet<&str> = pair
            .quadrants()
            .into_iter()
            .flat_map(|q| self.config.quadrants.assets(q))
            .collect();

        let decisions: Vec<(String, ExitReason)> = self
            .state
            .positions
            .iter()
            .filter_map(|(ticker, position)| {
                let check = ExitCheck {
                    in_selected_quadrants: selected.contains(ticker.as_str()),
                    above_trend: market.above_trend(ticker, idx),
                    // stops apply from the session after entry
                    low: if position.entry_date == date {
                        None
                    } else {
                        market.low_or_close(ticker, idx)
                    },
                };
                self.stops
                    .evaluate(position, &check)
                    .map(|reason| (ticker.clone(), reason))
            })
            .collect();

        decisions
            .into_iter()
            .filter_map(|(ticker, reason)| self.close_position(market, idx, &ticker, reason))
            .collect()
    }

    fn close_position(
        &mut self,
        market: &MarketData,
        idx: usize,
        ticker: &str,
        reason: ExitReason,
    ) -> Option<ClosedTrade> {
        let date = market.date(idx)?;
        let position = self.state.positions.remove(ticker)?;
        let close = market.close(ticker, idx).unwrap_or(position.entry_price);
        let exit_price = match (reason, position.stop_price()) {
            (ExitReason::StopLoss, Some(stop)) => stop.min(close),
            _ => close,
        };
        self.state.stats.exits += 1;
        if reason == ExitReason::StopLoss {
            self.state.stats.stops_hit += 1;
        }
        debug!(%ticker, %reason, exit_price, "position closed");
        Some(position.close(exit_price, date, reason))
    }
}
