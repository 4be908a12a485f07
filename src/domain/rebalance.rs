//! Event-driven rebalance trigger.
//!
//! A session rebalances when the top-2 pair differs from the last
//! rebalancing session, when any tracked ticker's trend flag flipped since
//! the previous session, when entries confirmed this session, or when a stop
//! closed a position. Otherwise weights carry forward.

use crate::domain::quadrant::Quadrant;
use crate::domain::regime::TopQuadrantPair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    Initial,
    RegimeChange,
    TrendFlip(String),
    ConfirmedEntries(usize),
    StopExit,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Initial => write!(f, "initial allocation"),
            TriggerReason::RegimeChange => write!(f, "regime change"),
            TriggerReason::TrendFlip(t) => write!(f, "trend flip on {t}"),
            TriggerReason::ConfirmedEntries(n) => write!(f, "{n} confirmed entries"),
            TriggerReason::StopExit => write!(f, "stop exit"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceTrigger {
    last_pair: Option<(Quadrant, Quadrant)>,
    last_trend: BTreeMap<String, bool>,
}

impl RebalanceTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide for one session and record its state for the next one.
    ///
    /// `trends` holds the session's defined trend flags; tickers missing on
    /// either side of the comparison never count as a flip.
    pub fn evaluate(
        &mut self,
        pair: &TopQuadrantPair,
        trends: &BTreeMap<String, bool>,
        confirmed_entries: usize,
        stop_exits: usize,
    ) -> Option<TriggerReason> {
        let current = (pair.primary, pair.secondary);
        let reason = match self.last_pair {
            None => Some(TriggerReason::Initial),
            Some(prev) if prev != current => Some(TriggerReason::RegimeChange),
            Some(_) if stop_exits > 0 => Some(TriggerReason::StopExit),
            Some(_) => trends
                .iter()
                .find(|(ticker, above)| {
                    self.last_trend
                        .get(ticker.as_str())
                        .is_some_and(|prev| prev != *above)
                })
                .map(|(ticker, _)| TriggerReason::TrendFlip(ticker.clone()))
                .or_else(|| {
                    (confirmed_entries > 0)
                        .then_some(TriggerReason::ConfirmedEntries(confirmed_entries))
                }),
        };

        if reason.is_some() {
            self.last_pair = Some(current);
        }
        self.last_trend = trends.clone();
        reason
    }
}
