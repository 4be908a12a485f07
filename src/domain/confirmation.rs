//! Entry confirmation state machine.
//!
//! Per ticker: `None -> Pending(weight, 0) -> Confirmed | Rejected -> None`.
//!
//! Once per session every pending entry is advanced with that session's
//! trend status. A passing filter increments `days_waiting`; once it reaches
//! the required lag the entry confirms at the session's target weight. A
//! failing filter (or missing data) rejects and discards the entry. Nothing
//! about a rejected entry survives, so a later signal starts from zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub ticker: String,
    pub target_weight: f64,
    pub ema_at_signal: f64,
    pub days_waiting: u32,
    pub signal_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Price at or below EMA on a confirmation session.
    BelowTrend,
    /// No price or EMA on a confirmation session.
    NoData,
    /// The session's allocation no longer assigns the ticker any weight.
    NoLongerTargeted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BelowTrend => write!(f, "below trend"),
            RejectReason::NoData => write!(f, "no data"),
            RejectReason::NoLongerTargeted => write!(f, "no longer targeted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryOutcome {
    Confirmed { entry: PendingEntry, weight: f64 },
    Rejected { entry: PendingEntry, reason: RejectReason },
    Waiting(PendingEntry),
}

/// What the confirmation check sees for one ticker on one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionView {
    /// `Some(price > EMA)` or `None` if either is undefined.
    pub above_trend: Option<bool>,
    /// Target weight of the session's allocation (0 if untargeted).
    pub target_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfirmationEngine {
    required_lag: u32,
    pending: BTreeMap<String, PendingEntry>,
}

impl EntryConfirmationEngine {
    pub fn new(required_lag: u32) -> Self {
        EntryConfirmationEngine {
            required_lag: required_lag.max(1),
            pending: BTreeMap::new(),
        }
    }

    pub fn is_pending(&self, ticker: &str) -> bool {
        self.pending.contains_key(ticker)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }

    /// Create `Pending(weight, 0)` unless the ticker is already pending or
    /// the weight is not positive. Returns the new entry.
    pub fn propose(
        &mut self,
        ticker: &str,
        target_weight: f64,
        ema_at_signal: f64,
        signal_date: NaiveDate,
    ) -> Option<&PendingEntry> {
        if !(target_weight > 0.0) || self.pending.contains_key(ticker) {
            return None;
        }
        let entry = PendingEntry {
            ticker: ticker.to_string(),
            target_weight,
            ema_at_signal,
            days_waiting: 0,
            signal_date,
        };
        Some(self.pending.entry(ticker.to_string()).or_insert(entry))
    }

    /// Advance every pending entry by one session.
    ///
    /// Outcomes are returned in ticker order; confirmed and rejected entries
    /// leave the engine.
    pub fn advance<F>(&mut self, mut view: F) -> Vec<EntryOutcome>
    where
        F: FnMut(&str) -> SessionView,
    {
        let pending = std::mem::take(&mut self.pending);
        let mut outcomes = Vec::with_capacity(pending.len());

        for (ticker, mut entry) in pending {
            let session = view(&ticker);
            let outcome = match session.above_trend {
                None => EntryOutcome::Rejected {
                    entry,
                    reason: RejectReason::NoData,
                },
                Some(false) => EntryOutcome::Rejected {
                    entry,
                    reason: RejectReason::BelowTrend,
                },
                Some(true) => {
                    entry.days_waiting += 1;
                    if entry.days_waiting < self.required_lag {
                        self.pending.insert(ticker, entry.clone());
                        EntryOutcome::Waiting(entry)
                    } else if session.target_weight > 0.0 {
                        EntryOutcome::Confirmed {
                            weight: session.target_weight,
                            entry,
                        }
                    } else {
                        EntryOutcome::Rejected {
                            entry,
                            reason: RejectReason::NoLongerTargeted,
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn passing(weight: f64) -> SessionView {
        SessionView {
            above_trend: Some(true),
            target_weight: weight,
        }
    }

    #[test]
    fn propose_creates_fresh_pending() {
        let mut engine = EntryConfirmationEngine::new(1);
        let entry = engine.propose("GLD", 0.2, 98.0, date(1)).unwrap();
        assert_eq!(entry.days_waiting, 0);
        assert!((entry.ema_at_signal - 98.0).abs() < f64::EPSILON);
        assert!(engine.is_pending("GLD"));
    }

    #[test]
    fn propose_ignores_duplicates_and_zero_weight() {
        let mut engine = EntryConfirmationEngine::new(1);
        assert!(engine.propose("GLD", 0.2, 98.0, date(1)).is_some());
        assert!(engine.propose("GLD", 0.5, 99.0, date(2)).is_none());
        assert!(engine.propose("TLT", 0.0, 50.0, date(2)).is_none());
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn lag_one_confirms_next_session_at_current_weight() {
        let mut engine = EntryConfirmationEngine::new(1);
        engine.propose("GLD", 0.2, 98.0, date(1));
        let outcomes = engine.advance(|_| passing(0.25));
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            EntryOutcome::Confirmed { entry, weight } => {
                assert_eq!(entry.days_waiting, 1);
                assert!((weight - 0.25).abs() < f64::EPSILON);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        assert!(engine.is_empty());
    }

    #[test]
    fn lag_two_waits_one_session() {
        let mut engine = EntryConfirmationEngine::new(2);
        engine.propose("GLD", 0.2, 98.0, date(1));
        let first = engine.advance(|_| passing(0.2));
        assert!(matches!(first[0], EntryOutcome::Waiting(ref e) if e.days_waiting == 1));
        assert!(engine.is_pending("GLD"));

        let second = engine.advance(|_| passing(0.2));
        assert!(matches!(second[0], EntryOutcome::Confirmed { .. }));
    }

    #[test]
    fn failing_filter_rejects_and_discards() {
        let mut engine = EntryConfirmationEngine::new(2);
        engine.propose("GLD", 0.2, 98.0, date(1));
        engine.advance(|_| passing(0.2));
        let outcomes = engine.advance(|_| SessionView {
            above_trend: Some(false),
            target_weight: 0.0,
        });
        assert!(matches!(
            outcomes[0],
            EntryOutcome::Rejected {
                reason: RejectReason::BelowTrend,
                ..
            }
        ));
        assert!(!engine.is_pending("GLD"));

        let fresh = engine.propose("GLD", 0.3, 97.0, date(5)).unwrap();
        assert_eq!(fresh.days_waiting, 0);
    }

    #[test]
    fn missing_data_rejects() {
        let mut engine = EntryConfirmationEngine::new(1);
        engine.propose("GLD", 0.2, 98.0, date(1));
        let outcomes = engine.advance(|_| SessionView {
            above_trend: None,
            target_weight: 0.2,
        });
        assert!(matches!(
            outcomes[0],
            EntryOutcome::Rejected {
                reason: RejectReason::NoData,
                ..
            }
        ));
    }

    #[test]
    fn untargeted_entry_is_rejected_at_confirmation() {
        let mut engine = EntryConfirmationEngine::new(1);
        engine.propose("GLD", 0.2, 98.0, date(1));
        let outcomes = engine.advance(|_| passing(0.0));
        assert!(matches!(
            outcomes[0],
            EntryOutcome::Rejected {
                reason: RejectReason::NoLongerTargeted,
                ..
            }
        ));
    }

    #[test]
    fn zero_lag_is_clamped_to_one() {
        let mut engine = EntryConfirmationEngine::new(0);
        engine.propose("GLD", 0.2, 98.0, date(1));
        let outcomes = engine.advance(|_| passing(0.2));
        assert!(matches!(outcomes[0], EntryOutcome::Confirmed { .. }));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut engine = EntryConfirmationEngine::new(2);
        engine.propose("GLD", 0.2, 98.0, date(1));
        engine.advance(|_| passing(0.2));
        let json = serde_json::to_string(&engine).unwrap();
        let restored: EntryConfirmationEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, engine);
    }
}
