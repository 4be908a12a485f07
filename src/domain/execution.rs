//! Live order planning and execution.
//!
//! Target weights become signed quantity deltas against the broker's current
//! holdings:
//!
//! ```text
//! target_qty = weight * account_value / price
//! delta      = target_qty - current_qty
//! ```
//!
//! Holdings absent from the target are closed in full. An adjustment is only
//! sent when `|delta| > MIN_ADJUSTMENT_FRACTION * |target_qty|`.

use crate::domain::error::QuadtraderError;
use crate::ports::broker_port::BrokerPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

pub const MIN_ADJUSTMENT_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: OrderSide,
    /// Always positive; direction is carried by `side`.
    pub quantity: f64,
    pub current_quantity: f64,
    pub target_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NoPrice,
    BelowThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub ticker: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub account_value: f64,
    pub orders: Vec<OrderRequest>,
    pub skipped: Vec<SkippedOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub ticker: String,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan: ExecutionPlan,
    pub fills: Vec<Fill>,
    pub failures: Vec<OrderFailure>,
}

impl ExecutionReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn plan_orders(
    targets: &BTreeMap<String, f64>,
    holdings: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
    account_value: f64,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan {
        account_value,
        ..ExecutionPlan::default()
    };

    for (ticker, &current) in holdings {
        if targets.get(ticker).is_some_and(|w| *w > 0.0) || current == 0.0 {
            continue;
        }
        plan.orders.push(OrderRequest {
            ticker: ticker.clone(),
            side: if current > 0.0 {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            quantity: current.abs(),
            current_quantity: current,
            target_quantity: 0.0,
        });
    }

    for (ticker, &weight) in targets {
        if weight <= 0.0 {
            continue;
        }
        let Some(price) = prices.get(ticker).copied().filter(|p| p.is_finite() && *p > 0.0)
        else {
            plan.skipped.push(SkippedOrder {
                ticker: ticker.clone(),
                reason: SkipReason::NoPrice,
            });
            continue;
        };

        let target_quantity = weight * account_value / price;
        let current_quantity = holdings.get(ticker).copied().unwrap_or(0.0);
        let delta = target_quantity - current_quantity;

        if delta.abs() <= target_quantity.abs() * MIN_ADJUSTMENT_FRACTION {
            plan.skipped.push(SkippedOrder {
                ticker: ticker.clone(),
                reason: SkipReason::BelowThreshold,
            });
            continue;
        }

        plan.orders.push(OrderRequest {
            ticker: ticker.clone(),
            side: if delta > 0.0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            quantity: delta.abs(),
            current_quantity,
            target_quantity,
        });
    }

    plan
}

/// Places every order of `plan`, retrying each up to `retry_attempts`
/// times. A failing ticker is recorded and the rest still run.
pub fn execute_plan(
    broker: &mut dyn BrokerPort,
    plan: ExecutionPlan,
    retry_attempts: u32,
) -> ExecutionReport {
    let attempts = retry_attempts.max(1);
    let mut fills = Vec::new();
    let mut failures = Vec::new();

    for order in &plan.orders {
        let mut last_error = None;
        for attempt in 1..=attempts {
            match broker.place_order(&order.ticker, order.side, order.quantity) {
                Ok(fill) => {
                    info!(
                        ticker = %fill.ticker,
                        side = %fill.side,
                        quantity = fill.quantity,
                        price = fill.price,
                        "order filled"
                    );
                    fills.push(fill);
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(ticker = %order.ticker, attempt, error = %e, "order attempt failed");
                    last_error = Some(e);
                }
            }
        }
        if let Some(e) = last_error {
            failures.push(OrderFailure {
                ticker: order.ticker.clone(),
                attempts,
                reason: e.to_string(),
            });
        }
    }

    ExecutionReport {
        plan,
        fills,
        failures,
    }
}

/// Moves the broker account to `targets` using the latest `prices`.
///
/// Fails only if the account itself cannot be read; per-order failures are
/// reported in [`ExecutionReport::failures`].
pub fn rebalance_account(
    broker: &mut dyn BrokerPort,
    targets: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
    retry_attempts: u32,
) -> Result<ExecutionReport, QuadtraderError> {
    let account_value = broker.get_account_value()?;
    let holdings = broker.get_positions()?;
    let plan = plan_orders(targets, &holdings, prices, account_value);
    info!(
        account_value,
        orders = plan.orders.len(),
        skipped = plan.skipped.len(),
        "execution plan"
    );
    Ok(execute_plan(broker, plan, retry_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyBroker {
        failures_left: BTreeMap<String, u32>,
        calls: Vec<String>,
    }

    impl BrokerPort for FlakyBroker {
        fn get_positions(&self) -> Result<BTreeMap<String, f64>, QuadtraderError> {
            Ok(BTreeMap::new())
        }

        fn get_account_value(&self) -> Result<f64, QuadtraderError> {
            Ok(10_000.0)
        }

        fn place_order(
            &mut self,
            ticker: &str,
            side: OrderSide,
            quantity: f64,
        ) -> Result<Fill, QuadtraderError> {
            self.calls.push(ticker.to_string());
            if let Some(left) = self.failures_left.get_mut(ticker) {
                if *left > 0 {
                    *left -= 1;
                    return Err(QuadtraderError::Execution {
                        ticker: ticker.to_string(),
                        reason: "rejected".into(),
                    });
                }
            }
            Ok(Fill {
                ticker: ticker.to_string(),
                side,
                quantity,
                price: 100.0,
            })
        }
    }

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(t, v)| (t.to_string(), *v)).collect()
    }

    #[test]
    fn plan_buys_new_targets() {
        let plan = plan_orders(
            &map(&[("GLD", 0.5)]),
            &BTreeMap::new(),
            &map(&[("GLD", 200.0)]),
            10_000.0,
        );
        assert_eq!(plan.orders.len(), 1);
        let order = &plan.orders[0];
        assert_eq!(order.side, OrderSide::Buy);
        assert!((order.quantity - 25.0).abs() < 1e-12);
    }

    #[test]
    fn plan_closes_untargeted_holdings() {
        let plan = plan_orders(
            &map(&[]),
            &map(&[("TLT", 12.0), ("XLE", -3.0)]),
            &BTreeMap::new(),
            10_000.0,
        );
        assert_eq!(plan.orders.len(), 2);
        let tlt = plan.orders.iter().find(|o| o.ticker == "TLT").unwrap();
        assert_eq!(tlt.side, OrderSide::Sell);
        assert!((tlt.quantity - 12.0).abs() < f64::EPSILON);
        let xle = plan.orders.iter().find(|o| o.ticker == "XLE").unwrap();
        assert_eq!(xle.side, OrderSide::Buy);
    }

    #[test]
    fn small_adjustments_are_skipped() {
        // target 50 shares, holding 48: delta 2 < 5% of 50
        let plan = plan_orders(
            &map(&[("GLD", 0.5)]),
            &map(&[("GLD", 48.0)]),
            &map(&[("GLD", 100.0)]),
            10_000.0,
        );
        assert!(plan.orders.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::BelowThreshold);
    }

    #[test]
    fn missing_price_is_skipped() {
        let plan = plan_orders(&map(&[("GLD", 0.5)]), &BTreeMap::new(), &BTreeMap::new(), 10_000.0);
        assert!(plan.orders.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::NoPrice);
    }

    #[test]
    fn retries_until_fill() {
        let mut broker = FlakyBroker {
            failures_left: [("GLD".to_string(), 2)].into_iter().collect(),
            calls: Vec::new(),
        };
        let report = rebalance_account(
            &mut broker,
            &map(&[("GLD", 0.5)]),
            &map(&[("GLD", 100.0)]),
            3,
        )
        .unwrap();
        assert_eq!(report.fills.len(), 1);
        assert!(report.is_clean());
        assert_eq!(broker.calls.len(), 3);
    }

    #[test]
    fn failing_ticker_does_not_block_others() {
        let mut broker = FlakyBroker {
            failures_left: [("GLD".to_string(), 10)].into_iter().collect(),
            calls: Vec::new(),
        };
        let report = rebalance_account(
            &mut broker,
            &map(&[("GLD", 0.5), ("TLT", 0.5)]),
            &map(&[("GLD", 100.0), ("TLT", 100.0)]),
            2,
        )
        .unwrap();
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.failures[0].ticker, "GLD");
        assert_eq!(report.failures[0].attempts, 2);
        assert_eq!(report.fills.len(), 1);
        assert_eq!(report.fills[0].ticker, "TLT");
    }
}
