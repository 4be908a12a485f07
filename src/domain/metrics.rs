//! Performance metrics and statistics.

use super::backtest::BacktestResult;
use super::indicator::volatility::TRADING_DAYS_PER_YEAR;
use super::portfolio::EquityPoint;
use super::position::ClosedTrade;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPerformance {
    pub year: i32,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub avg_trade_return: f64,
    pub avg_holding_days: f64,
    pub rebalances: usize,
    pub entries_confirmed: usize,
    pub entries_rejected: usize,
    pub rejection_rate: f64,
    pub stops_hit: usize,
    pub total_costs: f64,
    pub yearly: Vec<YearlyPerformance>,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let equity_curve = &result.equity_curve;
        let initial_capital = result.initial_capital;

        let final_equity = result.final_equity();
        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let trading_days = equity_curve.len() as f64;
        let years = trading_days / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let daily_rf = result.risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);
        let annualized_volatility = compute_volatility(equity_curve);

        let (trades_won, trades_lost, avg_trade_return, avg_holding_days) =
            trade_statistics(&result.trades);
        let resolved = trades_won + trades_lost;
        let win_rate = if resolved > 0 {
            trades_won as f64 / resolved as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trades_won,
            trades_lost,
            win_rate,
            avg_trade_return,
            avg_holding_days,
            rebalances: result.stats.rebalances,
            entries_confirmed: result.stats.entries_confirmed,
            entries_rejected: result.stats.entries_rejected,
            rejection_rate: result.stats.rejection_rate(),
            stops_hit: result.stats.stops_hit,
            total_costs: result.total_costs,
            yearly: yearly_breakdown(equity_curve, initial_capital),
        }
    }
}

fn trade_statistics(trades: &[ClosedTrade]) -> (usize, usize, f64, f64) {
    if trades.is_empty() {
        return (0, 0, 0.0, 0.0);
    }
    let won = trades.iter().filter(|t| t.return_pct > 0.0).count();
    let lost = trades.iter().filter(|t| t.return_pct < 0.0).count();
    let n = trades.len() as f64;
    let avg_return = trades.iter().map(|t| t.return_pct).sum::<f64>() / n;
    let avg_days = trades.iter().map(|t| t.holding_days() as f64).sum::<f64>() / n;
    (won, lost, avg_return, avg_days)
}

/// Peak-to-trough drawdown (fraction) and its longest duration in sessions.
pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut dd_start: Option<NaiveDate> = None;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            dd_start = None;
            current_dd_duration = 0;
        } else if peak > 0.0 && point.equity < peak {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            if dd_start.is_none() {
                dd_start = Some(point.date);
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn compute_volatility(equity_curve: &[EquityPoint]) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    let returns = period_returns(equity_curve);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_returns: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .collect();

    let downside_stddev = if !downside_returns.is_empty() {
        let ds_variance: f64 = downside_returns.iter().sum::<f64>() / n;
        ds_variance.sqrt()
    } else {
        0.0
    };

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Calendar-year return and drawdown. Each year starts from the last equity
/// of the previous year (or the initial capital).
pub fn yearly_breakdown(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<YearlyPerformance> {
    let mut out = Vec::new();
    let mut start_equity = initial_capital;
    let mut i = 0;

    while i < equity_curve.len() {
        let year = equity_curve[i].date.year();
        let end = equity_curve[i..]
            .iter()
            .position(|p| p.date.year() != year)
            .map_or(equity_curve.len(), |off| i + off);
        let slice = &equity_curve[i..end];

        let mut curve = Vec::with_capacity(slice.len() + 1);
        curve.push(EquityPoint {
            date: slice[0].date,
            equity: start_equity,
        });
        curve.extend(slice.iter().cloned());
        let (max_drawdown, _) = compute_drawdown(&curve);

        let end_equity = slice[slice.len() - 1].equity;
        out.push(YearlyPerformance {
            year,
            total_return: if start_equity > 0.0 {
                end_equity / start_equity - 1.0
            } else {
                0.0
            },
            max_drawdown,
            sessions: slice.len(),
        });

        start_equity = end_equity;
        i = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    #[test]
    fn metrics_max_drawdown() {
        let equity = vec![100.0, 110.0, 90.0, 95.0, 80.0, 100.0];
        let curve = make_equity_curve(&equity);
        let (dd, _) = compute_drawdown(&curve);

        assert!((dd - (110.0 - 80.0) / 110.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_max_drawdown_duration() {
        let equity = vec![100.0, 110.0, 100.0, 90.0, 85.0, 95.0];
        let curve = make_equity_curve(&equity);
        let (_, duration) = compute_drawdown(&curve);

        assert_eq!(duration, 4);
    }

    #[test]
    fn flat_curve_has_no_drawdown() {
        let curve = make_equity_curve(&[100.0, 100.0, 100.0]);
        assert_eq!(compute_drawdown(&curve), (0.0, 0));
    }

    #[test]
    fn metrics_sortino_ratio() {
        let equity = vec![100.0, 101.0, 100.5, 101.5, 100.0, 102.0];
        let curve = make_equity_curve(&equity);
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 0.0);

        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
    }

    #[test]
    fn volatility_of_constant_growth_is_zero() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let vol = compute_volatility(&make_equity_curve(&values));
        assert!(vol.abs() < 1e-9);
    }

    #[test]
    fn yearly_breakdown_chains_years() {
        let curve = vec![
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2022, 12, 29).unwrap(),
                equity: 100.0,
            },
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
                equity: 110.0,
            },
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
                equity: 99.0,
            },
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(),
                equity: 121.0,
            },
        ];
        let years = yearly_breakdown(&curve, 100.0);
        assert_eq!(years.len(), 2);
        assert_eq!(years[0].year, 2022);
        assert!((years[0].total_return - 0.10).abs() < 1e-12);
        assert_eq!(years[1].sessions, 2);
        assert!((years[1].total_return - 0.10).abs() < 1e-12);
        assert!((years[1].max_drawdown - 0.10).abs() < 1e-12);
    }
}
