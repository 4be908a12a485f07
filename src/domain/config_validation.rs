//! Configuration validation.
//!
//! Validates every section before a run starts. Inconsistent configuration
//! is fatal at startup and never surfaces mid-run.

use crate::domain::allocation::WeightingMode;
use crate::domain::error::QuadtraderError;
use crate::domain::price_table::FillPolicy;
use crate::domain::quadrant::Quadrant;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    validate_dates(config)?;
    validate_fill_policy(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    validate_lookbacks(config)?;
    validate_confirmation_lag(config)?;
    validate_stop_multiplier(config)?;
    validate_max_positions(config)?;
    validate_weighting_mode(config)?;
    validate_trade_costs(config)?;
    validate_leverage(config)?;
    validate_quadrant_overrides(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    let capital = config.get_double("backtest", "initial_capital", 100_000.0);
    if !(capital > 0.0) {
        return Err(QuadtraderError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    let rf = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&rf) {
        return Err(QuadtraderError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    match config.get_string("live", "state_file") {
        Some(s) if !s.trim().is_empty() => {}
        _ => return Err(QuadtraderError::missing("live", "state_file")),
    }
    if config.get_int("live", "retry_attempts", 3) < 1 {
        return Err(QuadtraderError::invalid(
            "live",
            "retry_attempts",
            "retry_attempts must be at least 1",
        ));
    }
    Ok(())
}

pub fn validate_robustness_config(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    if config.get_int("robustness", "simulations", 1000) < 1 {
        return Err(QuadtraderError::invalid(
            "robustness",
            "simulations",
            "simulations must be at least 1",
        ));
    }
    if config.get_int("robustness", "block_size", 20) < 1 {
        return Err(QuadtraderError::invalid(
            "robustness",
            "block_size",
            "block_size must be at least 1",
        ));
    }
    if config.get_int("robustness", "seed", 42) < 0 {
        return Err(QuadtraderError::invalid(
            "robustness",
            "seed",
            "seed must be non-negative",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(QuadtraderError::invalid(
                "data",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

/// Reads an optional `YYYY-MM-DD` date from the `[data]` section.
pub fn parse_optional_date(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveDate>, QuadtraderError> {
    match config.get_string("data", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                QuadtraderError::invalid(
                    "data",
                    key,
                    &format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn validate_fill_policy(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    if let Some(s) = config.get_string("data", "fill_policy") {
        s.parse::<FillPolicy>()
            .map_err(|e| QuadtraderError::invalid("data", "fill_policy", &e))?;
    }
    Ok(())
}

fn validate_lookbacks(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    for (key, default, min) in [
        ("momentum_lookback_days", 50, 1),
        ("ema_period", 50, 1),
        ("volatility_lookback_days", 30, 2),
        ("atr_period", 14, 1),
    ] {
        if config.get_int("strategy", key, default) < min {
            return Err(QuadtraderError::invalid(
                "strategy",
                key,
                &format!("{key} must be at least {min}"),
            ));
        }
    }
    Ok(())
}

fn validate_confirmation_lag(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    if config.get_int("strategy", "entry_confirmation_lag_days", 1) < 1 {
        return Err(QuadtraderError::ConfigInconsistency {
            reason: "entry_confirmation_lag_days must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_stop_multiplier(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    let value = config.get_double("strategy", "atr_stop_multiplier", 2.0);
    if !value.is_finite() || value < 0.0 {
        return Err(QuadtraderError::invalid(
            "strategy",
            "atr_stop_multiplier",
            "atr_stop_multiplier must be non-negative (0 disables stops)",
        ));
    }
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    if config.get_int("strategy", "max_positions", 10) < 0 {
        return Err(QuadtraderError::invalid(
            "strategy",
            "max_positions",
            "max_positions must be non-negative (0 = unlimited)",
        ));
    }
    Ok(())
}

fn validate_weighting_mode(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    if let Some(s) = config.get_string("strategy", "volatility_weighting_mode") {
        s.parse::<WeightingMode>()
            .map_err(|e| QuadtraderError::invalid("strategy", "volatility_weighting_mode", &e))?;
    }
    Ok(())
}

fn validate_trade_costs(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    for key in ["min_trade_delta", "cost_per_leg_bps"] {
        let value = config.get_double("strategy", key, 0.0);
        if !value.is_finite() || value < 0.0 {
            return Err(QuadtraderError::invalid(
                "strategy",
                key,
                &format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

/// Leverage overrides must name all four quadrants or none.
fn validate_leverage(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    let present: Vec<Quadrant> = Quadrant::PRIORITY
        .into_iter()
        .filter(|q| config.get_string("leverage", &q.to_string()).is_some())
        .collect();
    if !present.is_empty() && present.len() != Quadrant::PRIORITY.len() {
        let missing: Vec<String> = Quadrant::PRIORITY
            .iter()
            .filter(|q| !present.contains(q))
            .map(|q| q.to_string())
            .collect();
        return Err(QuadtraderError::ConfigInconsistency {
            reason: format!("leverage table is missing {}", missing.join(", ")),
        });
    }
    for q in present {
        let value = config.get_double("leverage", &q.to_string(), f64::NAN);
        if !value.is_finite() || value < 0.0 {
            return Err(QuadtraderError::invalid(
                "leverage",
                &q.to_string(),
                "leverage must be a non-negative number",
            ));
        }
    }
    Ok(())
}

fn validate_quadrant_overrides(config: &dyn ConfigPort) -> Result<(), QuadtraderError> {
    for q in Quadrant::PRIORITY {
        let section = format!("quadrant.{q}");
        if let Some(assets) = config.get_string(&section, "assets") {
            let parsed = parse_asset_list(&assets)
                .map_err(|e| QuadtraderError::invalid(&section, "assets", &e))?;
            if parsed.is_empty() {
                return Err(QuadtraderError::ConfigInconsistency {
                    reason: format!("quadrant {q} has no assets"),
                });
            }
        }
        if let Some(indicators) = config.get_string(&section, "indicators") {
            if parse_ticker_list(&indicators).is_empty() {
                return Err(QuadtraderError::ConfigInconsistency {
                    reason: format!("quadrant {q} has no indicator tickers"),
                });
            }
        }
    }
    Ok(())
}

/// Parses `QQQ:0.30, ARKK:0.21`. A ticker without a weight gets 1.0.
pub fn parse_asset_list(input: &str) -> Result<Vec<(String, f64)>, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(':') {
            Some((ticker, weight)) => {
                let w: f64 = weight
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid weight in '{item}'"))?;
                if !w.is_finite() || w < 0.0 {
                    return Err(format!("weight must be non-negative in '{item}'"));
                }
                Ok((ticker.trim().to_uppercase(), w))
            }
            None => Ok((item.to_uppercase(), 1.0)),
        })
        .collect()
}

pub fn parse_ticker_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
