//! Strategy configuration assembled from the config port.

use crate::domain::allocation::WeightingMode;
use crate::domain::config_validation::{parse_asset_list, parse_ticker_list, validate_strategy_config};
use crate::domain::error::QuadtraderError;
use crate::domain::quadrant::{LeverageTable, Quadrant, QuadrantDefinitions, QuadrantUniverse};
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable parameters of the rotation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub momentum_lookback_days: usize,
    pub ema_period: usize,
    pub volatility_lookback_days: usize,
    pub atr_period: usize,
    /// Stop distance in ATRs. 0 disables stops.
    pub atr_stop_multiplier: f64,
    /// `None` = unlimited.
    pub max_positions: Option<usize>,
    pub entry_confirmation_lag_days: u32,
    pub weighting_mode: WeightingMode,
    pub min_trade_delta: f64,
    pub cost_per_leg_bps: f64,
    pub leverage: LeverageTable,
    pub quadrants: QuadrantDefinitions,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            momentum_lookback_days: 50,
            ema_period: 50,
            volatility_lookback_days: 30,
            atr_period: 14,
            atr_stop_multiplier: 2.0,
            max_positions: Some(10),
            entry_confirmation_lag_days: 1,
            weighting_mode: WeightingMode::Direct,
            min_trade_delta: 0.0,
            cost_per_leg_bps: 0.0,
            leverage: LeverageTable::default(),
            quadrants: QuadrantDefinitions::production(),
        }
    }
}

impl StrategyConfig {
    /// Validate and assemble the `[strategy]`, `[leverage]` and
    /// `[quadrant.Qn]` sections. Missing keys fall back to the defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuadtraderError> {
        validate_strategy_config(config)?;
        let defaults = StrategyConfig::default();

        let usize_key = |key: &str, default: usize| -> usize {
            config.get_int("strategy", key, default as i64).max(0) as usize
        };

        let weighting_mode = match config.get_string("strategy", "volatility_weighting_mode") {
            Some(s) => s
                .parse()
                .map_err(|e: String| QuadtraderError::invalid("strategy", "volatility_weighting_mode", e))?,
            None => defaults.weighting_mode,
        };

        let max_positions = match usize_key("max_positions", 10) {
            0 => None,
            n => Some(n),
        };

        Ok(StrategyConfig {
            momentum_lookback_days: usize_key("momentum_lookback_days", defaults.momentum_lookback_days),
            ema_period: usize_key("ema_period", defaults.ema_period),
            volatility_lookback_days: usize_key(
                "volatility_lookback_days",
                defaults.volatility_lookback_days,
            ),
            atr_period: usize_key("atr_period", defaults.atr_period),
            atr_stop_multiplier: config.get_double(
                "strategy",
                "atr_stop_multiplier",
                defaults.atr_stop_multiplier,
            ),
            max_positions,
            entry_confirmation_lag_days: config
                .get_int("strategy", "entry_confirmation_lag_days", 1)
                .max(1) as u32,
            weighting_mode,
            min_trade_delta: config.get_double("strategy", "min_trade_delta", 0.0),
            cost_per_leg_bps: config.get_double("strategy", "cost_per_leg_bps", 0.0),
            leverage: load_leverage(config)?,
            quadrants: load_quadrants(config)?,
        })
    }

    /// Number of sessions before any quadrant can be scored and allocated.
    pub fn warmup_days(&self) -> usize {
        self.momentum_lookback_days
            .max(self.ema_period)
            .max(self.volatility_lookback_days + 1)
    }

    pub fn stops_enabled(&self) -> bool {
        self.atr_stop_multiplier > 0.0
    }
}

fn load_leverage(config: &dyn ConfigPort) -> Result<LeverageTable, QuadtraderError> {
    let defaults = LeverageTable::default();
    let table: BTreeMap<Quadrant, f64> = Quadrant::PRIORITY
        .into_iter()
        .map(|q| {
            let value = config.get_double("leverage", &q.to_string(), defaults.multiplier(q));
            (q, value)
        })
        .collect();
    LeverageTable::new(table)
}

fn load_quadrants(config: &dyn ConfigPort) -> Result<QuadrantDefinitions, QuadtraderError> {
    let production = QuadrantDefinitions::production();
    let mut quadrants = BTreeMap::new();

    for q in Quadrant::PRIORITY {
        let section = format!("quadrant.{q}");
        let base = production.universe(q);

        let assets = match config.get_string(&section, "assets") {
            Some(s) => parse_asset_list(&s)
                .map_err(|e| QuadtraderError::invalid(&section, "assets", e))?
                .into_iter()
                .collect(),
            None => base.assets.clone(),
        };
        let indicators = match config.get_string(&section, "indicators") {
            Some(s) => parse_ticker_list(&s),
            None => base.indicators.clone(),
        };

        quadrants.insert(q, QuadrantUniverse { assets, indicators });
    }

    QuadrantDefinitions::new(quadrants)
}
