//! Monte Carlo robustness checks and parameter sweeps.
//!
//! Two simulation kinds:
//!
//! - **Block bootstrap**: the strategy's daily returns are cut into fixed,
//!   non-overlapping blocks of `block_size` (the remainder forms one shorter
//!   block). Blocks are drawn with replacement until the original length is
//!   covered, and the result is trimmed to exactly that length.
//! - **Parameter variation**: each trial re-runs the backtest with EMA period
//!   and momentum lookback drawn from 45..=55, volatility lookback from
//!   25..=35 and, when stops are enabled, the ATR multiplier from 1.8..=2.2.
//!
//! Trial `i` uses `StdRng::seed_from_u64(seed + i)` so every run is
//! reproducible regardless of thread scheduling.

use crate::domain::backtest::{run_backtest, BacktestConfig};
use crate::domain::error::QuadtraderError;
use crate::domain::indicator::volatility::TRADING_DAYS_PER_YEAR;
use crate::domain::market_data::MarketData;
use crate::domain::metrics::Metrics;
use crate::domain::price_table::PriceTable;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub const PERCENTILES: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessConfig {
    pub simulations: usize,
    pub block_size: usize,
    pub seed: u64,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        RobustnessConfig {
            simulations: 1000,
            block_size: 20,
            seed: 42,
        }
    }
}

impl RobustnessConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuadtraderError> {
        crate::domain::config_validation::validate_robustness_config(config)?;
        Ok(RobustnessConfig {
            simulations: config.get_int("robustness", "simulations", 1000) as usize,
            block_size: config.get_int("robustness", "block_size", 20) as usize,
            seed: config.get_int("robustness", "seed", 42) as u64,
        })
    }

    fn rng_for(&self, trial: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(trial as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    Bootstrap,
    ParameterVariation,
}

impl FromStr for SimulationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bootstrap" => Ok(SimulationKind::Bootstrap),
            "parameters" | "parameter_variation" | "params" => {
                Ok(SimulationKind::ParameterVariation)
            }
            other => Err(format!("unknown simulation kind '{other}'")),
        }
    }
}

impl fmt::Display for SimulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationKind::Bootstrap => write!(f, "bootstrap"),
            SimulationKind::ParameterVariation => write!(f, "parameter variation"),
        }
    }
}

/// Strategy parameters drawn for one parameter-variation trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub ema_period: usize,
    pub momentum_lookback_days: usize,
    pub volatility_lookback_days: usize,
    pub atr_stop_multiplier: f64,
}

impl ParameterSet {
    fn sample(rng: &mut StdRng, base: &StrategyConfig) -> Self {
        ParameterSet {
            ema_period: rng.gen_range(45..=55),
            momentum_lookback_days: rng.gen_range(45..=55),
            volatility_lookback_days: rng.gen_range(25..=35),
            atr_stop_multiplier: if base.stops_enabled() {
                rng.gen_range(1.8..=2.2)
            } else {
                base.atr_stop_multiplier
            },
        }
    }

    fn apply(&self, base: &StrategyConfig) -> StrategyConfig {
        StrategyConfig {
            ema_period: self.ema_period,
            momentum_lookback_days: self.momentum_lookback_days,
            volatility_lookback_days: self.volatility_lookback_days,
            atr_stop_multiplier: self.atr_stop_multiplier,
            ..base.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial: usize,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Positive fraction, 0.25 = 25% below the running peak.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub parameters: Option<ParameterSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// `(percentile, value)` for each entry of [`PERCENTILES`].
    pub percentiles: Vec<(f64, f64)>,
}

impl Distribution {
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mean = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        Distribution {
            mean,
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            percentiles: PERCENTILES
                .iter()
                .map(|&p| (p, percentile_sorted(&sorted, p)))
                .collect(),
        }
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(q, _)| (q - p).abs() < f64::EPSILON)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub kind: SimulationKind,
    pub trials: usize,
    pub total_return: Distribution,
    pub annualized_return: Distribution,
    pub max_drawdown: Distribution,
    pub sharpe_ratio: Distribution,
    pub prob_positive_return: f64,
    pub prob_drawdown_over_30: f64,
    pub prob_drawdown_over_40: f64,
    /// 5th percentile of total return.
    pub var_95: f64,
    /// 1st percentile of total return.
    pub var_99: f64,
}

impl MonteCarloSummary {
    pub fn from_trials(kind: SimulationKind, trials: &[TrialResult]) -> Self {
        let returns: Vec<f64> = trials.iter().map(|t| t.total_return).collect();
        let total_return = Distribution::from_values(&returns);

        MonteCarloSummary {
            kind,
            trials: trials.len(),
            var_95: total_return.percentile(5.0).unwrap_or(0.0),
            var_99: total_return.percentile(1.0).unwrap_or(0.0),
            total_return,
            annualized_return: Distribution::from_values(
                &trials.iter().map(|t| t.annualized_return).collect::<Vec<_>>(),
            ),
            max_drawdown: Distribution::from_values(
                &trials.iter().map(|t| t.max_drawdown).collect::<Vec<_>>(),
            ),
            sharpe_ratio: Distribution::from_values(
                &trials.iter().map(|t| t.sharpe_ratio).collect::<Vec<_>>(),
            ),
            prob_positive_return: share(trials, |t| t.total_return > 0.0),
            prob_drawdown_over_30: share(trials, |t| t.max_drawdown > 0.30),
            prob_drawdown_over_40: share(trials, |t| t.max_drawdown > 0.40),
        }
    }
}

fn share(trials: &[TrialResult], pred: impl Fn(&TrialResult) -> bool) -> f64 {
    if trials.is_empty() {
        return 0.0;
    }
    trials.iter().filter(|t| pred(t)).count() as f64 / trials.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub summary: MonteCarloSummary,
    pub trials: Vec<TrialResult>,
}

/// Linear interpolation between closest ranks of an ascending slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Fixed non-overlapping blocks; the trailing remainder is its own block.
pub fn make_blocks(returns: &[f64], block_size: usize) -> Vec<&[f64]> {
    returns.chunks(block_size.max(1)).collect()
}

/// One block-bootstrap resample, exactly as long as `returns`.
pub fn block_bootstrap(returns: &[f64], block_size: usize, rng: &mut StdRng) -> Vec<f64> {
    let n = returns.len();
    let blocks = make_blocks(returns, block_size);
    if blocks.is_empty() {
        return Vec::new();
    }

    let mut resampled = Vec::with_capacity(n + block_size);
    while resampled.len() < n {
        let block = blocks[rng.gen_range(0..blocks.len())];
        resampled.extend_from_slice(block);
    }
    resampled.truncate(n);
    resampled
}

fn summarize_returns(trial: usize, returns: &[f64]) -> TrialResult {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_drawdown = 0.0_f64;
    for r in returns {
        equity = (equity * (1.0 + r)).max(0.0);
        peak = peak.max(equity);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }
    let total_return = equity - 1.0;

    let years = returns.len() as f64 / TRADING_DAYS_PER_YEAR;
    let annualized_return = if years > 0.0 && total_return > -1.0 {
        (1.0 + total_return).powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    TrialResult {
        trial,
        total_return,
        annualized_return,
        max_drawdown,
        sharpe_ratio: annualized_sharpe(returns),
        parameters: None,
    }
}

fn annualized_sharpe(returns: &[f64]) -> f64 {
    let n = returns.len();
    if n < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = returns.iter().map(|&r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Bootstrap the strategy's daily returns `config.simulations` times.
pub fn run_bootstrap(daily_returns: &[f64], config: &RobustnessConfig) -> MonteCarloReport {
    info!(
        simulations = config.simulations,
        block_size = config.block_size,
        observations = daily_returns.len(),
        "running block bootstrap"
    );

    let trials: Vec<TrialResult> = (0..config.simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = config.rng_for(i);
            let resampled = block_bootstrap(daily_returns, config.block_size, &mut rng);
            summarize_returns(i, &resampled)
        })
        .collect();

    MonteCarloReport {
        summary: MonteCarloSummary::from_trials(SimulationKind::Bootstrap, &trials),
        trials,
    }
}

fn trial_from_backtest(
    trial: usize,
    table: &PriceTable,
    strategy: &StrategyConfig,
    backtest: &BacktestConfig,
) -> Result<TrialResult, QuadtraderError> {
    let market = MarketData::new(table.clone(), strategy);
    let result = run_backtest(&market, strategy, backtest)?;
    let metrics = Metrics::compute(&result);
    Ok(TrialResult {
        trial,
        total_return: metrics.total_return,
        annualized_return: metrics.annualized_return,
        max_drawdown: metrics.max_drawdown,
        sharpe_ratio: metrics.sharpe_ratio,
        parameters: None,
    })
}

/// Re-run the backtest with randomly perturbed parameters.
pub fn run_parameter_variation(
    table: &PriceTable,
    base: &StrategyConfig,
    backtest: &BacktestConfig,
    config: &RobustnessConfig,
) -> Result<MonteCarloReport, QuadtraderError> {
    info!(simulations = config.simulations, "running parameter variation");

    let trials: Vec<TrialResult> = (0..config.simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = config.rng_for(i);
            let params = ParameterSet::sample(&mut rng, base);
            let strategy = params.apply(base);
            let mut result = trial_from_backtest(i, table, &strategy, backtest)?;
            result.parameters = Some(params);
            Ok(result)
        })
        .collect::<Result<Vec<_>, QuadtraderError>>()?;

    Ok(MonteCarloReport {
        summary: MonteCarloSummary::from_trials(SimulationKind::ParameterVariation, &trials),
        trials,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    MomentumLookback,
    VolatilityLookback,
    EmaPeriod,
}

impl SweepParameter {
    fn apply(self, base: &StrategyConfig, value: usize) -> StrategyConfig {
        let mut strategy = base.clone();
        match self {
            SweepParameter::MomentumLookback => strategy.momentum_lookback_days = value,
            SweepParameter::VolatilityLookback => strategy.volatility_lookback_days = value,
            SweepParameter::EmaPeriod => strategy.ema_period = value,
        }
        strategy
    }
}

impl FromStr for SweepParameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "momentum" | "momentum_lookback_days" => Ok(SweepParameter::MomentumLookback),
            "volatility" | "volatility_lookback_days" => Ok(SweepParameter::VolatilityLookback),
            "ema" | "ema_period" => Ok(SweepParameter::EmaPeriod),
            other => Err(format!("unknown sweep parameter '{other}'")),
        }
    }
}

impl fmt::Display for SweepParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepParameter::MomentumLookback => write!(f, "momentum_lookback_days"),
            SweepParameter::VolatilityLookback => write!(f, "volatility_lookback_days"),
            SweepParameter::EmaPeriod => write!(f, "ema_period"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub parameter: SweepParameter,
    pub value: usize,
    pub metrics: Metrics,
}

/// One backtest per value, run in parallel; rows keep the order of `values`.
pub fn run_sweep(
    table: &PriceTable,
    base: &StrategyConfig,
    backtest: &BacktestConfig,
    parameter: SweepParameter,
    values: &[usize],
) -> Result<Vec<SweepRow>, QuadtraderError> {
    info!(%parameter, values = values.len(), "running parameter sweep");
    values
        .par_iter()
        .map(|&value| {
            let strategy = parameter.apply(base, value);
            let market = MarketData::new(table.clone(), &strategy);
            let result = run_backtest(&market, &strategy, backtest)?;
            Ok(SweepRow {
                parameter,
                value,
                metrics: Metrics::compute(&result),
            })
        })
        .collect()
}

/// Row with the highest Sharpe ratio.
pub fn best_by_sharpe(rows: &[SweepRow]) -> Option<&SweepRow> {
    rows.iter()
        .max_by(|a, b| a.metrics.sharpe_ratio.total_cmp(&b.metrics.sharpe_ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PriceBar;
    use crate::domain::price_table::FillPolicy;
    use crate::domain::quadrant::{Quadrant, QuadrantDefinitions, QuadrantUniverse};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn blocks_cover_series_with_remainder() {
        let returns: Vec<f64> = (0..47).map(|i| i as f64).collect();
        let blocks = make_blocks(&returns, 20);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].len(), 7);
        assert_eq!(blocks[2][0], 40.0);
    }

    #[test]
    fn bootstrap_keeps_length() {
        let returns: Vec<f64> = (0..47).map(|i| i as f64 * 0.001).collect();
        let mut rng = StdRng::seed_from_u64(7);
        for block in [1, 5, 20, 47, 100] {
            assert_eq!(block_bootstrap(&returns, block, &mut rng).len(), returns.len());
        }
        assert!(block_bootstrap(&[], 20, &mut rng).is_empty());
    }

    #[test]
    fn bootstrap_draws_whole_blocks() {
        let returns: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let resampled = block_bootstrap(&returns, 10, &mut rng);
        for chunk in resampled.chunks(10) {
            assert_eq!(chunk[0] % 10.0, 0.0);
            for w in chunk.windows(2) {
                assert_eq!(w[1] - w[0], 1.0);
            }
        }
    }

    #[test]
    fn bootstrap_is_reproducible() {
        let returns: Vec<f64> = (0..100).map(|i| ((i * 37) % 11) as f64 * 0.001 - 0.005).collect();
        let config = RobustnessConfig {
            simulations: 50,
            block_size: 10,
            seed: 11,
        };
        let a = run_bootstrap(&returns, &config);
        let b = run_bootstrap(&returns, &config);
        assert_eq!(a, b);
        assert_eq!(a.trials.len(), 50);
        assert_eq!(a.summary.trials, 50);
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile_sorted(&sorted, 50.0) - 3.0).abs() < f64::EPSILON);
        assert!((percentile_sorted(&sorted, 25.0) - 2.0).abs() < f64::EPSILON);
        assert!((percentile_sorted(&sorted, 10.0) - 1.4).abs() < 1e-12);
        assert!((percentile_sorted(&[], 50.0)).abs() < f64::EPSILON);
    }

    fn trial(total_return: f64, max_drawdown: f64) -> TrialResult {
        TrialResult {
            trial: 0,
            total_return,
            annualized_return: total_return,
            max_drawdown,
            sharpe_ratio: 0.0,
            parameters: None,
        }
    }

    #[test]
    fn summary_probabilities() {
        let trials = vec![
            trial(0.10, 0.05),
            trial(-0.20, 0.35),
            trial(0.30, 0.45),
            trial(0.05, 0.10),
        ];
        let s = MonteCarloSummary::from_trials(SimulationKind::Bootstrap, &trials);
        assert!((s.prob_positive_return - 0.75).abs() < 1e-12);
        assert!((s.prob_drawdown_over_30 - 0.5).abs() < 1e-12);
        assert!((s.prob_drawdown_over_40 - 0.25).abs() < 1e-12);
        assert!((s.total_return.min - (-0.20)).abs() < 1e-12);
        assert_eq!(s.total_return.percentiles.len(), PERCENTILES.len());
        assert_eq!(s.var_95, s.total_return.percentile(5.0).unwrap());
    }

    #[test]
    fn summarize_returns_compounds() {
        let t = summarize_returns(0, &[0.10, -0.50, 0.20]);
        assert!((t.total_return - (1.1 * 0.5 * 1.2 - 1.0)).abs() < 1e-12);
        assert!((t.max_drawdown - 0.5).abs() < 1e-12);
    }

    fn strategy() -> StrategyConfig {
        let universe = |t: &str| QuadrantUniverse {
            assets: [(t.to_string(), 1.0)].into_iter().collect(),
            indicators: vec![t.to_string()],
        };
        let quadrants: BTreeMap<Quadrant, QuadrantUniverse> = [
            (Quadrant::Q1, universe("AAA")),
            (Quadrant::Q2, universe("BBB")),
            (Quadrant::Q3, universe("CCC")),
            (Quadrant::Q4, universe("DDD")),
        ]
        .into_iter()
        .collect();
        StrategyConfig {
            max_positions: None,
            quadrants: QuadrantDefinitions::new(quadrants).unwrap(),
            ..StrategyConfig::default()
        }
    }

    fn table(n: usize) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut bars = Vec::new();
        for i in 0..n {
            let d = start + chrono::Duration::days(i as i64);
            let x = i as f64;
            bars.push(PriceBar::from_close("AAA", d, 100.0 + 0.5 * x + (x * 0.7).sin()));
            bars.push(PriceBar::from_close("BBB", d, 80.0 + 0.3 * x + (x * 0.5).cos()));
            bars.push(PriceBar::from_close("CCC", d, 60.0 + (x * 0.3).sin() * 2.0));
            bars.push(PriceBar::from_close("DDD", d, 50.0 - 0.1 * x + (x * 0.9).sin()));
        }
        PriceTable::from_bars(&bars, FillPolicy::Forward)
    }

    #[test]
    fn parameter_variation_stays_in_ranges() {
        let base = strategy();
        let config = RobustnessConfig {
            simulations: 4,
            block_size: 20,
            seed: 5,
        };
        let report =
            run_parameter_variation(&table(150), &base, &BacktestConfig::default(), &config)
                .unwrap();
        assert_eq!(report.trials.len(), 4);
        for t in &report.trials {
            let p = t.parameters.as_ref().unwrap();
            assert!((45..=55).contains(&p.ema_period));
            assert!((45..=55).contains(&p.momentum_lookback_days));
            assert!((25..=35).contains(&p.volatility_lookback_days));
            assert!((1.8..=2.2).contains(&p.atr_stop_multiplier));
        }
    }

    #[test]
    fn sweep_keeps_value_order() {
        let base = strategy();
        let rows = run_sweep(
            &table(150),
            &base,
            &BacktestConfig::default(),
            SweepParameter::MomentumLookback,
            &[20, 50, 30],
        )
        .unwrap();
        let values: Vec<usize> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![20, 50, 30]);
        assert!(best_by_sharpe(&rows).is_some());
    }

    #[test]
    fn sweep_parameter_parses() {
        assert_eq!(
            "momentum".parse::<SweepParameter>().unwrap(),
            SweepParameter::MomentumLookback
        );
        assert_eq!(
            "volatility_lookback_days".parse::<SweepParameter>().unwrap(),
            SweepParameter::VolatilityLookback
        );
        assert!("rsi".parse::<SweepParameter>().is_err());
    }
}
