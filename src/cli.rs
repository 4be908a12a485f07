//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_notifier::FileNotifier;
use crate::adapters::json_report_adapter::{CsvDailyReportAdapter, JsonReportAdapter};
use crate::adapters::json_state_store::JsonStateStore;
use crate::adapters::log_notifier::LogNotifier;
use crate::adapters::paper_broker::PaperBroker;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    parse_optional_date, validate_backtest_config, validate_data_config, validate_live_config,
    validate_robustness_config, validate_strategy_config,
};
use crate::domain::error::QuadtraderError;
use crate::domain::execution::{rebalance_account, ExecutionReport};
use crate::domain::live::{
    confirm_phase, format_confirm_summary, format_signal_summary, notify, signal_phase,
};
use crate::domain::market_data::MarketData;
use crate::domain::metrics::Metrics;
use crate::domain::price_table::{FillPolicy, PriceTable};
use crate::domain::quadrant::Quadrant;
use crate::domain::robustness::{
    best_by_sharpe, run_bootstrap, run_parameter_variation, run_sweep, Distribution,
    MonteCarloReport, MonteCarloSummary, RobustnessConfig, SimulationKind, SweepParameter,
    SweepRow,
};
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::notifier_port::NotifierPort;
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "quadtrader", about = "Macro regime rotation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a historical backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the full result and metrics as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write one CSV row per session
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Compute the rebalance decision after the latest close
    Signal {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Confirm or reject pending entries against the latest close
    Confirm {
        #[arg(short, long)]
        config: PathBuf,
        /// Send the resulting orders to the paper account
        #[arg(long)]
        execute: bool,
    },
    /// Monte Carlo robustness analysis
    MonteCarlo {
        #[arg(short, long)]
        config: PathBuf,
        /// bootstrap | parameters
        #[arg(short, long, default_value = "bootstrap")]
        kind: SimulationKind,
        #[arg(short = 'n', long)]
        simulations: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Backtest a range of values for one parameter
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        /// momentum | volatility | ema
        #[arg(short, long)]
        parameter: SweepParameter,
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and check price coverage
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load a directory of per-ticker CSV files into the SQLite price store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        from: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            csv,
        } => cmd_backtest(&config, output.as_deref(), csv.as_deref()),
        Command::Signal { config } => cmd_signal(&config),
        Command::Confirm { config, execute } => cmd_confirm(&config, execute),
        Command::MonteCarlo {
            config,
            kind,
            simulations,
            output,
        } => cmd_monte_carlo(&config, kind, simulations, output.as_deref()),
        Command::Sweep {
            config,
            parameter,
            values,
            output,
        } => cmd_sweep(&config, parameter, &values, output.as_deref()),
        Command::Validate { config } => cmd_validate(&config),
        Command::Import { config, from } => cmd_import(&config, &from),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, QuadtraderError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn latest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Price source selected by `[data] source` (csv by default).
pub fn open_price_port(config: &dyn ConfigPort) -> Result<Box<dyn PricePort>, QuadtraderError> {
    let source = config
        .get_string("data", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());

    match source.as_str() {
        "csv" => {
            let dir = config
                .get_string("data", "price_dir")
                .ok_or_else(|| QuadtraderError::missing("data", "price_dir"))?;
            Ok(Box::new(CsvPriceAdapter::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqlitePriceAdapter;
            Ok(Box::new(SqlitePriceAdapter::from_config(config)?))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(QuadtraderError::invalid(
            "data",
            "source",
            "built without sqlite support",
        )),
        other => Err(QuadtraderError::invalid(
            "data",
            "source",
            format!("unknown price source '{other}' (expected csv or sqlite)"),
        )),
    }
}

/// Loads every ticker of the configured universe into an aligned table.
///
/// History before `start_date` is kept for indicator warmup.
pub fn load_price_table(
    prices: &dyn PricePort,
    config: &dyn ConfigPort,
    strategy: &StrategyConfig,
) -> Result<PriceTable, QuadtraderError> {
    validate_data_config(config)?;
    let policy = match config.get_string("data", "fill_policy") {
        Some(s) => s
            .parse::<FillPolicy>()
            .map_err(|e| QuadtraderError::invalid("data", "fill_policy", e))?,
        None => FillPolicy::default(),
    };
    if policy == FillPolicy::ForwardBackward {
        warn!("forward_backward fill leaks the first observed price into earlier sessions");
    }

    let tickers = strategy.quadrants.all_tickers();
    let end = parse_optional_date(config, "end_date")?.unwrap_or_else(latest_date);
    let bars = prices.get_prices(&tickers, earliest_date(), end)?;
    if bars.is_empty() {
        return Err(QuadtraderError::NoData {
            ticker: tickers.into_iter().collect::<Vec<_>>().join(","),
        });
    }

    let table = PriceTable::from_bars(&bars, policy);
    for ticker in &tickers {
        if !table.has_ticker(ticker) {
            warn!(%ticker, "no price data, ticker will never be allocated");
        }
    }
    info!(
        tickers = tickers.len(),
        sessions = table.len(),
        bars = bars.len(),
        %policy,
        "price table ready"
    );
    Ok(table)
}

/// Validated configuration plus the loaded price history.
pub struct RunContext {
    pub strategy: StrategyConfig,
    pub backtest: BacktestConfig,
    pub table: PriceTable,
}

impl RunContext {
    pub fn prepare(
        config: &dyn ConfigPort,
        prices: &dyn PricePort,
    ) -> Result<Self, QuadtraderError> {
        let strategy = StrategyConfig::from_config(config)?;
        let backtest = BacktestConfig::from_config(config)?;
        let table = load_price_table(prices, config, &strategy)?;
        Ok(RunContext {
            strategy,
            backtest,
            table,
        })
    }

    pub fn market(&self) -> MarketData {
        MarketData::new(self.table.clone(), &self.strategy)
    }

    pub fn run_backtest(&self) -> Result<(BacktestResult, Metrics), QuadtraderError> {
        let result = run_backtest(&self.market(), &self.strategy, &self.backtest)?;
        let metrics = Metrics::compute(&result);
        Ok((result, metrics))
    }
}

fn cmd_backtest(
    config_path: &Path,
    output: Option<&Path>,
    csv: Option<&Path>,
) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    let prices = open_price_port(&config)?;
    let ctx = RunContext::prepare(&config, prices.as_ref())?;
    let (result, metrics) = ctx.run_backtest()?;

    println!("{}", format_metrics(&result, &metrics));

    if let Some(path) = output {
        JsonReportAdapter.write(&result, &metrics, &path.to_string_lossy())?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = csv {
        CsvDailyReportAdapter.write(&result, &metrics, &path.to_string_lossy())?;
        info!(path = %path.display(), "daily records written");
    }
    Ok(())
}

fn open_notifier(config: &dyn ConfigPort) -> Box<dyn NotifierPort> {
    match config.get_string("live", "notify_file") {
        Some(path) if !path.trim().is_empty() => Box::new(FileNotifier::new(PathBuf::from(path))),
        _ => Box::new(LogNotifier),
    }
}

fn state_store(config: &dyn ConfigPort) -> Result<JsonStateStore, QuadtraderError> {
    validate_live_config(config)?;
    let path = config
        .get_string("live", "state_file")
        .ok_or_else(|| QuadtraderError::missing("live", "state_file"))?;
    Ok(JsonStateStore::new(path))
}

fn cmd_signal(config_path: &Path) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    let store = state_store(&config)?;
    let prices = open_price_port(&config)?;
    let ctx = RunContext::prepare(&config, prices.as_ref())?;
    let market = ctx.market();

    let outcome = signal_phase(&ctx.strategy, &market, &store)?;
    let notifier = open_notifier(&config);

    if let Some(catch_up) = &outcome.catch_up {
        let summary = format_confirm_summary(catch_up, None);
        print!("{summary}");
        notify(notifier.as_ref(), &summary);
    }
    let summary = format_signal_summary(&outcome.report);
    print!("{summary}");
    if !outcome.replayed {
        notify(notifier.as_ref(), &summary);
    }
    Ok(())
}

fn cmd_confirm(config_path: &Path, execute: bool) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    let store = state_store(&config)?;
    let prices = open_price_port(&config)?;
    let ctx = RunContext::prepare(&config, prices.as_ref())?;
    let market = ctx.market();

    let outcome = confirm_phase(&ctx.strategy, &market, &store)?;

    let execute = execute || config.get_bool("live", "execute_orders", false);
    let execution = if execute && !outcome.replayed {
        Some(execute_on_paper(&config, &market, &outcome.weights)?)
    } else {
        None
    };

    let summary = format_confirm_summary(&outcome.report, execution.as_ref());
    print!("{summary}");
    if !outcome.replayed {
        notify(open_notifier(&config).as_ref(), &summary);
    }
    if let Some(report) = &execution {
        if !report.is_clean() {
            warn!(errors = report.error_count(), "some orders failed");
        }
    }
    Ok(())
}

fn execute_on_paper(
    config: &dyn ConfigPort,
    market: &MarketData,
    targets: &BTreeMap<String, f64>,
) -> Result<ExecutionReport, QuadtraderError> {
    let path = config
        .get_string("live", "paper_account")
        .ok_or_else(|| QuadtraderError::missing("live", "paper_account"))?;
    let cash = config.get_double("live", "paper_cash", 100_000.0);
    let retry_attempts = config.get_int("live", "retry_attempts", 3).max(1) as u32;

    let last = market.len().saturating_sub(1);
    let prices: BTreeMap<String, f64> = market
        .table()
        .tickers()
        .filter_map(|t| market.close(t, last).map(|p| (t.to_string(), p)))
        .collect();

    let mut broker = PaperBroker::open(&path, cash)?;
    broker.set_prices(prices.clone());
    let report = rebalance_account(&mut broker, targets, &prices, retry_attempts)?;
    broker.save()?;
    info!(
        fills = report.fills.len(),
        failures = report.error_count(),
        account = %path,
        "paper orders executed"
    );
    Ok(report)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), QuadtraderError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    info!(path = %path.display(), "json written");
    Ok(())
}

fn cmd_monte_carlo(
    config_path: &Path,
    kind: SimulationKind,
    simulations: Option<usize>,
    output: Option<&Path>,
) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    let mut robustness = RobustnessConfig::from_config(&config)?;
    if let Some(n) = simulations {
        robustness.simulations = n.max(1);
    }
    let prices = open_price_port(&config)?;
    let ctx = RunContext::prepare(&config, prices.as_ref())?;

    let report: MonteCarloReport = match kind {
        SimulationKind::Bootstrap => {
            let (result, _) = ctx.run_backtest()?;
            run_bootstrap(&result.daily_returns(), &robustness)
        }
        SimulationKind::ParameterVariation => {
            run_parameter_variation(&ctx.table, &ctx.strategy, &ctx.backtest, &robustness)?
        }
    };

    println!("{}", format_monte_carlo(&report.summary));
    if let Some(path) = output {
        write_json(path, &report)?;
    }
    Ok(())
}

fn cmd_sweep(
    config_path: &Path,
    parameter: SweepParameter,
    values: &[usize],
    output: Option<&Path>,
) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    let prices = open_price_port(&config)?;
    let ctx = RunContext::prepare(&config, prices.as_ref())?;

    let rows = run_sweep(&ctx.table, &ctx.strategy, &ctx.backtest, parameter, values)?;
    println!("{}", format_sweep(&rows));
    if let Some(path) = output {
        write_json(path, &rows)?;
    }
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), QuadtraderError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    validate_strategy_config(&config)?;
    validate_backtest_config(&config)?;
    validate_robustness_config(&config)?;
    if config.get_string("live", "state_file").is_some() {
        validate_live_config(&config)?;
    }

    let strategy = StrategyConfig::from_config(&config)?;
    println!(
        "Strategy: momentum {}d, EMA {}, volatility {}d, ATR {} x {:.2}, lag {}d, {} weighting",
        strategy.momentum_lookback_days,
        strategy.ema_period,
        strategy.volatility_lookback_days,
        strategy.atr_period,
        strategy.atr_stop_multiplier,
        strategy.entry_confirmation_lag_days,
        strategy.weighting_mode,
    );
    for quadrant in Quadrant::PRIORITY {
        let assets: Vec<&str> = strategy.quadrants.assets(quadrant).collect();
        println!(
            "  {} {} x{:.2}: assets {} | indicators {}",
            quadrant,
            quadrant.description(),
            strategy.leverage.multiplier(quadrant),
            assets.join(", "),
            strategy.quadrants.indicators(quadrant).join(", "),
        );
    }

    let prices = open_price_port(&config)?;
    let tickers = strategy.quadrants.all_tickers();
    let bars = prices.get_prices(&tickers, earliest_date(), latest_date())?;
    let found: BTreeSet<&str> = bars.iter().map(|b| b.ticker.as_str()).collect();
    let missing: Vec<&str> = tickers
        .iter()
        .map(String::as_str)
        .filter(|t| !found.contains(t))
        .collect();

    if missing.is_empty() {
        println!("Price data: all {} tickers present", tickers.len());
    } else {
        println!(
            "Price data: {} of {} tickers missing: {}",
            missing.len(),
            tickers.len(),
            missing.join(", ")
        );
    }
    println!("Configuration is valid.");
    Ok(())
}

#[cfg(feature = "sqlite")]
fn cmd_import(config_path: &Path, from: &Path) -> Result<(), QuadtraderError> {
    use crate::adapters::sqlite_adapter::SqlitePriceAdapter;

    let config = load_config(config_path)?;
    let store = SqlitePriceAdapter::from_config(&config)?;
    let source = CsvPriceAdapter::new(from.to_path_buf());

    let mut total = 0;
    for ticker in source.list_tickers()? {
        let wanted: BTreeSet<String> = [ticker.clone()].into_iter().collect();
        let bars = source.get_prices(&wanted, earliest_date(), latest_date())?;
        total += store.insert_bars(&bars)?;
        match store.get_data_range(&ticker)? {
            Some((first, last, count)) => {
                println!("{ticker}: {count} bars, {first} to {last}");
            }
            None => println!("{ticker}: no bars"),
        }
    }
    info!(bars = total, "import complete");
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn cmd_import(_config_path: &Path, _from: &Path) -> Result<(), QuadtraderError> {
    Err(QuadtraderError::invalid(
        "data",
        "source",
        "built without sqlite support",
    ))
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

pub fn format_metrics(result: &BacktestResult, metrics: &Metrics) -> String {
    let mut out = String::new();
    let (first, last) = match (result.equity_curve.first(), result.equity_curve.last()) {
        (Some(f), Some(l)) => (f.date.to_string(), l.date.to_string()),
        _ => ("-".to_string(), "-".to_string()),
    };
    let _ = writeln!(out, "=== Backtest {first} to {last} ===");
    let _ = writeln!(out, "Final Equity:     {:.2}", result.final_equity());
    let _ = writeln!(out, "Total Return:     {}", pct(metrics.total_return));
    let _ = writeln!(out, "Annualized:       {}", pct(metrics.annualized_return));
    let _ = writeln!(out, "Volatility:       {}", pct(metrics.annualized_volatility));
    let _ = writeln!(out, "Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    let _ = writeln!(out, "Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    let _ = writeln!(
        out,
        "Max Drawdown:     -{} ({} days)",
        pct(metrics.max_drawdown),
        metrics.max_drawdown_duration
    );
    let _ = writeln!(
        out,
        "Trades:           {} won / {} lost ({} win rate)",
        metrics.trades_won,
        metrics.trades_lost,
        pct(metrics.win_rate)
    );
    let _ = writeln!(out, "Avg Trade:        {}", pct(metrics.avg_trade_return));
    let _ = writeln!(out, "Avg Holding:      {:.1} days", metrics.avg_holding_days);
    let _ = writeln!(out, "Rebalances:       {}", metrics.rebalances);
    let _ = writeln!(
        out,
        "Entries:          {} confirmed / {} rejected ({} rejected)",
        metrics.entries_confirmed,
        metrics.entries_rejected,
        pct(metrics.rejection_rate)
    );
    let _ = writeln!(out, "Stops Hit:        {}", metrics.stops_hit);
    let _ = writeln!(out, "Trading Costs:    {:.2}", metrics.total_costs);

    if !metrics.yearly.is_empty() {
        let _ = writeln!(out, "\nYear   Return   MaxDD  Sessions");
        for y in &metrics.yearly {
            let _ = writeln!(
                out,
                "{}  {:>7}  {:>6}  {:>8}",
                y.year,
                pct(y.total_return),
                pct(y.max_drawdown),
                y.sessions
            );
        }
    }
    out
}

fn distribution_row(label: &str, dist: &Distribution) -> String {
    let p = |q: f64| dist.percentile(q).map_or_else(|| "-".into(), pct);
    format!(
        "{label:<12} {:>9} {:>9} {:>9} {:>9} {:>9}",
        pct(dist.mean),
        p(5.0),
        p(50.0),
        p(95.0),
        pct(dist.max)
    )
}

pub fn format_monte_carlo(summary: &MonteCarloSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Monte Carlo ({}, {} trials) ===", summary.kind, summary.trials);
    let _ = writeln!(
        out,
        "{:<12} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "", "mean", "p5", "p50", "p95", "max"
    );
    let _ = writeln!(out, "{}", distribution_row("Return", &summary.total_return));
    let _ = writeln!(out, "{}", distribution_row("Annualized", &summary.annualized_return));
    let _ = writeln!(out, "{}", distribution_row("Max DD", &summary.max_drawdown));
    let sharpe = &summary.sharpe_ratio;
    let _ = writeln!(
        out,
        "{:<12} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
        "Sharpe",
        sharpe.mean,
        sharpe.percentile(5.0).unwrap_or(0.0),
        sharpe.percentile(50.0).unwrap_or(0.0),
        sharpe.percentile(95.0).unwrap_or(0.0),
        sharpe.max
    );
    let _ = writeln!(out, "P(return > 0):   {}", pct(summary.prob_positive_return));
    let _ = writeln!(out, "P(DD > 30%):     {}", pct(summary.prob_drawdown_over_30));
    let _ = writeln!(out, "P(DD > 40%):     {}", pct(summary.prob_drawdown_over_40));
    let _ = writeln!(out, "VaR 95%:         {}", pct(summary.var_95));
    let _ = writeln!(out, "VaR 99%:         {}", pct(summary.var_99));
    out
}

pub fn format_sweep(rows: &[SweepRow]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else {
        return "no sweep results\n".to_string();
    };
    let _ = writeln!(out, "=== Sweep: {} ===", first.parameter);
    let _ = writeln!(
        out,
        "{:>6} {:>9} {:>9} {:>7} {:>8} {:>10}",
        "value", "return", "annual", "sharpe", "max dd", "rebalances"
    );
    for row in rows {
        let m = &row.metrics;
        let _ = writeln!(
            out,
            "{:>6} {:>9} {:>9} {:>7.2} {:>8} {:>10}",
            row.value,
            pct(m.total_return),
            pct(m.annualized_return),
            m.sharpe_ratio,
            pct(m.max_drawdown),
            m.rebalances
        );
    }
    if let Some(best) = best_by_sharpe(rows) {
        let _ = writeln!(
            out,
            "Best Sharpe: {} = {} ({:.2})",
            best.parameter, best.value, best.metrics.sharpe_ratio
        );
    }
    out
}
