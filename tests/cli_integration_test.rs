//! CLI integration tests.
//!
//! Drives the subcommands against INI files and per-ticker CSV files on
//! disk: backtest reports, validation, the signal/confirm cycle with paper
//! execution, Monte Carlo and sweep output, SQLite import.

mod common;

use clap::Parser;
use common::*;
use quadtrader::adapters::json_state_store::JsonStateStore;
use quadtrader::cli::{run, Cli};
use quadtrader::domain::price::PriceBar;
use quadtrader::ports::state_store_port::StateStorePort;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

// ExitCode has no PartialEq; compare the debug form
fn code_str(code: ExitCode) -> String {
    format!("{code:?}")
}

fn assert_success(code: ExitCode) {
    assert_eq!(code_str(code), code_str(ExitCode::SUCCESS));
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(bars: &[PriceBar]) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("prices")).unwrap();
        write_price_csvs(&dir.path().join("prices"), bars);
        Workspace { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_config(&self, extra: &str) -> PathBuf {
        let ini = format!(
            "[data]\n\
             price_dir = {}\n\
             fill_policy = forward\n\
             \n\
             [backtest]\n\
             initial_capital = 100000\n\
             \n\
             [live]\n\
             state_file = {}\n\
             paper_account = {}\n\
             notify_file = {}\n\
             retry_attempts = 2\n\
             \n\
             [robustness]\n\
             simulations = 20\n\
             block_size = 5\n\
             seed = 11\n\
             \n\
             {}\n{}",
            self.path("prices").display(),
            self.path("state.json").display(),
            self.path("paper.json").display(),
            self.path("notify.log").display(),
            strategy_ini(),
            extra,
        );
        let path = self.path("quadtrader.ini");
        std::fs::write(&path, ini).unwrap();
        path
    }
}

fn cli(args: &[&str]) -> Cli {
    Cli::parse_from(std::iter::once("quadtrader").chain(args.iter().copied()))
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn backtest_writes_json_and_csv_reports() {
    let ws = Workspace::new(&trending_bars(40));
    let config = ws.write_config("");
    let json = ws.path("report.json");
    let csv = ws.path("daily.csv");

    assert_success(run(cli(&[
        "backtest",
        "-c",
        &arg(&config),
        "-o",
        &arg(&json),
        "--csv",
        &arg(&csv),
    ])));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert!(report["metrics"]["total_return"].as_f64().unwrap() > 0.0);
    assert_eq!(report["result"]["equity_curve"].as_array().unwrap().len(), 40);

    let rows = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(rows.lines().count(), 41);
    assert!(rows.lines().last().unwrap().contains("AAA:1.500000;BBB:1.000000"));
}

#[test]
fn missing_config_is_config_error() {
    let ws = Workspace::new(&trending_bars(10));
    let code = run(cli(&["backtest", "-c", &arg(&ws.path("nope.ini"))]));
    assert_eq!(code_str(code), code_str(ExitCode::from(2)));
}

#[test]
fn invalid_strategy_is_rejected_by_validate() {
    let ws = Workspace::new(&trending_bars(10));
    let config = ws.write_config("");
    let content = std::fs::read_to_string(&config)
        .unwrap()
        .replace("atr_period = 3", "atr_period = 3\nvolatility_weighting_mode = sideways");
    std::fs::write(&config, content).unwrap();

    let code = run(cli(&["validate", "-c", &arg(&config)]));
    assert_eq!(code_str(code), code_str(ExitCode::from(2)));
}

#[test]
fn validate_accepts_partial_price_coverage() {
    let bars: Vec<PriceBar> = trending_bars(10)
        .into_iter()
        .filter(|b| b.ticker != "DDD")
        .collect();
    let ws = Workspace::new(&bars);
    let config = ws.write_config("");
    assert_success(run(cli(&["validate", "-c", &arg(&config)])));
}

#[test]
fn signal_then_confirm_trades_the_paper_account() {
    let bars = trending_bars(30);
    let last_date = bars.iter().map(|b| b.date).max().unwrap();
    let before: Vec<PriceBar> = bars.iter().filter(|b| b.date < last_date).cloned().collect();

    // signal after the close of the second to last session
    let ws = Workspace::new(&before);
    let config = ws.write_config("");
    assert_success(run(cli(&["signal", "-c", &arg(&config)])));

    let store = JsonStateStore::new(ws.path("state.json"));
    let snapshot = store.load().unwrap().unwrap();
    assert!(snapshot.last_signal.is_some());

    // confirm once the next session is available
    write_price_csvs(&ws.path("prices"), &bars);
    assert_success(run(cli(&["confirm", "-c", &arg(&config), "--execute"])));

    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.state.last_confirmed_date, Some(last_date));

    let account: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ws.path("paper.json")).unwrap()).unwrap();
    let positions = account["positions"].as_object().unwrap();
    assert!(positions.contains_key("AAA"));
    assert!(positions.contains_key("BBB"));

    let log = std::fs::read_to_string(ws.path("notify.log")).unwrap();
    assert!(log.contains(&format!("Confirmation for {last_date}")));

    // repeating the phase changes nothing and sends no second notice
    assert_success(run(cli(&["confirm", "-c", &arg(&config), "--execute"])));
    let again = std::fs::read_to_string(ws.path("notify.log")).unwrap();
    assert_eq!(again, log);
}

#[test]
fn signal_without_state_file_is_config_error() {
    let ws = Workspace::new(&trending_bars(10));
    let config = ws.write_config("");
    let content = std::fs::read_to_string(&config)
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with("state_file"))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&config, content).unwrap();

    let code = run(cli(&["signal", "-c", &arg(&config)]));
    assert_eq!(code_str(code), code_str(ExitCode::from(2)));
}

#[test]
fn monte_carlo_writes_summary() {
    let ws = Workspace::new(&rotating_bars(60));
    let config = ws.write_config("");
    let out = ws.path("mc.json");

    assert_success(run(cli(&[
        "monte-carlo",
        "-c",
        &arg(&config),
        "-k",
        "bootstrap",
        "-o",
        &arg(&out),
    ])));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["summary"]["trials"], 20);
    assert_eq!(report["trials"].as_array().unwrap().len(), 20);
}

#[test]
fn sweep_writes_one_row_per_value() {
    let ws = Workspace::new(&rotating_bars(60));
    let config = ws.write_config("");
    let out = ws.path("sweep.json");

    assert_success(run(cli(&[
        "sweep",
        "-c",
        &arg(&config),
        "-p",
        "momentum",
        "--values",
        "2,3,4",
        "-o",
        &arg(&out),
    ])));

    let rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let values: Vec<u64> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"].as_u64().unwrap())
        .collect();
    assert_eq!(values, vec![2, 3, 4]);
}

#[cfg(feature = "sqlite")]
#[test]
fn import_then_backtest_from_sqlite() {
    let ws = Workspace::new(&trending_bars(40));
    let db = ws.path("prices.db");
    let extra = format!("[sqlite]\npath = {}\n", db.display());
    let config = ws.write_config(&extra);

    assert_success(run(cli(&[
        "import",
        "-c",
        &arg(&config),
        "--from",
        &arg(&ws.path("prices")),
    ])));

    let content = std::fs::read_to_string(&config)
        .unwrap()
        .replace("fill_policy = forward", "fill_policy = forward\nsource = sqlite");
    std::fs::write(&config, content).unwrap();

    let json = ws.path("report.json");
    assert_success(run(cli(&["backtest", "-c", &arg(&config), "-o", &arg(&json)])));
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(report["result"]["equity_curve"].as_array().unwrap().len(), 40);
}
