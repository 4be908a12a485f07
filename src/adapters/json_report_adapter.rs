//! JSON and CSV report adapters implementing ReportPort.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuadtraderError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;

#[derive(Serialize)]
struct JsonReport<'a> {
    metrics: &'a Metrics,
    result: &'a BacktestResult,
}

/// Full result and metrics as one JSON document.
pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_path: &str,
    ) -> Result<(), QuadtraderError> {
        let writer = BufWriter::new(File::create(output_path)?);
        serde_json::to_writer_pretty(writer, &JsonReport { metrics, result })?;
        Ok(())
    }
}

/// One CSV row per session: equity, regime, budget and weights.
pub struct CsvDailyReportAdapter;

impl ReportPort for CsvDailyReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        _metrics: &Metrics,
        output_path: &str,
    ) -> Result<(), QuadtraderError> {
        let mut wtr = csv::Writer::from_path(output_path)?;
        wtr.write_record([
            "date",
            "primary",
            "secondary",
            "equity",
            "daily_return",
            "leverage_budget",
            "cash_fraction",
            "cost",
            "trigger",
            "weights",
        ])?;

        for day in &result.daily {
            let (primary, secondary) = day
                .regime
                .map(|(p, s)| (p.to_string(), s.to_string()))
                .unwrap_or_default();
            let weights: Vec<String> = day
                .weights
                .iter()
                .map(|(t, w)| format!("{t}:{w:.6}"))
                .collect();
            wtr.write_record([
                day.date.format("%Y-%m-%d").to_string(),
                primary,
                secondary,
                format!("{:.2}", day.equity),
                format!("{:.6}", day.daily_return),
                format!("{:.4}", day.leverage_budget),
                format!("{:.6}", day.cash_fraction),
                format!("{:.2}", day.cost),
                day.trigger.as_ref().map(|t| t.to_string()).unwrap_or_default(),
                weights.join(";"),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
