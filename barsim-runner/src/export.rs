//! Run artifacts: trade log and equity CSV, JSON summary.
//!
//! Every JSON summary carries a `schema_version`; newer versions are
//! rejected on load.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use barsim_core::domain::TradeRecord;
use barsim_core::engine::RunResult;
use barsim_core::time::ole_to_datetime;

use crate::config::RunId;
use crate::monte_carlo::MonteCarloReport;
use crate::walk_forward::WalkForwardReport;

pub const SCHEMA_VERSION: u32 = 1;

// ─── Summary ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: String,
    pub num_trades: u32,
    pub num_win: u32,
    pub num_loss: u32,
    pub net_profit: f64,
    pub win_rate: f64,
    /// `None` when there were no losing trades.
    pub profit_factor: Option<f64>,
    pub max_drawdown: f64,
    pub final_balance: f64,
    pub final_equity: f64,
    pub num_rejected: u32,
    pub last_error: Option<String>,
    #[serde(default)]
    pub num_wfo_win: u32,
    #[serde(default)]
    pub num_wfo_loss: u32,
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloReport>,
}

impl RunSummary {
    pub fn new(run_id: RunId, result: &RunResult) -> Self {
        let perf = &result.performance;
        let pf = perf.profit_factor();
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            strategy: result.strategy.clone(),
            num_trades: perf.num_trades(),
            num_win: perf.num_win,
            num_loss: perf.num_loss,
            net_profit: perf.net_profit(),
            win_rate: perf.win_rate(),
            profit_factor: pf.is_finite().then_some(pf),
            max_drawdown: perf.equity_dd.max,
            final_balance: result.final_balance,
            final_equity: result.final_equity,
            num_rejected: result.num_rejected,
            last_error: result.last_error.clone(),
            num_wfo_win: 0,
            num_wfo_loss: 0,
            monte_carlo: None,
        }
    }

    pub fn with_walk_forward(mut self, report: &WalkForwardReport) -> Self {
        self.num_wfo_win = report.num_wfo_win;
        self.num_wfo_loss = report.num_wfo_loss;
        self
    }

    pub fn with_monte_carlo(mut self, report: MonteCarloReport) -> Self {
        self.monte_carlo = Some(report);
        self
    }
}

pub fn export_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize run summary")
}

pub fn import_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary = serde_json::from_str(json).context("failed to parse run summary")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TradeRow<'a> {
    id: u32,
    algo: &'a str,
    asset: &'a str,
    side: String,
    reason: &'static str,
    phantom: bool,
    bar_open: usize,
    bar_close: usize,
    time_open: String,
    time_close: String,
    entry_price: f64,
    exit_price: f64,
    lots: u32,
    gross: f64,
    commission: f64,
    rollover: f64,
    slippage: f64,
    result: f64,
    mae: f64,
    mfe: f64,
}

fn format_time(ole: f64) -> String {
    ole_to_datetime(ole).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default()
}

impl<'a> From<&'a TradeRecord> for TradeRow<'a> {
    fn from(t: &'a TradeRecord) -> Self {
        Self {
            id: t.id.0,
            algo: &t.algo,
            asset: &t.asset,
            side: t.side.to_string(),
            reason: t.reason.as_str(),
            phantom: t.phantom,
            bar_open: t.bar_open,
            bar_close: t.bar_close,
            time_open: format_time(t.time_open),
            time_close: format_time(t.time_close),
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            lots: t.lots,
            gross: t.gross,
            commission: t.commission,
            rollover: t.rollover,
            slippage: t.slippage,
            result: t.result,
            mae: t.mae,
            mfe: t.mfe,
        }
    }
}

/// Trade log, one row per closed trade in closing order.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for t in trades {
        wtr.serialize(TradeRow::from(t))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Per-bar balance and equity.
pub fn export_equity_csv(result: &RunResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar", "balance", "equity"])?;
    for (i, m) in result.marks.iter().enumerate() {
        wtr.write_record([i.to_string(), format!("{:.2}", m.balance), format!("{:.2}", m.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `summary.json`, `trades.csv` and `equity.csv` under
/// `output_dir/<strategy>_<run id prefix>/` and return that directory.
pub fn save_artifacts(summary: &RunSummary, result: &RunResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix = summary.run_id.get(..12).unwrap_or(&summary.run_id);
    let run_dir = output_dir.join(format!("{}_{}", summary.strategy, prefix));
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    fs::write(run_dir.join("summary.json"), export_json(summary)?)?;
    fs::write(run_dir.join("trades.csv"), export_trades_csv(&result.trades)?)?;
    fs::write(run_dir.join("equity.csv"), export_equity_csv(result)?)?;
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::run_once;
    use crate::testutil::sine_config;

    fn sample() -> (RunSummary, RunResult) {
        let (config, data) = sine_config(300);
        let result = run_once(&config, data).unwrap();
        (RunSummary::new(config.run_id().unwrap(), &result), result)
    }

    #[test]
    fn summary_round_trips_and_rejects_newer_schema() {
        let (summary, result) = sample();
        assert_eq!(summary.num_trades as usize, result.trades.len());
        let json = export_json(&summary).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back.run_id, summary.run_id);
        assert_eq!(back.num_trades, summary.num_trades);
        assert!((back.net_profit - summary.net_profit).abs() < 1e-6);

        let mut newer = summary;
        newer.schema_version = SCHEMA_VERSION + 1;
        assert!(import_json(&export_json(&newer).unwrap()).is_err());
    }

    #[test]
    fn trades_csv_has_header_and_rows() {
        let (_, result) = sample();
        let csv = export_trades_csv(&result.trades).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,algo,asset,side,reason"));
        assert_eq!(lines.count(), result.trades.len());
    }

    #[test]
    fn artifacts_land_in_run_dir() {
        let (summary, result) = sample();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&summary, &result, dir.path()).unwrap();
        for name in ["summary.json", "trades.csv", "equity.csv"] {
            assert!(run_dir.join(name).is_file(), "{name} missing");
        }
        let equity = fs::read_to_string(run_dir.join("equity.csv")).unwrap();
        assert_eq!(equity.lines().count(), result.marks.len() + 1);
    }
}
