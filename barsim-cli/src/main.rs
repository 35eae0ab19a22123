//! barsim CLI: run, sweep, and history file commands.
//!
//! Commands:
//! - `run`: run a TOML config, with walk-forward and Monte Carlo when enabled
//! - `sweep`: grid-search the config's `[sweep]` parameters
//! - `inspect`: summarize a `.t1`, `.t6` or `.csv` history file
//! - `convert`: rewrite history between `.t1`/`.t6`/`.csv`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use barsim_core::data::history::{load_bars, read_t1, write_csv_bars, write_t6};
use barsim_core::logging::init_logging;
use barsim_core::time::ole_to_datetime;
use barsim_runner::{
    load_market_data, monte_carlo, run_once, save_artifacts, seeded_rng, walk_forward, ParamSweep,
    RunConfig, RunSummary,
};

#[derive(Parser)]
#[command(name = "barsim", about = "barsim: bar-by-bar trading simulation")]
struct Cli {
    /// Log filter when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write daily-rotating log files here.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest from a TOML config file.
    Run {
        #[arg(long)]
        config: PathBuf,

        /// Output directory for summary.json, trades.csv and equity.csv.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run the config's parameter grid and report the best combinations.
    Sweep {
        #[arg(long)]
        config: PathBuf,

        /// How many ranked combinations to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write the trained component statuses as JSON.
        #[arg(long)]
        status_out: Option<PathBuf>,
    },
    /// Print a summary of a history file.
    Inspect {
        file: PathBuf,

        /// Bar period in minutes for aggregating `.t1` ticks.
        #[arg(long, default_value_t = 60.0)]
        bar_period: f64,
    },
    /// Convert history; the output format follows the output extension.
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Bar period in minutes for aggregating `.t1` ticks.
        #[arg(long, default_value_t = 60.0)]
        bar_period: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_dir.as_deref(), "barsim");

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(&config, &output_dir),
        Commands::Sweep { config, top, status_out } => sweep_cmd(&config, top, status_out.as_deref()),
        Commands::Inspect { file, bar_period } => inspect_cmd(&file, bar_period),
        Commands::Convert { input, output, bar_period } => convert_cmd(&input, &output, bar_period),
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn run_cmd(config_path: &Path, output_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let run_id = config.run_id()?;
    let data = load_market_data(&config)?;
    info!(run_id = %run_id, assets = data.series.len(), bars = data.len(), "data loaded");

    let sim = &config.simulation;
    let wfo = if sim.num_wfo_cycles > 0 {
        if config.sweep.is_none() {
            bail!("num_wfo_cycles is set but the config has no [sweep] section");
        }
        Some(walk_forward(&config, &data)?)
    } else {
        None
    };

    let result = run_once(&config, data)?;
    let mut summary = RunSummary::new(run_id.clone(), &result);
    if let Some(report) = &wfo {
        summary = summary.with_walk_forward(report);
    }
    if sim.monte_carlo > 0 {
        let mut rng = seeded_rng(&run_id, sim.seed);
        let mc = monte_carlo(&result.trades, sim.capital, sim.monte_carlo, sim.confidence, &mut rng);
        summary = summary.with_monte_carlo(mc);
    }

    print_summary(&summary);
    let run_dir = save_artifacts(&summary, &result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn sweep_cmd(config_path: &Path, top: usize, status_out: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let data = load_market_data(&config)?;
    let sweep = ParamSweep::new(&config)?;
    println!("Sweeping {} combinations on {} cores", sweep.grid().size(), config.simulation.num_cores);
    let results = sweep.run(&data, config.simulation.lookback)?;

    println!();
    println!("{:<4} {:>12} {:>8}  params", "rank", "score", "trades");
    println!("{}", "-".repeat(48));
    for (rank, point) in results.top_n(top).into_iter().enumerate() {
        let params: Vec<String> = point.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("{:<4} {:>12.4} {:>8}  {}", rank + 1, point.score, point.result.trades.len(), params.join(" "));
    }

    if let Some(path) = status_out {
        let statuses = results.trained_statuses(&config.strategy.name);
        let json = serde_json::to_string_pretty(&statuses).context("failed to serialize statuses")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Trained statuses saved to: {}", path.display());
    }
    Ok(())
}

fn format_time(ole: f64) -> String {
    ole_to_datetime(ole)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ole.to_string())
}

fn is_t1(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("t1"))
}

fn inspect_cmd(file: &Path, bar_period: f64) -> Result<()> {
    if is_t1(file) {
        let ticks = read_t1(file)?;
        println!("Ticks:   {}", ticks.len());
    }
    let bars = load_bars(file, bar_period).with_context(|| format!("failed to read {}", file.display()))?;
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        println!("{}: no bars", file.display());
        return Ok(());
    };
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    println!("File:    {}", file.display());
    println!("Bars:    {}", bars.len());
    println!("From:    {}", format_time(first.time));
    println!("To:      {}", format_time(last.time));
    println!("Range:   {low} .. {high}");
    println!("Last:    O {} H {} L {} C {}", last.open, last.high, last.low, last.close);
    Ok(())
}

fn convert_cmd(input: &Path, output: &Path, bar_period: f64) -> Result<()> {
    let bars = load_bars(input, bar_period).with_context(|| format!("failed to read {}", input.display()))?;
    let ext = output.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "t6" => write_t6(output, &bars)?,
        "csv" => write_csv_bars(output, &bars)?,
        other => bail!("cannot write '{other}' files; use .t6 or .csv"),
    }
    println!("Wrote {} bars to {}", bars.len(), output.display());
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!();
    println!("=== Run Result ===");
    println!("Run id:         {}", s.run_id);
    println!("Strategy:       {}", s.strategy);
    println!("Trades:         {} ({} won, {} lost)", s.num_trades, s.num_win, s.num_loss);
    println!("Rejected:       {}", s.num_rejected);
    println!();
    println!("--- Performance ---");
    println!("Net Profit:     {:.2}", s.net_profit);
    println!("Win Rate:       {:.1}%", s.win_rate * 100.0);
    match s.profit_factor {
        Some(pf) => println!("Profit Factor:  {pf:.2}"),
        None => println!("Profit Factor:  n/a"),
    }
    println!("Max Drawdown:   {:.2}", s.max_drawdown);
    println!("Final Balance:  {:.2}", s.final_balance);
    println!("Final Equity:   {:.2}", s.final_equity);
    if s.num_wfo_win + s.num_wfo_loss > 0 {
        println!("WFO Cycles:     {} won, {} lost", s.num_wfo_win, s.num_wfo_loss);
    }
    if let Some(mc) = &s.monte_carlo {
        println!(
            "MC Drawdown:    {:.2} at {:.0}% ({:.2} median, {:.2} worst, {} runs)",
            mc.drawdown_at_confidence, mc.confidence, mc.drawdown_median, mc.drawdown_worst, mc.runs
        );
    }
    if let Some(err) = &s.last_error {
        println!("WARNING: {err}");
    }
    println!();
}
