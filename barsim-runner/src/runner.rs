//! Single-run execution: load the configured history, build the strategy,
//! run the bar loop.

use crate::config::{ConfigError, RunConfig};
use barsim_core::data::history::{self, HistoryError};
use barsim_core::data::MarketData;
use barsim_core::engine::{RunResult, SimConfig, SimContext, Simulation};
use barsim_core::strategies::{self, Params, StrategyError};
use barsim_core::EngineError;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("no bars in {0}")]
    NoData(String),
}

/// Load and align every configured asset, attaching tick files when given.
pub fn load_market_data(config: &RunConfig) -> Result<MarketData, RunError> {
    let mut inputs = Vec::with_capacity(config.assets.len());
    for source in &config.assets {
        let bars = history::load_bars(&source.history, config.simulation.bar_period)?;
        if bars.is_empty() {
            return Err(RunError::NoData(source.history.display().to_string()));
        }
        debug!(asset = %source.params.name, bars = bars.len(), "loaded history");
        inputs.push((source.params.clone(), bars));
    }
    let mut data = MarketData::align(inputs);
    for (index, source) in config.assets.iter().enumerate() {
        if let Some(path) = &source.ticks {
            let ticks = history::read_t1(path)?;
            debug!(asset = %source.params.name, ticks = ticks.len(), "attached ticks");
            data.attach_ticks(index, &ticks);
        }
    }
    Ok(data)
}

/// Run the configured strategy with `params` on `data`.
///
/// `sim` overrides the config's simulation section, which is how sweeps
/// assign cores and walk-forward frames set their own lookback.
pub fn run_with(
    config: &RunConfig,
    sim: SimConfig,
    data: MarketData,
    params: &Params,
) -> Result<RunResult, RunError> {
    let strategy = strategies::build(&config.strategy.name, params)?;
    let ctx = SimContext::new(sim, config.trade.clone())?.with_fill(config.fill.build());
    Simulation::new(ctx, data, strategy)?.run().map_err(RunError::from)
}

/// Run the config as written.
pub fn run_once(config: &RunConfig, data: MarketData) -> Result<RunResult, RunError> {
    info!(strategy = %config.strategy.name, bars = data.len(), "starting run");
    let result = run_with(config, config.simulation.clone(), data, &config.strategy.params)?;
    info!(
        trades = result.trades.len(),
        net_profit = result.net_profit(),
        balance = result.final_balance,
        "run finished"
    );
    Ok(result)
}

/// Load the data and run in one go.
pub fn run_config(config: &RunConfig) -> Result<RunResult, RunError> {
    let data = load_market_data(config)?;
    run_once(config, data)
}
