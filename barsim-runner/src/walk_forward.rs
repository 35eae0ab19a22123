//! Walk-forward optimization.
//!
//! The bars are cut into `num_wfo_cycles` frames. Each frame trains on
//! `data_split` percent of its length and tests on the rest; consecutive
//! test windows are adjacent, so the out-of-sample runs cover the tail of
//! the history without overlap:
//!
//! ```text
//! r = split / (100 - split)
//! test  = N / (cycles + r)
//! train = test * r
//! cycle k: train [k*test, k*test + train), test [k*test + train, +test)
//! ```
//!
//! Every test frame is prefixed with `lookback` bars of the training data
//! so indicators are warm when trading starts.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use tracing::info;

use barsim_core::data::MarketData;
use barsim_core::engine::RunResult;
use barsim_core::strategies::Params;

use crate::config::RunConfig;
use crate::runner::{run_with, RunError};
use crate::sweep::{ParamSweep, SweepError};

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("walk-forward needs num_wfo_cycles > 0")]
    Disabled,
    #[error("data_split must be in (0, 100), got {0}")]
    Split(f64),
    #[error("{bars} bars leave a training window of {train} bars, lookback is {lookback}")]
    TooShort { bars: usize, train: usize, lookback: usize },
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Bar ranges of one cycle on the global timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfoFrame {
    pub cycle: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Split `bars` into walk-forward frames. The last test window absorbs the
/// rounding remainder.
pub fn frames(bars: usize, cycles: u32, split: f64, lookback: usize) -> Result<Vec<WfoFrame>, WalkForwardError> {
    if cycles == 0 {
        return Err(WalkForwardError::Disabled);
    }
    if !(split > 0.0 && split < 100.0) {
        return Err(WalkForwardError::Split(split));
    }
    let ratio = split / (100.0 - split);
    let test = (bars as f64 / (cycles as f64 + ratio)).floor() as usize;
    let train = (test as f64 * ratio).floor() as usize;
    if test == 0 || train <= lookback {
        return Err(WalkForwardError::TooShort { bars, train, lookback });
    }

    let cycles = cycles as usize;
    Ok((0..cycles)
        .map(|k| {
            let start = k * test;
            let test_start = start + train;
            let test_end = if k + 1 == cycles { bars } else { test_start + test };
            WfoFrame { cycle: k, train: start..test_start, test: test_start..test_end }
        })
        .collect())
}

/// Outcome of one cycle.
#[derive(Debug, Clone)]
pub struct WfoCycle {
    pub frame: WfoFrame,
    pub params: Params,
    pub train_score: f64,
    pub test: RunResult,
}

impl WfoCycle {
    pub fn won(&self) -> bool {
        self.test.net_profit() > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct WalkForwardReport {
    pub cycles: Vec<WfoCycle>,
    pub num_wfo_win: u32,
    pub num_wfo_loss: u32,
}

impl WalkForwardReport {
    /// Net profit over all out-of-sample frames.
    pub fn oos_net_profit(&self) -> f64 {
        self.cycles.iter().map(|c| c.test.net_profit()).sum()
    }

    pub fn oos_trades(&self) -> usize {
        self.cycles.iter().map(|c| c.test.trades.len()).sum()
    }
}

/// Train on each frame with the configured sweep, then run the best
/// parameters out of sample.
pub fn walk_forward(config: &RunConfig, data: &MarketData) -> Result<WalkForwardReport, WalkForwardError> {
    let sim = &config.simulation;
    let frames = frames(data.len(), sim.num_wfo_cycles, sim.data_split, sim.lookback)?;
    let sweep = ParamSweep::new(config)?;

    let mut cycles = Vec::with_capacity(frames.len());
    let (mut won, mut lost) = (0u32, 0u32);
    for frame in frames {
        let trained = sweep.run(&data.slice(frame.train.clone()), sim.lookback)?;
        let Some(best) = trained.best() else {
            continue;
        };

        let warm = frame.test.start.saturating_sub(sim.lookback);
        let mut test_sim = sim.clone();
        test_sim.lookback = frame.test.start - warm;
        test_sim.core = 0;
        let test = run_with(config, test_sim, data.slice(warm..frame.test.end), &best.params)?;

        let cycle = WfoCycle { frame, params: best.params.clone(), train_score: best.score, test };
        if cycle.won() {
            won += 1;
        } else {
            lost += 1;
        }
        info!(
            cycle = cycle.frame.cycle,
            params = ?cycle.params,
            oos_net = cycle.test.net_profit(),
            "walk-forward cycle"
        );
        cycles.push(cycle);
    }
    Ok(WalkForwardReport { cycles, num_wfo_win: won, num_wfo_loss: lost })
}
