//! Grid parameter sweep.
//!
//! Every parameter combination runs in its own [`SimContext`] on a rayon
//! pool of `num_cores` threads. Combinations the strategy rejects (for
//! example a fast period above the slow one) are skipped.
//!
//! [`SimContext`]: barsim_core::engine::SimContext

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use barsim_core::data::MarketData;
use barsim_core::domain::{Performance, Status};
use barsim_core::engine::RunResult;
use barsim_core::strategies::{self, Params};

use crate::config::{Objective, RunConfig, SweepSection};
use crate::runner::{run_with, RunError};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("config has no [sweep] section")]
    NoSweep,
    #[error("no parameter combination is valid for '{0}'")]
    Empty(String),
    #[error("cannot build thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Run(#[from] RunError),
}

impl Objective {
    /// Score of a finished run; higher is better. NaN scores rank last.
    pub fn score(self, perf: &Performance) -> f64 {
        let value = match self {
            Objective::NetProfit => perf.net_profit(),
            Objective::ProfitFactor => perf.profit_factor(),
            Objective::WinRate => perf.win_rate(),
        };
        if value.is_nan() {
            f64::NEG_INFINITY
        } else {
            value
        }
    }
}

// ─── Grid ───────────────────────────────────────────────────────────

/// Cartesian grid over named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    /// Axes in name order.
    pub axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn from_section(section: &SweepSection) -> Self {
        Self {
            axes: section.params.iter().map(|(name, range)| (name.clone(), range.values())).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    /// All combinations, each layered over `base`. The last axis varies fastest.
    pub fn combinations(&self, base: &Params) -> Vec<Params> {
        let mut out = vec![base.clone()];
        for (name, values) in &self.axes {
            out = out
                .iter()
                .flat_map(|params| {
                    values.iter().map(move |&v| {
                        let mut p = params.clone();
                        p.insert(name.clone(), v);
                        p
                    })
                })
                .collect();
        }
        out
    }
}

// ─── Execution ──────────────────────────────────────────────────────

/// One evaluated grid point.
#[derive(Debug, Clone)]
pub struct SweepPoint {
    pub params: Params,
    pub score: f64,
    pub result: RunResult,
}

pub struct ParamSweep<'a> {
    config: &'a RunConfig,
    grid: ParamGrid,
    objective: Objective,
}

impl<'a> ParamSweep<'a> {
    pub fn new(config: &'a RunConfig) -> Result<Self, SweepError> {
        let section = config.sweep.as_ref().ok_or(SweepError::NoSweep)?;
        Ok(Self { config, grid: ParamGrid::from_section(section), objective: section.objective })
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Evaluate every valid combination on `data` with the given lookback.
    pub fn run(&self, data: &MarketData, lookback: usize) -> Result<SweepResults, SweepError> {
        let name = &self.config.strategy.name;
        let combos: Vec<Params> = self
            .grid
            .combinations(&self.config.strategy.params)
            .into_iter()
            .filter(|p| match strategies::build(name, p) {
                Ok(_) => true,
                Err(e) => {
                    debug!(?p, error = %e, "skipping combination");
                    false
                }
            })
            .collect();
        if combos.is_empty() {
            return Err(SweepError::Empty(name.clone()));
        }

        let cores = self.config.simulation.num_cores.max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(cores).build()?;
        info!(strategy = %name, combinations = combos.len(), cores, "starting sweep");

        let points = pool.install(|| {
            combos
                .par_iter()
                .enumerate()
                .map(|(i, params)| {
                    let mut sim = self.config.simulation.clone();
                    sim.core = i % cores + 1;
                    sim.lookback = lookback;
                    let result = run_with(self.config, sim, data.clone(), params)?;
                    let score = self.objective.score(&result.performance);
                    Ok(SweepPoint { params: params.clone(), score, result })
                })
                .collect::<Result<Vec<_>, RunError>>()
        })?;

        let results = SweepResults::new(self.grid.clone(), points);
        if let Some(best) = results.best() {
            info!(params = ?best.params, score = best.score, "sweep finished");
        }
        Ok(results)
    }
}

/// Results in grid order.
#[derive(Debug, Clone)]
pub struct SweepResults {
    grid: ParamGrid,
    points: Vec<SweepPoint>,
}

impl SweepResults {
    fn new(grid: ParamGrid, points: Vec<SweepPoint>) -> Self {
        Self { grid, points }
    }

    pub fn all(&self) -> &[SweepPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points sorted by score, best first. Ties keep grid order.
    pub fn ranked(&self) -> Vec<&SweepPoint> {
        let mut sorted: Vec<_> = self.points.iter().collect();
        sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<&SweepPoint> {
        self.ranked().into_iter().take(n).collect()
    }

    pub fn best(&self) -> Option<&SweepPoint> {
        self.ranked().into_iter().next()
    }

    /// The best run's statuses with the winning parameters stored in the
    /// optimizer state of every component of `algo`.
    pub fn trained_statuses(&self, algo: &str) -> Vec<Status> {
        let Some(best) = self.best() else {
            return Vec::new();
        };
        let params: Vec<f64> =
            self.grid.axes.iter().filter_map(|(name, _)| best.params.get(name).copied()).collect();
        let steps: Vec<u32> = self.grid.axes.iter().map(|(_, v)| v.len() as u32).collect();
        let objective: Vec<f64> = self.points.iter().map(|p| p.score).collect();

        let mut statuses = best.result.statuses.clone();
        for status in statuses.iter_mut().filter(|s| s.key.algo == algo) {
            status.optimizer.set_params(&params);
            status.optimizer.steps = steps.clone();
            status.optimizer.objective = objective.clone();
        }
        statuses
    }
}
