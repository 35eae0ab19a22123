//! barsim runner: run orchestration on top of `barsim-core`.
//!
//! - TOML run configuration with a content-hash run id
//! - History loading and single runs
//! - Grid parameter sweeps on a rayon pool
//! - Walk-forward optimization
//! - Monte Carlo drawdown analysis
//! - CSV/JSON artifact export

pub mod config;
pub mod export;
pub mod monte_carlo;
pub mod runner;
pub mod sweep;
pub mod walk_forward;

pub use config::{AssetSource, ConfigError, Objective, ParamRange, RunConfig, RunId, SweepSection};
pub use export::{save_artifacts, RunSummary, SCHEMA_VERSION};
pub use monte_carlo::{monte_carlo, seeded_rng, MonteCarloReport};
pub use runner::{load_market_data, run_config, run_once, run_with, RunError};
pub use sweep::{ParamGrid, ParamSweep, SweepError, SweepPoint, SweepResults};
pub use walk_forward::{walk_forward, WalkForwardError, WalkForwardReport, WfoCycle, WfoFrame};


#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn runner_types_are_send_sync() {
        assert_send_sync::<RunConfig>();
        assert_send_sync::<RunSummary>();
        assert_send_sync::<MonteCarloReport>();
        assert_send_sync::<SweepResults>();
        assert_send_sync::<WalkForwardReport>();
    }
}
