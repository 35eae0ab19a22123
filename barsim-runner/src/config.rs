//! Serializable run configuration, read from TOML.
//!
//! ```toml
//! [simulation]
//! bar_period = 60
//! lookback = 50
//! capital = 10000
//!
//! [trade]
//! lots = 1
//! stop = 0.5
//!
//! [fill]
//! model = "gap"
//! slippage = 0.01
//!
//! [[assets]]
//! name = "EUR/USD"
//! history = "data/eurusd.t6"
//! pip = 0.0001
//!
//! [strategy]
//! name = "sma_crossover"
//! params = { fast = 10, slow = 30 }
//!
//! [sweep]
//! objective = "net_profit"
//! params = { fast = { start = 5, end = 20, step = 5 } }
//! ```

use barsim_core::domain::AssetParams;
use barsim_core::engine::{FillKind, SimConfig, TradeSettings};
use barsim_core::flags::MAX_STEPS;
use barsim_core::strategies::{self, Params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run configuration (content hash).
pub type RunId = String;

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One traded instrument and where its history comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSource {
    #[serde(flatten)]
    pub params: AssetParams,
    /// `.t6`, `.t1` or `.csv` price history.
    pub history: PathBuf,
    /// Optional `.t1` ticks replayed inside the bars.
    #[serde(default)]
    pub ticks: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySection {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

/// Inclusive parameter range of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl ParamRange {
    /// Values from `start` to `end` inclusive, at most [`MAX_STEPS`].
    pub fn values(&self) -> Vec<f64> {
        let count = ((self.end - self.start) / self.step).floor() as usize + 1;
        (0..count.min(MAX_STEPS))
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

/// What a sweep maximizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    NetProfit,
    ProfitFactor,
    WinRate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSection {
    #[serde(default)]
    pub objective: Objective,
    /// Grid axes by parameter name.
    pub params: BTreeMap<String, ParamRange>,
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub simulation: SimConfig,
    #[serde(default)]
    pub trade: TradeSettings,
    #[serde(default)]
    pub fill: FillKind,
    pub assets: Vec<AssetSource>,
    pub strategy: StrategySection,
    #[serde(default)]
    pub sweep: Option<SweepSection>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file. Relative history paths are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for a in &mut self.assets {
            if a.history.is_relative() {
                a.history = base.join(&a.history);
            }
            if let Some(t) = a.ticks.as_mut().filter(|t| t.is_relative()) {
                *t = base.join(&*t);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        self.simulation.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.assets.is_empty() {
            return invalid("at least one [[assets]] entry is required".into());
        }
        for a in &self.assets {
            a.params.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        strategies::build(&self.strategy.name, &self.strategy.params)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(sweep) = &self.sweep {
            if sweep.params.is_empty() {
                return invalid("[sweep] needs at least one parameter".into());
            }
            for (name, r) in &sweep.params {
                if !(r.step > 0.0) || r.end < r.start {
                    return invalid(format!("sweep range for '{name}' needs step > 0 and end >= start"));
                }
            }
        }
        Ok(())
    }

    /// Deterministic content hash; equal configs share a run id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [simulation]
        bar_period = 1440
        lookback = 20
        capital = 5000

        [trade]
        stop = 2.5

        [[assets]]
        name = "SPY"
        history = "spy.csv"
        pip = 0.01
        pip_cost = 1

        [strategy]
        name = "sma_crossover"
        params = { fast = 5, slow = 20 }

        [sweep]
        params = { fast = { start = 2, end = 8, step = 2 } }
    "#;

    #[test]
    fn parses_sample() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.simulation.bar_period, 1440.0);
        assert_eq!(config.simulation.max_trades, SimConfig::default().max_trades);
        assert_eq!(config.trade.stop, 2.5);
        assert_eq!(config.trade.lots, 1);
        assert_eq!(config.assets[0].params.name, "SPY");
        assert_eq!(config.assets[0].params.pip, 0.01);
        assert_eq!(config.fill, FillKind::Naive);
        assert_eq!(config.strategy.params["slow"], 20.0);
        let sweep = config.sweep.unwrap();
        assert_eq!(sweep.objective, Objective::NetProfit);
        assert_eq!(sweep.params["fast"].values(), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn run_id_is_stable_and_content_addressed() {
        let a = RunConfig::from_toml_str(SAMPLE).unwrap();
        let mut b = a.clone();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        b.simulation.capital = 6000.0;
        assert_ne!(a.run_id().unwrap(), b.run_id().unwrap());
    }

    #[test]
    fn rejects_unknown_strategy_and_bad_ranges() {
        let bad = SAMPLE.replace("sma_crossover", "nope");
        assert!(matches!(RunConfig::from_toml_str(&bad), Err(ConfigError::Invalid(_))));
        let bad = SAMPLE.replace("step = 2", "step = 0");
        assert!(matches!(RunConfig::from_toml_str(&bad), Err(ConfigError::Invalid(_))));
        assert!(matches!(RunConfig::from_toml_str("[strategy"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.assets[0].history, dir.path().join("spy.csv"));
    }
}
