//! Run configuration, split by who may change it.
//!
//! [`SimConfig`] is fixed before the run. [`TradeSettings`] are the defaults
//! strategy callbacks may change between orders.

use crate::error::EngineError;
use crate::flags::mode;
use serde::{Deserialize, Serialize};

/// Set before the run, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Bar period in minutes.
    pub bar_period: f64,
    /// Bars before trading starts. Entries are ignored during lookback.
    pub lookback: usize,
    /// Capacity of every bar-indexed store (asset history, curves).
    pub max_bars: usize,
    /// Capacity of the trade arena.
    pub max_trades: usize,
    /// Start balance.
    pub capital: f64,
    /// Mode switches, see [`crate::flags::mode`].
    pub mode: u32,
    /// Keep closed trades in the arena instead of recycling them next bar.
    pub keep_closed: bool,
    /// Walk-forward cycles; 0 disables walk-forward.
    pub num_wfo_cycles: u32,
    /// In-sample share of each walk-forward frame, percent.
    pub data_split: f64,
    pub num_cores: usize,
    /// Index of this run's core, `1..=num_cores`. 0 when not in a sweep.
    pub core: usize,
    /// Monte Carlo resamples; 0 disables.
    pub monte_carlo: u32,
    /// Monte Carlo confidence level, percent.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bar_period: 60.0,
            lookback: 80,
            max_bars: 100_000,
            max_trades: 1_000,
            capital: 10_000.0,
            mode: 0,
            keep_closed: false,
            num_wfo_cycles: 0,
            data_split: 80.0,
            num_cores: 1,
            core: 0,
            monte_carlo: 0,
            confidence: 95.0,
            seed: 42,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::InvalidConfig(msg));
        if !(self.bar_period > 0.0) {
            return fail(format!("bar_period must be positive, got {}", self.bar_period));
        }
        if self.max_bars == 0 || self.max_trades == 0 {
            return fail("max_bars and max_trades must be at least 1".into());
        }
        if self.lookback >= self.max_bars {
            return fail(format!(
                "lookback {} does not fit into max_bars {}",
                self.lookback, self.max_bars
            ));
        }
        if !(0.0..=100.0).contains(&self.data_split) || !(0.0..=100.0).contains(&self.confidence) {
            return fail("data_split and confidence are percentages".into());
        }
        if self.num_cores == 0 || self.core > self.num_cores {
            return fail(format!("core {} outside 1..={}", self.core, self.num_cores));
        }
        Ok(())
    }

    pub fn has_mode(&self, flag: u32) -> bool {
        self.mode & flag != 0
    }

    /// Open trades stay open at the end of the run.
    pub fn open_end(&self) -> bool {
        self.has_mode(mode::OPENEND)
    }

    /// Bars per day at this bar period.
    pub fn bars_per_day(&self) -> f64 {
        1440.0 / self.bar_period
    }
}

/// What happens to open trades of the opposite side on entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hedge {
    /// Entering one side closes the other side of the same component.
    #[default]
    None,
    /// Long and short trades may coexist.
    Full,
}

/// Order defaults, writable from strategy callbacks.
///
/// Distances are in price units. Zero disables a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSettings {
    pub lots: u32,
    /// Invest this much margin per trade; overrides `lots` when > 0.
    pub margin: f64,
    /// Cap the loss at the stop to this amount; 0 disables.
    pub risk: f64,
    pub stop: f64,
    pub trail: f64,
    pub trail_slope: f64,
    pub trail_lock: f64,
    pub trail_step: f64,
    pub take_profit: f64,
    /// > 0 limit entry distance, < 0 stop entry distance.
    pub entry: f64,
    /// Bars after which an open trade is closed; 0 disables.
    pub exit_time: u32,
    /// Bars a pending entry waits for a fill.
    pub entry_time: u32,
    pub hedge: Hedge,
    /// Max open trades per component and side; 0 disables.
    pub max_long: u32,
    pub max_short: u32,
    pub phantom: bool,
    pub pool: bool,
    /// Stops and targets checked at the bar close only.
    pub bar_only: bool,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            lots: 1,
            margin: 0.0,
            risk: 0.0,
            stop: 0.0,
            trail: 0.0,
            trail_slope: 1.0,
            trail_lock: 0.0,
            trail_step: 0.0,
            take_profit: 0.0,
            entry: 0.0,
            exit_time: 0,
            entry_time: 1,
            hedge: Hedge::None,
            max_long: 0,
            max_short: 0,
            phantom: false,
            pool: false,
            bar_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_bar_period() {
        let cfg = SimConfig { bar_period: 0.0, ..SimConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_core_beyond_pool() {
        let cfg = SimConfig { num_cores: 2, core: 3, ..SimConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn settings_parse_with_defaults() {
        let s: TradeSettings = serde_json::from_str(r#"{"stop": 0.005, "hedge": "full"}"#).unwrap();
        assert_eq!(s.lots, 1);
        assert_eq!(s.stop, 0.005);
        assert_eq!(s.hedge, Hedge::Full);
        assert_eq!(s.trail_slope, 1.0);
    }
}
