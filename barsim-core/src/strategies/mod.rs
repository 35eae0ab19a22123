//! Built-in strategies and the name-based factory used by the runner and CLI.

mod channel_breakout;
mod sma_crossover;

pub use channel_breakout::ChannelBreakout;
pub use sma_crossover::SmaCrossover;

use crate::engine::Strategy;
use std::collections::BTreeMap;
use thiserror::Error;

/// Strategy parameters by name.
pub type Params = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{0}'")]
    Unknown(String),
    #[error("invalid parameter {name}: {reason}")]
    BadParam { name: &'static str, reason: String },
}

/// Named parameter, falling back to `default`.
fn param(params: &Params, name: &str, default: f64) -> f64 {
    params.get(name).copied().unwrap_or(default)
}

/// Named parameter that must be a positive whole number.
fn param_count(params: &Params, name: &'static str, default: usize) -> Result<usize, StrategyError> {
    let value = param(params, name, default as f64);
    if value < 1.0 || value.fract() != 0.0 {
        return Err(StrategyError::BadParam { name, reason: format!("expected a positive integer, got {value}") });
    }
    Ok(value as usize)
}

pub const NAMES: [&str; 2] = [SmaCrossover::NAME, ChannelBreakout::NAME];

/// Build a built-in strategy by name.
pub fn build(name: &str, params: &Params) -> Result<Box<dyn Strategy>, StrategyError> {
    match name {
        SmaCrossover::NAME => Ok(Box::new(SmaCrossover::from_params(params)?)),
        ChannelBreakout::NAME => Ok(Box::new(ChannelBreakout::from_params(params)?)),
        other => Err(StrategyError::Unknown(other.to_string())),
    }
}
