//! Moving average crossover with market entries.
//!
//! Goes long when the fast SMA of the close crosses above the slow SMA and
//! short on the opposite cross. With the default `Hedge::None` each entry
//! reverses the opposite position.

use super::{param, param_count, Params, StrategyError};
use crate::engine::{EntryOrder, Platform, Strategy};
use crate::error::EngineError;
use crate::flags::is_nil;
use crate::series::Series;

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    pub fast: usize,
    pub slow: usize,
    /// Stop distance in price units; 0 uses the trade settings.
    pub stop: f64,
    pub take_profit: f64,
    closes: Series,
    fast_ma: Series,
    slow_ma: Series,
    seen: usize,
}

impl SmaCrossover {
    pub const NAME: &'static str = "sma_crossover";

    pub fn new(fast: usize, slow: usize) -> Result<Self, StrategyError> {
        if fast == 0 || slow <= fast {
            return Err(StrategyError::BadParam {
                name: "slow",
                reason: format!("need 0 < fast < slow, got {fast} / {slow}"),
            });
        }
        Ok(Self {
            fast,
            slow,
            stop: 0.0,
            take_profit: 0.0,
            closes: Series::new(slow, 0.0),
            fast_ma: Series::new(2, 0.0),
            slow_ma: Series::new(2, 0.0),
            seen: 0,
        })
    }

    pub fn from_params(params: &Params) -> Result<Self, StrategyError> {
        let mut s = Self::new(param_count(params, "fast", 10)?, param_count(params, "slow", 30)?)?;
        s.stop = param(params, "stop", 0.0);
        s.take_profit = param(params, "take_profit", 0.0);
        Ok(s)
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        p.algo(Self::NAME);
        Ok(())
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        let close = p.price_close(0);
        if is_nil(close) {
            return Ok(());
        }
        self.closes.push(close);
        self.seen += 1;
        self.fast_ma.push(self.closes.mean(self.fast));
        self.slow_ma.push(self.closes.mean(self.slow));
        // both averages need a full window on this bar and the one before
        if self.seen <= self.slow {
            return Ok(());
        }

        let order = EntryOrder::new().stop(self.stop).take_profit(self.take_profit);
        if self.fast_ma.cross_over(&self.slow_ma) {
            p.enter_long(order);
        } else if self.fast_ma.cross_under(&self.slow_ma) {
            p.enter_short(order);
        }
        Ok(())
    }
}
