//! Channel breakout with pending stop entries.
//!
//! While flat, places a buy stop at the highest high and a sell stop at
//! the lowest low of the last `period` bars. Orders wait `wait` bars for a
//! fill; open trades carry a stop and an optional trailing stop. Once one
//! side fills, the order on the other side is cancelled.

use super::{param, param_count, Params, StrategyError};
use crate::engine::{EntryOrder, ExitOrder, Hedge, Platform, Strategy, TradeFilter};
use crate::error::EngineError;
use crate::flags::is_nil;

#[derive(Debug, Clone)]
pub struct ChannelBreakout {
    pub period: usize,
    /// Bars a pending entry waits.
    pub wait: u32,
    pub stop: f64,
    pub trail: f64,
}

impl ChannelBreakout {
    pub const NAME: &'static str = "channel_breakout";

    pub fn new(period: usize, wait: u32) -> Self {
        Self { period, wait, stop: 0.0, trail: 0.0 }
    }

    pub fn from_params(params: &Params) -> Result<Self, StrategyError> {
        let mut s = Self::new(param_count(params, "period", 20)?, param_count(params, "wait", 3)? as u32);
        s.stop = param(params, "stop", 0.0);
        s.trail = param(params, "trail", 0.0);
        if s.stop < 0.0 || s.trail < 0.0 {
            return Err(StrategyError::BadParam { name: "stop", reason: "distances must not be negative".into() });
        }
        Ok(s)
    }

    /// Highest high and lowest low of bars `1..=period`; `None` while the
    /// history is shorter.
    fn channel(&self, p: &dyn Platform) -> Option<(f64, f64)> {
        let mut hi = f64::MIN;
        let mut lo = f64::MAX;
        for offset in 1..=self.period {
            let (h, l) = (p.price_high(offset), p.price_low(offset));
            if is_nil(h) || is_nil(l) {
                return None;
            }
            hi = hi.max(h);
            lo = lo.min(l);
        }
        Some((hi, lo))
    }
}

impl Strategy for ChannelBreakout {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        p.algo(Self::NAME);
        // both entry orders wait side by side
        p.settings_mut().hedge = Hedge::Full;
        Ok(())
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        if !p.trades(&TradeFilter::open().algo(Self::NAME)).is_empty() {
            for h in p.trades(&TradeFilter::pending().algo(Self::NAME)) {
                p.exit_trade(h, ExitOrder::default());
            }
            return Ok(());
        }
        if !p.trades(&TradeFilter::pending().algo(Self::NAME)).is_empty() {
            return Ok(());
        }
        let price = p.price_close(0);
        let Some((hi, lo)) = self.channel(p) else { return Ok(()) };
        if is_nil(price) {
            return Ok(());
        }

        let order = EntryOrder::new().stop(self.stop).trail(self.trail).entry_time(self.wait);
        // negative entry distance places a stop entry away from the price
        if hi > price {
            p.enter_long(order.entry(-(hi - price)));
        }
        if lo < price {
            p.enter_short(order.entry(-(price - lo)));
        }
        Ok(())
    }
}
