//! The bar loop: drives a [`SimContext`] over aligned market data and calls
//! the strategy once per global bar.
//!
//! Per bar:
//! 1. Start of bar: recycle closed trades, detect a new day, lookback flag
//! 2. Feed: every asset with a bar at this time advances its history
//! 3. Trades: pending fills, exits, trailing, trade managers
//! 4. Strategy: `Strategy::run` with the first asset selected
//! 5. End of bar: account recompute and bar mark
//!
//! Teardown happens in [`Simulation::finish`], or on drop if the
//! simulation was abandoned.

use super::context::SimContext;
use super::platform::Platform;
use crate::data::MarketData;
use crate::domain::{AssetId, BarMark, CloseReason, Performance, Status, Trade, TradeRecord};
use crate::error::EngineError;
use crate::flags::status;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// User strategy code. `run` is called once per bar after the trades of
/// the bar have been processed.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Called once before the first bar, with `INITRUN` set.
    fn init(&mut self, _p: &mut dyn Platform) -> Result<(), EngineError> {
        Ok(())
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError>;

    /// Called once after the last bar, with `EXITRUN` set and before open
    /// trades are closed.
    fn exit(&mut self, _p: &mut dyn Platform) {}
}

impl<T: Strategy + ?Sized> Strategy for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn init(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        (**self).init(p)
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        (**self).run(p)
    }

    fn exit(&mut self, p: &mut dyn Platform) {
        (**self).exit(p)
    }
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub strategy: String,
    /// Closed trades in closing order.
    pub trades: Vec<TradeRecord>,
    pub marks: Vec<BarMark>,
    pub daily_equity: Vec<f64>,
    pub performance: Performance,
    pub statuses: Vec<Status>,
    pub final_balance: f64,
    pub final_equity: f64,
    pub num_rejected: u32,
    pub last_error: Option<String>,
    /// Trades still live at the end; empty unless the run is open-ended.
    pub open_trades: Vec<Trade>,
}

impl RunResult {
    pub fn balance_curve(&self) -> Vec<f64> {
        self.marks.iter().map(|m| m.balance).collect()
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.marks.iter().map(|m| m.equity).collect()
    }

    pub fn net_profit(&self) -> f64 {
        self.performance.net_profit()
    }
}

pub struct Simulation<S: Strategy> {
    ctx: Option<SimContext>,
    data: MarketData,
    ids: Vec<AssetId>,
    strategy: S,
    next: usize,
    initialized: bool,
    stopped: bool,
}

impl<S: Strategy> std::fmt::Debug for Simulation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("strategy", &self.strategy.name())
            .field("next", &self.next)
            .field("bars", &self.data.len())
            .finish()
    }
}

/// One global bar, without the halt check.
fn bar_step<S: Strategy>(
    ctx: &mut SimContext,
    data: &MarketData,
    ids: &[AssetId],
    strategy: &mut S,
    g: usize,
) -> Result<(), EngineError> {
    ctx.start_bar(g, data.times[g])?;
    for (i, series) in data.series.iter().enumerate() {
        if let Some(bar) = &series.bars[g] {
            ctx.feed_asset(ids[i], bar, data.ticks_at(i, g))?;
        }
    }
    ctx.process_trades();
    ctx.state_mut().asset = ids.first().copied();
    if let Err(err) = strategy.run(ctx) {
        ctx.fail(err);
    }
    ctx.end_bar()
}

impl<S: Strategy> Simulation<S> {
    /// Register every asset of `data` with the context and select the first.
    pub fn new(mut ctx: SimContext, data: MarketData, strategy: S) -> Result<Self, EngineError> {
        let ids = data
            .series
            .iter()
            .map(|s| ctx.asset_add(s.params.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let state = ctx.state_mut();
        state.asset = ids.first().copied();
        state.num_bars = data.len();
        Ok(Self { ctx: Some(ctx), data, ids, strategy, next: 0, initialized: false, stopped: false })
    }

    pub fn context(&self) -> Option<&SimContext> {
        self.ctx.as_ref()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Run one global bar. `Ok(false)` once the data is exhausted.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        let Some(ctx) = self.ctx.as_mut() else { return Ok(false) };
        if self.stopped || self.next >= self.data.len() {
            return Ok(false);
        }
        if !self.initialized {
            self.initialized = true;
            info!(strategy = self.strategy.name(), bars = self.data.len(), assets = self.ids.len(), "run start");
            ctx.state_mut().set_flag(status::INITRUN, true);
            let init = self.strategy.init(ctx);
            ctx.state_mut().set_flag(status::INITRUN, false);
            if let Err(err) = init {
                ctx.fail(err);
            }
        }

        let g = self.next;
        if let Err(err) = bar_step(ctx, &self.data, &self.ids, &mut self.strategy, g) {
            ctx.fail(err);
        }
        self.next += 1;
        match ctx.take_halt() {
            Some(err) => {
                self.stopped = true;
                Err(err)
            }
            None => Ok(true),
        }
    }

    /// Run to the end of the data and tear down.
    pub fn run(mut self) -> Result<RunResult, EngineError> {
        while self.step()? {}
        Ok(self.finish())
    }

    fn teardown(ctx: &mut SimContext, strategy: &mut S, initialized: bool) {
        ctx.state_mut().set_flag(status::EXITRUN, true);
        if initialized {
            strategy.exit(ctx);
        }
        if !ctx.config().open_end() {
            let closed = ctx.close_all(CloseReason::Sold);
            debug!(closed, "open trades closed at end of run");
            ctx.state_mut().account.reset_open();
        }
    }

    /// Close out and collect the results. Open trades are sold at market
    /// unless the run is open-ended.
    pub fn finish(mut self) -> RunResult {
        let name = self.strategy.name().to_string();
        let Some(mut ctx) = self.ctx.take() else {
            return RunResult::empty(name);
        };
        Self::teardown(&mut ctx, &mut self.strategy, self.initialized);

        let equity = ctx.state().account.equity;
        let capacity = ctx.config().max_bars;
        if let Err(err) = ctx.state_mut().push_daily(equity, capacity) {
            ctx.fail(err);
        }
        let (mut state, trades, statuses, open_trades) = ctx.into_parts();
        state.performance.finalize(&state.marks);
        info!(
            strategy = %name,
            trades = trades.len(),
            balance = state.account.balance,
            rejected = state.num_rejected,
            "run end"
        );
        RunResult {
            strategy: name,
            trades,
            marks: state.marks,
            daily_equity: state.daily_equity,
            performance: state.performance,
            statuses,
            final_balance: state.account.balance,
            final_equity: state.account.equity,
            num_rejected: state.num_rejected,
            last_error: state.last_error,
            open_trades,
        }
    }
}

impl RunResult {
    fn empty(strategy: String) -> Self {
        Self {
            strategy,
            trades: Vec::new(),
            marks: Vec::new(),
            daily_equity: Vec::new(),
            performance: Performance::default(),
            statuses: Vec::new(),
            final_balance: 0.0,
            final_equity: 0.0,
            num_rejected: 0,
            last_error: None,
            open_trades: Vec::new(),
        }
    }
}

impl<S: Strategy> Drop for Simulation<S> {
    fn drop(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            Self::teardown(&mut ctx, &mut self.strategy, self.initialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetParams, Bar};
    use crate::engine::config::{SimConfig, TradeSettings};
    use crate::engine::platform::EntryOrder;

    const DAY0: f64 = 45_000.0;

    /// Goes long on bar `at` and never exits.
    struct BuyOnce {
        at: usize,
        exits: u32,
    }

    impl Strategy for BuyOnce {
        fn name(&self) -> &str {
            "buy_once"
        }

        fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
            if p.state().bar == self.at {
                p.enter_long(EntryOrder::new());
            }
            Ok(())
        }

        fn exit(&mut self, _p: &mut dyn Platform) {
            self.exits += 1;
        }
    }

    fn data(closes: &[f64]) -> MarketData {
        let bars = closes.iter().enumerate().map(|(i, c)| Bar::flat(DAY0 + i as f64 / 24.0, *c)).collect();
        let mut params = AssetParams::named("TEST");
        params.pip = 0.01;
        params.pip_cost = 1.0;
        MarketData::single(params, bars)
    }

    fn config(lookback: usize) -> SimConfig {
        SimConfig { lookback, max_bars: 1_000, ..SimConfig::default() }
    }

    #[test]
    fn finish_sells_open_trades() {
        let ctx = SimContext::new(config(1), TradeSettings::default()).unwrap();
        let sim = Simulation::new(ctx, data(&[100.0, 100.0, 101.0, 103.0]), BuyOnce { at: 1, exits: 0 }).unwrap();
        let result = sim.run().unwrap();
        assert_eq!(result.marks.len(), 4);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].reason, CloseReason::Sold);
        assert!(result.open_trades.is_empty());
        assert!((result.final_balance - 10_300.0).abs() < 1e-6);
        assert_eq!(result.final_balance, result.final_equity);
        assert_eq!(result.daily_equity.len(), 1);
    }

    #[test]
    fn open_end_keeps_trades() {
        let cfg = SimConfig { mode: crate::flags::mode::OPENEND, ..config(1) };
        let ctx = SimContext::new(cfg, TradeSettings::default()).unwrap();
        let sim = Simulation::new(ctx, data(&[100.0, 100.0, 102.0]), BuyOnce { at: 1, exits: 0 }).unwrap();
        let result = sim.run().unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.open_trades.len(), 1);
        assert!((result.final_equity - 10_200.0).abs() < 1e-6);
    }

    #[test]
    fn stepping_and_exit_hook() {
        let ctx = SimContext::new(config(0), TradeSettings::default()).unwrap();
        let mut sim = Simulation::new(ctx, data(&[1.0, 2.0]), BuyOnce { at: 9, exits: 0 }).unwrap();
        assert!(sim.step().unwrap());
        assert!(sim.step().unwrap());
        assert!(!sim.step().unwrap());
        assert_eq!(sim.context().map(|c| c.state().bar), Some(1));
        let result = sim.finish();
        assert_eq!(result.strategy, "buy_once");
        assert_eq!(result.performance.num_trades(), 0);
    }

    #[test]
    fn trade_storage_exhaustion_stops_the_loop() {
        struct Spam;
        impl Strategy for Spam {
            fn name(&self) -> &str {
                "spam"
            }
            fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
                p.enter_long(EntryOrder::new());
                Ok(())
            }
        }
        let settings = TradeSettings { hedge: crate::engine::config::Hedge::Full, ..TradeSettings::default() };
        let cfg = SimConfig { max_trades: 2, ..config(0) };
        let ctx = SimContext::new(cfg, settings).unwrap();
        let sim = Simulation::new(ctx, data(&[1.0; 10]), Spam).unwrap();
        let err = sim.run().unwrap_err();
        assert!(matches!(err, EngineError::CapacityExhausted { capacity: 2, .. }));
    }
}
