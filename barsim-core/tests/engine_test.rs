//! End-to-end trade lifecycle scenarios through the bar loop.

use barsim_core::data::MarketData;
use barsim_core::domain::{AssetParams, Bar, CloseReason, Performance, Tick, TradeHandle, TradeId};
use barsim_core::engine::{
    EntryOrder, ExitOrder, Platform, SimConfig, SimContext, Simulation, Strategy, TradeSettings,
};
use barsim_core::EngineError;

const DAY0: f64 = 45_000.0;
const HOUR: f64 = 1.0 / 24.0;

// ── Helpers ──────────────────────────────────────────────────────────

fn bar_time(i: usize) -> f64 {
    DAY0 + (i + 1) as f64 * HOUR
}

fn hourly(closes: &[f64]) -> Vec<Bar> {
    closes.iter().enumerate().map(|(i, c)| Bar::flat(bar_time(i), *c)).collect()
}

fn asset(name: &str, pip: f64) -> AssetParams {
    AssetParams { pip, pip_cost: 1.0, ..AssetParams::named(name) }
}

fn context(keep_closed: bool) -> SimContext {
    let config = SimConfig { lookback: 0, max_bars: 1_000, keep_closed, ..SimConfig::default() };
    SimContext::new(config, TradeSettings::default()).unwrap()
}

fn run_all<S: Strategy>(sim: &mut Simulation<S>) {
    while sim.step().unwrap() {}
}

// ── Stopped by a tick beyond the stop ────────────────────────────────

struct ShortOnce;

impl Strategy for ShortOnce {
    fn name(&self) -> &str {
        "short_once"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        if p.state().bar == 0 {
            p.enter_short(EntryOrder::new().stop(0.0050));
        }
        Ok(())
    }
}

#[test]
fn short_stopped_by_tick_past_stop() {
    let bars = vec![
        Bar::flat(bar_time(0), 1.2000),
        Bar::new(bar_time(1), 1.2000, 1.2051, 1.1990, 1.2020),
        Bar::flat(bar_time(2), 1.2020),
    ];
    let mut data = MarketData::single(asset("EUR/USD", 0.0001), bars);
    let ticks = [
        Tick::new(bar_time(0) + 0.25 * HOUR, 1.2010),
        Tick::new(bar_time(0) + 0.50 * HOUR, 1.2051),
        Tick::new(bar_time(0) + 0.75 * HOUR, 1.2020),
    ];
    data.attach_ticks(0, &ticks);

    let result = Simulation::new(context(false), data, ShortOnce).unwrap().run().unwrap();
    assert_eq!(result.trades.len(), 1);
    let t = &result.trades[0];
    assert_eq!(t.reason, CloseReason::Stopped);
    assert_eq!(t.bar_open, 0);
    assert_eq!(t.bar_close, 1);
    assert!(t.result < 0.0);
    assert!((t.entry_price - 1.2000).abs() < 1e-9);
}

// ── Win, win, loss ───────────────────────────────────────────────────

struct InAndOut;

impl Strategy for InAndOut {
    fn name(&self) -> &str {
        "in_and_out"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        match p.state().bar {
            1 | 3 | 5 => {
                p.enter_long(EntryOrder::new());
            }
            2 | 4 | 6 => {
                p.exit_long(ExitOrder::default());
            }
            _ => {}
        }
        Ok(())
    }
}

#[test]
fn win_win_loss_streaks() {
    let data = MarketData::single(
        asset("TEST", 0.01),
        hourly(&[100.0, 100.0, 101.0, 100.0, 102.0, 100.0, 99.0, 99.0]),
    );
    let result = Simulation::new(context(false), data, InAndOut).unwrap().run().unwrap();

    let reasons: Vec<CloseReason> = result.trades.iter().map(|t| t.reason).collect();
    assert_eq!(reasons, vec![CloseReason::Exit; 3]);
    let perf = &result.performance;
    assert_eq!((perf.num_win, perf.num_loss), (2, 1));
    assert_eq!(perf.win_streak_max, 2);
    assert_eq!(perf.loss_streak_max, 1);
    assert_eq!(perf.loss_streak, 1);
    assert_eq!(Performance::from_history(&result.trades, &result.marks), *perf);
}

// ── Pending entry that never fills ───────────────────────────────────

#[derive(Default)]
struct StopEntryWatch {
    handle: Option<TradeHandle>,
    seen_closed: Option<(usize, Option<CloseReason>)>,
}

impl Strategy for StopEntryWatch {
    fn name(&self) -> &str {
        "stop_entry_watch"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        let bar = p.state().bar;
        if bar == 1 {
            self.handle = p.enter_long(EntryOrder::new().entry(-5.0).entry_time(3));
        }
        if let Some(t) = self.handle.and_then(|h| p.trade(h)) {
            if t.is_closed() && self.seen_closed.is_none() {
                self.seen_closed = Some((bar, t.close_reason()));
            }
        }
        Ok(())
    }
}

#[test]
fn pending_window_expires_on_fourth_bar() {
    let data = MarketData::single(asset("TEST", 0.01), hourly(&[100.0; 7]));
    let mut sim = Simulation::new(context(false), data, StopEntryWatch::default()).unwrap();
    run_all(&mut sim);
    assert_eq!(sim.strategy().seen_closed, Some((4, Some(CloseReason::MissedEntry))));

    let result = sim.finish();
    assert!(result.trades.is_empty());
    assert_eq!(result.num_rejected, 1);
}

// ── Recycling ────────────────────────────────────────────────────────

#[derive(Default)]
struct Recycler {
    handle: Option<TradeHandle>,
    id: Option<TradeId>,
    reachable_after_close: Option<(bool, bool)>,
}

impl Strategy for Recycler {
    fn name(&self) -> &str {
        "recycler"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        match p.state().bar {
            1 => {
                self.handle = p.enter_long(EntryOrder::new());
                self.id = self.handle.and_then(|h| p.trade(h)).and_then(|t| t.id());
            }
            2 => {
                p.exit_long(ExitOrder::default());
            }
            3 => {
                let by_handle = self.handle.and_then(|h| p.trade(h)).is_some();
                let by_id = self.id.and_then(|id| p.find_trade(id)).is_some();
                self.reachable_after_close = Some((by_handle, by_id));
            }
            _ => {}
        }
        Ok(())
    }
}

#[test]
fn closed_trades_are_unreachable_after_recycling() {
    let data = MarketData::single(asset("TEST", 0.01), hourly(&[100.0; 5]));
    let mut sim = Simulation::new(context(false), data, Recycler::default()).unwrap();
    run_all(&mut sim);
    assert!(sim.strategy().id.is_some());
    assert_eq!(sim.strategy().reachable_after_close, Some((false, false)));
}

#[test]
fn keep_closed_leaves_trades_reachable() {
    let data = MarketData::single(asset("TEST", 0.01), hourly(&[100.0; 5]));
    let mut sim = Simulation::new(context(true), data, Recycler::default()).unwrap();
    run_all(&mut sim);
    assert_eq!(sim.strategy().reachable_after_close.map(|r| r.0), Some(true));
}

// ── Multi-asset ──────────────────────────────────────────────────────

struct TradeSecond;

impl Strategy for TradeSecond {
    fn name(&self) -> &str {
        "trade_second"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        if p.state().bar == 0 {
            p.asset("B")?;
            p.enter_long(EntryOrder::new());
        }
        Ok(())
    }
}

#[test]
fn trades_follow_the_selected_asset() {
    let data = MarketData::align(vec![
        (asset("A", 0.01), hourly(&[10.0, 11.0, 12.0])),
        (asset("B", 0.01), hourly(&[50.0, 49.0, 48.0])),
    ]);
    let result = Simulation::new(context(false), data, TradeSecond).unwrap().run().unwrap();
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].asset, "B");
    assert_eq!(result.trades[0].reason, CloseReason::Sold);
    assert!(result.trades[0].result < 0.0);
}

// ── Repeatability ────────────────────────────────────────────────────

struct ThreeExits;

impl Strategy for ThreeExits {
    fn name(&self) -> &str {
        "three_exits"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        match p.state().bar {
            0 => {
                p.enter_long(EntryOrder::new().stop(1.0));
            }
            3 => {
                p.enter_long(EntryOrder::new().take_profit(1.0));
            }
            6 => {
                p.enter_long(EntryOrder::new().exit_time(2));
            }
            _ => {}
        }
        Ok(())
    }
}

fn three_exit_bars() -> Vec<Bar> {
    vec![
        Bar::flat(bar_time(0), 100.0),
        Bar::new(bar_time(1), 100.0, 100.5, 98.5, 99.0),
        Bar::flat(bar_time(2), 99.0),
        Bar::flat(bar_time(3), 100.0),
        Bar::new(bar_time(4), 100.0, 101.5, 99.8, 101.2),
        Bar::flat(bar_time(5), 101.0),
        Bar::flat(bar_time(6), 101.0),
        Bar::flat(bar_time(7), 101.0),
        Bar::flat(bar_time(8), 101.0),
        Bar::flat(bar_time(9), 101.0),
    ]
}

#[test]
fn repeated_runs_close_on_the_same_bar_for_the_same_reason() {
    let run = || {
        let data = MarketData::single(asset("TEST", 0.01), three_exit_bars());
        Simulation::new(context(false), data, ThreeExits).unwrap().run().unwrap()
    };
    let first = run();
    let second = run();

    let closes: Vec<(CloseReason, usize)> = first.trades.iter().map(|t| (t.reason, t.bar_close)).collect();
    assert_eq!(
        closes,
        vec![(CloseReason::Stopped, 1), (CloseReason::ProfitTarget, 4), (CloseReason::Timeout, 8)]
    );
    assert_eq!(first.trades, second.trades);
    for (a, b) in first.trades.iter().zip(&second.trades) {
        assert_eq!(a.exit_price.to_bits(), b.exit_price.to_bits());
    }
}
