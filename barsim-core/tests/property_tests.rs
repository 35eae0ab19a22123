//! Property tests for trade lifecycle and accounting invariants.
//!
//! Uses proptest to verify, over random price paths and order settings:
//! 1. Every closed trade carries exactly one closing reason bit
//! 2. The flag word decodes back to the recorded reason and side
//! 3. Incremental performance equals the batch recomputation
//! 4. Balance equals capital plus the booked results

use barsim_core::data::MarketData;
use barsim_core::domain::{AssetParams, Bar, FlagPhase, Performance};
use barsim_core::engine::{
    EntryOrder, Hedge, Platform, SimConfig, SimContext, Simulation, Strategy as SimStrategy,
    TradeSettings,
};
use barsim_core::EngineError;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.5..1.5_f64, 20..80).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(10.0);
                (price * 100.0).round() / 100.0
            })
            .collect()
    })
}

fn bars(path: &[f64]) -> Vec<Bar> {
    let mut prev = path[0];
    path.iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Bar::new(45_000.0 + i as f64 / 24.0, open, open.max(close) + 0.3, open.min(close) - 0.3, close)
        })
        .collect()
}

/// Alternates long and short entries every `every` bars.
struct Alternate {
    every: usize,
    order: EntryOrder,
}

impl SimStrategy for Alternate {
    fn name(&self) -> &str {
        "alternate"
    }

    fn run(&mut self, p: &mut dyn Platform) -> Result<(), EngineError> {
        let bar = p.state().bar;
        if bar % self.every == 0 {
            if (bar / self.every) % 2 == 0 {
                p.enter_long(self.order);
            } else {
                p.enter_short(self.order);
            }
        }
        Ok(())
    }
}

fn run(path: &[f64], every: usize, order: EntryOrder, hedge: bool, phantom: bool) -> barsim_core::engine::RunResult {
    let config = SimConfig { lookback: 2, max_bars: 1_000, ..SimConfig::default() };
    let settings = TradeSettings {
        hedge: if hedge { Hedge::Full } else { Hedge::None },
        phantom,
        ..TradeSettings::default()
    };
    let ctx = SimContext::new(config, settings).unwrap();
    let params = AssetParams { pip: 0.01, pip_cost: 1.0, spread: 0.02, commission: 0.5, ..AssetParams::named("TEST") };
    let data = MarketData::single(params, bars(path));
    Simulation::new(ctx, data, Alternate { every, order }).unwrap().run().unwrap()
}

fn arb_order() -> impl Strategy<Value = EntryOrder> {
    (0.0..3.0_f64, 0.0..3.0_f64, 0u32..6, prop_oneof![Just(0.0), -1.0..1.0_f64], 1u32..4).prop_map(
        |(stop, tp, exit_time, entry, wait)| {
            EntryOrder::new().stop(stop).take_profit(tp).exit_time(exit_time).entry(entry).entry_time(wait)
        },
    )
}

// ── 1–2. One closing reason per transition ───────────────────────────

proptest! {
    #[test]
    fn one_reason_bit_per_closed_trade(
        path in arb_path(),
        every in 1usize..5,
        order in arb_order(),
        hedge in any::<bool>(),
    ) {
        let result = run(&path, every, order, hedge, false);
        for t in &result.trades {
            prop_assert_eq!(t.flags.close_reason_bits().count_ones(), 1);
            let decoded = t.flags.decode();
            prop_assert!(decoded.is_some());
            let decoded = decoded.unwrap();
            prop_assert_eq!(decoded.phase, FlagPhase::Closed(t.reason));
            prop_assert_eq!(decoded.side, t.side);
            prop_assert!(t.bar_close >= t.bar_open);
        }
    }
}

// ── 3–4. Accounting ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn incremental_performance_matches_batch(
        path in arb_path(),
        every in 1usize..5,
        order in arb_order(),
        phantom in any::<bool>(),
    ) {
        let result = run(&path, every, order, false, phantom);
        let batch = Performance::from_history(&result.trades, &result.marks);
        prop_assert_eq!(&batch, &result.performance);
        prop_assert_eq!(result.marks.len(), path.len());
    }

    #[test]
    fn balance_is_capital_plus_results(
        path in arb_path(),
        every in 1usize..5,
        order in arb_order(),
    ) {
        let result = run(&path, every, order, true, false);
        let booked: f64 = result.trades.iter().map(|t| t.result).sum();
        prop_assert!((result.final_balance - (10_000.0 + booked)).abs() < 1e-6);
        prop_assert!(result.open_trades.is_empty());
    }
}
