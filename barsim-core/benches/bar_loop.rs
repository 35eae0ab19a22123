//! Criterion benchmarks for the bar loop.
//!
//! Benchmarks:
//! 1. Full simulation with the SMA crossover (market entries, reversals)
//! 2. Full simulation with the channel breakout (pending entries, stops)
//! 3. Tick aggregation into bars

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barsim_core::data::history::ticks_to_bars;
use barsim_core::data::MarketData;
use barsim_core::domain::{AssetParams, Bar, Tick};
use barsim_core::engine::{SimConfig, SimContext, Simulation, TradeSettings};
use barsim_core::strategies::{self, Params};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar::new(45_000.0 + i as f64 / 24.0, open, close + 1.5, open - 1.5, close)
        })
        .collect()
}

fn make_data(n: usize) -> MarketData {
    let asset = AssetParams { pip: 0.01, pip_cost: 1.0, spread: 0.05, ..AssetParams::named("BENCH") };
    MarketData::single(asset, make_bars(n))
}

fn simulate(name: &str, data: &MarketData) -> f64 {
    let config = SimConfig { lookback: 50, max_bars: data.len() + 10, ..SimConfig::default() };
    let ctx = SimContext::new(config, TradeSettings::default()).unwrap();
    let strategy = strategies::build(name, &Params::new()).unwrap();
    let result = Simulation::new(ctx, data.clone(), strategy).unwrap().run().unwrap();
    result.final_balance
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_bar_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("bar_loop");
    for n in [1_000usize, 10_000] {
        let data = make_data(n);
        for name in strategies::NAMES {
            group.bench_with_input(BenchmarkId::new(name, n), &data, |b, data| {
                b.iter(|| black_box(simulate(name, data)))
            });
        }
    }
    group.finish();
}

fn bench_tick_aggregation(c: &mut Criterion) {
    let ticks: Vec<Tick> = (0..100_000)
        .map(|i| Tick::new(45_000.0 + i as f64 / 86_400.0, 100.0 + (i as f64 * 0.01).sin()))
        .collect();
    c.bench_function("ticks_to_bars_1m", |b| b.iter(|| black_box(ticks_to_bars(&ticks, 1.0))));
}

criterion_group!(benches, bench_bar_loop, bench_tick_aggregation);
criterion_main!(benches);
