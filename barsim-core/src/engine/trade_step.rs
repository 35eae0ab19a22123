//! Per-bar trade mechanics: pending fills, exits, trailing.
//!
//! Everything here is deterministic. Within one bar an exit is decided in
//! this order: a gap through the stop, a gap through the target, the stop
//! inside the bar range, the target inside the range, then the time limit.
//! When the stop and the target both lie inside one bar the stop wins.
//! With ticks available the stop/target checks replay the ticks instead.

use super::fill::{Cross, FillModel, FillRequest};
use crate::domain::{Bar, CloseReason, EntryKind, Side, Tick, Trade, TradeState};

/// Ask prices of the trade's asset for the bar being processed.
#[derive(Debug, Clone, Copy)]
pub struct BarQuotes<'a> {
    pub bar: &'a Bar,
    pub ticks: &'a [Tick],
    pub spread: f64,
}

impl BarQuotes<'_> {
    /// The bar as seen when entering `side`.
    fn entry_bar(&self, side: Side) -> Bar {
        match side {
            Side::Long => *self.bar,
            Side::Short => self.bar.shifted(-self.spread),
        }
    }

    /// The bar as seen when leaving `side`.
    fn exit_bar(&self, side: Side) -> Bar {
        match side {
            Side::Long => self.bar.shifted(-self.spread),
            Side::Short => *self.bar,
        }
    }

    fn entry_tick(&self, side: Side, t: &Tick) -> f64 {
        match side {
            Side::Long => t.price,
            Side::Short => t.price - self.spread,
        }
    }

    fn exit_tick(&self, side: Side, t: &Tick) -> f64 {
        match side {
            Side::Long => t.price - self.spread,
            Side::Short => t.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingOutcome {
    Filled { price: f64 },
    Waiting,
    Missed,
}

fn reached(cross: Cross, price: f64, level: f64) -> bool {
    match cross {
        Cross::Up => price >= level,
        Cross::Down => price <= level,
    }
}

/// Test a pending trade on global bar `now`.
///
/// The order placed on bar `p` is tested on every bar after `p`; if it has
/// not filled once `now - p` reaches the wait window it is missed.
pub fn check_pending(
    trade: &Trade,
    now: usize,
    q: &BarQuotes<'_>,
    fill: &dyn FillModel,
) -> PendingOutcome {
    let TradeState::Pending { placed_bar, wait_bars, limit, kind } = trade.state else {
        return PendingOutcome::Waiting;
    };
    if now <= placed_bar {
        return PendingOutcome::Waiting;
    }
    let side = trade.side;
    let buy = side == Side::Long;
    let bar = q.entry_bar(side);

    if kind == EntryKind::Market {
        return PendingOutcome::Filled { price: fill.market(bar.open, buy) };
    }

    // Long limits buy lower, long stops buy higher; shorts mirror.
    let cross = match (kind, side) {
        (EntryKind::Limit, Side::Long) | (EntryKind::Stop, Side::Short) => Cross::Down,
        _ => Cross::Up,
    };

    let filled = if !q.ticks.is_empty() && !trade.attrs.bar_only {
        q.ticks.iter().find_map(|t| {
            let p = q.entry_tick(side, t);
            reached(cross, p, limit)
                .then(|| fill.triggered(&FillRequest { trigger: limit, open: p, cross, buy }))
        })
    } else {
        let extreme = match cross {
            Cross::Up => bar.high,
            Cross::Down => bar.low,
        };
        reached(cross, extreme, limit)
            .then(|| fill.triggered(&FillRequest { trigger: limit, open: bar.open, cross, buy }))
    };

    match filled {
        Some(price) => PendingOutcome::Filled { price },
        None if now - placed_bar >= wait_bars as usize => PendingOutcome::Missed,
        None => PendingOutcome::Waiting,
    }
}

/// Stop and target of an open trade in its exit stream.
struct Levels {
    stop: Option<(f64, Cross)>,
    profit: Option<(f64, Cross)>,
    buy: bool,
}

impl Levels {
    fn of(trade: &Trade) -> Self {
        let (stop_cross, profit_cross) = match trade.side {
            Side::Long => (Cross::Down, Cross::Up),
            Side::Short => (Cross::Up, Cross::Down),
        };
        Self {
            stop: (trade.stop_limit > 0.0).then_some((trade.stop_limit, stop_cross)),
            profit: (trade.profit_limit > 0.0).then_some((trade.profit_limit, profit_cross)),
            buy: trade.side == Side::Short,
        }
    }

    fn request(&self, (trigger, cross): (f64, Cross), open: f64) -> FillRequest {
        FillRequest { trigger, open, cross, buy: self.buy }
    }

    /// Check one price that the market traded at (open or tick).
    fn at_price(&self, price: f64, fill: &dyn FillModel) -> Option<(CloseReason, f64)> {
        if let Some(stop) = self.stop.filter(|(lvl, c)| reached(*c, price, *lvl)) {
            return Some((CloseReason::Stopped, fill.triggered(&self.request(stop, price))));
        }
        if let Some(tp) = self.profit.filter(|(lvl, c)| reached(*c, price, *lvl)) {
            return Some((CloseReason::ProfitTarget, fill.triggered(&self.request(tp, price))));
        }
        None
    }
}

/// Decide whether an open trade closes on global bar `now`, and at what price.
pub fn check_exit(
    trade: &Trade,
    now: usize,
    q: &BarQuotes<'_>,
    fill: &dyn FillModel,
) -> Option<(CloseReason, f64)> {
    if !trade.is_open() || now <= trade.bar_open {
        return None;
    }
    let levels = Levels::of(trade);
    let bar = q.exit_bar(trade.side);

    let hit = if trade.attrs.bar_only {
        levels.at_price(bar.close, fill)
    } else if !q.ticks.is_empty() {
        q.ticks.iter().find_map(|t| levels.at_price(q.exit_tick(trade.side, t), fill))
    } else {
        levels.at_price(bar.open, fill).or_else(|| {
            let touched = |(lvl, c): (f64, Cross)| {
                let extreme = match c {
                    Cross::Up => bar.high,
                    Cross::Down => bar.low,
                };
                reached(c, extreme, lvl)
            };
            if let Some(stop) = levels.stop.filter(|s| touched(*s)) {
                Some((CloseReason::Stopped, fill.triggered(&levels.request(stop, bar.open))))
            } else {
                levels.profit.filter(|p| touched(*p)).map(|tp| {
                    (CloseReason::ProfitTarget, fill.triggered(&levels.request(tp, bar.open)))
                })
            }
        })
    };
    if hit.is_some() {
        return hit;
    }

    if trade.exit_time > 0 && now - trade.bar_open >= trade.exit_time as usize {
        return Some((CloseReason::Timeout, fill.market(bar.close, levels.buy)));
    }
    None
}

/// Update MAE/MFE from the bar in the trade's exit stream.
pub fn track_excursion(trade: &mut Trade, q: &BarQuotes<'_>) {
    let bar = q.exit_bar(trade.side);
    trade.update_excursion(bar.high, bar.low);
}

/// Only ever tighten: raise a long stop, lower a short stop. 0 means unset.
pub fn tighten(side: Side, current: f64, proposed: f64) -> f64 {
    if current <= 0.0 {
        return proposed;
    }
    match side {
        Side::Long => current.max(proposed),
        Side::Short => current.min(proposed),
    }
}

/// Move the stop of an open trade whose gain passed the trailing distance.
pub fn trail(trade: &mut Trade, q: &BarQuotes<'_>) {
    if !trade.is_open() || trade.trail_dist <= 0.0 {
        return;
    }
    let close = q.exit_bar(trade.side).close;
    let gain = trade.gain(close);
    if gain < trade.trail_dist {
        return;
    }
    let dir = trade.side.sign();
    let mut stop = trade.stop_limit;
    if trade.trail_slope > 0.0 && trade.stop_dist != 0.0 {
        let moved = trade.trail_slope * (gain - trade.trail_dist);
        stop = tighten(trade.side, stop, trade.entry_price + trade.stop_dist + dir * moved);
    }
    if trade.trail_lock > 0.0 {
        stop = tighten(trade.side, stop, trade.entry_price + dir * trade.trail_lock * trade.mfe);
    }
    if trade.trail_step > 0.0 && stop > 0.0 {
        stop = tighten(trade.side, stop, stop + trade.trail_step * (close - stop));
    }
    if stop > 0.0 {
        trade.stop_limit = stop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, StatusKey, TradeId};
    use crate::engine::fill::{GapFill, NaiveFill};

    fn trade(side: Side) -> Trade {
        Trade::new(side, AssetId(0), StatusKey::new("", AssetId(0), side), 0)
    }

    fn quotes<'a>(bar: &'a Bar, ticks: &'a [Tick]) -> BarQuotes<'a> {
        BarQuotes { bar, ticks, spread: 0.0 }
    }

    fn pending(side: Side, kind: EntryKind, limit: f64, wait: u32) -> Trade {
        let mut t = trade(side);
        t.state = TradeState::Pending { placed_bar: 0, wait_bars: wait, limit, kind };
        t
    }

    #[test]
    fn short_stopped_by_tick_beyond_stop() {
        let mut t = trade(Side::Short);
        t.stop_dist = 0.0050;
        t.fill(TradeId(1), 1.2000, 0, 0.0);
        let bar = Bar::new(1.0, 1.2000, 1.2051, 1.1990, 1.2040);
        let ticks = [Tick::new(0.9, 1.2010), Tick::new(0.95, 1.2051), Tick::new(1.0, 1.2040)];
        let (reason, price) = check_exit(&t, 1, &quotes(&bar, &ticks), &NaiveFill).unwrap();
        assert_eq!(reason, CloseReason::Stopped);
        assert!((price - 1.2050).abs() < 1e-12);
    }

    #[test]
    fn stop_wins_when_both_inside_bar() {
        let mut t = trade(Side::Long);
        t.stop_dist = -1.0;
        t.profit_dist = 1.0;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        let bar = Bar::new(1.0, 100.0, 101.5, 98.5, 100.0);
        let (reason, _) = check_exit(&t, 1, &quotes(&bar, &[]), &NaiveFill).unwrap();
        assert_eq!(reason, CloseReason::Stopped);
    }

    #[test]
    fn gap_through_target_takes_profit_at_open() {
        let mut t = trade(Side::Long);
        t.stop_dist = -1.0;
        t.profit_dist = 1.0;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        let bar = Bar::new(1.0, 102.0, 102.5, 98.0, 101.0);
        let (reason, price) = check_exit(&t, 1, &quotes(&bar, &[]), &GapFill::new(0.0)).unwrap();
        assert_eq!(reason, CloseReason::ProfitTarget);
        assert_eq!(price, 102.0);
    }

    #[test]
    fn timeout_after_exit_time() {
        let mut t = trade(Side::Long);
        t.exit_time = 2;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        let bar = Bar::flat(1.0, 100.0);
        assert!(check_exit(&t, 1, &quotes(&bar, &[]), &NaiveFill).is_none());
        let (reason, price) = check_exit(&t, 2, &quotes(&bar, &[]), &NaiveFill).unwrap();
        assert_eq!(reason, CloseReason::Timeout);
        assert_eq!(price, 100.0);
    }

    #[test]
    fn no_exit_on_entry_bar() {
        let mut t = trade(Side::Long);
        t.stop_dist = -1.0;
        t.fill(TradeId(1), 100.0, 3, 0.0);
        let bar = Bar::new(1.0, 100.0, 100.0, 90.0, 95.0);
        assert!(check_exit(&t, 3, &quotes(&bar, &[]), &NaiveFill).is_none());
    }

    #[test]
    fn pending_window_misses_on_last_bar() {
        let t = pending(Side::Long, EntryKind::Stop, 110.0, 3);
        let bar = Bar::flat(0.0, 100.0);
        let q = quotes(&bar, &[]);
        assert_eq!(check_pending(&t, 0, &q, &NaiveFill), PendingOutcome::Waiting);
        assert_eq!(check_pending(&t, 1, &q, &NaiveFill), PendingOutcome::Waiting);
        assert_eq!(check_pending(&t, 2, &q, &NaiveFill), PendingOutcome::Waiting);
        assert_eq!(check_pending(&t, 3, &q, &NaiveFill), PendingOutcome::Missed);
    }

    #[test]
    fn pending_fills_on_last_bar_of_window() {
        let t = pending(Side::Long, EntryKind::Stop, 110.0, 3);
        let bar = Bar::new(0.0, 105.0, 111.0, 104.0, 109.0);
        assert_eq!(
            check_pending(&t, 3, &quotes(&bar, &[]), &NaiveFill),
            PendingOutcome::Filled { price: 110.0 }
        );
    }

    #[test]
    fn short_limit_fills_in_bid_stream() {
        let t = pending(Side::Short, EntryKind::Limit, 101.0, 5);
        let bar = Bar::new(0.0, 100.0, 101.5, 99.0, 100.0);
        let q = BarQuotes { bar: &bar, ticks: &[], spread: 1.0 };
        // bid high is 100.5, below the limit
        assert_eq!(check_pending(&t, 1, &q, &NaiveFill), PendingOutcome::Waiting);
        let q = BarQuotes { bar: &bar, ticks: &[], spread: 0.25 };
        assert_eq!(check_pending(&t, 1, &q, &NaiveFill), PendingOutcome::Filled { price: 101.0 });
    }

    #[test]
    fn trailing_only_tightens() {
        let mut t = trade(Side::Long);
        t.stop_dist = -2.0;
        t.trail_dist = 2.0;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        assert_eq!(t.stop_limit, 98.0);

        let below = Bar::flat(1.0, 101.0);
        trail(&mut t, &quotes(&below, &[]));
        assert_eq!(t.stop_limit, 98.0);

        let up = Bar::flat(2.0, 105.0);
        trail(&mut t, &quotes(&up, &[]));
        assert_eq!(t.stop_limit, 101.0);

        let back = Bar::flat(3.0, 103.0);
        trail(&mut t, &quotes(&back, &[]));
        assert_eq!(t.stop_limit, 101.0);
    }

    #[test]
    fn trail_lock_uses_mfe() {
        let mut t = trade(Side::Short);
        t.trail_dist = 1.0;
        t.trail_slope = 0.0;
        t.trail_lock = 0.5;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        t.mfe = 4.0;
        let bar = Bar::flat(1.0, 97.0);
        trail(&mut t, &quotes(&bar, &[]));
        assert_eq!(t.stop_limit, 98.0);
    }
}
