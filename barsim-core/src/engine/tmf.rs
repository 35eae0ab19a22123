//! Trade management functions (TMF).
//!
//! A manager is registered once and attached to trades through
//! [`crate::engine::EntryOrder::manager`]. It is called for each of its live
//! trades once per bar, and once when the trade is entered, stopped or
//! hits its profit target.

use crate::domain::{Bar, Trade, TradeLevels};

/// Why the manager is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmfEvent {
    /// The trade just filled.
    Entered,
    /// Regular per-bar call for a pending or open trade.
    Bar,
    /// The trade was closed by its stop.
    Stopped,
    /// The trade was closed at its profit target.
    Profit,
}

/// What the engine should do after the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TmfAction {
    #[default]
    Continue,
    /// Close an open trade at market, or cancel a pending one.
    Exit,
    /// Fill a pending trade at market now.
    Enter,
    /// Do not move trailing stops this bar.
    HoldStops,
}

/// The trade a manager is looking at.
pub struct TradeView<'a> {
    trade: &'a mut Trade,
    bar: Option<&'a Bar>,
    event: TmfEvent,
    now: usize,
}

impl<'a> TradeView<'a> {
    pub fn new(trade: &'a mut Trade, bar: Option<&'a Bar>, event: TmfEvent, now: usize) -> Self {
        Self { trade, bar, event, now }
    }

    pub fn event(&self) -> TmfEvent {
        self.event
    }

    pub fn trade(&self) -> &Trade {
        self.trade
    }

    pub fn levels(&mut self) -> TradeLevels<'_> {
        TradeLevels::new(self.trade)
    }

    /// Current bar of the trade's asset.
    pub fn bar(&self) -> Option<&Bar> {
        self.bar
    }

    /// Bars since the trade was entered.
    pub fn bars_open(&self) -> usize {
        self.now.saturating_sub(self.trade.bar_open)
    }
}

pub trait TradeManager: Send {
    fn manage(&mut self, view: &mut TradeView<'_>) -> TmfAction;
}

impl<F> TradeManager for F
where
    F: FnMut(&mut TradeView<'_>) -> TmfAction + Send,
{
    fn manage(&mut self, view: &mut TradeView<'_>) -> TmfAction {
        self(view)
    }
}

/// Moves the stop to the entry price once the trade has gained `trigger`.
#[derive(Debug, Clone, Copy)]
pub struct BreakEven {
    /// Favourable excursion (price units) that arms the move.
    pub trigger: f64,
}

impl TradeManager for BreakEven {
    fn manage(&mut self, view: &mut TradeView<'_>) -> TmfAction {
        if view.event() != TmfEvent::Bar || !view.trade().is_open() {
            return TmfAction::Continue;
        }
        let t = view.trade();
        if t.mfe >= self.trigger {
            let entry = t.entry_price;
            let tighter = if t.is_long() {
                t.stop_limit == 0.0 || t.stop_limit < entry
            } else {
                t.stop_limit == 0.0 || t.stop_limit > entry
            };
            if tighter {
                view.levels().set_stop(entry);
            }
        }
        TmfAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, Side, StatusKey, TradeId};

    fn open_long() -> Trade {
        let mut t = Trade::new(Side::Long, AssetId(0), StatusKey::new("", AssetId(0), Side::Long), 0);
        t.stop_dist = -2.0;
        t.fill(TradeId(1), 100.0, 0, 0.0);
        t
    }

    #[test]
    fn break_even_moves_stop_once_armed() {
        let mut t = open_long();
        let mut be = BreakEven { trigger: 3.0 };
        t.mfe = 2.0;
        be.manage(&mut TradeView::new(&mut t, None, TmfEvent::Bar, 1));
        assert_eq!(t.stop_limit, 98.0);
        t.mfe = 3.5;
        be.manage(&mut TradeView::new(&mut t, None, TmfEvent::Bar, 2));
        assert_eq!(t.stop_limit, 100.0);
    }

    #[test]
    fn closures_are_managers() {
        let mut t = open_long();
        let mut exit_after_two = |v: &mut TradeView<'_>| {
            if v.bars_open() >= 2 {
                TmfAction::Exit
            } else {
                TmfAction::Continue
            }
        };
        assert_eq!(exit_after_two.manage(&mut TradeView::new(&mut t, None, TmfEvent::Bar, 1)), TmfAction::Continue);
        assert_eq!(exit_after_two.manage(&mut TradeView::new(&mut t, None, TmfEvent::Bar, 2)), TmfAction::Exit);
    }

    #[test]
    fn levels_ignore_closed_trades() {
        let mut t = open_long();
        t.close(crate::domain::CloseReason::Exit, 3, 101.0, 0.0);
        let mut view = TradeView::new(&mut t, None, TmfEvent::Bar, 3);
        let mut levels = view.levels();
        levels.set_stop(99.5);
        levels.set_target(110.0);
        assert!(!levels.set_lots(5));
        assert_eq!(t.stop_limit, 98.0);
        assert_eq!(t.profit_limit, 0.0);
    }
}
