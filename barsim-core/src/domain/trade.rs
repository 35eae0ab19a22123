//! Trades: lifecycle state, orthogonal attributes, and the closed-trade log record.
//!
//! A trade is pending, open or closed. The raw flag word that logs and saved
//! sessions carry is derived from the typed state with [`Trade::flags`] and
//! read back with [`TradeFlags::decode`].

use super::ids::{AssetId, Side, StatusKey, TmfId, TradeId};
use crate::flags::{tr, TradeFlags, NUM_SKILLS};
use serde::{Deserialize, Serialize};

/// How a pending trade is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Fills on the next price update.
    Market,
    /// Fills at a better price than the current one.
    Limit,
    /// Fills when the price moves through the trigger in the trade direction.
    Stop,
}

/// Why a trade left the book. Exactly one per closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    Stopped,
    ProfitTarget,
    Timeout,
    Sold,
    Exit,
    Removed,
    Reversed,
    Expired,
    Cancelled,
    MissedEntry,
    MissedOpen,
    NoSize,
}

impl CloseReason {
    pub const ALL: [CloseReason; 12] = [
        CloseReason::Stopped,
        CloseReason::ProfitTarget,
        CloseReason::Timeout,
        CloseReason::Sold,
        CloseReason::Exit,
        CloseReason::Removed,
        CloseReason::Reversed,
        CloseReason::Expired,
        CloseReason::Cancelled,
        CloseReason::MissedEntry,
        CloseReason::MissedOpen,
        CloseReason::NoSize,
    ];

    pub fn bit(self) -> u32 {
        match self {
            CloseReason::Stopped => tr::STOPPED,
            CloseReason::ProfitTarget => tr::PROFIT,
            CloseReason::Timeout => tr::TIME,
            CloseReason::Sold => tr::SOLD,
            CloseReason::Exit => tr::EXIT,
            CloseReason::Removed => tr::REMOVED,
            CloseReason::Reversed => tr::REVERSED,
            CloseReason::Expired => tr::EXPIRED,
            CloseReason::Cancelled => tr::CANCELLED,
            CloseReason::MissedEntry => tr::MISSEDENTRY,
            CloseReason::MissedOpen => tr::MISSEDOPEN,
            CloseReason::NoSize => tr::NOSIZE,
        }
    }

    /// The reason whose bit is the only close-reason bit in `bits`.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let reasons = bits & tr::CLOSE_REASONS;
        if reasons.count_ones() != 1 {
            return None;
        }
        Self::ALL.into_iter().find(|r| r.bit() == reasons)
    }

    /// Reasons that close a trade which never filled.
    pub fn is_unfilled(self) -> bool {
        matches!(
            self,
            CloseReason::Cancelled
                | CloseReason::MissedEntry
                | CloseReason::MissedOpen
                | CloseReason::NoSize
        )
    }

    /// Entry failures counted as rejected orders.
    pub fn is_rejection(self) -> bool {
        matches!(self, CloseReason::MissedEntry | CloseReason::MissedOpen | CloseReason::NoSize)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Stopped => "stopped",
            CloseReason::ProfitTarget => "profit",
            CloseReason::Timeout => "timeout",
            CloseReason::Sold => "sold",
            CloseReason::Exit => "exit",
            CloseReason::Removed => "removed",
            CloseReason::Reversed => "reversed",
            CloseReason::Expired => "expired",
            CloseReason::Cancelled => "cancelled",
            CloseReason::MissedEntry => "missed_entry",
            CloseReason::MissedOpen => "missed_open",
            CloseReason::NoSize => "no_size",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradeState {
    Pending {
        /// Global bar on which the order was placed.
        placed_bar: usize,
        /// Number of bars after placement on which the order may fill.
        wait_bars: u32,
        /// Trigger price (ask for longs, bid for shorts). 0 for market orders.
        limit: f64,
        kind: EntryKind,
    },
    Open,
    Closed {
        reason: CloseReason,
        /// Global bar on which the trade closed.
        bar: usize,
    },
}

/// Attributes independent of the lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeAttrs {
    /// Simulated only; results do not touch the balance.
    pub phantom: bool,
    /// Pool trade of a virtual-hedging account.
    pub pool: bool,
    /// Entered through a stop order.
    pub entry_stop: bool,
    /// Skipped by trade enumeration and the TMF.
    pub ignore: bool,
    /// Stops and targets checked at bar close only, not intrabar.
    pub bar_only: bool,
}

/// The option or future a trade holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub kind: u32,
    pub expiry: u32,
    pub strike: f64,
}

/// One position or pending order.
///
/// Price levels (`entry_limit`, `stop_limit`, `profit_limit`, `trail_limit`)
/// are absolute prices in the trade's own stream: ask for entering a long
/// or leaving a short, bid for the opposite. 0 means unset.
///
/// Identity and lifecycle (`id`, `side`, `state`, `asset`, `status`) are
/// owned by the engine. Code outside it changes a live trade only through
/// [`TradeLevels`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// `None` while pending. A partial close assigns the remainder a new id.
    pub(crate) id: Option<TradeId>,
    pub(crate) side: Side,
    pub(crate) state: TradeState,
    pub attrs: TradeAttrs,
    pub(crate) asset: AssetId,
    pub(crate) status: StatusKey,
    pub contract: Option<ContractSpec>,

    // ── Size ──
    pub lots: u32,
    pub units: f64,

    // ── Prices ──
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_limit: f64,
    pub stop_limit: f64,
    /// Signed distance from entry to the initial stop (negative for longs).
    pub stop_dist: f64,
    pub profit_limit: f64,
    /// Distance from entry to the profit target. Resolved on fill.
    pub profit_dist: f64,
    /// Trailing activation price.
    pub trail_limit: f64,
    /// Trailing activation distance.
    pub trail_dist: f64,
    pub trail_slope: f64,
    pub trail_lock: f64,
    pub trail_step: f64,
    /// Spread at entry.
    pub spread: f64,

    // ── Excursion (price units, >= 0) ──
    pub mae: f64,
    pub mfe: f64,

    // ── Costs (account currency) ──
    /// Accumulated rollover; <= 0 for a cost.
    pub roll: f64,
    /// Slippage cost; positive is adverse.
    pub slippage: f64,
    pub commission: f64,

    // ── Timing ──
    pub bar_open: usize,
    pub bar_close: usize,
    pub time_open: f64,
    pub time_close: f64,
    /// Close at market after this many bars open. 0 disables.
    pub exit_time: u32,
    /// Entry window in bars.
    pub entry_wait: u32,

    pub manager: Option<TmfId>,
    pub skill: [f64; NUM_SKILLS],
    pub args: [f64; NUM_SKILLS],

    /// Net profit: unrealized while open, realized once closed.
    pub result: f64,
}

impl Trade {
    /// A pending market order. Callers fill in the levels.
    pub fn new(side: Side, asset: AssetId, status: StatusKey, placed_bar: usize) -> Self {
        Self {
            id: None,
            side,
            state: TradeState::Pending {
                placed_bar,
                wait_bars: 0,
                limit: 0.0,
                kind: EntryKind::Market,
            },
            attrs: TradeAttrs::default(),
            asset,
            status,
            contract: None,
            lots: 0,
            units: 0.0,
            entry_price: 0.0,
            exit_price: 0.0,
            entry_limit: 0.0,
            stop_limit: 0.0,
            stop_dist: 0.0,
            profit_limit: 0.0,
            profit_dist: 0.0,
            trail_limit: 0.0,
            trail_dist: 0.0,
            trail_slope: 1.0,
            trail_lock: 0.0,
            trail_step: 0.0,
            spread: 0.0,
            mae: 0.0,
            mfe: 0.0,
            roll: 0.0,
            slippage: 0.0,
            commission: 0.0,
            bar_open: placed_bar,
            bar_close: 0,
            time_open: 0.0,
            time_close: 0.0,
            exit_time: 0,
            entry_wait: 0,
            manager: None,
            skill: [0.0; NUM_SKILLS],
            args: [0.0; NUM_SKILLS],
            result: 0.0,
        }
    }

    pub fn id(&self) -> Option<TradeId> {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn status(&self) -> &StatusKey {
        &self.status
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TradeState::Pending { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, TradeState::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, TradeState::Closed { .. })
    }

    /// Pending or open.
    pub fn is_live(&self) -> bool {
        !self.is_closed()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            TradeState::Closed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Price this trade trades at when entering, given the ask and spread.
    pub fn entry_quote(&self, ask: f64, spread: f64) -> f64 {
        match self.side {
            Side::Long => ask,
            Side::Short => ask - spread,
        }
    }

    /// Price this trade trades at when leaving, given the ask and spread.
    pub fn exit_quote(&self, ask: f64, spread: f64) -> f64 {
        match self.side {
            Side::Long => ask - spread,
            Side::Short => ask,
        }
    }

    /// Signed favourable move from entry to `price`.
    pub fn gain(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign()
    }

    /// Open the trade at `price` and resolve the distance-based levels.
    pub(crate) fn fill(&mut self, id: TradeId, price: f64, bar: usize, time: f64) {
        let dir = self.side.sign();
        self.id = Some(id);
        self.state = TradeState::Open;
        self.entry_price = price;
        self.bar_open = bar;
        self.time_open = time;
        if self.stop_dist != 0.0 {
            self.stop_limit = price + self.stop_dist;
        }
        if self.profit_dist > 0.0 {
            self.profit_limit = price + dir * self.profit_dist;
        }
        if self.trail_dist > 0.0 {
            self.trail_limit = price + dir * self.trail_dist;
        }
    }

    /// Move into the closed state. The caller settles the result.
    pub(crate) fn close(&mut self, reason: CloseReason, bar: usize, price: f64, time: f64) {
        self.state = TradeState::Closed { reason, bar };
        self.exit_price = price;
        self.bar_close = bar;
        self.time_close = time;
    }

    /// Update MAE/MFE from the high and low of the exit price stream.
    pub fn update_excursion(&mut self, high: f64, low: f64) {
        let (best, worst) = match self.side {
            Side::Long => (high - self.entry_price, self.entry_price - low),
            Side::Short => (self.entry_price - low, high - self.entry_price),
        };
        self.mfe = self.mfe.max(best);
        self.mae = self.mae.max(worst);
    }

    /// Raw flag word: side, exactly one lifecycle bit group, attributes.
    pub fn flags(&self) -> TradeFlags {
        let mut bits = 0;
        if self.side == Side::Short {
            bits |= tr::SHORT;
        }
        match self.state {
            TradeState::Pending { kind, .. } => {
                bits |= tr::WAITBUY;
                if kind == EntryKind::Stop {
                    bits |= tr::ENTRYSTOP;
                }
            }
            TradeState::Open => bits |= tr::OPEN,
            TradeState::Closed { reason, .. } => bits |= reason.bit(),
        }
        let a = self.attrs;
        if a.phantom {
            bits |= tr::PHANTOM;
        }
        if a.pool {
            bits |= tr::NET;
        }
        if a.entry_stop {
            bits |= tr::ENTRYSTOP;
        }
        if a.ignore {
            bits |= tr::IGNORE;
        }
        if a.bar_only {
            bits |= tr::BAR;
        }
        TradeFlags(bits)
    }
}

/// Write access to the adjustable levels of a live trade.
///
/// Reads go through to the trade. Setters are no-ops on a closed trade.
pub struct TradeLevels<'a> {
    trade: &'a mut Trade,
}

impl<'a> TradeLevels<'a> {
    pub fn new(trade: &'a mut Trade) -> Self {
        Self { trade }
    }

    fn live(&mut self) -> Option<&mut Trade> {
        self.trade.is_live().then_some(&mut *self.trade)
    }

    /// Absolute stop price. 0 removes the stop.
    pub fn set_stop(&mut self, price: f64) {
        if let Some(t) = self.live() {
            t.stop_limit = price;
        }
    }

    /// Absolute profit target. 0 removes it.
    pub fn set_target(&mut self, price: f64) {
        if let Some(t) = self.live() {
            t.profit_limit = price;
        }
    }

    /// Price at which trailing starts. 0 disables trailing.
    pub fn set_trail(&mut self, price: f64) {
        if let Some(t) = self.live() {
            t.trail_limit = price;
        }
    }

    pub fn set_trail_params(&mut self, slope: f64, lock: f64, step: f64) {
        if let Some(t) = self.live() {
            t.trail_slope = slope;
            t.trail_lock = lock;
            t.trail_step = step;
        }
    }

    /// Close at market after `bars` bars open. 0 disables.
    pub fn set_exit_time(&mut self, bars: u32) {
        if let Some(t) = self.live() {
            t.exit_time = bars;
        }
    }

    /// Resize a pending trade. Returns false once the trade has filled.
    pub fn set_lots(&mut self, lots: u32) -> bool {
        if !self.trade.is_pending() {
            return false;
        }
        self.trade.lots = lots;
        true
    }

    pub fn args_mut(&mut self) -> &mut [f64; NUM_SKILLS] {
        &mut self.trade.args
    }

    pub fn skill_mut(&mut self) -> &mut [f64; NUM_SKILLS] {
        &mut self.trade.skill
    }
}

impl std::ops::Deref for TradeLevels<'_> {
    type Target = Trade;

    fn deref(&self) -> &Trade {
        self.trade
    }
}

/// Lifecycle phase as read back from a flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagPhase {
    Pending,
    Open,
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFlags {
    pub side: Side,
    pub phase: FlagPhase,
    pub attrs: TradeAttrs,
}

impl TradeFlags {
    /// Read side, phase and attributes back. `None` if the word does not
    /// describe exactly one lifecycle phase.
    pub fn decode(self) -> Option<DecodedFlags> {
        let side = if self.is_short() { Side::Short } else { Side::Long };
        let reasons = self.close_reason_bits();
        let phase = match (self.is_open(), self.is_pending(), reasons) {
            (true, false, 0) => FlagPhase::Open,
            (false, true, 0) => FlagPhase::Pending,
            (false, false, r) if r != 0 => FlagPhase::Closed(CloseReason::from_bits(r)?),
            _ => return None,
        };
        let attrs = TradeAttrs {
            phantom: self.any(tr::PHANTOM),
            pool: self.any(tr::NET),
            entry_stop: self.any(tr::ENTRYSTOP),
            ignore: self.any(tr::IGNORE),
            bar_only: self.any(tr::BAR),
        };
        Some(DecodedFlags { side, phase, attrs })
    }
}

/// A finished trade, as written to the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub id: TradeId,
    pub algo: String,
    pub asset: String,
    pub side: Side,
    pub reason: CloseReason,
    pub flags: TradeFlags,
    pub phantom: bool,

    // ── Entry / exit ──
    pub bar_open: usize,
    pub bar_close: usize,
    pub time_open: f64,
    pub time_close: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub lots: u32,

    // ── PnL (account currency) ──
    pub gross: f64,
    pub pips: f64,
    pub commission: f64,
    pub rollover: f64,
    pub slippage: f64,
    pub spread_cost: f64,
    /// Net result: gross + rollover - commission.
    pub result: f64,

    // ── Excursion (price units) ──
    pub mae: f64,
    pub mfe: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.result > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.bar_close.saturating_sub(self.bar_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side) -> Trade {
        Trade::new(side, AssetId(0), StatusKey::new("", AssetId(0), side), 0)
    }

    #[test]
    fn reason_bits_are_distinct() {
        let mut seen = 0u32;
        for r in CloseReason::ALL {
            assert_eq!(r.bit().count_ones(), 1);
            assert_eq!(seen & r.bit(), 0);
            seen |= r.bit();
            assert_eq!(CloseReason::from_bits(r.bit()), Some(r));
        }
        assert_eq!(seen, tr::CLOSE_REASONS);
        assert_eq!(CloseReason::from_bits(tr::STOPPED | tr::PROFIT), None);
    }

    #[test]
    fn fill_resolves_levels_for_short() {
        let mut t = trade(Side::Short);
        t.stop_dist = 0.0050;
        t.profit_dist = 0.0100;
        t.fill(TradeId(7), 1.2000, 3, 0.0);
        assert!(t.is_open());
        assert!((t.stop_limit - 1.2050).abs() < 1e-12);
        assert!((t.profit_limit - 1.1900).abs() < 1e-12);
        assert_eq!(t.id, Some(TradeId(7)));
        assert_eq!(t.bar_open, 3);
    }

    #[test]
    fn quotes_follow_side() {
        let long = trade(Side::Long);
        let short = trade(Side::Short);
        assert_eq!(long.entry_quote(1.5, 0.5), 1.5);
        assert_eq!(long.exit_quote(1.5, 0.5), 1.0);
        assert_eq!(short.entry_quote(1.5, 0.5), 1.0);
        assert_eq!(short.exit_quote(1.5, 0.5), 1.5);
    }

    #[test]
    fn excursion_tracks_extremes() {
        let mut t = trade(Side::Long);
        t.fill(TradeId(1), 100.0, 0, 0.0);
        t.update_excursion(104.0, 99.0);
        t.update_excursion(102.0, 97.0);
        assert_eq!(t.mfe, 4.0);
        assert_eq!(t.mae, 3.0);
    }

    #[test]
    fn flags_roundtrip_through_decode() {
        let mut t = trade(Side::Short);
        t.attrs.phantom = true;
        t.attrs.pool = true;
        let pending = t.flags().decode().unwrap();
        assert_eq!(pending.phase, FlagPhase::Pending);
        assert!(pending.attrs.phantom && pending.attrs.pool);
        assert!(t.flags().is_virtual());

        t.fill(TradeId(1), 1.0, 1, 0.0);
        assert_eq!(t.flags().decode().unwrap().phase, FlagPhase::Open);

        t.close(CloseReason::Reversed, 2, 1.0, 0.0);
        let closed = t.flags();
        assert_eq!(closed.close_reason_bits(), tr::REVERSED);
        let decoded = closed.decode().unwrap();
        assert_eq!(decoded.side, Side::Short);
        assert_eq!(decoded.phase, FlagPhase::Closed(CloseReason::Reversed));
    }

    #[test]
    fn decode_rejects_ambiguous_words() {
        assert!(TradeFlags(tr::OPEN | tr::STOPPED).decode().is_none());
        assert!(TradeFlags(tr::STOPPED | tr::SOLD).decode().is_none());
        assert!(TradeFlags(0).decode().is_none());
    }
}
