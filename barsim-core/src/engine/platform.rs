//! The call surface strategies use: the [`Platform`] trait and its order builders.
//!
//! Order builders default every field to zero, which means "use the
//! current [`TradeSettings`](super::TradeSettings) value".

use super::config::{SimConfig, TradeSettings};
use super::state::RunState;
use super::tmf::TradeManager;
use crate::domain::{
    Asset, AssetId, AssetParams, AssetType, Contract, ContractRef, Side, TmfId, Trade,
    TradeHandle, TradeId, TradeLevels,
};
use crate::error::EngineError;
use crate::flags::NUM_SKILLS;
use crate::io;
use std::path::Path;

/// Parameters of an entry. Zero fields fall back to the trade settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntryOrder {
    pub lots: u32,
    /// > 0 limit distance, < 0 stop distance.
    pub entry: f64,
    pub stop: f64,
    pub take_profit: f64,
    pub trail: f64,
    pub trail_slope: f64,
    pub trail_lock: f64,
    pub trail_step: f64,
    pub exit_time: u32,
    pub entry_time: u32,
    pub manager: Option<TmfId>,
    pub contract: Option<ContractRef>,
    pub args: [f64; NUM_SKILLS],
}

impl EntryOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lots(mut self, lots: u32) -> Self {
        self.lots = lots;
        self
    }

    pub fn entry(mut self, entry: f64) -> Self {
        self.entry = entry;
        self
    }

    pub fn stop(mut self, stop: f64) -> Self {
        self.stop = stop;
        self
    }

    pub fn take_profit(mut self, tp: f64) -> Self {
        self.take_profit = tp;
        self
    }

    pub fn trail(mut self, trail: f64) -> Self {
        self.trail = trail;
        self
    }

    pub fn exit_time(mut self, bars: u32) -> Self {
        self.exit_time = bars;
        self
    }

    pub fn entry_time(mut self, bars: u32) -> Self {
        self.entry_time = bars;
        self
    }

    pub fn manager(mut self, id: TmfId) -> Self {
        self.manager = Some(id);
        self
    }

    pub fn contract(mut self, c: ContractRef) -> Self {
        self.contract = Some(c);
        self
    }
}

/// Which trades an exit applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitScope {
    /// Trades of the current algo and asset.
    #[default]
    Component,
    /// All trades of the current asset.
    Asset,
    /// Every trade.
    All,
}

/// Parameters of an exit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitOrder {
    /// 0 closes the whole position.
    pub lots: u32,
    /// > 0 sets an exit limit instead of closing at market.
    pub limit: f64,
    pub scope: ExitScope,
}

impl ExitOrder {
    pub fn all() -> Self {
        Self { scope: ExitScope::All, ..Self::default() }
    }

    pub fn lots(mut self, lots: u32) -> Self {
        self.lots = lots;
        self
    }

    pub fn limit(mut self, limit: f64) -> Self {
        self.limit = limit;
        self
    }

    pub fn scope(mut self, scope: ExitScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Trade enumeration filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeFilter {
    pub pending: bool,
    pub open: bool,
    pub closed: bool,
    pub side: Option<Side>,
    pub asset: Option<AssetId>,
    pub algo: Option<String>,
    /// Include trades flagged `ignore`.
    pub ignored: bool,
}

impl TradeFilter {
    pub fn open() -> Self {
        Self { open: true, ..Self::default() }
    }

    pub fn pending() -> Self {
        Self { pending: true, ..Self::default() }
    }

    /// Pending and open.
    pub fn live() -> Self {
        Self { pending: true, open: true, ..Self::default() }
    }

    pub fn all() -> Self {
        Self { pending: true, open: true, closed: true, ignored: true, ..Self::default() }
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn asset(mut self, asset: AssetId) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn algo(mut self, algo: impl Into<String>) -> Self {
        self.algo = Some(algo.into());
        self
    }

    pub fn matches(&self, t: &Trade) -> bool {
        let state_ok = (self.pending && t.is_pending())
            || (self.open && t.is_open())
            || (self.closed && t.is_closed());
        state_ok
            && (self.ignored || !t.attrs.ignore)
            && self.side.map_or(true, |s| s == t.side)
            && self.asset.map_or(true, |a| a == t.asset)
            && self.algo.as_deref().map_or(true, |a| a == t.status.algo)
    }
}

/// Where `print` output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrintTarget {
    #[default]
    Log,
    Diag,
    Alert,
}

/// Everything a strategy can read or do. Implemented by
/// [`SimContext`](super::SimContext).
pub trait Platform {
    // ── State ──
    fn state(&self) -> &RunState;
    fn config(&self) -> &SimConfig;
    fn settings(&self) -> &TradeSettings;
    fn settings_mut(&mut self) -> &mut TradeSettings;
    /// Test a status flag.
    fn is(&self, flag: u32) -> bool;
    fn last_error(&self) -> Option<&str>;
    fn set_error(&mut self, msg: &str);
    fn print(&mut self, target: PrintTarget, msg: &str);

    // ── Algo / asset ──
    fn algo(&mut self, name: &str);
    fn asset(&mut self, name: &str) -> Result<AssetId, EngineError>;
    fn asset_add(&mut self, params: AssetParams) -> Result<AssetId, EngineError>;
    fn asset_type(&self, name: &str) -> AssetType;
    fn current_asset(&self) -> Option<&Asset>;

    // ── Prices of the current asset; NIL when unavailable ──
    /// Mean of the bar's four prices.
    fn price(&self, offset: usize) -> f64;
    fn price_open(&self, offset: usize) -> f64;
    fn price_close(&self, offset: usize) -> f64;
    fn price_high(&self, offset: usize) -> f64;
    fn price_low(&self, offset: usize) -> f64;
    fn price_set(&mut self, offset: usize, open: f64, high: f64, low: f64, close: f64) -> bool;
    /// Positive quote is ask, negative is bid.
    fn price_quote(&mut self, time: f64, quote: f64) -> bool;
    fn market_val(&self, offset: usize) -> f64;
    fn market_vol(&self, offset: usize) -> f64;

    // ── Trading ──
    /// `None` only during lookback or when the trade storage is full.
    fn enter_long(&mut self, order: EntryOrder) -> Option<TradeHandle>;
    fn enter_short(&mut self, order: EntryOrder) -> Option<TradeHandle>;
    /// Returns the number of trades closed or changed.
    fn exit_long(&mut self, order: ExitOrder) -> usize;
    fn exit_short(&mut self, order: ExitOrder) -> usize;
    fn exit_trade(&mut self, handle: TradeHandle, order: ExitOrder) -> bool;
    /// Drop a trade from the book without trading.
    fn cancel_trade(&mut self, id: TradeId) -> bool;
    fn trades(&self, filter: &TradeFilter) -> Vec<TradeHandle>;
    fn find_trade(&self, id: TradeId) -> Option<TradeHandle>;
    fn trade(&self, handle: TradeHandle) -> Option<&Trade>;
    /// Stop, target and trail of a live trade. `None` once it is closed.
    fn trade_levels(&mut self, handle: TradeHandle) -> Option<TradeLevels<'_>>;
    fn register_manager(&mut self, manager: Box<dyn TradeManager>) -> TmfId;

    // ── Contracts of the current asset ──
    /// Select the contract nearest in expiry and strike; it becomes `this_contract`.
    fn contract(&mut self, kind: u32, days: i32, strike: f64) -> Option<ContractRef>;
    /// Install a fresh chain. Earlier `ContractRef`s stop resolving.
    fn contract_update(&mut self, contracts: Vec<Contract>) -> usize;
    fn contract_days(&self, c: ContractRef) -> f64;
    fn contract_price(&self, c: ContractRef) -> f64;
    /// Net open lots in the contract; shorts count negative.
    fn contract_position(&self, c: ContractRef) -> i64;
    fn this_contract(&self) -> Option<&Contract>;

    // ── Date / time of the current asset's bars (UTC) ──
    fn year(&self, offset: usize) -> u32;
    fn month(&self, offset: usize) -> u32;
    fn day(&self, offset: usize) -> u32;
    fn hour(&self, offset: usize) -> u32;
    fn minute(&self, offset: usize) -> u32;
    /// 1 = Monday … 7 = Sunday.
    fn dow(&self, offset: usize) -> u32;
    /// `HHMM`
    fn tod(&self, offset: usize) -> u32;
    /// `YYYYMMDD`
    fn date(&self, offset: usize) -> u32;
    /// OLE date.
    fn wdate(&self, offset: usize) -> f64;
    /// Within the current asset's market hours.
    fn market(&self, offset: usize) -> bool;

    // ── Variables and files ──
    /// In-memory variable, or one stored in a JSON file. NIL if missing.
    fn getvar(&self, file: Option<&Path>, name: &str) -> f64;
    fn putvar(&mut self, file: Option<&Path>, name: &str, value: f64) -> Result<(), EngineError>;
    fn file_append(&mut self, path: &Path, text: &str) -> Result<(), EngineError>;
    fn file_content(&self, path: &Path) -> Result<String, EngineError>;

    fn strvar(&self, text: &str, name: &str, default: f64) -> f64 {
        io::strvar(text, name, default)
    }

    fn strtext(&self, text: &str, name: &str, default: &str) -> String {
        io::strtext(text, name, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StatusKey;

    #[test]
    fn entry_builder_leaves_unset_fields_zero() {
        let o = EntryOrder::new().lots(2).stop(0.005);
        assert_eq!(o.lots, 2);
        assert_eq!(o.stop, 0.005);
        assert_eq!(o.take_profit, 0.0);
        assert_eq!(o.entry_time, 0);
    }

    #[test]
    fn filter_matches_state_and_side() {
        let mut t = Trade::new(Side::Short, AssetId(1), StatusKey::new("a", AssetId(1), Side::Short), 0);
        assert!(TradeFilter::live().matches(&t));
        assert!(!TradeFilter::open().matches(&t));
        assert!(!TradeFilter::live().side(Side::Long).matches(&t));
        assert!(TradeFilter::live().asset(AssetId(1)).algo("a").matches(&t));
        t.attrs.ignore = true;
        assert!(!TradeFilter::live().matches(&t));
        assert!(TradeFilter::all().matches(&t));
    }
}
