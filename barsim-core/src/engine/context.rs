//! The simulation context: owns assets, trades, statistics and the account,
//! and implements [`Platform`] for strategies.
//!
//! Per global bar the driver calls, in order: [`SimContext::start_bar`],
//! [`SimContext::feed_asset`] for every asset with data, [`SimContext::process_trades`],
//! the strategy, then [`SimContext::end_bar`].

use super::accounting::{
    margin_of, risk_of, rollover_per_bar, settle, size_lots, slippage_cost, unrealized,
    SizeRequest,
};
use super::arena::TradeArena;
use super::config::{Hedge, SimConfig, TradeSettings};
use super::fill::{FillModel, NaiveFill};
use super::platform::{EntryOrder, ExitOrder, ExitScope, Platform, PrintTarget, TradeFilter};
use super::state::RunState;
use super::tmf::{TmfAction, TmfEvent, TradeManager, TradeView};
use super::trade_step::{check_exit, check_pending, track_excursion, trail, BarQuotes, PendingOutcome};
use crate::domain::contract::EXPIRY_HOUR_UTC;
use crate::domain::{
    asset_type, Asset, AssetId, AssetParams, AssetType, Bar, BarMark, CloseReason, Contract,
    ContractChain, ContractRef, ContractSpec, EntryKind, Side, Status, StatusKey, Tick, TmfId,
    Trade, TradeAttrs, TradeHandle, TradeId, TradeIdGen, TradeLevels, TradeRecord, TradeState,
};
use crate::error::EngineError;
use crate::flags::{contract as ct, status, NIL};
use crate::io::{self, VarStore};
use crate::time::{hhmm, ole_to_datetime, parse_ymd, ymd};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

fn slot(id: AssetId) -> usize {
    id.0 as usize
}

/// The asset a trade trades. Trades only reference registered assets.
fn asset_of(assets: &[Asset], id: AssetId) -> Option<&Asset> {
    assets.get(slot(id))
}

fn pick(value: f64, fallback: f64) -> f64 {
    if value != 0.0 {
        value
    } else {
        fallback
    }
}

fn pick_u32(value: u32, fallback: u32) -> u32 {
    if value != 0 {
        value
    } else {
        fallback
    }
}

/// The listed contract a trade holds, if the chain still has it.
fn listed<'a>(chain: &'a ContractChain, spec: &ContractSpec) -> Option<&'a Contract> {
    chain
        .contracts()
        .iter()
        .find(|c| c.kind == spec.kind && c.expiry == spec.expiry && c.strike == spec.strike)
}

/// Value of a contract at expiry for underlying price `unl`.
fn intrinsic(spec: &ContractSpec, unl: f64) -> f64 {
    if spec.kind & ct::FUTURE != 0 {
        unl
    } else if spec.kind & ct::CALL != 0 {
        (unl - spec.strike).max(0.0)
    } else if spec.kind & ct::PUT != 0 {
        (spec.strike - unl).max(0.0)
    } else {
        unl
    }
}

fn spec_expired(spec: &ContractSpec, now: NaiveDateTime) -> bool {
    parse_ymd(spec.expiry)
        .and_then(|d| d.and_hms_opt(EXPIRY_HOUR_UTC, 0, 0))
        .is_some_and(|exp| now >= exp)
}

/// Price at which `t` would leave the market now.
fn exit_price(asset: &Asset, t: &Trade, fill: &dyn FillModel) -> f64 {
    let buy = t.side == Side::Short;
    match t.contract {
        Some(spec) => match listed(&asset.chain, &spec) {
            Some(c) if buy => c.ask,
            Some(c) => c.bid,
            None => intrinsic(&spec, asset.price),
        },
        None => fill.market(t.exit_quote(asset.price, asset.spread), buy),
    }
}

/// Statuses and live trades of a session, as written by `save_status`.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    statuses: Vec<SavedStatus>,
    trades: Vec<SavedTrade>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedStatus {
    asset: String,
    status: Status,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedTrade {
    asset: String,
    trade: Trade,
}

/// One simulation. Not shared between threads; sweeps build one per run.
pub struct SimContext {
    config: SimConfig,
    settings: TradeSettings,
    state: RunState,
    assets: Vec<Asset>,
    by_name: HashMap<String, AssetId>,
    /// The global bar of each asset for the current step, if it had data.
    current: Vec<Option<Bar>>,
    arena: TradeArena,
    ids: TradeIdGen,
    statuses: BTreeMap<StatusKey, Status>,
    managers: Vec<Box<dyn TradeManager>>,
    trade_log: Vec<TradeRecord>,
    fill: Box<dyn FillModel>,
    vars: VarStore,
    halt: Option<EngineError>,
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("bar", &self.state.bar)
            .field("assets", &self.assets.len())
            .field("trades", &self.arena.len())
            .field("fill", &self.fill.name())
            .finish()
    }
}

impl SimContext {
    pub fn new(config: SimConfig, settings: TradeSettings) -> Result<Self, EngineError> {
        config.validate()?;
        let mut state = RunState::default();
        state.account.balance = config.capital;
        state.account.equity = config.capital;
        state.cycle = 1;
        state.total_cycles = 1;
        Ok(Self {
            arena: TradeArena::new(config.max_trades),
            config,
            settings,
            state,
            assets: Vec::new(),
            by_name: HashMap::new(),
            current: Vec::new(),
            ids: TradeIdGen::new(),
            statuses: BTreeMap::new(),
            managers: Vec::new(),
            trade_log: Vec::new(),
            fill: Box::new(NaiveFill),
            vars: VarStore::default(),
            halt: None,
        })
    }

    pub fn with_fill(mut self, fill: Box<dyn FillModel>) -> Self {
        self.fill = fill;
        self
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset_by_id(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(slot(id))
    }

    pub fn statuses(&self) -> impl Iterator<Item = &Status> {
        self.statuses.values()
    }

    pub fn status(&self, key: &StatusKey) -> Option<&Status> {
        self.statuses.get(key)
    }

    pub fn status_mut(&mut self, key: &StatusKey) -> Option<&mut Status> {
        self.statuses.get_mut(key)
    }

    /// Closed trades in closing order.
    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trade_log
    }

    pub fn halted(&self) -> Option<&EngineError> {
        self.halt.as_ref()
    }

    pub(crate) fn take_halt(&mut self) -> Option<EngineError> {
        self.halt.take()
    }

    pub(crate) fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    /// Record an error. Fatal errors stop the run after the current bar.
    pub fn fail(&mut self, err: EngineError) {
        self.state.last_error = Some(err.to_string());
        if err.is_fatal() {
            error!(bar = self.state.bar, %err, "simulation halted");
            if self.halt.is_none() {
                self.halt = Some(err);
            }
        } else {
            warn!(bar = self.state.bar, %err, "operation failed");
        }
    }

    // ── Bar cycle ──

    /// Begin global bar `g` at OLE time `time`.
    pub fn start_bar(&mut self, g: usize, time: f64) -> Result<(), EngineError> {
        if !self.config.keep_closed {
            self.recycle_closed();
        }
        let day = |t: f64| ole_to_datetime(t).map(|d| d.date());
        let new_day = g > 0 && day(time) != day(self.state.time);
        if new_day {
            if let Some(m) = self.state.marks.last() {
                let equity = m.equity;
                self.state.push_daily(equity, self.config.max_bars)?;
            }
        }
        self.state.bar = g;
        self.state.time = time;
        self.state.set_flag(status::LOOKBACK, g < self.config.lookback);
        self.state.set_flag(status::NEWDAY, new_day);
        self.current.iter_mut().for_each(|c| *c = None);
        Ok(())
    }

    /// Feed the global bar of one asset.
    pub fn feed_asset(&mut self, id: AssetId, bar: &Bar, ticks: &[Tick]) -> Result<(), EngineError> {
        let g = self.state.bar;
        let asset = self.assets.get_mut(slot(id)).ok_or_else(|| EngineError::UnknownAsset(id.to_string()))?;
        asset.advance(g, bar, ticks)?;
        self.current[slot(id)] = Some(*bar);
        Ok(())
    }

    fn recycle_closed(&mut self) {
        let closed: Vec<TradeHandle> =
            self.arena.iter().filter(|(_, t)| t.is_closed()).map(|(h, _)| h).collect();
        for h in closed {
            self.arena.recycle(h);
        }
    }

    /// Fill, exit, trail and manage every live trade on the current bar.
    pub fn process_trades(&mut self) {
        for h in self.arena.handles() {
            let Some(t) = self.arena.get(h) else { continue };
            if t.is_closed() {
                continue;
            }
            let Some(bar) = self.current.get(slot(t.asset)).copied().flatten() else {
                continue;
            };
            if t.is_pending() {
                self.step_pending(h, &bar);
            } else {
                self.step_open(h, &bar);
            }
        }
    }

    fn step_pending(&mut self, h: TradeHandle, bar: &Bar) {
        let now = self.state.bar;
        let Some(t) = self.arena.get(h) else { return };
        let Some(asset) = asset_of(&self.assets, t.asset) else { return };
        let q = BarQuotes { bar, ticks: asset.ticks(), spread: asset.spread };
        let outcome = check_pending(t, now, &q, self.fill.as_ref());
        let ideal = match t.state {
            TradeState::Pending { limit, kind, .. } if kind != EntryKind::Market => Some(limit),
            _ => None,
        };
        match outcome {
            PendingOutcome::Filled { price } => self.fill_trade(h, price, ideal.unwrap_or(price)),
            PendingOutcome::Missed => {
                self.close_trade(h, CloseReason::MissedEntry, 0.0);
            }
            PendingOutcome::Waiting => match self.call_manager(h, Some(bar), TmfEvent::Bar) {
                TmfAction::Exit => {
                    self.close_trade(h, CloseReason::Cancelled, 0.0);
                }
                TmfAction::Enter => {
                    let Some(t) = self.arena.get(h) else { return };
                    let Some(asset) = asset_of(&self.assets, t.asset) else { return };
                    let quote = t.entry_quote(asset.price, asset.spread);
                    let price = self.fill.market(quote, t.side == Side::Long);
                    self.fill_trade(h, price, quote);
                }
                TmfAction::Continue | TmfAction::HoldStops => {}
            },
        }
    }

    fn step_open(&mut self, h: TradeHandle, bar: &Bar) {
        let now = self.state.bar;
        let bar_period = self.config.bar_period;
        let dt = ole_to_datetime(self.state.time);
        let Some(t) = self.arena.get_mut(h) else { return };
        let Some(asset) = asset_of(&self.assets, t.asset) else { return };
        let q = BarQuotes { bar, ticks: asset.ticks(), spread: asset.spread };
        if now > t.bar_open {
            t.roll += rollover_per_bar(t, &asset.params, bar_period);
        }

        let hit = match t.contract {
            Some(spec) => {
                if dt.is_some_and(|d| spec_expired(&spec, d)) {
                    Some((CloseReason::Expired, intrinsic(&spec, asset.price)))
                } else if t.exit_time > 0 && now - t.bar_open >= t.exit_time as usize {
                    Some((CloseReason::Timeout, exit_price(asset, t, self.fill.as_ref())))
                } else {
                    None
                }
            }
            None => {
                if now > t.bar_open {
                    track_excursion(t, &q);
                }
                check_exit(t, now, &q, self.fill.as_ref())
            }
        };

        if let Some((reason, price)) = hit {
            let ideal = match reason {
                CloseReason::Stopped => t.stop_limit,
                CloseReason::ProfitTarget => t.profit_limit,
                _ => price,
            };
            t.slippage += slippage_cost(&asset.params, ideal, price, t.side == Side::Short, t.lots);
            self.close_trade(h, reason, price);
            let event = match reason {
                CloseReason::Stopped => Some(TmfEvent::Stopped),
                CloseReason::ProfitTarget => Some(TmfEvent::Profit),
                _ => None,
            };
            if let Some(event) = event {
                self.call_manager(h, Some(bar), event);
            }
            return;
        }

        match self.call_manager(h, Some(bar), TmfEvent::Bar) {
            TmfAction::Exit => {
                let Some(t) = self.arena.get(h) else { return };
                let Some(asset) = asset_of(&self.assets, t.asset) else { return };
                let price = exit_price(asset, t, self.fill.as_ref());
                self.close_trade(h, CloseReason::Exit, price);
            }
            TmfAction::HoldStops => {}
            TmfAction::Continue | TmfAction::Enter => {
                let Some(t) = self.arena.get_mut(h) else { return };
                if t.contract.is_none() {
                    let Some(asset) = asset_of(&self.assets, t.asset) else { return };
                    trail(t, &BarQuotes { bar, ticks: asset.ticks(), spread: asset.spread });
                }
            }
        }
    }

    /// Call the trade's manager.
    fn call_manager(&mut self, h: TradeHandle, bar: Option<&Bar>, event: TmfEvent) -> TmfAction {
        let now = self.state.bar;
        let Some(t) = self.arena.get_mut(h) else { return TmfAction::Continue };
        let Some(TmfId(index)) = t.manager else { return TmfAction::Continue };
        if t.attrs.ignore {
            return TmfAction::Continue;
        }
        let Some(manager) = self.managers.get_mut(index as usize) else {
            return TmfAction::Continue;
        };
        manager.manage(&mut TradeView::new(t, bar, event, now))
    }

    fn fill_trade(&mut self, h: TradeHandle, price: f64, ideal: f64) {
        let id = self.ids.next_id();
        let (now, time) = (self.state.bar, self.state.time);
        let Some(t) = self.arena.get_mut(h) else { return };
        let Some(asset) = asset_of(&self.assets, t.asset) else { return };
        t.spread = asset.spread;
        t.fill(id, price, now, time);
        t.slippage = slippage_cost(&asset.params, ideal, price, t.side == Side::Long, t.lots);
        debug!(trade = %id, side = %t.side, asset = asset.name(), price, lots = t.lots, "trade opened");
        self.arena.index_id(id, h);
        self.call_manager(h, None, TmfEvent::Entered);
    }

    /// Move a live trade into the closed state and book its result.
    fn close_trade(&mut self, h: TradeHandle, reason: CloseReason, price: f64) -> bool {
        let (bar, time) = (self.state.bar, self.state.time);
        let Some(t) = self.arena.get_mut(h) else { return false };
        if t.is_closed() {
            return false;
        }
        let filled = t.is_open();
        t.close(reason, bar, price, time);
        debug!(trade = ?t.id, side = %t.side, %reason, price, bar, "trade closed");
        if reason.is_rejection() {
            self.state.num_rejected += 1;
            warn!(status = %t.status, %reason, bar, "entry rejected");
        }
        if !filled || reason == CloseReason::Removed {
            return true;
        }
        let Some(asset) = asset_of(&self.assets, t.asset) else { return true };
        let Some(record) = settle(t, &asset.params) else { return true };
        let key = t.status.clone();
        self.book(key, record);
        true
    }

    fn book(&mut self, key: StatusKey, record: TradeRecord) {
        self.statuses
            .entry(key.clone())
            .or_insert_with(|| Status::new(key))
            .record_close(record.result, record.lots);
        self.state.performance.record_trade(&record);
        if !record.phantom {
            self.state.account.balance += record.result;
        }
        self.trade_log.push(record);
    }

    /// Recompute the account and open statistics and take the bar mark.
    pub fn end_bar(&mut self) -> Result<(), EngineError> {
        self.state.account.reset_open();
        self.statuses.values_mut().for_each(Status::reset_open);
        let valuation = NaiveFill;
        for h in self.arena.handles() {
            let Some(t) = self.arena.get_mut(h) else { continue };
            let Some(status) = self.statuses.get_mut(&t.status) else { continue };
            let account = &mut self.state.account;
            if t.is_pending() {
                account.num_pending += 1;
                status.num_pending += 1;
                continue;
            }
            if !t.is_open() {
                continue;
            }
            let Some(asset) = asset_of(&self.assets, t.asset) else { continue };
            let open = unrealized(t, &asset.params, exit_price(asset, t, &valuation));
            t.result = open;
            status.record_open(open);
            if t.attrs.phantom {
                account.num_phantom_open += 1;
                continue;
            }
            match t.side {
                Side::Long => account.num_long_open += 1,
                Side::Short => account.num_short_open += 1,
            }
            if open > 0.0 {
                account.num_win_open += 1;
                account.win_val_open += open;
            } else if open < 0.0 {
                account.num_loss_open += 1;
                account.loss_val_open -= open;
            } else {
                account.num_even_open += 1;
            }
            account.margin_sum += margin_of(t, &asset.params);
            account.risk_sum += risk_of(t, &asset.params);
        }
        let a = &mut self.state.account;
        a.equity = a.balance + a.win_val_open - a.loss_val_open;
        let mark = BarMark {
            balance: a.balance,
            equity: a.equity,
            margin: a.margin_sum,
            risk: a.risk_sum,
            in_market: a.num_open() > 0,
        };
        let trading = mark.in_market;
        self.state.set_flag(status::TRADING, trading);
        self.state.push_mark(mark, self.config.max_bars)
    }

    /// Close every open trade at market with `reason`; pending ones are cancelled.
    pub(crate) fn close_all(&mut self, reason: CloseReason) -> usize {
        let live: Vec<TradeHandle> =
            self.arena.iter().filter(|(_, t)| t.is_live()).map(|(h, _)| h).collect();
        let mut closed = 0;
        for h in live {
            let Some(t) = self.arena.get(h) else { continue };
            let ok = if t.is_pending() {
                self.close_trade(h, CloseReason::Cancelled, 0.0)
            } else {
                let Some(asset) = asset_of(&self.assets, t.asset) else { continue };
                let price = exit_price(asset, t, self.fill.as_ref());
                self.close_trade(h, reason, price)
            };
            closed += ok as usize;
        }
        closed
    }

    /// Live trades, cloned.
    pub fn open_trades(&self) -> Vec<Trade> {
        self.arena.iter().filter(|(_, t)| t.is_live()).map(|(_, t)| t.clone()).collect()
    }

    pub(crate) fn into_parts(self) -> (RunState, Vec<TradeRecord>, Vec<Status>, Vec<Trade>) {
        let open = self.open_trades();
        let statuses = self.statuses.into_values().collect();
        (self.state, self.trade_log, statuses, open)
    }

    // ── Entries and exits ──

    fn enter(&mut self, side: Side, order: EntryOrder) -> Option<TradeHandle> {
        if self.state.in_lookback() {
            return None;
        }
        let Some(aid) = self.state.asset else {
            self.fail(EngineError::NoAsset);
            return None;
        };
        let now = self.state.bar;
        let key = StatusKey::new(self.state.algo.clone(), aid, side);
        self.statuses.entry(key.clone()).or_insert_with(|| Status::new(key.clone()));

        if self.settings.hedge == Hedge::None {
            self.reverse(&key);
        }
        let max = match side {
            Side::Long => self.settings.max_long,
            Side::Short => self.settings.max_short,
        };
        if max > 0 {
            if let Some(h) = self.apply_limit(&key, max, &order) {
                return Some(h);
            }
        }

        let s = &self.settings;
        let stop = pick(order.stop, s.stop);
        let Some(asset) = asset_of(&self.assets, aid) else {
            self.fail(EngineError::UnknownAsset(aid.to_string()));
            return None;
        };
        let contract = order
            .contract
            .filter(|r| r.asset == aid)
            .and_then(|r| asset.chain.get(r))
            .copied();
        let lots = size_lots(
            &SizeRequest { lots: pick_u32(order.lots, s.lots), margin: s.margin, risk: s.risk, stop },
            &asset.params,
        );

        let mut trade = Trade::new(side, aid, key, now);
        trade.attrs = TradeAttrs { phantom: s.phantom, pool: s.pool, bar_only: s.bar_only, ..TradeAttrs::default() };
        trade.lots = lots;
        trade.units = lots as f64 * asset.params.lot_amount;
        if stop > 0.0 {
            trade.stop_dist = -side.sign() * stop;
        }
        trade.profit_dist = pick(order.take_profit, s.take_profit);
        trade.trail_dist = pick(order.trail, s.trail);
        trade.trail_slope = pick(order.trail_slope, s.trail_slope);
        trade.trail_lock = pick(order.trail_lock, s.trail_lock);
        trade.trail_step = pick(order.trail_step, s.trail_step);
        trade.exit_time = pick_u32(order.exit_time, s.exit_time);
        trade.entry_wait = pick_u32(order.entry_time, s.entry_time).max(1);
        trade.manager = order.manager;
        trade.args = order.args;
        trade.skill = asset.skill;
        trade.contract = contract.map(|c| ContractSpec { kind: c.kind, expiry: c.expiry, strike: c.strike });

        let quote = match contract {
            Some(c) if side == Side::Long => c.ask,
            Some(c) => c.bid,
            None => trade.entry_quote(asset.price, asset.spread),
        };
        let entry = if contract.is_some() { 0.0 } else { pick(order.entry, s.entry) };
        let market_open = ole_to_datetime(self.state.time).map_or(true, |d| asset.params.hours.is_open(d));

        enum Start {
            NoSize,
            MissedOpen,
            Market,
            Pending,
        }
        let start = if lots == 0 {
            Start::NoSize
        } else if entry != 0.0 {
            // > 0 buys below (sells above) the quote, < 0 the other way round
            let limit = quote - side.sign() * entry;
            let kind = if entry > 0.0 { EntryKind::Limit } else { EntryKind::Stop };
            trade.entry_limit = limit;
            trade.attrs.entry_stop = kind == EntryKind::Stop;
            trade.state = TradeState::Pending { placed_bar: now, wait_bars: trade.entry_wait, limit, kind };
            Start::Pending
        } else if !market_open {
            Start::MissedOpen
        } else {
            Start::Market
        };

        let h = match self.arena.insert(trade) {
            Ok(h) => h,
            Err(err) => {
                self.fail(err);
                return None;
            }
        };
        self.state.trade = Some(h);
        match start {
            Start::NoSize => {
                self.close_trade(h, CloseReason::NoSize, 0.0);
            }
            Start::MissedOpen => {
                self.close_trade(h, CloseReason::MissedOpen, 0.0);
            }
            Start::Market => {
                let price = if contract.is_some() { quote } else { self.fill.market(quote, side == Side::Long) };
                self.fill_trade(h, price, quote);
            }
            Start::Pending => debug!(side = %side, bar = now, "entry order placed"),
        }
        Some(h)
    }

    /// Close or cancel the opposite side of the component.
    fn reverse(&mut self, key: &StatusKey) {
        let opposite = StatusKey::new(key.algo.clone(), key.asset, key.side.opposite());
        let targets: Vec<TradeHandle> = self
            .arena
            .iter()
            .filter(|(_, t)| t.is_live() && t.status == opposite)
            .map(|(h, _)| h)
            .collect();
        for h in targets {
            let Some(t) = self.arena.get(h) else { continue };
            if t.is_pending() {
                self.close_trade(h, CloseReason::Cancelled, 0.0);
            } else if let Some(asset) = asset_of(&self.assets, t.asset) {
                let price = exit_price(asset, t, self.fill.as_ref());
                self.close_trade(h, CloseReason::Reversed, price);
            }
        }
    }

    /// With `max` live trades in the component, move their levels to the
    /// new order's values and return the most recent one instead of entering.
    fn apply_limit(&mut self, key: &StatusKey, max: u32, order: &EntryOrder) -> Option<TradeHandle> {
        let live: Vec<TradeHandle> = self
            .arena
            .iter()
            .filter(|(_, t)| t.is_live() && t.status == *key)
            .map(|(h, _)| h)
            .collect();
        if (live.len() as u32) < max {
            return None;
        }
        let stop = pick(order.stop, self.settings.stop);
        let take_profit = pick(order.take_profit, self.settings.take_profit);
        let trail_dist = pick(order.trail, self.settings.trail);
        for &h in &live {
            let Some(t) = self.arena.get_mut(h) else { continue };
            let dir = t.side.sign();
            if stop > 0.0 {
                t.stop_dist = -dir * stop;
                if t.is_open() {
                    t.stop_limit = t.entry_price + t.stop_dist;
                }
            }
            if take_profit > 0.0 {
                t.profit_dist = take_profit;
                if t.is_open() {
                    t.profit_limit = t.entry_price + dir * take_profit;
                }
            }
            if trail_dist > 0.0 {
                t.trail_dist = trail_dist;
            }
        }
        debug!(status = %key, max, "trade limit reached, levels updated");
        let latest = live
            .into_iter()
            .max_by_key(|h| self.arena.get(*h).map(|t| (t.bar_open, t.id)));
        self.state.trade = latest;
        latest
    }

    fn exit_side(&mut self, side: Side, order: ExitOrder) -> usize {
        let asset = self.state.asset;
        if asset.is_none() && order.scope != ExitScope::All {
            return 0;
        }
        let algo = self.state.algo.clone();
        let targets: Vec<TradeHandle> = self
            .arena
            .iter()
            .filter(|(_, t)| t.is_live() && t.side == side && !t.attrs.ignore)
            .filter(|(_, t)| match order.scope {
                ExitScope::Component => Some(t.asset) == asset && t.status.algo == algo,
                ExitScope::Asset => Some(t.asset) == asset,
                ExitScope::All => true,
            })
            .map(|(h, _)| h)
            .collect();
        targets.into_iter().filter(|h| self.exit_one(*h, &order)).count()
    }

    fn exit_one(&mut self, h: TradeHandle, order: &ExitOrder) -> bool {
        let Some(t) = self.arena.get(h) else { return false };
        if t.is_pending() {
            return self.close_trade(h, CloseReason::Cancelled, 0.0);
        }
        if !t.is_open() {
            return false;
        }
        let Some(asset) = asset_of(&self.assets, t.asset) else { return false };
        if order.limit > 0.0 {
            let current = t.exit_quote(asset.price, asset.spread);
            let favourable = (order.limit - current) * t.side.sign() > 0.0;
            let Some(t) = self.arena.get_mut(h) else { return false };
            if favourable {
                t.profit_limit = order.limit;
            } else {
                t.stop_limit = order.limit;
            }
            return true;
        }
        let price = exit_price(asset, t, self.fill.as_ref());
        if order.lots > 0 && order.lots < t.lots {
            return self.split_close(h, order.lots, price);
        }
        self.close_trade(h, CloseReason::Exit, price)
    }

    /// Close `lots` of an open trade. The remainder stays open under a new id.
    fn split_close(&mut self, h: TradeHandle, lots: u32, price: f64) -> bool {
        let Some(t) = self.arena.get(h) else { return false };
        let Some(lot_amount) = asset_of(&self.assets, t.asset).map(|a| a.params.lot_amount) else {
            return false;
        };
        let share = lots as f64 / t.lots as f64;
        let mut rest = t.clone();
        rest.id = Some(self.ids.next_id());
        rest.lots = t.lots - lots;
        rest.units = rest.lots as f64 * lot_amount;
        rest.roll = t.roll * (1.0 - share);
        rest.slippage = t.slippage * (1.0 - share);
        let rest_id = rest.id;
        if let Err(err) = self.arena.insert(rest) {
            self.fail(err);
            return false;
        }
        let Some(t) = self.arena.get_mut(h) else { return false };
        t.lots = lots;
        t.units = lots as f64 * lot_amount;
        t.roll *= share;
        t.slippage *= share;
        debug!(trade = ?t.id, remainder = ?rest_id, lots, "partial close");
        self.close_trade(h, CloseReason::Exit, price)
    }

    // ── Persistence ──

    /// Write all status records and live trades as JSON.
    pub fn save_status(&self, path: &Path) -> Result<(), EngineError> {
        let name = |id: AssetId| self.assets.get(slot(id)).map(|a| a.name().to_string()).unwrap_or_default();
        let session = SavedSession {
            statuses: self
                .statuses
                .values()
                .map(|s| SavedStatus { asset: name(s.key.asset), status: s.clone() })
                .collect(),
            trades: self
                .arena
                .iter()
                .filter(|(_, t)| t.is_live())
                .map(|(_, t)| SavedTrade { asset: name(t.asset), trade: t.clone() })
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&session)?)?;
        info!(path = %path.display(), statuses = session.statuses.len(), trades = session.trades.len(), "status saved");
        Ok(())
    }

    /// Restore status records and live trades saved by [`Self::save_status`].
    /// Entries of assets unknown to this context are skipped. Returns the
    /// number of trades restored.
    pub fn load_status(&mut self, path: &Path) -> Result<usize, EngineError> {
        let session: SavedSession = serde_json::from_str(&fs::read_to_string(path)?)?;
        for SavedStatus { asset, mut status } in session.statuses {
            let Some(&id) = self.by_name.get(&asset) else {
                warn!(%asset, "saved status for unknown asset skipped");
                continue;
            };
            status.key.asset = id;
            self.statuses.insert(status.key.clone(), status);
        }
        let mut restored = 0;
        for SavedTrade { asset, mut trade } in session.trades {
            let Some(&id) = self.by_name.get(&asset) else {
                warn!(%asset, "saved trade for unknown asset skipped");
                continue;
            };
            trade.asset = id;
            trade.status.asset = id;
            if let Some(tid) = trade.id {
                self.ids.observe(tid);
            }
            let key = trade.status.clone();
            self.statuses.entry(key.clone()).or_insert_with(|| Status::new(key));
            self.arena.insert(trade)?;
            restored += 1;
        }
        info!(path = %path.display(), trades = restored, "status loaded");
        Ok(restored)
    }

    // ── Helpers ──

    fn bar_at(&self, offset: usize) -> Option<&Bar> {
        self.current_asset()?.at(offset)
    }

    fn bar_price(&self, offset: usize, f: impl Fn(&Bar) -> f64) -> f64 {
        self.bar_at(offset).map_or(NIL, f)
    }

    fn bar_time(&self, offset: usize) -> Option<NaiveDateTime> {
        ole_to_datetime(self.bar_at(offset)?.time)
    }

    fn bar_field(&self, offset: usize, f: impl Fn(NaiveDateTime) -> u32) -> u32 {
        self.bar_time(offset).map_or(0, f)
    }

    fn chain_contract(&self, c: ContractRef) -> Option<&Contract> {
        self.assets.get(slot(c.asset))?.chain.get(c)
    }
}

impl Platform for SimContext {
    fn state(&self) -> &RunState {
        &self.state
    }

    fn config(&self) -> &SimConfig {
        &self.config
    }

    fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut TradeSettings {
        &mut self.settings
    }

    fn is(&self, flag: u32) -> bool {
        self.state.is(flag)
    }

    fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    fn set_error(&mut self, msg: &str) {
        debug!(bar = self.state.bar, msg, "script error");
        self.state.last_error = Some(msg.to_string());
    }

    fn print(&mut self, target: PrintTarget, msg: &str) {
        let bar = self.state.bar;
        match target {
            PrintTarget::Log => info!(target: "barsim::script", bar, "{msg}"),
            PrintTarget::Diag => debug!(target: "barsim::script", bar, "{msg}"),
            PrintTarget::Alert => warn!(target: "barsim::script", bar, "{msg}"),
        }
    }

    fn algo(&mut self, name: &str) {
        self.state.algo = name.to_string();
    }

    fn asset(&mut self, name: &str) -> Result<AssetId, EngineError> {
        match self.by_name.get(name) {
            Some(&id) => {
                self.state.asset = Some(id);
                Ok(id)
            }
            None => {
                let err = EngineError::UnknownAsset(name.to_string());
                self.state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn asset_add(&mut self, params: AssetParams) -> Result<AssetId, EngineError> {
        params.validate()?;
        if let Some(&id) = self.by_name.get(&params.name) {
            self.assets[slot(id)].params = params;
            self.state.asset = Some(id);
            return Ok(id);
        }
        let id = AssetId(self.assets.len() as u32);
        debug!(asset = %params.name, %id, "asset added");
        self.by_name.insert(params.name.clone(), id);
        self.assets.push(Asset::new(id, params, self.config.max_bars));
        self.current.push(None);
        self.state.asset = Some(id);
        self.state.set_flag(status::ASSETS, true);
        Ok(id)
    }

    fn asset_type(&self, name: &str) -> AssetType {
        asset_type(name)
    }

    fn current_asset(&self) -> Option<&Asset> {
        self.assets.get(slot(self.state.asset?))
    }

    fn price(&self, offset: usize) -> f64 {
        self.bar_price(offset, Bar::mean)
    }

    fn price_open(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.open)
    }

    fn price_close(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.close)
    }

    fn price_high(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.high)
    }

    fn price_low(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.low)
    }

    fn price_set(&mut self, offset: usize, open: f64, high: f64, low: f64, close: f64) -> bool {
        let Some(id) = self.state.asset else { return false };
        let Some(bar) = self.assets.get_mut(slot(id)).and_then(|a| a.at_mut(offset)) else {
            return false;
        };
        bar.open = open;
        bar.high = high;
        bar.low = low;
        bar.close = close;
        true
    }

    fn price_quote(&mut self, time: f64, quote: f64) -> bool {
        let Some(id) = self.state.asset else { return false };
        match self.assets.get_mut(slot(id)) {
            Some(asset) => {
                asset.quote(time, quote);
                true
            }
            None => false,
        }
    }

    fn market_val(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.val)
    }

    fn market_vol(&self, offset: usize) -> f64 {
        self.bar_price(offset, |b| b.vol)
    }

    fn enter_long(&mut self, order: EntryOrder) -> Option<TradeHandle> {
        self.enter(Side::Long, order)
    }

    fn enter_short(&mut self, order: EntryOrder) -> Option<TradeHandle> {
        self.enter(Side::Short, order)
    }

    fn exit_long(&mut self, order: ExitOrder) -> usize {
        self.exit_side(Side::Long, order)
    }

    fn exit_short(&mut self, order: ExitOrder) -> usize {
        self.exit_side(Side::Short, order)
    }

    fn exit_trade(&mut self, handle: TradeHandle, order: ExitOrder) -> bool {
        self.exit_one(handle, &order)
    }

    fn cancel_trade(&mut self, id: TradeId) -> bool {
        let Some(h) = self.arena.find(id) else { return false };
        let Some(t) = self.arena.get(h) else { return false };
        let reason = if t.is_pending() { CloseReason::Cancelled } else { CloseReason::Removed };
        let price = t.exit_price;
        self.close_trade(h, reason, price)
    }

    fn trades(&self, filter: &TradeFilter) -> Vec<TradeHandle> {
        self.arena.iter().filter(|(_, t)| filter.matches(t)).map(|(h, _)| h).collect()
    }

    fn find_trade(&self, id: TradeId) -> Option<TradeHandle> {
        self.arena.find(id)
    }

    fn trade(&self, handle: TradeHandle) -> Option<&Trade> {
        self.arena.get(handle)
    }

    fn trade_levels(&mut self, handle: TradeHandle) -> Option<TradeLevels<'_>> {
        self.arena.get_mut(handle).filter(|t| t.is_live()).map(TradeLevels::new)
    }

    fn register_manager(&mut self, manager: Box<dyn TradeManager>) -> TmfId {
        self.managers.push(manager);
        TmfId((self.managers.len() - 1) as u32)
    }

    fn contract(&mut self, kind: u32, days: i32, strike: f64) -> Option<ContractRef> {
        let now = self.state.time;
        let asset = self.current_asset()?;
        let index = asset.chain.select(kind, days, strike, now)?;
        let r = asset.chain.make_ref(asset.id, index);
        self.state.contract = r;
        r
    }

    fn contract_update(&mut self, contracts: Vec<Contract>) -> usize {
        let Some(id) = self.state.asset else { return 0 };
        let Some(asset) = self.assets.get_mut(slot(id)) else { return 0 };
        asset.chain.replace(contracts);
        self.state.contract = None;
        self.state.set_flag(status::CONTRACTS, true);
        asset.chain.len()
    }

    fn contract_days(&self, c: ContractRef) -> f64 {
        let Some(now) = ole_to_datetime(self.state.time) else { return NIL };
        self.chain_contract(c).map_or(NIL, |k| k.days_to_expiry(now))
    }

    fn contract_price(&self, c: ContractRef) -> f64 {
        self.chain_contract(c).map_or(NIL, Contract::price)
    }

    fn contract_position(&self, c: ContractRef) -> i64 {
        let Some(k) = self.chain_contract(c) else { return 0 };
        self.arena
            .iter()
            .filter(|(_, t)| t.is_open() && t.asset == c.asset)
            .filter(|(_, t)| {
                t.contract.is_some_and(|s| s.kind == k.kind && s.expiry == k.expiry && s.strike == k.strike)
            })
            .map(|(_, t)| t.side.sign() as i64 * t.lots as i64)
            .sum()
    }

    fn this_contract(&self) -> Option<&Contract> {
        self.chain_contract(self.state.contract?)
    }

    fn year(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.year() as u32)
    }

    fn month(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.month())
    }

    fn day(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.day())
    }

    fn hour(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.hour())
    }

    fn minute(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.minute())
    }

    fn dow(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| d.weekday().number_from_monday())
    }

    fn tod(&self, offset: usize) -> u32 {
        self.bar_field(offset, hhmm)
    }

    fn date(&self, offset: usize) -> u32 {
        self.bar_field(offset, |d| ymd(d.date()))
    }

    fn wdate(&self, offset: usize) -> f64 {
        self.bar_at(offset).map_or(NIL, |b| b.time)
    }

    fn market(&self, offset: usize) -> bool {
        let Some(asset) = self.current_asset() else { return false };
        self.bar_time(offset).is_some_and(|d| asset.params.hours.is_open(d))
    }

    fn getvar(&self, file: Option<&Path>, name: &str) -> f64 {
        match file {
            Some(path) => VarStore::get_file(path, name),
            None => self.vars.get(name),
        }
    }

    fn putvar(&mut self, file: Option<&Path>, name: &str, value: f64) -> Result<(), EngineError> {
        match file {
            Some(path) => VarStore::put_file(path, name, value),
            None => {
                self.vars.put(name, value);
                Ok(())
            }
        }
    }

    fn file_append(&mut self, path: &Path, text: &str) -> Result<(), EngineError> {
        io::file_append(path, text)
    }

    fn file_content(&self, path: &Path) -> Result<String, EngineError> {
        io::file_content(path)
    }
}
