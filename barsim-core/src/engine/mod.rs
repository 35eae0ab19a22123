//! Simulation engine: configuration, the trade arena, per-bar trade
//! processing, accounting, the strategy call surface and the bar loop.
//!
//! [`SimContext`] owns all mutable state of one simulation and implements
//! [`Platform`]. [`Simulation`] drives it over [`MarketData`](crate::data::MarketData):
//!
//! 1. Start of bar: recycle closed trades, new-day detection
//! 2. Feed: advance every asset with a bar at this time
//! 3. Trades: pending fills, exits, trailing, trade managers
//! 4. Strategy callback
//! 5. End of bar: account recompute, bar mark

pub mod accounting;
pub mod arena;
pub mod config;
pub mod context;
pub mod fill;
pub mod loop_runner;
pub mod platform;
pub mod state;
pub mod tmf;
pub mod trade_step;

pub use arena::TradeArena;
pub use config::{Hedge, SimConfig, TradeSettings};
pub use context::SimContext;
pub use fill::{FillKind, FillModel, GapFill, NaiveFill};
pub use loop_runner::{RunResult, Simulation, Strategy};
pub use platform::{EntryOrder, ExitOrder, ExitScope, Platform, PrintTarget, TradeFilter};
pub use state::{Account, RunState};
pub use tmf::{BreakEven, TmfAction, TmfEvent, TradeManager, TradeView};
