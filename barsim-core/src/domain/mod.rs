//! Entity model: assets, contracts, trades, per-component status, performance.

pub mod asset;
pub mod bar;
pub mod contract;
pub mod ids;
pub mod performance;
pub mod records;
pub mod status;
pub mod trade;

pub use asset::{asset_type, Asset, AssetParams, AssetType};
pub use bar::{Bar, Tick};
pub use contract::{Contract, ContractChain};
pub use ids::{AssetId, ContractRef, Side, StatusKey, TmfId, TradeHandle, TradeId, TradeIdGen};
pub use performance::{BarMark, Drawdown, Performance, ReturnStats};
pub use records::{CodecError, ContractRecord, Record, Thl, T1, T2, T6};
pub use status::{OptimizerState, Status};
pub use trade::{
    CloseReason, ContractSpec, DecodedFlags, EntryKind, FlagPhase, Trade, TradeAttrs, TradeLevels,
    TradeRecord, TradeState,
};
