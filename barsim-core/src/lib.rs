//! barsim core: trading-simulation data model and bar loop.
//!
//! This crate contains:
//! - The entity model (assets, contracts, trades, per-component status, performance)
//! - The trade lifecycle state machine and its persisted flag word
//! - The simulation context with the strategy call surface (`Platform`)
//! - The bar-by-bar loop driving strategies over aligned market data
//! - History file codecs, CSV import, datasets, series and matrix helpers

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod flags;
pub mod io;
pub mod logging;
pub mod matrix;
pub mod series;
pub mod strategies;
pub mod time;

pub use error::EngineError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: data handed to sweep workers is Send, results
    /// coming back are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::Status>();
        require_sync::<domain::Status>();
        require_send::<domain::Performance>();
        require_sync::<domain::Performance>();
        require_send::<domain::AssetParams>();
        require_sync::<domain::AssetParams>();

        // Data
        require_send::<data::MarketData>();
        require_sync::<data::MarketData>();
        require_send::<data::Dataset>();
        require_sync::<data::Dataset>();

        // Engine
        require_send::<engine::SimConfig>();
        require_sync::<engine::SimConfig>();
        require_send::<engine::TradeSettings>();
        require_sync::<engine::TradeSettings>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
        require_send::<engine::SimContext>();
        require_send::<Box<dyn engine::Strategy>>();
        require_send::<engine::Simulation<Box<dyn engine::Strategy>>>();
    }

    /// Strategies only get the `Platform` surface, never the context itself.
    #[test]
    fn strategy_sees_platform_only() {
        fn _check(s: &mut dyn engine::Strategy, p: &mut dyn engine::Platform) -> Result<(), EngineError> {
            s.run(p)
        }
    }
}
