//! Market data: history files, multi-asset alignment, datasets.

pub mod align;
pub mod dataset;
pub mod history;

pub use align::{AssetSeries, MarketData};
pub use dataset::{Dataset, DatasetError};
pub use history::{load_bars, BarBuilder, HistoryError};
