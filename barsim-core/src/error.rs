//! Engine error types.

use thiserror::Error;

/// Storage that is sized before a run and must not grow past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Trades,
    Bars,
    DatasetRows,
}

impl std::fmt::Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Storage::Trades => "trade slots",
            Storage::Bars => "bar storage",
            Storage::DatasetRows => "dataset rows",
        };
        f.write_str(name)
    }
}

/// Errors that stop a run or fail an engine-level operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{storage} exhausted (capacity {capacity})")]
    CapacityExhausted { storage: Storage, capacity: usize },

    #[error("unknown asset '{0}'")]
    UnknownAsset(String),

    #[error("no asset selected")]
    NoAsset,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Fatal errors end the bar loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::CapacityExhausted { .. })
    }
}
