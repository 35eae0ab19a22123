use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an asset in the simulation's asset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// Numeric trade id, assigned when a trade fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u32);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic trade id generator. Ids are never reused within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIdGen {
    next: u32,
}

impl TradeIdGen {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> TradeId {
        let id = TradeId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    /// Make sure future ids are greater than `id` (after loading saved trades).
    pub fn observe(&mut self, id: TradeId) {
        self.next = self.next.max(id.0.saturating_add(1));
    }
}

impl Default for TradeIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Generational reference to a trade slot.
///
/// A handle only resolves while its generation matches the slot's; recycling
/// a slot bumps the generation and invalidates every outstanding handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeHandle {
    pub index: u32,
    pub generation: u32,
}

/// Id of a registered trade management function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TmfId(pub u32);

/// Trade direction. Fixed when the trade is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Identifies one strategy component: algorithm, asset and side.
/// Every trade of a component shares one `Status` record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    pub algo: String,
    pub asset: AssetId,
    pub side: Side,
}

impl StatusKey {
    pub fn new(algo: impl Into<String>, asset: AssetId, side: Side) -> Self {
        Self { algo: algo.into(), asset, side }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.algo.is_empty() {
            write!(f, "{}:{}", self.asset, self.side)
        } else {
            write!(f, "{}:{}:{}", self.algo, self.asset, self.side)
        }
    }
}

/// Generational reference to a contract in an asset's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    pub asset: AssetId,
    pub index: u32,
    pub generation: u32,
}
