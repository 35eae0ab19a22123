//! Assets: instrument parameters, per-asset bar history and bar cursor.

use super::bar::{Bar, Tick};
use super::contract::ContractChain;
use super::ids::AssetId;
use crate::error::{EngineError, Storage};
use crate::flags::NUM_SKILLS;
use crate::time::{MarketHours, Zone};
use serde::{Deserialize, Serialize};

/// Static parameters of one traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetParams {
    pub name: String,
    /// Ask minus bid, in price units.
    pub spread: f64,
    /// Rollover per lot and day, long and short side. Negative is a cost.
    pub roll_long: f64,
    pub roll_short: f64,
    /// Size of one pip in price units.
    pub pip: f64,
    /// Value of one pip per lot, in account currency.
    pub pip_cost: f64,
    /// Margin per lot.
    pub margin_cost: f64,
    pub leverage: f64,
    /// Contracts or units per lot.
    pub lot_amount: f64,
    /// Round-turn commission per lot.
    pub commission: f64,
    /// 0 means unlimited.
    pub max_lots: u32,
    pub zone: Zone,
    pub hours: MarketHours,
    /// Asset bar period as a multiple of the simulation bar period.
    pub frame: usize,
    pub frame_offset: usize,
    /// Binary option payouts (fraction of stake).
    pub win_payout: f64,
    pub loss_payout: f64,
}

impl Default for AssetParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            spread: 0.0,
            roll_long: 0.0,
            roll_short: 0.0,
            pip: 0.0001,
            pip_cost: 0.1,
            margin_cost: 0.0,
            leverage: 100.0,
            lot_amount: 1000.0,
            commission: 0.0,
            max_lots: 0,
            zone: Zone::Utc,
            hours: MarketHours::always_open(),
            frame: 1,
            frame_offset: 0,
            win_payout: 0.0,
            loss_payout: 0.0,
        }
    }
}

impl AssetParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.is_empty() {
            return Err(EngineError::InvalidConfig("asset name is empty".into()));
        }
        if !(self.pip > 0.0) {
            return Err(EngineError::InvalidConfig(format!("{}: pip must be positive", self.name)));
        }
        if self.frame == 0 || self.frame_offset >= self.frame {
            return Err(EngineError::InvalidConfig(format!(
                "{}: need frame >= 1 and frame_offset < frame (got {} / {})",
                self.name, self.frame, self.frame_offset
            )));
        }
        if self.spread < 0.0 {
            return Err(EngineError::InvalidConfig(format!("{}: negative spread", self.name)));
        }
        Ok(())
    }

    /// Account-currency value of a price move of `delta` for `lots` lots.
    pub fn value_of(&self, delta: f64, lots: f64) -> f64 {
        delta / self.pip * self.pip_cost * lots
    }
}

/// Asset class guessed from the symbol name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Unknown = 0,
    Forex = 1,
    Index = 2,
    Commodity = 3,
    Stock = 4,
    Bond = 5,
    Crypto = 6,
}

const METALS: &[&str] = &["XAU", "XAG", "XPT", "XPD"];
const CRYPTO: &[&str] = &["BTC", "ETH", "LTC", "XRP", "BCH", "SOL"];
const INDICES: &[&str] = &[
    "SPX500", "NAS100", "US30", "US2000", "GER30", "GER40", "UK100", "FRA40", "EUR50",
    "JPN225", "AUS200", "HKG33",
];
const COMMODITIES: &[&str] = &["USOIL", "UKOIL", "NGAS", "COPPER", "CORN", "WHEAT", "SOYBEAN"];
const BONDS: &[&str] = &["BUND", "USTBOND", "USTNOTE", "GILT"];

/// Guess the asset class from a symbol such as `"EUR/USD"` or `"SPX500"`.
pub fn asset_type(name: &str) -> AssetType {
    let upper = name.to_ascii_uppercase();
    if let Some((base, quote)) = upper.split_once('/') {
        if base.len() == 3 && quote.len() == 3 {
            if METALS.contains(&base) {
                return AssetType::Commodity;
            }
            if CRYPTO.contains(&base) {
                return AssetType::Crypto;
            }
            return AssetType::Forex;
        }
        return AssetType::Unknown;
    }
    if INDICES.contains(&upper.as_str()) {
        AssetType::Index
    } else if COMMODITIES.contains(&upper.as_str()) {
        AssetType::Commodity
    } else if BONDS.contains(&upper.as_str()) {
        AssetType::Bond
    } else if !upper.is_empty()
        && upper.len() <= 5
        && upper.chars().all(|c| c.is_ascii_alphabetic() || c == '.')
    {
        AssetType::Stock
    } else {
        AssetType::Unknown
    }
}

/// One traded instrument during a run.
///
/// The asset keeps its own bar history, oldest first. Its cursor advances
/// once per asset bar: on global bar `g` the slot is
/// `(g + frame_offset) / frame`, and a new asset bar starts whenever the
/// slot changes; otherwise the incoming bar is merged into the current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub params: AssetParams,
    /// Current spread; bid quotes update it.
    pub spread: f64,
    /// Last ask price.
    pub price: f64,
    pub skill: [f64; NUM_SKILLS],
    pub chain: ContractChain,
    history: Vec<Bar>,
    capacity: usize,
    slot: Option<usize>,
    /// Ticks of the current global bar, oldest first.
    ticks: Vec<Tick>,
}

impl Asset {
    pub fn new(id: AssetId, params: AssetParams, capacity: usize) -> Self {
        Self {
            id,
            spread: params.spread,
            params,
            price: 0.0,
            skill: [0.0; NUM_SKILLS],
            chain: ContractChain::default(),
            history: Vec::new(),
            capacity,
            slot: None,
            ticks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Index of the current asset bar, `None` before the first bar.
    pub fn cursor(&self) -> Option<usize> {
        self.history.len().checked_sub(1)
    }

    pub fn history(&self) -> &[Bar] {
        &self.history
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Bar `offset` bars back from the current one (0 = current).
    pub fn at(&self, offset: usize) -> Option<&Bar> {
        let idx = self.cursor()?.checked_sub(offset)?;
        self.history.get(idx)
    }

    pub fn at_mut(&mut self, offset: usize) -> Option<&mut Bar> {
        let idx = self.cursor()?.checked_sub(offset)?;
        self.history.get_mut(idx)
    }

    /// Feed the data of global bar `g`. Returns true if a new asset bar started.
    pub fn advance(&mut self, g: usize, bar: &Bar, ticks: &[Tick]) -> Result<bool, EngineError> {
        let slot = (g + self.params.frame_offset) / self.params.frame;
        self.ticks.clear();
        self.ticks.extend_from_slice(ticks);
        self.price = bar.close;
        let started = if self.slot == Some(slot) && !self.history.is_empty() {
            if let Some(last) = self.history.last_mut() {
                last.merge(bar);
            }
            false
        } else {
            if self.history.len() >= self.capacity {
                return Err(EngineError::CapacityExhausted {
                    storage: Storage::Bars,
                    capacity: self.capacity,
                });
            }
            self.history.push(*bar);
            true
        };
        self.slot = Some(slot);
        Ok(started)
    }

    /// Record a quote at `time`. Positive is ask, negative is bid.
    pub fn quote(&mut self, time: f64, quote: f64) {
        if quote >= 0.0 {
            self.price = quote;
            self.ticks.push(Tick::new(time, quote));
            if let Some(bar) = self.history.last_mut() {
                bar.high = bar.high.max(quote);
                bar.low = bar.low.min(quote);
                bar.close = quote;
            }
        } else if self.price > 0.0 {
            self.spread = (self.price + quote).max(0.0);
        }
    }

    /// Bid price of the current bar close.
    pub fn bid(&self) -> f64 {
        self.price - self.spread
    }
}
