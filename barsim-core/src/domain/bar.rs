//! Bars and ticks.

use super::records::{T1, T2, T6};
use serde::{Deserialize, Serialize};

/// OHLC bar in ask prices. `time` is the bar close as an OLE date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Spread, open interest or any extra per-bar value from the source.
    pub val: f64,
    pub vol: f64,
}

impl Bar {
    pub fn new(time: f64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { time, open, high, low, close, val: 0.0, vol: 0.0 }
    }

    /// A bar whose four prices are all `price`.
    pub fn flat(time: f64, price: f64) -> Self {
        Self::new(time, price, price, price, price)
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// High is the maximum, low the minimum of the four prices.
    pub fn is_sane(&self) -> bool {
        !self.is_void()
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Mean of the four prices.
    pub fn mean(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    /// Merge a later bar into this one: max high, min low, last close.
    pub fn merge(&mut self, later: &Bar) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.time = later.time;
        self.val = later.val;
        self.vol += later.vol;
    }

    /// The same bar with every price moved by `delta` (ask to bid: `-spread`).
    pub fn shifted(&self, delta: f64) -> Bar {
        Bar {
            open: self.open + delta,
            high: self.high + delta,
            low: self.low + delta,
            close: self.close + delta,
            ..*self
        }
    }
}

impl From<T6> for Bar {
    fn from(r: T6) -> Self {
        Self {
            time: r.time,
            open: r.open as f64,
            high: r.high as f64,
            low: r.low as f64,
            close: r.close as f64,
            val: r.val as f64,
            vol: r.vol as f64,
        }
    }
}

impl From<&Bar> for T6 {
    fn from(b: &Bar) -> Self {
        Self {
            time: b.time,
            high: b.high as f32,
            low: b.low as f32,
            open: b.open as f32,
            close: b.close as f32,
            val: b.val as f32,
            vol: b.vol as f32,
        }
    }
}

/// One price quote inside a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: f64,
    /// Ask price.
    pub price: f64,
    pub vol: f64,
}

impl Tick {
    pub fn new(time: f64, price: f64) -> Self {
        Self { time, price, vol: 0.0 }
    }
}

/// Bid quotes carry a negative price and are dropped here; see
/// [`crate::data::history::quotes_from_t1`] for spread extraction.
impl From<T1> for Tick {
    fn from(r: T1) -> Self {
        Self { time: r.time, price: (r.price as f64).abs(), vol: 0.0 }
    }
}

impl From<T2> for Tick {
    fn from(r: T2) -> Self {
        Self { time: r.time, price: (r.price as f64).abs(), vol: r.vol as f64 }
    }
}
