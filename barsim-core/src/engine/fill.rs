//! Fill models: the price an order actually trades at.
//!
//! The engine decides *whether* an order triggers; the fill model decides
//! the price. [`NaiveFill`] fills at the ideal price. [`GapFill`] fills
//! gapped stop and limit orders at the bar open and adds adverse slippage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction in which price must move to reach a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    /// Triggers when the price rises to the trigger.
    Up,
    /// Triggers when the price falls to the trigger.
    Down,
}

/// A triggered order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillRequest {
    pub trigger: f64,
    /// Open of the bar (or the tick price) in the order's price stream.
    pub open: f64,
    pub cross: Cross,
    /// Buying (long entry, short exit) or selling.
    pub buy: bool,
}

impl FillRequest {
    /// The bar opened already beyond the trigger.
    pub fn gapped(&self) -> bool {
        match self.cross {
            Cross::Up => self.open > self.trigger,
            Cross::Down => self.open < self.trigger,
        }
    }
}

pub trait FillModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Price of a stop, limit or target order that triggered.
    fn triggered(&self, req: &FillRequest) -> f64;

    /// Price of a market order at `price`.
    fn market(&self, price: f64, _buy: bool) -> f64 {
        price
    }
}

/// Fills exactly at the trigger or market price.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveFill;

impl FillModel for NaiveFill {
    fn name(&self) -> &str {
        "naive"
    }

    fn triggered(&self, req: &FillRequest) -> f64 {
        req.trigger
    }
}

/// Gapped orders fill at the open; every fill pays `slippage` against the trader.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapFill {
    /// Adverse slippage per fill, in price units.
    pub slippage: f64,
}

impl GapFill {
    pub fn new(slippage: f64) -> Self {
        Self { slippage }
    }

    fn slip(&self, price: f64, buy: bool) -> f64 {
        if buy {
            price + self.slippage
        } else {
            price - self.slippage
        }
    }
}

impl FillModel for GapFill {
    fn name(&self) -> &str {
        "gap"
    }

    fn triggered(&self, req: &FillRequest) -> f64 {
        let base = if req.gapped() { req.open } else { req.trigger };
        self.slip(base, req.buy)
    }

    fn market(&self, price: f64, buy: bool) -> f64 {
        self.slip(price, buy)
    }
}

/// Serializable choice of fill model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FillKind {
    #[default]
    Naive,
    Gap {
        #[serde(default)]
        slippage: f64,
    },
}

impl FillKind {
    pub fn build(self) -> Box<dyn FillModel> {
        match self {
            FillKind::Naive => Box::new(NaiveFill),
            FillKind::Gap { slippage } => Box::new(GapFill::new(slippage)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sell_stop(open: f64) -> FillRequest {
        FillRequest { trigger: 100.0, open, cross: Cross::Down, buy: false }
    }

    #[test]
    fn naive_fills_at_trigger_even_when_gapped() {
        assert_eq!(NaiveFill.triggered(&sell_stop(95.0)), 100.0);
        assert_eq!(NaiveFill.market(101.0, true), 101.0);
    }

    #[test]
    fn gap_fill_uses_open_when_gapped() {
        let model = GapFill::new(0.0);
        assert!(sell_stop(95.0).gapped());
        assert_eq!(model.triggered(&sell_stop(95.0)), 95.0);
        assert!(!sell_stop(102.0).gapped());
        assert_eq!(model.triggered(&sell_stop(102.0)), 100.0);
    }

    #[test]
    fn gap_fill_slips_against_trader() {
        let model = GapFill::new(0.5);
        assert_eq!(model.market(100.0, true), 100.5);
        assert_eq!(model.market(100.0, false), 99.5);
        let buy_stop = FillRequest { trigger: 100.0, open: 103.0, cross: Cross::Up, buy: true };
        assert_eq!(model.triggered(&buy_stop), 103.5);
    }

    #[test]
    fn fill_kind_parses_from_toml_style_json() {
        let kind: FillKind = serde_json::from_str(r#"{"model":"gap","slippage":0.01}"#).unwrap();
        assert_eq!(kind, FillKind::Gap { slippage: 0.01 });
        assert_eq!(kind.build().name(), "gap");
    }
}
