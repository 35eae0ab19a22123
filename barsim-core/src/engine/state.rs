//! Engine-owned run state. Strategies only ever see `&RunState`.

use crate::domain::{AssetId, BarMark, ContractRef, Performance, TradeHandle};
use crate::error::{EngineError, Storage};
use crate::flags::status;
use serde::{Deserialize, Serialize};

/// Account situation, recomputed at the end of every bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Start capital plus closed results.
    pub balance: f64,
    /// Balance plus open results.
    pub equity: f64,
    pub margin_sum: f64,
    /// Sum of the losses at the stops of all open trades.
    pub risk_sum: f64,
    pub win_val_open: f64,
    pub loss_val_open: f64,
    pub num_long_open: u32,
    pub num_short_open: u32,
    pub num_win_open: u32,
    pub num_loss_open: u32,
    pub num_even_open: u32,
    pub num_pending: u32,
    pub num_phantom_open: u32,
}

impl Account {
    pub fn num_open(&self) -> u32 {
        self.num_long_open + self.num_short_open
    }

    pub(crate) fn reset_open(&mut self) {
        let balance = self.balance;
        *self = Self { balance, equity: balance, ..Self::default() };
    }
}

/// Cursors, flags and results of the running simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Current global bar.
    pub bar: usize,
    /// Total global bars in the data.
    pub num_bars: usize,
    /// OLE time of the current global bar.
    pub time: f64,
    /// Current sweep or walk-forward cycle, starting at 1.
    pub cycle: u32,
    pub total_cycles: u32,
    /// Status flags, see [`crate::flags::status`].
    pub status: u32,
    pub algo: String,
    pub asset: Option<AssetId>,
    pub trade: Option<TradeHandle>,
    pub contract: Option<ContractRef>,
    pub account: Account,
    pub performance: Performance,
    /// One mark per bar; capacity `max_bars`.
    pub marks: Vec<BarMark>,
    /// Equity at the end of each day.
    pub daily_equity: Vec<f64>,
    pub last_error: Option<String>,
    /// Entries that ended without a fill (no size, missed entry or open).
    pub num_rejected: u32,
}

impl RunState {
    pub fn is(&self, flag: u32) -> bool {
        self.status & flag != 0
    }

    pub(crate) fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    pub fn in_lookback(&self) -> bool {
        self.is(status::LOOKBACK)
    }

    pub fn balance_curve(&self) -> Vec<f64> {
        self.marks.iter().map(|m| m.balance).collect()
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.marks.iter().map(|m| m.equity).collect()
    }

    pub(crate) fn push_mark(&mut self, mark: BarMark, capacity: usize) -> Result<(), EngineError> {
        if self.marks.len() >= capacity {
            return Err(EngineError::CapacityExhausted { storage: Storage::Bars, capacity });
        }
        self.performance.record_bar(&mark);
        self.marks.push(mark);
        Ok(())
    }

    pub(crate) fn push_daily(&mut self, equity: f64, capacity: usize) -> Result<(), EngineError> {
        if self.daily_equity.len() >= capacity {
            return Err(EngineError::CapacityExhausted { storage: Storage::Bars, capacity });
        }
        self.daily_equity.push(equity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_toggle() {
        let mut s = RunState::default();
        s.set_flag(status::LOOKBACK, true);
        assert!(s.in_lookback());
        s.set_flag(status::LOOKBACK, false);
        assert!(!s.is(status::LOOKBACK));
    }

    #[test]
    fn marks_are_bounded() {
        let mut s = RunState::default();
        s.push_mark(BarMark::default(), 1).unwrap();
        assert!(s.push_mark(BarMark::default(), 1).is_err());
        assert_eq!(s.performance.num_bars, 1);
    }

    #[test]
    fn reset_keeps_balance() {
        let mut a = Account { balance: 500.0, num_long_open: 2, margin_sum: 3.0, ..Account::default() };
        a.reset_open();
        assert_eq!(a.equity, 500.0);
        assert_eq!(a.num_open(), 0);
        assert_eq!(a.margin_sum, 0.0);
    }
}
