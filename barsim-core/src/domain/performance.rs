//! Overall performance of a run.
//!
//! [`Performance`] is accumulated incrementally while the simulation runs:
//! once per closed trade ([`Performance::record_trade`]) and once per bar
//! ([`Performance::record_bar`]). [`Performance::from_history`] recomputes
//! the same figures in one pass over the finished trade log and bar marks;
//! both must agree exactly.

use super::trade::TradeRecord;
use serde::{Deserialize, Serialize};

/// Account snapshot taken at the end of every bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BarMark {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub risk: f64,
    /// Any trade was open during the bar.
    pub in_market: bool,
}

/// Running drawdown of one curve, measured as `peak - value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    pub peak: f64,
    /// Largest `peak - value` seen.
    pub max: f64,
    /// Bars on which the value was strictly below the running peak.
    pub bars: u32,
    /// Current run of bars below the peak.
    pub run: u32,
    /// Longest run of bars below the peak.
    pub longest: u32,
    started: bool,
}

impl Drawdown {
    pub fn update(&mut self, value: f64) {
        if !self.started || value > self.peak {
            self.peak = value;
            self.started = true;
        }
        self.max = self.max.max(self.peak - value);
        if value < self.peak {
            self.bars += 1;
            self.run += 1;
            self.longest = self.longest.max(self.run);
        } else {
            self.run = 0;
        }
    }

    /// Current distance below the peak.
    pub fn current(&self, value: f64) -> f64 {
        (self.peak - value).max(0.0)
    }
}

/// End-of-run statistics of the per-bar equity changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Root mean square of the percentage drawdown of the equity curve.
    pub ulcer: f64,
    /// Coefficient of determination of a straight-line fit to the equity curve.
    pub r2: f64,
}

impl ReturnStats {
    pub fn from_equity(equity: &[f64]) -> Self {
        if equity.len() < 2 {
            return Self::default();
        }
        let changes: Vec<f64> = equity.windows(2).map(|w| w[1] - w[0]).collect();
        let n = changes.len() as f64;
        let mean = changes.iter().sum::<f64>() / n;
        let var = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;

        let mut peak = equity[0];
        let mut sq = 0.0;
        for &e in equity {
            peak = peak.max(e);
            if peak > 0.0 {
                let pct = 100.0 * (peak - e) / peak;
                sq += pct * pct;
            }
        }
        let ulcer = (sq / equity.len() as f64).sqrt();

        Self { mean, std_dev: var.sqrt(), ulcer, r2: r_squared(equity) }
    }
}

fn r_squared(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    (sxy * sxy) / (sxx * syy)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    // ── Trade results (account currency; losses stored positive) ──
    pub win_total: f64,
    pub loss_total: f64,
    pub pips_total: f64,
    pub win_max: f64,
    pub loss_max: f64,
    pub num_win: u32,
    pub num_loss: u32,

    // ── Streaks ──
    pub win_streak: u32,
    pub loss_streak: u32,
    pub win_streak_max: u32,
    pub loss_streak_max: u32,

    // ── Costs ──
    pub commission: f64,
    pub rollover: f64,
    pub slippage_win: f64,
    pub slippage_loss: f64,
    pub spread: f64,

    // ── Phantom trades ──
    pub phantom_win: f64,
    pub phantom_loss: f64,
    pub num_phantom: u32,

    /// Lots traded.
    pub volume: f64,

    // ── Per bar ──
    pub margin_max: f64,
    pub risk_max: f64,
    pub balance_dd: Drawdown,
    pub equity_dd: Drawdown,
    pub num_bars: u32,
    pub bars_in_market: u32,

    pub stats: ReturnStats,
}

impl Performance {
    pub fn record_trade(&mut self, t: &TradeRecord) {
        if t.phantom {
            self.num_phantom += 1;
            if t.result > 0.0 {
                self.phantom_win += t.result;
            } else {
                self.phantom_loss -= t.result;
            }
            return;
        }
        if t.result > 0.0 {
            self.win_total += t.result;
            self.win_max = self.win_max.max(t.result);
            self.num_win += 1;
            self.win_streak += 1;
            self.loss_streak = 0;
            self.win_streak_max = self.win_streak_max.max(self.win_streak);
        } else {
            self.loss_total -= t.result;
            self.loss_max = self.loss_max.max(-t.result);
            self.num_loss += 1;
            self.loss_streak += 1;
            self.win_streak = 0;
            self.loss_streak_max = self.loss_streak_max.max(self.loss_streak);
        }
        self.pips_total += t.pips;
        self.commission += t.commission;
        self.rollover += t.rollover;
        if t.slippage > 0.0 {
            self.slippage_loss += t.slippage;
        } else {
            self.slippage_win -= t.slippage;
        }
        self.spread += t.spread_cost;
        self.volume += t.lots as f64;
    }

    pub fn record_bar(&mut self, mark: &BarMark) {
        self.num_bars += 1;
        if mark.in_market {
            self.bars_in_market += 1;
        }
        self.margin_max = self.margin_max.max(mark.margin);
        self.risk_max = self.risk_max.max(mark.risk);
        self.balance_dd.update(mark.balance);
        self.equity_dd.update(mark.equity);
    }

    /// Compute the end-of-run return statistics.
    pub fn finalize(&mut self, marks: &[BarMark]) {
        let equity: Vec<f64> = marks.iter().map(|m| m.equity).collect();
        self.stats = ReturnStats::from_equity(&equity);
    }

    /// Recompute everything from the trade log and bar marks in one pass.
    pub fn from_history(trades: &[TradeRecord], marks: &[BarMark]) -> Self {
        let (phantom, real): (Vec<&TradeRecord>, Vec<&TradeRecord>) =
            trades.iter().partition(|t| t.phantom);
        let wins = || real.iter().filter(|t| t.result > 0.0);
        let losses = || real.iter().filter(|t| t.result <= 0.0);

        let (win_streak_max, loss_streak_max, win_streak, loss_streak) = streaks(&real);

        let mut balance_dd = Drawdown::default();
        let mut equity_dd = Drawdown::default();
        for m in marks {
            balance_dd.update(m.balance);
            equity_dd.update(m.equity);
        }

        let mut perf = Self {
            win_total: wins().fold(0.0, |a, t| a + t.result),
            loss_total: losses().fold(0.0, |a, t| a - t.result),
            pips_total: real.iter().fold(0.0, |a, t| a + t.pips),
            win_max: wins().fold(0.0, |a: f64, t| a.max(t.result)),
            loss_max: losses().fold(0.0, |a: f64, t| a.max(-t.result)),
            num_win: wins().count() as u32,
            num_loss: losses().count() as u32,
            win_streak,
            loss_streak,
            win_streak_max,
            loss_streak_max,
            commission: real.iter().fold(0.0, |a, t| a + t.commission),
            rollover: real.iter().fold(0.0, |a, t| a + t.rollover),
            slippage_win: real
                .iter()
                .filter(|t| t.slippage <= 0.0)
                .fold(0.0, |a, t| a - t.slippage),
            slippage_loss: real
                .iter()
                .filter(|t| t.slippage > 0.0)
                .fold(0.0, |a, t| a + t.slippage),
            spread: real.iter().fold(0.0, |a, t| a + t.spread_cost),
            phantom_win: phantom
                .iter()
                .filter(|t| t.result > 0.0)
                .fold(0.0, |a, t| a + t.result),
            phantom_loss: phantom
                .iter()
                .filter(|t| t.result <= 0.0)
                .fold(0.0, |a, t| a - t.result),
            num_phantom: phantom.len() as u32,
            volume: real.iter().fold(0.0, |a, t| a + t.lots as f64),
            margin_max: marks.iter().fold(0.0, |a: f64, m| a.max(m.margin)),
            risk_max: marks.iter().fold(0.0, |a: f64, m| a.max(m.risk)),
            balance_dd,
            equity_dd,
            num_bars: marks.len() as u32,
            bars_in_market: marks.iter().filter(|m| m.in_market).count() as u32,
            stats: ReturnStats::default(),
        };
        perf.finalize(marks);
        perf
    }

    pub fn num_trades(&self) -> u32 {
        self.num_win + self.num_loss
    }

    pub fn net_profit(&self) -> f64 {
        self.win_total - self.loss_total
    }

    pub fn win_rate(&self) -> f64 {
        match self.num_trades() {
            0 => 0.0,
            n => self.num_win as f64 / n as f64,
        }
    }

    /// Gross win over gross loss; infinite with wins and no losses.
    pub fn profit_factor(&self) -> f64 {
        if self.loss_total > 0.0 {
            self.win_total / self.loss_total
        } else if self.win_total > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// (max win run, max loss run, trailing win run, trailing loss run)
fn streaks(trades: &[&TradeRecord]) -> (u32, u32, u32, u32) {
    let mut runs: Vec<(bool, u32)> = Vec::new();
    for t in trades {
        let win = t.result > 0.0;
        match runs.last_mut() {
            Some((w, n)) if *w == win => *n += 1,
            _ => runs.push((win, 1)),
        }
    }
    let max_of = |win: bool| runs.iter().filter(|(w, _)| *w == win).map(|(_, n)| *n).max().unwrap_or(0);
    let (cur_win, cur_loss) = match runs.last() {
        Some((true, n)) => (*n, 0),
        Some((false, n)) => (0, *n),
        None => (0, 0),
    };
    (max_of(true), max_of(false), cur_win, cur_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{Side, TradeId};
    use crate::domain::trade::CloseReason;
    use crate::flags::TradeFlags;

    fn record(result: f64) -> TradeRecord {
        TradeRecord {
            id: TradeId(1),
            algo: String::new(),
            asset: "EUR/USD".into(),
            side: Side::Long,
            reason: CloseReason::Sold,
            flags: TradeFlags(0),
            phantom: false,
            bar_open: 0,
            bar_close: 1,
            time_open: 0.0,
            time_close: 0.0,
            entry_price: 1.0,
            exit_price: 1.0,
            lots: 1,
            gross: result,
            pips: result,
            commission: 0.5,
            rollover: 0.0,
            slippage: 0.0,
            spread_cost: 0.1,
            result,
            mae: 0.0,
            mfe: 0.0,
        }
    }

    #[test]
    fn win_win_loss_streaks() {
        let mut perf = Performance::default();
        for r in [10.0, 5.0, -3.0] {
            perf.record_trade(&record(r));
        }
        assert_eq!(perf.win_streak_max, 2);
        assert_eq!(perf.loss_streak, 1);
        assert_eq!(perf.loss_streak_max, 1);
        assert_eq!(perf.win_streak, 0);
        assert_eq!(perf.win_total, 15.0);
        assert_eq!(perf.loss_total, 3.0);
    }

    #[test]
    fn phantom_results_bypass_totals() {
        let mut perf = Performance::default();
        let mut t = record(20.0);
        t.phantom = true;
        perf.record_trade(&t);
        assert_eq!(perf.phantom_win, 20.0);
        assert_eq!(perf.win_total, 0.0);
        assert_eq!(perf.num_trades(), 0);
    }

    #[test]
    fn drawdown_counts_bars_below_peak() {
        let mut dd = Drawdown::default();
        for v in [100.0, 110.0, 105.0, 102.0, 110.0, 108.0, 120.0] {
            dd.update(v);
        }
        assert_eq!(dd.peak, 120.0);
        assert_eq!(dd.max, 8.0);
        assert_eq!(dd.bars, 3);
        assert_eq!(dd.longest, 2);
        assert_eq!(dd.run, 0);
    }

    #[test]
    fn batch_matches_incremental() {
        let trades: Vec<TradeRecord> = [4.0, -2.0, -1.0, 3.0, 0.0].into_iter().map(record).collect();
        let marks: Vec<BarMark> = [100.0, 104.0, 102.0, 101.0, 104.0, 104.0]
            .into_iter()
            .map(|v| BarMark { balance: v, equity: v, margin: 1.0, risk: 0.5, in_market: v > 101.0 })
            .collect();
        let mut inc = Performance::default();
        for t in &trades {
            inc.record_trade(t);
        }
        for m in &marks {
            inc.record_bar(m);
        }
        inc.finalize(&marks);
        assert_eq!(inc, Performance::from_history(&trades, &marks));
    }

    #[test]
    fn return_stats_of_straight_line() {
        let stats = ReturnStats::from_equity(&[100.0, 101.0, 102.0, 103.0]);
        assert!((stats.mean - 1.0).abs() < 1e-12);
        assert!(stats.std_dev.abs() < 1e-12);
        assert!((stats.r2 - 1.0).abs() < 1e-12);
        assert_eq!(stats.ulcer, 0.0);
    }
}
