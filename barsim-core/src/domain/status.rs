//! Per-component trade statistics.

use super::ids::StatusKey;
use crate::flags::{MAX_PARAMS, NUM_RESULTS, NUM_SKILLS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Optimizer results stored with a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Trained value per parameter.
    pub params: Vec<f64>,
    /// Number of steps tried per parameter.
    pub steps: Vec<u32>,
    /// Objective value per step, in step order.
    pub objective: Vec<f64>,
}

impl OptimizerState {
    pub fn set_params(&mut self, params: &[f64]) {
        self.params = params.iter().copied().take(MAX_PARAMS).collect();
    }
}

/// Statistics shared by every trade of one `(algo, asset, side)` component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub key: StatusKey,

    // ── Closed trades ──
    pub win: f64,
    pub loss: f64,
    /// Sum of squared results.
    pub r2: f64,
    pub win_max: f64,
    pub loss_max: f64,
    pub loss_max_per_lot: f64,
    pub num_win: u32,
    pub num_loss: u32,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub win_streak_val: f64,
    pub loss_streak_val: f64,
    /// Last results, newest first.
    pub results: VecDeque<f64>,

    // ── Open trades, recomputed every bar ──
    pub win_val_open: f64,
    pub loss_val_open: f64,
    pub num_win_open: u32,
    pub num_loss_open: u32,
    pub num_pending: u32,

    pub skill: [f64; NUM_SKILLS],
    pub optimizer: OptimizerState,
}

impl Status {
    pub fn new(key: StatusKey) -> Self {
        Self {
            key,
            win: 0.0,
            loss: 0.0,
            r2: 0.0,
            win_max: 0.0,
            loss_max: 0.0,
            loss_max_per_lot: 0.0,
            num_win: 0,
            num_loss: 0,
            win_streak: 0,
            loss_streak: 0,
            win_streak_val: 0.0,
            loss_streak_val: 0.0,
            results: VecDeque::with_capacity(NUM_RESULTS),
            win_val_open: 0.0,
            loss_val_open: 0.0,
            num_win_open: 0,
            num_loss_open: 0,
            num_pending: 0,
            skill: [0.0; NUM_SKILLS],
            optimizer: OptimizerState::default(),
        }
    }

    /// Account a closed trade. Results above zero are wins.
    pub fn record_close(&mut self, result: f64, lots: u32) {
        self.r2 += result * result;
        if result > 0.0 {
            self.win += result;
            self.num_win += 1;
            self.win_max = self.win_max.max(result);
            if self.loss_streak > 0 || self.win_streak == 0 {
                self.win_streak = 0;
                self.win_streak_val = 0.0;
            }
            self.win_streak += 1;
            self.win_streak_val += result;
            self.loss_streak = 0;
            self.loss_streak_val = 0.0;
        } else {
            self.loss -= result;
            self.num_loss += 1;
            self.loss_max = self.loss_max.max(-result);
            if lots > 0 {
                self.loss_max_per_lot = self.loss_max_per_lot.max(-result / lots as f64);
            }
            if self.win_streak > 0 || self.loss_streak == 0 {
                self.loss_streak = 0;
                self.loss_streak_val = 0.0;
            }
            self.loss_streak += 1;
            self.loss_streak_val -= result;
            self.win_streak = 0;
            self.win_streak_val = 0.0;
        }
        self.results.push_front(result);
        self.results.truncate(NUM_RESULTS);
    }

    pub fn reset_open(&mut self) {
        self.win_val_open = 0.0;
        self.loss_val_open = 0.0;
        self.num_win_open = 0;
        self.num_loss_open = 0;
        self.num_pending = 0;
    }

    pub fn record_open(&mut self, unrealized: f64) {
        if unrealized > 0.0 {
            self.win_val_open += unrealized;
            self.num_win_open += 1;
        } else {
            self.loss_val_open -= unrealized;
            self.num_loss_open += 1;
        }
    }

    pub fn num_trades(&self) -> u32 {
        self.num_win + self.num_loss
    }

    /// Net closed result.
    pub fn net(&self) -> f64 {
        self.win - self.loss
    }
}
