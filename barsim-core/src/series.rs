//! Strategy-side value series, newest value at offset 0.
//!
//! A `Series` has a fixed length. `push` shifts every value one slot
//! back and drops the oldest, so offsets line up with bar offsets when
//! the strategy pushes once per bar.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    values: VecDeque<f64>,
}

impl Series {
    /// A series of `len` values, all `init`. `len` is at least 1.
    pub fn new(len: usize, init: f64) -> Self {
        Self { values: std::iter::repeat(init).take(len.max(1)).collect() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shift in a new value at offset 0.
    pub fn push(&mut self, value: f64) {
        self.values.pop_back();
        self.values.push_front(value);
    }

    /// Shift by `n` slots, repeating the newest value.
    pub fn shift(&mut self, n: usize) {
        let newest = self.get(0);
        for _ in 0..n.min(self.len()) {
            self.push(newest);
        }
    }

    /// Value at `offset`; beyond the end the oldest value is returned.
    pub fn get(&self, offset: usize) -> f64 {
        let last = self.values.len() - 1;
        self.values[offset.min(last)]
    }

    pub fn set(&mut self, offset: usize, value: f64) {
        if let Some(v) = self.values.get_mut(offset) {
            *v = value;
        }
    }

    pub fn rising(&self) -> bool {
        self.get(0) > self.get(1)
    }

    pub fn falling(&self) -> bool {
        self.get(0) < self.get(1)
    }

    /// Offset 1 is a local maximum.
    pub fn peak(&self) -> bool {
        self.get(1) > self.get(0) && self.get(1) > self.get(2)
    }

    /// Offset 1 is a local minimum.
    pub fn valley(&self) -> bool {
        self.get(1) < self.get(0) && self.get(1) < self.get(2)
    }

    /// `self` crossed above `other` on the newest value.
    pub fn cross_over(&self, other: &Series) -> bool {
        self.get(0) > other.get(0) && self.get(1) <= other.get(1)
    }

    pub fn cross_under(&self, other: &Series) -> bool {
        self.get(0) < other.get(0) && self.get(1) >= other.get(1)
    }

    /// Mean of the newest `n` values.
    pub fn mean(&self, n: usize) -> f64 {
        let n = n.clamp(1, self.len());
        self.values.iter().take(n).sum::<f64>() / n as f64
    }

    pub fn max(&self, n: usize) -> f64 {
        self.values.iter().take(n.max(1)).copied().fold(f64::MIN, f64::max)
    }

    pub fn min(&self, n: usize) -> f64 {
        self.values.iter().take(n.max(1)).copied().fold(f64::MAX, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_oldest(values: &[f64]) -> Series {
        let mut s = Series::new(values.len(), 0.0);
        for v in values {
            s.push(*v);
        }
        s
    }

    #[test]
    fn push_shifts_newest_to_front() {
        let s = from_oldest(&[1.0, 2.0, 3.0]);
        assert_eq!((s.get(0), s.get(1), s.get(2)), (3.0, 2.0, 1.0));
        assert_eq!(s.get(10), 1.0);
        assert!(s.rising());
        assert!(!s.falling());
    }

    #[test]
    fn peaks_and_valleys() {
        assert!(from_oldest(&[1.0, 3.0, 2.0]).peak());
        assert!(from_oldest(&[3.0, 1.0, 2.0]).valley());
        assert!(!from_oldest(&[1.0, 2.0, 3.0]).peak());
    }

    #[test]
    fn crossings() {
        let fast = from_oldest(&[1.0, 3.0]);
        let slow = from_oldest(&[2.0, 2.0]);
        assert!(fast.cross_over(&slow));
        assert!(slow.cross_under(&fast));
        assert!(!slow.cross_over(&fast));
    }

    #[test]
    fn shift_repeats_newest() {
        let mut s = from_oldest(&[1.0, 2.0, 3.0]);
        s.shift(2);
        assert_eq!((s.get(0), s.get(1), s.get(2)), (3.0, 3.0, 3.0));
        assert_eq!(s.mean(3), 3.0);
    }

    #[test]
    fn window_stats() {
        let s = from_oldest(&[4.0, 1.0, 2.0, 3.0]);
        assert_eq!(s.mean(2), 2.5);
        assert_eq!(s.max(3), 3.0);
        assert_eq!(s.min(4), 1.0);
    }
}
