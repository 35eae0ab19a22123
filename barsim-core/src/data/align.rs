//! Multi-asset time alignment.
//!
//! Given bars for several assets, align them on one global bar timeline.
//! An asset without a bar at a timestamp gets `None` there; its prices are
//! never forward-filled.

use crate::domain::{AssetParams, Bar, Tick};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

/// Timestamps compare at millisecond resolution.
fn key(time: f64) -> i64 {
    (time * 86_400_000.0).round() as i64
}

/// One asset's bars on the global timeline.
#[derive(Debug, Clone)]
pub struct AssetSeries {
    pub params: AssetParams,
    /// Same length as [`MarketData::times`].
    pub bars: Vec<Option<Bar>>,
    /// Ticks inside each global bar, oldest first. Empty without tick data.
    pub ticks: Vec<Vec<Tick>>,
}

/// Bars of every asset aligned on a common timeline.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    /// Close time of each global bar (OLE date, ascending).
    pub times: Vec<f64>,
    pub series: Vec<AssetSeries>,
}

impl MarketData {
    /// Align several assets. The timeline is the union of all bar times.
    pub fn align(inputs: Vec<(AssetParams, Vec<Bar>)>) -> Self {
        let mut all = BTreeSet::new();
        for (_, bars) in &inputs {
            all.extend(bars.iter().map(|b| key(b.time)));
        }
        let keys: Vec<i64> = all.into_iter().collect();
        let times: Vec<f64> = keys.iter().map(|k| *k as f64 / 86_400_000.0).collect();

        let series = inputs
            .into_iter()
            .map(|(params, bars)| {
                let by_time: HashMap<i64, Bar> = bars.into_iter().map(|b| (key(b.time), b)).collect();
                let aligned = keys.iter().map(|k| by_time.get(k).copied()).collect();
                AssetSeries { params, bars: aligned, ticks: Vec::new() }
            })
            .collect();
        Self { times, series }
    }

    pub fn single(params: AssetParams, bars: Vec<Bar>) -> Self {
        Self::align(vec![(params, bars)])
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn asset_names(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.params.name.as_str()).collect()
    }

    /// Distribute ticks of asset `index` onto the global bars: a tick
    /// belongs to the first bar whose close time is not before it.
    /// Ticks after the last bar are dropped.
    pub fn attach_ticks(&mut self, index: usize, ticks: &[Tick]) {
        let Some(series) = self.series.get_mut(index) else { return };
        let mut per_bar = vec![Vec::new(); self.times.len()];
        let mut bar = 0;
        for tick in ticks {
            while bar < self.times.len() && key(self.times[bar]) < key(tick.time) {
                bar += 1;
            }
            if bar == self.times.len() {
                break;
            }
            per_bar[bar].push(*tick);
        }
        series.ticks = per_bar;
    }

    pub fn ticks_at(&self, index: usize, bar: usize) -> &[Tick] {
        self.series
            .get(index)
            .and_then(|s| s.ticks.get(bar))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The global bars in `range`, as a new timeline.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.times.len());
        let start = range.start.min(end);
        let cut = |v: &[Vec<Tick>]| if v.is_empty() { Vec::new() } else { v[start..end].to_vec() };
        Self {
            times: self.times[start..end].to_vec(),
            series: self
                .series
                .iter()
                .map(|s| AssetSeries {
                    params: s.params.clone(),
                    bars: s.bars[start..end].to_vec(),
                    ticks: cut(&s.ticks),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: f64, close: f64) -> Bar {
        Bar::new(45_000.0 + day, close - 1.0, close + 1.0, close - 2.0, close)
    }

    #[test]
    fn align_leaves_gaps_empty() {
        let data = MarketData::align(vec![
            (AssetParams::named("A"), vec![bar(0.0, 100.0), bar(1.0, 101.0), bar(2.0, 102.0)]),
            (AssetParams::named("B"), vec![bar(0.0, 200.0), bar(2.0, 202.0)]),
        ]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.series[0].bars[1].map(|b| b.close), Some(101.0));
        assert!(data.series[1].bars[1].is_none());
        assert_eq!(data.series[1].bars[2].map(|b| b.close), Some(202.0));
        assert_eq!(data.asset_names(), vec!["A", "B"]);
    }

    #[test]
    fn ticks_go_to_the_enclosing_bar() {
        let mut data = MarketData::single(AssetParams::named("A"), vec![bar(0.0, 1.0), bar(1.0, 1.0)]);
        let ticks = [
            Tick::new(44_999.5, 1.0),
            Tick::new(45_000.0, 1.1),
            Tick::new(45_000.5, 1.2),
            Tick::new(45_002.0, 1.3),
        ];
        data.attach_ticks(0, &ticks);
        assert_eq!(data.ticks_at(0, 0).len(), 2);
        assert_eq!(data.ticks_at(0, 1).len(), 1);
        assert!(data.ticks_at(1, 0).is_empty());
    }

    #[test]
    fn slice_cuts_every_series() {
        let data = MarketData::single(AssetParams::named("A"), (0..10).map(|d| bar(d as f64, d as f64)).collect());
        let part = data.slice(3..6);
        assert_eq!(part.len(), 3);
        assert_eq!(part.series[0].bars[0].map(|b| b.close), Some(3.0));
        assert_eq!(data.slice(8..20).len(), 2);
    }
}
