//! Price history files: binary `.t1`/`.t6` records, CSV bars, tick aggregation.
//!
//! Binary history files store records newest first. Everything returned
//! from this module is oldest first.

use crate::domain::records::{decode_all, encode_all};
use crate::domain::{Bar, CodecError, Record, Tick, T1, T6};
use crate::time::{datetime_to_ole, ole_to_datetime};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad record data: {0}")]
    Codec(#[from] CodecError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing CSV column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}: cannot parse '{value}'")]
    BadValue { row: usize, value: String },

    #[error("unknown history format '{0}'")]
    UnknownFormat(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HistoryError + '_ {
    move |source| HistoryError::Io { path: path.display().to_string(), source }
}

/// Read a record file and return the records oldest first.
pub fn read_records<R: Record>(path: &Path) -> Result<Vec<R>, HistoryError> {
    let data = fs::read(path).map_err(io_err(path))?;
    let mut records: Vec<R> = decode_all(&data)?;
    records.reverse();
    debug!(path = %path.display(), count = records.len(), "history read");
    Ok(records)
}

/// Write records given oldest first; the file stores them newest first.
pub fn write_records<R: Record + Clone>(path: &Path, records: &[R]) -> Result<(), HistoryError> {
    let mut newest_first = records.to_vec();
    newest_first.reverse();
    fs::write(path, encode_all(&newest_first)).map_err(io_err(path))
}

pub fn read_t6(path: &Path) -> Result<Vec<Bar>, HistoryError> {
    Ok(read_records::<T6>(path)?.into_iter().map(Bar::from).collect())
}

pub fn write_t6(path: &Path, bars: &[Bar]) -> Result<(), HistoryError> {
    let records: Vec<T6> = bars.iter().map(T6::from).collect();
    write_records(path, &records)
}

/// Ask ticks and `(time, spread)` pairs from T1 quotes, oldest first.
///
/// Negative prices are bid quotes; each one sets the spread against the
/// last ask seen before it. Bids before the first ask are ignored.
pub fn quotes_from_t1(records: &[T1]) -> (Vec<Tick>, Vec<(f64, f64)>) {
    let mut ticks = Vec::with_capacity(records.len());
    let mut spreads = Vec::new();
    let mut last_ask: Option<f64> = None;
    for r in records {
        let price = r.price as f64;
        if price >= 0.0 {
            ticks.push(Tick::new(r.time, price));
            last_ask = Some(price);
        } else if let Some(ask) = last_ask {
            spreads.push((r.time, (ask + price).max(0.0)));
        }
    }
    (ticks, spreads)
}

/// Ask ticks of a `.t1` file, oldest first.
pub fn read_t1(path: &Path) -> Result<Vec<Tick>, HistoryError> {
    let records = read_records::<T1>(path)?;
    Ok(quotes_from_t1(&records).0)
}

pub fn write_t1(path: &Path, ticks: &[Tick]) -> Result<(), HistoryError> {
    let records: Vec<T1> = ticks.iter().map(|t| T1 { time: t.time, price: t.price as f32 }).collect();
    write_records(path, &records)
}

/// Read bars from `.t6` or `.csv`, or ticks from `.t1` aggregated into
/// bars of `bar_period` minutes.
pub fn load_bars(path: &Path, bar_period: f64) -> Result<Vec<Bar>, HistoryError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "t6" => read_t6(path),
        "csv" => read_csv_bars(path),
        "t1" => Ok(ticks_to_bars(&read_t1(path)?, bar_period)),
        other => Err(HistoryError::UnknownFormat(other.to_string())),
    }
}

// ── Tick aggregation ──

/// Builds bars of a fixed period from ticks in time order.
///
/// A bar is stamped with its close time; a tick exactly on a period
/// boundary closes the bar ending there.
#[derive(Debug)]
pub struct BarBuilder {
    period_ms: i64,
    current: Option<(i64, Bar)>,
    done: Vec<Bar>,
}

impl BarBuilder {
    /// `bar_period` in minutes.
    pub fn new(bar_period: f64) -> Self {
        let period_ms = ((bar_period * 60_000.0).round() as i64).max(1);
        Self { period_ms, current: None, done: Vec::new() }
    }

    pub fn push(&mut self, tick: &Tick) {
        let ms = (tick.time * MS_PER_DAY as f64).round() as i64;
        let slot = (ms + self.period_ms - 1).div_euclid(self.period_ms);
        match &mut self.current {
            Some((s, bar)) if *s == slot => {
                bar.high = bar.high.max(tick.price);
                bar.low = bar.low.min(tick.price);
                bar.close = tick.price;
                bar.vol += tick.vol;
            }
            _ => {
                let time = (slot * self.period_ms) as f64 / MS_PER_DAY as f64;
                let mut bar = Bar::flat(time, tick.price);
                bar.vol = tick.vol;
                if let Some((_, prev)) = self.current.replace((slot, bar)) {
                    self.done.push(prev);
                }
            }
        }
    }

    pub fn finish(mut self) -> Vec<Bar> {
        if let Some((_, bar)) = self.current.take() {
            self.done.push(bar);
        }
        self.done
    }
}

pub fn ticks_to_bars(ticks: &[Tick], bar_period: f64) -> Vec<Bar> {
    let mut builder = BarBuilder::new(bar_period);
    for t in ticks {
        builder.push(t);
    }
    builder.finish()
}

// ── CSV ──

/// Parse an OLE number, `YYYY-MM-DD`, or `YYYY-MM-DD HH:MM[:SS]` (also with `T`).
pub fn parse_time(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(ole) = value.parse::<f64>() {
        return Some(ole);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(datetime_to_ole(dt));
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(datetime_to_ole(date.and_hms_opt(0, 0, 0)?))
}

fn column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Bars from a CSV file with a header row. Required columns: a time column
/// (`time`, `date` or `datetime`), `open`, `high`, `low`, `close`;
/// `volume` is optional. Rows are sorted oldest first.
pub fn read_csv_bars(path: &Path) -> Result<Vec<Bar>, HistoryError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let find = |names: &[&str], label: &'static str| column(&headers, names).ok_or(HistoryError::MissingColumn(label));
    let time_col = find(&["time", "date", "datetime", "timestamp"], "time")?;
    let cols = [
        find(&["open"], "open")?,
        find(&["high"], "high")?,
        find(&["low"], "low")?,
        find(&["close"], "close")?,
    ];
    let vol_col = column(&headers, &["volume", "vol"]);

    let mut bars = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        let bad = |value: &str| HistoryError::BadValue { row: row + 1, value: value.to_string() };
        let time = parse_time(field(time_col)).ok_or_else(|| bad(field(time_col)))?;
        let mut prices = [0.0; 4];
        for (p, &c) in prices.iter_mut().zip(&cols) {
            *p = field(c).trim().parse().map_err(|_| bad(field(c)))?;
        }
        let [open, high, low, close] = prices;
        let mut bar = Bar::new(time, open, high, low, close);
        if let Some(c) = vol_col {
            bar.vol = field(c).trim().parse().unwrap_or(0.0);
        }
        bars.push(bar);
    }
    bars.sort_by(|a, b| a.time.total_cmp(&b.time));
    debug!(path = %path.display(), count = bars.len(), "csv bars read");
    Ok(bars)
}

pub fn write_csv_bars(path: &Path, bars: &[Bar]) -> Result<(), HistoryError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["time", "open", "high", "low", "close", "volume"])?;
    for b in bars {
        let time = ole_to_datetime(b.time)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| b.time.to_string());
        writer.write_record([
            time,
            b.open.to_string(),
            b.high.to_string(),
            b.low.to_string(),
            b.close.to_string(),
            b.vol.to_string(),
        ])?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t6_files_are_newest_first_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.t6");
        let bars = vec![Bar::flat(45_000.0, 1.0), Bar::flat(45_001.0, 2.0), Bar::flat(45_002.0, 3.0)];
        write_t6(&path, &bars).unwrap();

        let raw: Vec<T6> = decode_all(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[0].time, 45_002.0);
        let back = read_t6(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].close, 1.0);
        assert_eq!(back[2].time, 45_002.0);
    }

    #[test]
    fn bid_quotes_yield_spreads() {
        let records = [
            T1 { time: 1.0, price: -1.0 },
            T1 { time: 2.0, price: 1.25 },
            T1 { time: 3.0, price: -1.0 },
            T1 { time: 4.0, price: 1.5 },
        ];
        let (ticks, spreads) = quotes_from_t1(&records);
        assert_eq!(ticks.len(), 2);
        assert_eq!(spreads, vec![(3.0, 0.25)]);
    }

    #[test]
    fn ticks_aggregate_into_period_bars() {
        // hourly bars; 45_000.0 is a boundary
        let hour = 1.0 / 24.0;
        let ticks = [
            Tick::new(45_000.0 + 0.2 * hour, 10.0),
            Tick::new(45_000.0 + 0.5 * hour, 12.0),
            Tick::new(45_000.0 + 1.0 * hour, 9.0),
            Tick::new(45_000.0 + 1.5 * hour, 11.0),
        ];
        let bars = ticks_to_bars(&ticks, 60.0);
        assert_eq!(bars.len(), 2);
        assert_eq!((bars[0].open, bars[0].high, bars[0].low, bars[0].close), (10.0, 12.0, 9.0, 9.0));
        assert!((bars[0].time - (45_000.0 + hour)).abs() < 1e-9);
        assert_eq!(bars[1].close, 11.0);
    }

    #[test]
    fn csv_bars_roundtrip_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        fs::write(
            &path,
            "Date,Open,High,Low,Close,Volume\n2024-01-03,2,3,1,2.5,10\n2024-01-02,1,2,0.5,1.5,5\n",
        )
        .unwrap();
        let bars = read_csv_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.5);
        assert_eq!(bars[1].vol, 10.0);

        let out = dir.path().join("out.csv");
        write_csv_bars(&out, &bars).unwrap();
        assert_eq!(read_csv_bars(&out).unwrap(), bars);
    }

    #[test]
    fn csv_without_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "time,open,high,low\n1,1,1,1\n").unwrap();
        assert!(matches!(read_csv_bars(&path), Err(HistoryError::MissingColumn("close"))));
    }

    #[test]
    fn unknown_extension() {
        assert!(matches!(
            load_bars(Path::new("x.bin"), 60.0),
            Err(HistoryError::UnknownFormat(_))
        ));
    }
}
