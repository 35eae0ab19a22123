//! Row-oriented numeric datasets with a time column.
//!
//! Every row is a time (OLE date) followed by a fixed number of fields.
//! The binary format stores each row as an `f64` time and `f32` fields,
//! little endian, rows in memory order.

use crate::data::history::parse_time;
use crate::error::{EngineError, Storage};
use crate::flags::NIL;
use bytes::{Buf, BufMut};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset full ({capacity} rows)")]
    Full { capacity: usize },

    #[error("row has {got} fields, dataset has {expected}")]
    Width { expected: usize, got: usize },

    #[error("file size {len} is not a multiple of the row size {row}")]
    Misaligned { len: usize, row: usize },

    #[error("row {row}: cannot parse '{value}'")]
    BadValue { row: usize, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<DatasetError> for EngineError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Full { capacity } => {
                EngineError::CapacityExhausted { storage: Storage::DatasetRows, capacity }
            }
            DatasetError::Io(e) => EngineError::Io(e),
            other => EngineError::InvalidConfig(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    fields: usize,
    capacity: usize,
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Dataset {
    /// `fields` values per row besides the time; at most `capacity` rows.
    pub fn new(fields: usize, capacity: usize) -> Self {
        Self { fields, capacity, times: Vec::new(), values: Vec::new() }
    }

    pub fn fields(&self) -> usize {
        self.fields
    }

    pub fn rows(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn row_bytes(&self) -> usize {
        8 + 4 * self.fields
    }

    pub fn append_row(&mut self, time: f64, values: &[f64]) -> Result<usize, DatasetError> {
        if values.len() != self.fields {
            return Err(DatasetError::Width { expected: self.fields, got: values.len() });
        }
        if self.rows() >= self.capacity {
            return Err(DatasetError::Full { capacity: self.capacity });
        }
        self.times.push(time);
        self.values.extend_from_slice(values);
        Ok(self.rows() - 1)
    }

    pub fn time(&self, row: usize) -> f64 {
        self.times.get(row).copied().unwrap_or(NIL)
    }

    /// Field `col` of `row`; NIL when out of range.
    pub fn var(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows() || col >= self.fields {
            return NIL;
        }
        self.values[row * self.fields + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        if row >= self.rows() || col >= self.fields {
            return false;
        }
        self.values[row * self.fields + col] = value;
        true
    }

    /// Row whose time is nearest to `time` without being after it. Rows
    /// must be sorted by time.
    pub fn find(&self, time: f64) -> Option<usize> {
        self.times.partition_point(|t| *t <= time).checked_sub(1)
    }

    /// Sort rows by time, ascending. Stable.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.rows()).collect();
        order.sort_by(|a, b| self.times[*a].total_cmp(&self.times[*b]));
        let times = order.iter().map(|&r| self.times[r]).collect();
        let values = order
            .iter()
            .flat_map(|&r| self.values[r * self.fields..(r + 1) * self.fields].iter().copied())
            .collect();
        self.times = times;
        self.values = values;
    }

    // ── Files ──

    pub fn load(path: &Path, fields: usize, capacity: usize) -> Result<Self, DatasetError> {
        let data = fs::read(path)?;
        let mut set = Self::new(fields, capacity);
        let row = set.row_bytes();
        if data.len() % row != 0 {
            return Err(DatasetError::Misaligned { len: data.len(), row });
        }
        let mut buf = data.as_slice();
        let mut values = vec![0.0; fields];
        while buf.has_remaining() {
            let time = buf.get_f64_le();
            for v in values.iter_mut() {
                *v = buf.get_f32_le() as f64;
            }
            set.append_row(time, &values)?;
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let mut out = Vec::with_capacity(self.rows() * self.row_bytes());
        for (r, time) in self.times.iter().enumerate() {
            out.put_f64_le(*time);
            for v in &self.values[r * self.fields..(r + 1) * self.fields] {
                out.put_f32_le(*v as f32);
            }
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// CSV with a header row; the first column is the time, the following
    /// columns are the fields. The field count comes from the header.
    pub fn load_csv(path: &Path, capacity: usize) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_path(path)?;
        let fields = reader.headers()?.len().saturating_sub(1);
        let mut set = Self::new(fields, capacity);
        let mut values = vec![0.0; fields];
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let bad = |value: &str| DatasetError::BadValue { row: row + 1, value: value.to_string() };
            let raw_time = record.get(0).unwrap_or_default();
            let time = parse_time(raw_time).ok_or_else(|| bad(raw_time))?;
            for (i, v) in values.iter_mut().enumerate() {
                let raw = record.get(i + 1).unwrap_or_default().trim();
                *v = raw.parse().map_err(|_| bad(raw))?;
            }
            set.append_row(time, &values)?;
        }
        Ok(set)
    }

    pub fn save_csv(&self, path: &Path, header: &[&str]) -> Result<(), DatasetError> {
        let mut writer = csv::Writer::from_path(path)?;
        if header.len() == self.fields + 1 {
            writer.write_record(header)?;
        } else {
            let mut names = vec!["time".to_string()];
            names.extend((1..=self.fields).map(|i| format!("v{i}")));
            writer.write_record(&names)?;
        }
        for (r, time) in self.times.iter().enumerate() {
            let mut row = vec![time.to_string()];
            row.extend(self.values[r * self.fields..(r + 1) * self.fields].iter().map(f64::to_string));
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut d = Dataset::new(2, 10);
        d.append_row(45_002.0, &[3.0, 30.0]).unwrap();
        d.append_row(45_000.0, &[1.0, 10.0]).unwrap();
        d.append_row(45_001.0, &[2.0, 20.0]).unwrap();
        d
    }

    #[test]
    fn sort_and_find() {
        let mut d = sample();
        d.sort();
        assert_eq!(d.time(0), 45_000.0);
        assert_eq!(d.var(2, 1), 30.0);
        assert_eq!(d.find(45_001.5), Some(1));
        assert_eq!(d.find(44_999.0), None);
        assert_eq!(d.var(5, 0), NIL);
    }

    #[test]
    fn set_and_width_check() {
        let mut d = sample();
        assert!(d.set(0, 1, -1.0));
        assert_eq!(d.var(0, 1), -1.0);
        assert!(!d.set(0, 2, 0.0));
        assert!(matches!(d.append_row(1.0, &[1.0]), Err(DatasetError::Width { expected: 2, got: 1 })));
    }

    #[test]
    fn full_dataset_is_capacity_error() {
        let mut d = Dataset::new(1, 1);
        d.append_row(1.0, &[1.0]).unwrap();
        let err: EngineError = d.append_row(2.0, &[2.0]).unwrap_err().into();
        assert!(err.is_fatal());
    }

    #[test]
    fn binary_and_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let d = sample();

        let bin = dir.path().join("d.bin");
        d.save(&bin).unwrap();
        assert_eq!(fs::metadata(&bin).unwrap().len(), 3 * 16);
        assert_eq!(Dataset::load(&bin, 2, 10).unwrap(), d);
        assert!(matches!(Dataset::load(&bin, 3, 10), Err(DatasetError::Misaligned { .. })));

        let csv_path = dir.path().join("d.csv");
        d.save_csv(&csv_path, &["time", "a", "b"]).unwrap();
        let back = Dataset::load_csv(&csv_path, 10).unwrap();
        assert_eq!(back.fields(), 2);
        assert_eq!(back, d);
    }
}
