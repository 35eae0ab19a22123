//! Text and file helpers: `name=value` parsing, variable store, file append.

use crate::error::EngineError;
use crate::flags::NIL;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Position just after `name` followed by `=` or `:` (optionally quoted).
fn value_start(text: &str, name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(found) = text[from..].find(name) {
        let start = from + found;
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_');
        let rest = &text[start + name.len()..];
        let trimmed = rest.trim_start_matches('"').trim_start();
        if before_ok && (trimmed.starts_with('=') || trimmed.starts_with(':')) {
            let after = &trimmed[1..];
            let value = after.trim_start();
            return Some(text.len() - value.len());
        }
        from = start + name.len();
    }
    None
}

/// Numeric value of `name=value` (or `"name": value`) in `text`.
pub fn strvar(text: &str, name: &str, default: f64) -> f64 {
    let Some(start) = value_start(text, name) else {
        return default;
    };
    let rest = text[start..].trim_start_matches('"');
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
        .unwrap_or(rest.len());
    rest[..end].parse().unwrap_or(default)
}

/// Text value of `name=value` (or `"name": "value"`) in `text`.
pub fn strtext(text: &str, name: &str, default: &str) -> String {
    let Some(start) = value_start(text, name) else {
        return default.to_string();
    };
    let rest = &text[start..];
    if let Some(quoted) = rest.strip_prefix('"') {
        return quoted.split('"').next().unwrap_or(default).to_string();
    }
    let end = rest.find([',', ';', '\n', '\r', '}']).unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Named numeric variables, in memory or persisted as a JSON object.
#[derive(Debug, Clone, Default)]
pub struct VarStore {
    vars: BTreeMap<String, f64>,
}

impl VarStore {
    pub fn get(&self, name: &str) -> f64 {
        self.vars.get(name).copied().unwrap_or(NIL)
    }

    pub fn put(&mut self, name: &str, value: f64) {
        self.vars.insert(name.to_string(), value);
    }

    /// Read one variable from a JSON file. NIL if the file or key is missing.
    pub fn get_file(path: &Path, name: &str) -> f64 {
        Self::load(path)
            .ok()
            .and_then(|vars| vars.get(name).copied())
            .unwrap_or(NIL)
    }

    /// Write one variable into a JSON file, keeping the others.
    pub fn put_file(path: &Path, name: &str, value: f64) -> Result<(), EngineError> {
        let mut vars = if path.exists() { Self::load(path)? } else { BTreeMap::new() };
        vars.insert(name.to_string(), value);
        fs::write(path, serde_json::to_string_pretty(&vars)?)?;
        Ok(())
    }

    fn load(path: &Path) -> Result<BTreeMap<String, f64>, EngineError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub fn file_append(path: &Path, text: &str) -> Result<(), EngineError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

pub fn file_content(path: &Path) -> Result<String, EngineError> {
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strvar_reads_assignments_and_json() {
        assert_eq!(strvar("Lots=3, Stop=0.005", "Stop", 0.0), 0.005);
        assert_eq!(strvar(r#"{"Lots": 4, "Risk": -1.5e1}"#, "Risk", 0.0), -15.0);
        assert_eq!(strvar("Lots=3", "Stop", 7.0), 7.0);
    }

    #[test]
    fn strvar_skips_partial_names() {
        assert_eq!(strvar("MaxLots=9, Lots=2", "Lots", 0.0), 2.0);
    }

    #[test]
    fn strtext_reads_plain_and_quoted() {
        assert_eq!(strtext("Asset=EUR/USD; Algo=trend", "Asset", ""), "EUR/USD");
        assert_eq!(strtext(r#"{"Algo": "trend", "x": 1}"#, "Algo", ""), "trend");
        assert_eq!(strtext("x=1", "Algo", "none"), "none");
    }

    #[test]
    fn var_store_memory() {
        let mut vars = VarStore::default();
        assert_eq!(vars.get("x"), NIL);
        vars.put("x", 2.5);
        assert_eq!(vars.get("x"), 2.5);
    }
}
