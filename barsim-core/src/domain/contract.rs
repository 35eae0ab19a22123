//! Option and future contracts and per-asset contract chains.

use super::ids::{AssetId, ContractRef};
use super::records::ContractRecord;
use crate::flags::{contract as ct, NIL};
use crate::time::{ole_to_datetime, parse_ymd};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Hour of day (UTC) at which contracts expire on their expiry date.
pub const EXPIRY_HOUR_UTC: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub time: f64,
    pub ask: f64,
    pub bid: f64,
    pub val: f64,
    pub vol: f64,
    pub unl: f64,
    pub strike: f64,
    /// `YYYYMMDD`
    pub expiry: u32,
    pub kind: u32,
}

impl From<ContractRecord> for Contract {
    fn from(r: ContractRecord) -> Self {
        Self {
            time: r.time,
            ask: r.ask as f64,
            bid: r.bid as f64,
            val: r.val as f64,
            vol: r.vol as f64,
            unl: r.unl as f64,
            strike: r.strike as f64,
            expiry: r.expiry.max(0) as u32,
            kind: r.kind as u32,
        }
    }
}

impl From<&Contract> for ContractRecord {
    fn from(c: &Contract) -> Self {
        Self {
            time: c.time,
            ask: c.ask as f32,
            bid: c.bid as f32,
            val: c.val as f32,
            vol: c.vol as f32,
            unl: c.unl as f32,
            strike: c.strike as f32,
            expiry: c.expiry as i32,
            kind: c.kind as i32,
        }
    }
}

impl Contract {
    pub fn is_future(&self) -> bool {
        self.kind & ct::FUTURE != 0
    }

    pub fn is_call(&self) -> bool {
        self.kind & ct::CALL != 0
    }

    pub fn is_put(&self) -> bool {
        self.kind & ct::PUT != 0
    }

    /// Whether this contract matches a requested type: futures match
    /// `FUTURE`, options match the call/put bit and, if asked, `EUROPEAN`.
    pub fn matches(&self, kind: u32) -> bool {
        if kind & ct::FUTURE != 0 {
            return self.is_future();
        }
        let side = kind & (ct::CALL | ct::PUT);
        if side != 0 && self.kind & side != side {
            return false;
        }
        if kind & ct::EUROPEAN != 0 && self.kind & ct::EUROPEAN == 0 {
            return false;
        }
        !self.is_future()
    }

    /// Mid price, or the one side that is quoted, or [`NIL`].
    pub fn price(&self) -> f64 {
        match (self.ask > 0.0, self.bid > 0.0) {
            (true, true) => (self.ask + self.bid) / 2.0,
            (true, false) => self.ask,
            (false, true) => self.bid,
            (false, false) => NIL,
        }
    }

    pub fn expiry_time(&self) -> Option<NaiveDateTime> {
        parse_ymd(self.expiry)?.and_hms_opt(EXPIRY_HOUR_UTC, 0, 0)
    }

    /// Fractional days from `now` to expiry; negative once expired.
    pub fn days_to_expiry(&self, now: NaiveDateTime) -> f64 {
        match self.expiry_time() {
            Some(exp) => (exp - now).num_seconds() as f64 / 86_400.0,
            None => NIL,
        }
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expiry_time().is_some_and(|exp| now >= exp)
    }
}

/// The contracts currently listed for an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractChain {
    generation: u32,
    contracts: Vec<Contract>,
}

impl ContractChain {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Install a fresh chain. References handed out before stop resolving.
    pub fn replace(&mut self, contracts: Vec<Contract>) {
        self.generation = self.generation.wrapping_add(1);
        self.contracts = contracts;
    }

    pub fn make_ref(&self, asset: AssetId, index: usize) -> Option<ContractRef> {
        (index < self.contracts.len()).then_some(ContractRef {
            asset,
            index: index as u32,
            generation: self.generation,
        })
    }

    pub fn get(&self, r: ContractRef) -> Option<&Contract> {
        if r.generation != self.generation {
            return None;
        }
        self.contracts.get(r.index as usize)
    }

    /// Index of the contract of type `kind` whose expiry is nearest to
    /// `days` from `now`, then whose strike is nearest to `strike`
    /// (strike is ignored when 0).
    pub fn select(&self, kind: u32, days: i32, strike: f64, now: f64) -> Option<usize> {
        let now = ole_to_datetime(now)?;
        let mut best: Option<(usize, f64, f64)> = None;
        for (i, c) in self.contracts.iter().enumerate() {
            if !c.matches(kind) || c.is_expired(now) {
                continue;
            }
            let day_gap = (c.days_to_expiry(now) - days as f64).abs().round();
            let strike_gap = if strike > 0.0 { (c.strike - strike).abs() } else { 0.0 };
            let better = match best {
                None => true,
                Some((_, d, s)) => day_gap < d || (day_gap == d && strike_gap < s),
            };
            if better {
                best = Some((i, day_gap, strike_gap));
            }
        }
        best.map(|(i, _, _)| i)
    }
}
