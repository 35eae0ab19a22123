//! Fixed-size binary records for tick, bar and contract history.
//!
//! All records are little endian and start with an OLE date (`f64`).
//! Prices are stored as `f32`. Files are sequences of records, newest first.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{len} bytes is not a multiple of the {size}-byte record size")]
    Misaligned { len: usize, size: usize },

    #[error("record truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fixed-size little-endian record.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn time(&self) -> f64;
    fn put(&self, buf: &mut impl BufMut);
    fn get(buf: &mut impl Buf) -> Self;

    fn decode(buf: &mut impl Buf) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Truncated { need: Self::SIZE, have: buf.remaining() });
        }
        Ok(Self::get(buf))
    }
}

/// Encode records in the given order.
pub fn encode_all<R: Record>(records: &[R]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * R::SIZE);
    for r in records {
        r.put(&mut out);
    }
    out
}

/// Decode a whole buffer of records, in stored order.
pub fn decode_all<R: Record>(mut data: &[u8]) -> Result<Vec<R>, CodecError> {
    if data.len() % R::SIZE != 0 {
        return Err(CodecError::Misaligned { len: data.len(), size: R::SIZE });
    }
    let mut out = Vec::with_capacity(data.len() / R::SIZE);
    while data.has_remaining() {
        out.push(R::decode(&mut data)?);
    }
    Ok(out)
}

/// Tick: time and price. Positive price is an ask quote, negative a bid quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct T1 {
    pub time: f64,
    pub price: f32,
}

impl Record for T1 {
    const SIZE: usize = 12;

    fn time(&self) -> f64 {
        self.time
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.time);
        buf.put_f32_le(self.price);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self { time: buf.get_f64_le(), price: buf.get_f32_le() }
    }
}

/// Tick with volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct T2 {
    pub time: f64,
    pub price: f32,
    pub vol: f32,
}

impl Record for T2 {
    const SIZE: usize = 16;

    fn time(&self) -> f64 {
        self.time
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.time);
        buf.put_f32_le(self.price);
        buf.put_f32_le(self.vol);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self { time: buf.get_f64_le(), price: buf.get_f32_le(), vol: buf.get_f32_le() }
    }
}

/// High/low pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thl {
    pub time: f64,
    pub high: f32,
    pub low: f32,
}

impl Record for Thl {
    const SIZE: usize = 16;

    fn time(&self) -> f64 {
        self.time
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.time);
        buf.put_f32_le(self.high);
        buf.put_f32_le(self.low);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self { time: buf.get_f64_le(), high: buf.get_f32_le(), low: buf.get_f32_le() }
    }
}

/// OHLC bar with two extra values (`val` is spread or open interest).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct T6 {
    pub time: f64,
    pub high: f32,
    pub low: f32,
    pub open: f32,
    pub close: f32,
    pub val: f32,
    pub vol: f32,
}

impl Record for T6 {
    const SIZE: usize = 32;

    fn time(&self) -> f64 {
        self.time
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.time);
        buf.put_f32_le(self.high);
        buf.put_f32_le(self.low);
        buf.put_f32_le(self.open);
        buf.put_f32_le(self.close);
        buf.put_f32_le(self.val);
        buf.put_f32_le(self.vol);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self {
            time: buf.get_f64_le(),
            high: buf.get_f32_le(),
            low: buf.get_f32_le(),
            open: buf.get_f32_le(),
            close: buf.get_f32_le(),
            val: buf.get_f32_le(),
            vol: buf.get_f32_le(),
        }
    }
}

/// One option or future quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub time: f64,
    pub ask: f32,
    pub bid: f32,
    /// Open interest or multiplier.
    pub val: f32,
    pub vol: f32,
    /// Underlying price.
    pub unl: f32,
    pub strike: f32,
    /// `YYYYMMDD`
    pub expiry: i32,
    /// Contract type bits, see [`crate::flags::contract`].
    pub kind: i32,
}

impl Record for ContractRecord {
    const SIZE: usize = 40;

    fn time(&self) -> f64 {
        self.time
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.time);
        buf.put_f32_le(self.ask);
        buf.put_f32_le(self.bid);
        buf.put_f32_le(self.val);
        buf.put_f32_le(self.vol);
        buf.put_f32_le(self.unl);
        buf.put_f32_le(self.strike);
        buf.put_i32_le(self.expiry);
        buf.put_i32_le(self.kind);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self {
            time: buf.get_f64_le(),
            ask: buf.get_f32_le(),
            bid: buf.get_f32_le(),
            val: buf.get_f32_le(),
            vol: buf.get_f32_le(),
            unl: buf.get_f32_le(),
            strike: buf.get_f32_le(),
            expiry: buf.get_i32_le(),
            kind: buf.get_i32_le(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_encoding() {
        assert_eq!(encode_all(&[T1 { time: 1.0, price: 1.0 }]).len(), T1::SIZE);
        assert_eq!(encode_all(&[T2 { time: 1.0, price: 1.0, vol: 2.0 }]).len(), T2::SIZE);
        assert_eq!(encode_all(&[Thl { time: 1.0, high: 2.0, low: 1.0 }]).len(), Thl::SIZE);
        let t6 = T6 { time: 1.0, high: 2.0, low: 0.5, open: 1.0, close: 1.5, val: 0.0, vol: 10.0 };
        assert_eq!(encode_all(&[t6]).len(), T6::SIZE);
        let c = ContractRecord {
            time: 1.0,
            ask: 2.0,
            bid: 1.9,
            val: 100.0,
            vol: 5.0,
            unl: 50.0,
            strike: 50.0,
            expiry: 20240315,
            kind: 1,
        };
        assert_eq!(encode_all(&[c]).len(), ContractRecord::SIZE);
    }

    #[test]
    fn t6_field_order_is_high_low_open_close() {
        let t6 = T6 { time: 0.0, high: 4.0, low: 1.0, open: 2.0, close: 3.0, val: 0.0, vol: 0.0 };
        let bytes = encode_all(&[t6]);
        assert_eq!(&bytes[8..12], &4.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &2.0f32.to_le_bytes());
    }

    #[test]
    fn contract_decodes_expiry_and_type() {
        let c = ContractRecord {
            time: 45000.5,
            ask: 2.5,
            bid: 2.25,
            val: 100.0,
            vol: 12.0,
            unl: 101.0,
            strike: 100.0,
            expiry: 20240621,
            kind: 1 | 4,
        };
        let back: Vec<ContractRecord> = decode_all(&encode_all(&[c])).unwrap();
        assert_eq!(back[0].expiry, 20240621);
        assert_eq!(back[0].kind, 5);
    }

    #[test]
    fn misaligned_buffer_is_rejected() {
        let err = decode_all::<T1>(&[0u8; 13]).unwrap_err();
        assert!(matches!(err, CodecError::Misaligned { len: 13, size: 12 }));
    }

    #[test]
    fn truncated_record_is_reported() {
        let mut short: &[u8] = &[0u8; 6];
        assert!(matches!(T1::decode(&mut short), Err(CodecError::Truncated { need: 12, have: 6 })));
    }
}
