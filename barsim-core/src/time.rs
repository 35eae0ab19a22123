//! Timestamps and time zones.
//!
//! Record timestamps are OLE automation dates: fractional days since
//! 1899-12-30 00:00 UTC. Conversions go through `chrono`; market-hour and
//! local-time helpers resolve zone codes to IANA zones via `chrono-tz`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const MS_PER_DAY: f64 = 86_400_000.0;

fn ole_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert an OLE date to a UTC timestamp. `None` for non-finite or out of range input.
pub fn ole_to_datetime(date: f64) -> Option<NaiveDateTime> {
    if !date.is_finite() {
        return None;
    }
    let ms = (date * MS_PER_DAY).round();
    if ms.abs() > i64::MAX as f64 {
        return None;
    }
    let delta = TimeDelta::try_milliseconds(ms as i64)?;
    ole_epoch().checked_add_signed(delta)
}

/// Convert a UTC timestamp to an OLE date.
pub fn datetime_to_ole(dt: NaiveDateTime) -> f64 {
    let delta = dt - ole_epoch();
    delta.num_milliseconds() as f64 / MS_PER_DAY
}

/// `YYYYMMDD` integer for a date.
pub fn ymd(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

/// Parse a `YYYYMMDD` integer.
pub fn parse_ymd(value: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((value / 10_000) as i32, (value / 100) % 100, value % 100)
}

/// `HHMM` integer for a time of day.
pub fn hhmm(dt: NaiveDateTime) -> u32 {
    dt.hour() * 100 + dt.minute()
}

/// Zone codes used by asset and market-hour settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Zone {
    #[default]
    Utc,
    /// London
    Wet,
    /// Frankfurt
    Cet,
    /// New York
    Et,
    /// Tokyo
    Jst,
    /// Sydney
    Aest,
}

impl Zone {
    /// Numeric code as stored in asset records.
    pub fn code(self) -> i32 {
        match self {
            Zone::Utc => 24,
            Zone::Wet => 0,
            Zone::Cet => 1,
            Zone::Et => -5,
            Zone::Jst => 9,
            Zone::Aest => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            24 => Some(Zone::Utc),
            0 => Some(Zone::Wet),
            1 => Some(Zone::Cet),
            -5 => Some(Zone::Et),
            9 => Some(Zone::Jst),
            10 => Some(Zone::Aest),
            _ => None,
        }
    }

    pub fn tz(self) -> Tz {
        match self {
            Zone::Utc => chrono_tz::UTC,
            Zone::Wet => chrono_tz::Europe::London,
            Zone::Cet => chrono_tz::Europe::Berlin,
            Zone::Et => chrono_tz::America::New_York,
            Zone::Jst => chrono_tz::Asia::Tokyo,
            Zone::Aest => chrono_tz::Australia::Sydney,
        }
    }

    /// Local wall-clock time in this zone for a UTC timestamp.
    pub fn local(self, utc: NaiveDateTime) -> NaiveDateTime {
        Utc.from_utc_datetime(&utc).with_timezone(&self.tz()).naive_local()
    }

    /// Whether daylight saving is in effect at `utc`.
    pub fn is_dst(self, utc: NaiveDateTime) -> bool {
        let winter = NaiveDate::from_ymd_opt(utc.year(), 1, 15)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .map(|d| self.local(d) - d);
        let summer = NaiveDate::from_ymd_opt(utc.year(), 7, 15)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .map(|d| self.local(d) - d);
        let (Some(winter), Some(summer)) = (winter, summer) else {
            return false;
        };
        let standard = winter.min(summer);
        self.local(utc) - utc > standard
    }
}

/// Market session in local `HHMM`, e.g. 930..1600. Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHours {
    pub zone: Zone,
    pub start: u32,
    pub end: u32,
}

impl MarketHours {
    pub fn always_open() -> Self {
        Self { zone: Zone::Utc, start: 0, end: 2400 }
    }

    pub fn is_open(&self, utc: NaiveDateTime) -> bool {
        let t = hhmm(self.zone.local(utc));
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self::always_open()
    }
}
