//! Persisted bit vocabulary: trade bits, mode switches, status flags, contract types.
//!
//! These values are stored in trade logs and saved sessions. They must never
//! be renumbered.

use serde::{Deserialize, Serialize};

/// Sentinel for "unknown / no data" returned by price and contract accessors.
pub const NIL: f64 = 3e38;

/// True for the [`NIL`] sentinel (and anything at least as large).
pub fn is_nil(value: f64) -> bool {
    value >= NIL
}

pub const NAMESIZE: usize = 16;
pub const NAMESIZE2: usize = 40;
pub const NUM_SKILLS: usize = 8;
pub const NUM_RESULTS: usize = 20;
pub const MAX_PARAMS: usize = 16;
pub const MAX_STEPS: usize = 1000;

/// Trade flag bits.
pub mod tr {
    pub const SHORT: u32 = 1 << 0;
    pub const BID: u32 = 1 << 0;
    pub const OPEN: u32 = 1 << 1;
    pub const NOTFOUND: u32 = 1 << 2;
    pub const EXPIRED: u32 = 1 << 3;
    pub const WAITSELL: u32 = 1 << 4;
    pub const WAITBUY: u32 = 1 << 5;
    pub const DETREND: u32 = 1 << 6;
    pub const SUSPEND: u32 = 1 << 7;
    pub const EVENT: u32 = 1 << 8;
    pub const IGNORE: u32 = 1 << 9;
    pub const MISSEDENTRY: u32 = 1 << 10;
    pub const MISSEDEXIT: u32 = 1 << 11;
    pub const NOSIZE: u32 = 1 << 12;
    pub const RECYCLE: u32 = 1 << 13;
    pub const NONET: u32 = 1 << 14;
    pub const NET: u32 = 1 << 15;
    pub const PHANTOM: u32 = 1 << 16;
    pub const EXERCISE: u32 = 1 << 17;
    pub const STOPPED: u32 = 1 << 18;
    pub const PROFIT: u32 = 1 << 19;
    pub const TIME: u32 = 1 << 20;
    pub const SOLD: u32 = 1 << 21;
    pub const CANCELLED: u32 = 1 << 22;
    pub const MISSEDOPEN: u32 = 1 << 23;
    pub const ACCOUNT: u32 = 1 << 24;
    pub const ENTRYSTOP: u32 = 1 << 25;
    pub const ENTER: u32 = 1 << 26;
    pub const EXIT: u32 = 1 << 27;
    pub const REMOVED: u32 = 1 << 28;
    pub const BAR: u32 = 1 << 29;
    pub const REVERSED: u32 = 1 << 30;
    pub const NEW: u32 = 1 << 31;

    /// Every bit that names why a trade left the book.
    pub const CLOSE_REASONS: u32 = STOPPED
        | PROFIT
        | TIME
        | SOLD
        | EXIT
        | REMOVED
        | REVERSED
        | EXPIRED
        | CANCELLED
        | MISSEDENTRY
        | MISSEDOPEN
        | NOSIZE;
}

/// Mode switches, set before a run.
pub mod mode {
    pub const SKIP1: u32 = 1 << 0;
    pub const SKIP2: u32 = 1 << 1;
    pub const SKIP3: u32 = 1 << 2;
    pub const BINARY: u32 = 1 << 3;
    pub const PRELOAD: u32 = 1 << 4;
    pub const PLOTNOW: u32 = 1 << 5;
    pub const LOGFILE: u32 = 1 << 8;
    pub const LEAN: u32 = 1 << 10;
    pub const EXE: u32 = 1 << 11;
    pub const RULES: u32 = 1 << 12;
    pub const FACTORS: u32 = 1 << 13;
    pub const PARAMETERS: u32 = 1 << 14;
    pub const OPENEND: u32 = 1 << 15;
    pub const PEEK: u32 = 1 << 16;
    pub const RISKLIMIT: u32 = 1 << 17;
    pub const MARGINLIMIT: u32 = 1 << 18;
    pub const ACCUMULATE: u32 = 1 << 19;
    pub const TESTNOW: u32 = 1 << 20;
    pub const RECALCULATE: u32 = 1 << 21;
    pub const NOLOCK: u32 = 1 << 23;
    pub const FAST: u32 = 1 << 24;
    pub const NFA: u32 = 1 << 25;
    pub const SCREENSAVER: u32 = 1 << 26;
    pub const TICKS: u32 = 1 << 27;
    pub const BALANCE: u32 = 1 << 28;
    pub const STEPWISE: u32 = 1 << 29;
    pub const ALLCYCLES: u32 = 1 << 30;
}

/// Status flags, maintained by the engine.
pub mod status {
    pub const TRADING: u32 = 1 << 0;
    pub const CHANGED: u32 = 1 << 1;
    pub const INITRUN: u32 = 1 << 2;
    pub const EXITRUN: u32 = 1 << 3;
    pub const TESTMODE: u32 = 1 << 4;
    pub const TRAINMODE: u32 = 1 << 5;
    pub const TRADEMODE: u32 = 1 << 6;
    pub const DEMO: u32 = 1 << 7;
    pub const LOOKBACK: u32 = 1 << 8;
    pub const FIRSTRUN: u32 = 1 << 9;
    pub const COMMAND: u32 = 1 << 10;
    pub const CONTRACTS: u32 = 1 << 15;
    pub const PORTFOLIO: u32 = 1 << 16;
    pub const ASSETS: u32 = 1 << 17;
    pub const SELECTED: u32 = 1 << 18;
    pub const PLOTSTATS: u32 = 1 << 19;
    pub const AFFIRMED: u32 = 1 << 20;
    pub const SPECIALBAR: u32 = 1 << 21;
    pub const MARGINCALL: u32 = 1 << 22;
    pub const NEWDAY: u32 = 1 << 23;
    pub const PROCESS: u32 = 1 << 24;
    pub const SPONSORED: u32 = 1 << 25;
    pub const RUNNING: u32 = 1 << 26;
    pub const FIRSTINITRUN: u32 = 1 << 27;
    pub const SHORTING: u32 = 1 << 28;
}

/// Contract type bits.
pub mod contract {
    pub const CALL: u32 = 1 << 0;
    pub const PUT: u32 = 1 << 1;
    pub const EUROPEAN: u32 = 1 << 2;
    pub const BINARY: u32 = 1 << 3;
    pub const FUTURE: u32 = 1 << 5;
    pub const ONLYMATCH: u32 = 1 << 6;
    pub const ONLYW3: u32 = 1 << 7;
    pub const OPTION: u32 = CALL | PUT | EUROPEAN;
}

/// Raw trade flag word, as stored in logs and saved sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeFlags(pub u32);

impl TradeFlags {
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if any bit of `mask` is set.
    pub fn any(self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    /// True if every bit of `mask` is set.
    pub fn all(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    pub fn insert(&mut self, mask: u32) {
        self.0 |= mask;
    }

    pub fn remove(&mut self, mask: u32) {
        self.0 &= !mask;
    }

    pub fn is_short(self) -> bool {
        self.any(tr::SHORT)
    }

    pub fn is_open(self) -> bool {
        self.any(tr::OPEN)
    }

    pub fn is_pending(self) -> bool {
        self.any(tr::WAITBUY)
    }

    pub fn is_closed(self) -> bool {
        !self.is_open() && self.any(tr::CLOSE_REASONS)
    }

    pub fn is_phantom(self) -> bool {
        self.any(tr::PHANTOM)
    }

    pub fn is_pool(self) -> bool {
        self.0 & (tr::PHANTOM | tr::NET) == tr::NET
    }

    pub fn is_virtual(self) -> bool {
        self.all(tr::PHANTOM | tr::NET)
    }

    /// The closing-reason bits that are set.
    pub fn close_reason_bits(self) -> u32 {
        self.0 & tr::CLOSE_REASONS
    }
}
