//! Market data primitives: bars, ticks, account snapshots.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Best bid/ask at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    /// (bid + ask) / 2
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// ask - bid
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Account snapshot taken once per tick; all sizing within the tick uses
/// the same snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AccountState {
    pub balance: f64,
    pub equity: f64,
}
