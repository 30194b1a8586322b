//! Session gates: daily trading window and entry cooldown.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Daily window during which new entries are allowed. A window whose start
/// is after its end spans midnight.
#[derive(Debug, Clone, Copy)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

/// Minimum spacing between entries. The marker only moves forward, so a
/// replayed or out-of-order timestamp can never shorten the wait.
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last_trade_at: Option<DateTime<Utc>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_trade_at: None,
        }
    }

    /// True before any trade and from `last_trade_at + interval` onwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_trade_at {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    pub fn mark(&mut self, now: DateTime<Utc>) {
        match self.last_trade_at {
            Some(last) if last >= now => {}
            _ => self.last_trade_at = Some(now),
        }
    }

    pub fn last_trade_at(&self) -> Option<DateTime<Utc>> {
        self.last_trade_at
    }
}
