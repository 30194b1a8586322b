//! Market data access port trait.

use crate::domain::bar::{Bar, Tick};
use crate::domain::config::Timeframe;
use crate::domain::error::FxpilotError;

pub trait MarketDataPort {
    /// The most recent `count` bars, ascending by timestamp.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, FxpilotError>;

    fn fetch_tick(&self, symbol: &str) -> Result<Tick, FxpilotError>;
}
