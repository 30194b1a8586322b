//! CSV bar file adapter.
//!
//! Reads a whole price history from one file with a
//! `timestamp,open,high,low,close,volume` header, timestamps in
//! RFC 3339. Rows may arrive out of order; the result is always
//! ascending by timestamp.

use crate::domain::bar::Bar;
use crate::domain::error::FxpilotError;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

pub struct CsvBarAdapter {
    path: PathBuf,
}

impl CsvBarAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load_bars(&self, symbol: &str) -> Result<Vec<Bar>, FxpilotError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| FxpilotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let timestamp_str =
                record.get(0).ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing timestamp column".into(),
                })?;
            let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid timestamp {timestamp_str:?}, want RFC 3339: {e}"),
                })?
                .with_timezone(&Utc);

            let open: f64 = record
                .get(1)
                .ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing open column".into(),
                })?
                .parse()
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid open value: {}", e),
                })?;

            let high: f64 = record
                .get(2)
                .ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing high column".into(),
                })?
                .parse()
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid high value: {}", e),
                })?;

            let low: f64 = record
                .get(3)
                .ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing low column".into(),
                })?
                .parse()
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid low value: {}", e),
                })?;

            let close: f64 = record
                .get(4)
                .ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing close column".into(),
                })?
                .parse()
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid close value: {}", e),
                })?;

            let volume: i64 = record
                .get(5)
                .ok_or_else(|| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "missing volume column".into(),
                })?
                .parse()
                .map_err(|e| FxpilotError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("invalid volume value: {}", e),
                })?;

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}
