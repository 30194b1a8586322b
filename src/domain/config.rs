//! Engine configuration types.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveTime};

use crate::domain::indicator::IndicatorParams;
use crate::domain::session::TradingWindow;

/// Bar aggregation period, named the way brokers name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!(
                "unknown timeframe '{other}', expected one of M1, M5, M15, M30, H1, H4, D1"
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub rsi_window: usize,
    pub atr_period: usize,
    pub max_risk_percent: f64,
    pub take_profit_ratio: f64,
    pub trailing_stop_ratio: f64,
    pub trading_hours: TradingWindow,
    pub cooldown_secs: u64,
    pub tick_interval_secs: u64,
    pub max_retries: u32,
    pub is_demo: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "USDJPY".to_string(),
            timeframe: Timeframe::M1,
            fast_ma_period: 10,
            slow_ma_period: 50,
            rsi_window: 14,
            atr_period: 14,
            max_risk_percent: 0.15,
            take_profit_ratio: 2.0,
            trailing_stop_ratio: 0.05,
            trading_hours: TradingWindow {
                start: NaiveTime::MIN,
                end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            },
            cooldown_secs: 3600,
            tick_interval_secs: 60,
            max_retries: 3,
            is_demo: true,
        }
    }
}

impl EngineConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            fast_ma_period: self.fast_ma_period,
            slow_ma_period: self.slow_ma_period,
            rsi_window: self.rsi_window,
            atr_period: self.atr_period,
        }
    }

    /// A signal stays actionable for one tick interval.
    pub fn signal_validity(&self) -> Duration {
        Duration::seconds(self.tick_interval_secs as i64)
    }

    pub fn cooldown_interval(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }
}
