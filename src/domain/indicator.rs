//! Technical indicators over the trailing end of a bar series.
//!
//! Each function is pure: the same slice always yields the same value, and
//! nothing here touches a clock or a port. Values are taken at the latest
//! bar only; the engine re-computes from a fresh snapshot every tick.
//!
//! RSI uses simple means of gains and losses over the window:
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), with avg_loss == 0 → 100
//! and avg_gain == 0 → 0, checked in that order.

use crate::domain::bar::Bar;
use crate::domain::error::FxpilotError;

/// Lookback lengths for one indicator pass.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorParams {
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub rsi_window: usize,
    pub atr_period: usize,
}

impl IndicatorParams {
    /// Bars needed before every indicator is defined. RSI consumes
    /// `rsi_window` close-to-close deltas, which takes one extra bar.
    pub fn required_bars(&self) -> usize {
        self.fast_ma_period
            .max(self.slow_ma_period)
            .max(self.rsi_window + 1)
            .max(self.atr_period)
    }
}

/// Indicator values at the latest bar of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSet {
    pub fast_ma: f64,
    pub slow_ma: f64,
    pub rsi: f64,
    pub atr: f64,
}

/// Mean of the last `period` closes. None when the series is too short
/// or the period is zero.
pub fn sma(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let sum: f64 = window.iter().map(|b| b.close).sum();
    Some(sum / period as f64)
}

/// RSI over the last `window` close-to-close changes.
pub fn rsi(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window + 1 {
        return None;
    }

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in bars.len() - window..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            gain_sum += change;
        } else {
            loss_sum += -change;
        }
    }

    let avg_gain = gain_sum / window as f64;
    let avg_loss = loss_sum / window as f64;

    // Flat windows land in the first branch: no losses reads as full strength.
    let value = if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };
    Some(value)
}

/// Mean true range of the last `period` bars. The earliest bar of the
/// series has no prior close and contributes high - low.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let start = bars.len() - period;
    let mut sum = 0.0;
    for i in start..bars.len() {
        let tr = if i == 0 {
            bars[i].high - bars[i].low
        } else {
            bars[i].true_range(bars[i - 1].close)
        };
        sum += tr;
    }
    Some(sum / period as f64)
}

/// Compute the full indicator snapshot for the latest bar.
pub fn compute(
    symbol: &str,
    bars: &[Bar],
    params: &IndicatorParams,
) -> Result<IndicatorSet, FxpilotError> {
    let required = params.required_bars();
    let (Some(fast_ma), Some(slow_ma), Some(rsi), Some(atr)) = (
        sma(bars, params.fast_ma_period),
        sma(bars, params.slow_ma_period),
        rsi(bars, params.rsi_window),
        atr(bars, params.atr_period),
    ) else {
        return Err(FxpilotError::InsufficientBars {
            symbol: symbol.to_string(),
            bars: bars.len(),
            required,
        });
    };

    Ok(IndicatorSet {
        fast_ma,
        slow_ma,
        rsi,
        atr,
    })
}
