//! Entry signal generation.
//!
//! The canonical rule is long-only: Buy when the fast moving average is
//! strictly above the slow one and entries are currently permitted,
//! otherwise Flat. An externally supplied predictive label can only veto
//! an entry, never force one.

use chrono::{DateTime, Duration, Utc};

use crate::domain::indicator::IndicatorSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
    Flat,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub direction: Direction,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl Signal {
    /// A signal must never be acted on after its validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.valid_until
    }
}

/// Entry preconditions sampled by the scheduler before evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EntryGate {
    pub position_open: bool,
    pub cooldown_elapsed: bool,
}

#[derive(Debug, Clone)]
pub struct SignalGenerator {
    validity: Duration,
}

impl SignalGenerator {
    /// `validity` is how long an emitted signal may be acted on, normally
    /// one tick interval.
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    pub fn evaluate(
        &self,
        indicators: &IndicatorSet,
        predictive: Option<Direction>,
        gate: &EntryGate,
        now: DateTime<Utc>,
    ) -> Signal {
        let crossover = indicators.fast_ma > indicators.slow_ma;
        let entries_permitted = !gate.position_open && gate.cooldown_elapsed;
        // A label agrees when it is Buy or absent; Sell and Flat veto.
        let label_agrees = matches!(predictive, None | Some(Direction::Buy));

        let direction = if crossover && entries_permitted && label_agrees {
            Direction::Buy
        } else {
            Direction::Flat
        };

        let confidence = match direction {
            Direction::Buy => {
                let separation = (indicators.fast_ma - indicators.slow_ma) / indicators.slow_ma;
                separation.abs().min(1.0)
            }
            _ => 0.0,
        };

        Signal {
            direction,
            confidence,
            generated_at: now,
            valid_until: now + self.validity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn indicators(fast_ma: f64, slow_ma: f64) -> IndicatorSet {
        IndicatorSet {
            fast_ma,
            slow_ma,
            rsi: 55.0,
            atr: 0.05,
        }
    }

    fn open_gate() -> EntryGate {
        EntryGate {
            position_open: false,
            cooldown_elapsed: true,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn generator() -> SignalGenerator {
        SignalGenerator::new(Duration::seconds(60))
    }

    #[test]
    fn golden_cross_emits_buy() {
        let signal = generator().evaluate(&indicators(1.2350, 1.2300), None, &open_gate(), now());
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.confidence > 0.0);
    }

    #[test]
    fn fast_below_slow_is_flat() {
        let signal = generator().evaluate(&indicators(1.2250, 1.2300), None, &open_gate(), now());
        assert_eq!(signal.direction, Direction::Flat);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn equal_averages_are_flat() {
        // Strict inequality: a touching cross is not an entry.
        let signal = generator().evaluate(&indicators(1.2300, 1.2300), None, &open_gate(), now());
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn open_position_blocks_entry() {
        let gate = EntryGate {
            position_open: true,
            cooldown_elapsed: true,
        };
        let signal = generator().evaluate(&indicators(1.2350, 1.2300), None, &gate, now());
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn active_cooldown_blocks_entry() {
        let gate = EntryGate {
            position_open: false,
            cooldown_elapsed: false,
        };
        let signal = generator().evaluate(&indicators(1.2350, 1.2300), None, &gate, now());
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn agreeing_label_preserves_buy() {
        let signal = generator().evaluate(
            &indicators(1.2350, 1.2300),
            Some(Direction::Buy),
            &open_gate(),
            now(),
        );
        assert_eq!(signal.direction, Direction::Buy);
    }

    #[test]
    fn disagreeing_label_vetoes_buy() {
        for label in [Direction::Sell, Direction::Flat] {
            let signal = generator().evaluate(
                &indicators(1.2350, 1.2300),
                Some(label),
                &open_gate(),
                now(),
            );
            assert_eq!(signal.direction, Direction::Flat);
        }
    }

    #[test]
    fn label_alone_cannot_force_entry() {
        // Bearish averages with a bullish label stay flat.
        let signal = generator().evaluate(
            &indicators(1.2250, 1.2300),
            Some(Direction::Buy),
            &open_gate(),
            now(),
        );
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn confidence_is_bounded() {
        let signal = generator().evaluate(&indicators(10.0, 1.0), None, &open_gate(), now());
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.confidence <= 1.0);
    }

    #[test]
    fn signal_expires_after_validity_window() {
        let signal = generator().evaluate(&indicators(1.2350, 1.2300), None, &open_gate(), now());
        assert!(signal.is_valid_at(now()));
        assert!(signal.is_valid_at(now() + Duration::seconds(60)));
        assert!(!signal.is_valid_at(now() + Duration::seconds(61)));
    }
}
