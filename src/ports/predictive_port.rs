//! Optional predictive model port trait.
//!
//! A model only gates entries; the crossover rule remains the primary
//! signal and a missing or failing model degrades to crossover-only.

use crate::domain::error::FxpilotError;
use crate::domain::indicator::IndicatorSet;
use crate::domain::signal::Direction;

pub trait PredictivePort {
    fn predict(&self, indicators: &IndicatorSet) -> Result<Direction, FxpilotError>;
}
