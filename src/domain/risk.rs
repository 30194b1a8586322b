//! Fixed-fraction position sizing.

use crate::domain::error::FxpilotError;

/// Volume bounds imposed by the broker for a symbol.
#[derive(Debug, Clone, Copy)]
pub struct VolumeConstraints {
    pub min_volume: f64,
    pub max_volume: f64,
    pub volume_step: f64,
}

/// Size a position so that `balance * max_risk_percent` is lost if the
/// stop is hit: volume = balance * max_risk_percent / stop_distance,
/// clamped to the broker's volume range and rounded down to a step
/// multiple.
pub fn size_position(
    balance: f64,
    stop_distance: f64,
    max_risk_percent: f64,
    constraints: &VolumeConstraints,
) -> Result<f64, FxpilotError> {
    if !(balance > 0.0) {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!("balance must be positive, got {balance}"),
        });
    }
    if !(stop_distance > 0.0) {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!("stop distance must be positive, got {stop_distance}"),
        });
    }
    if !(max_risk_percent > 0.0 && max_risk_percent <= 1.0) {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!("max risk percent must be in (0, 1], got {max_risk_percent}"),
        });
    }
    if !(constraints.volume_step > 0.0)
        || !(constraints.min_volume > 0.0)
        || !(constraints.max_volume >= constraints.min_volume)
    {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!(
                "degenerate volume constraints: min {}, max {}, step {}",
                constraints.min_volume, constraints.max_volume, constraints.volume_step
            ),
        });
    }

    let raw = balance * max_risk_percent / stop_distance;
    let clamped = raw.clamp(constraints.min_volume, constraints.max_volume);
    let stepped = (clamped / constraints.volume_step).floor() * constraints.volume_step;

    // A min_volume not aligned to volume_step can floor to zero.
    if !(stepped > 0.0) {
        return Err(FxpilotError::InvalidRiskInput {
            reason: format!(
                "volume {clamped} rounds to zero under step {}",
                constraints.volume_step
            ),
        });
    }

    Ok(stepped)
}
