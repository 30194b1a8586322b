//! Configuration validation.
//!
//! Runs once at startup, before any port is touched. Config problems are
//! fatal here and nowhere else.

use crate::domain::config::Timeframe;
use crate::domain::error::FxpilotError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveTime;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    validate_symbol(config)?;
    validate_timeframe(config)?;
    validate_ma_periods(config)?;
    validate_rsi_window(config)?;
    validate_atr_period(config)?;
    validate_tick_interval(config)?;
    validate_max_retries(config)?;
    validate_max_risk_percent(config)?;
    validate_take_profit_ratio(config)?;
    validate_trailing_stop_ratio(config)?;
    validate_trading_hours(config)?;
    validate_cooldown(config)?;
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    match config.get_string("engine", "symbol") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(FxpilotError::ConfigMissing {
            section: "engine".to_string(),
            key: "symbol".to_string(),
        }),
    }
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    match config.get_string("engine", "timeframe") {
        None => Ok(()),
        Some(s) => match s.parse::<Timeframe>() {
            Ok(_) => Ok(()),
            Err(reason) => Err(FxpilotError::ConfigInvalid {
                section: "engine".to_string(),
                key: "timeframe".to_string(),
                reason,
            }),
        },
    }
}

fn validate_ma_periods(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let fast = config.get_int("engine", "fast_ma_period", 10);
    let slow = config.get_int("engine", "slow_ma_period", 50);

    if fast < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "fast_ma_period".to_string(),
            reason: "fast_ma_period must be at least 1".to_string(),
        });
    }
    if slow < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "slow_ma_period".to_string(),
            reason: "slow_ma_period must be at least 1".to_string(),
        });
    }
    if fast >= slow {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "fast_ma_period".to_string(),
            reason: "fast_ma_period must be less than slow_ma_period".to_string(),
        });
    }
    Ok(())
}

fn validate_rsi_window(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_int("engine", "rsi_window", 14);
    if value < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "rsi_window".to_string(),
            reason: "rsi_window must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_atr_period(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_int("engine", "atr_period", 14);
    if value < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "atr_period".to_string(),
            reason: "atr_period must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_tick_interval(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_int("engine", "tick_interval_secs", 60);
    if value < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "tick_interval_secs".to_string(),
            reason: "tick_interval_secs must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_max_retries(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_int("engine", "max_retries", 3);
    if value < 1 {
        return Err(FxpilotError::ConfigInvalid {
            section: "engine".to_string(),
            key: "max_retries".to_string(),
            reason: "max_retries must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_max_risk_percent(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_double("risk", "max_risk_percent", 0.15);
    if value <= 0.0 || value > 1.0 {
        return Err(FxpilotError::ConfigInvalid {
            section: "risk".to_string(),
            key: "max_risk_percent".to_string(),
            reason: "max_risk_percent must be between 0 (exclusive) and 1".to_string(),
        });
    }
    Ok(())
}

fn validate_take_profit_ratio(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_double("risk", "take_profit_ratio", 2.0);
    if value <= 0.0 {
        return Err(FxpilotError::ConfigInvalid {
            section: "risk".to_string(),
            key: "take_profit_ratio".to_string(),
            reason: "take_profit_ratio must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_trailing_stop_ratio(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_double("risk", "trailing_stop_ratio", 0.05);
    if value <= 0.0 || value >= 1.0 {
        return Err(FxpilotError::ConfigInvalid {
            section: "risk".to_string(),
            key: "trailing_stop_ratio".to_string(),
            reason: "trailing_stop_ratio must be between 0 and 1 exclusive".to_string(),
        });
    }
    Ok(())
}

fn validate_trading_hours(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    parse_session_time(config, "trading_hours_start")?;
    parse_session_time(config, "trading_hours_end")?;
    Ok(())
}

fn parse_session_time(config: &dyn ConfigPort, field: &str) -> Result<(), FxpilotError> {
    match config.get_string("session", field) {
        None => Ok(()),
        Some(s) => match NaiveTime::parse_from_str(&s, "%H:%M") {
            Ok(_) => Ok(()),
            Err(_) => Err(FxpilotError::ConfigInvalid {
                section: "session".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected HH:MM", field),
            }),
        },
    }
}

fn validate_cooldown(config: &dyn ConfigPort) -> Result<(), FxpilotError> {
    let value = config.get_int("session", "cooldown_secs", 3600);
    if value < 0 {
        return Err(FxpilotError::ConfigInvalid {
            section: "session".to_string(),
            key: "cooldown_secs".to_string(),
            reason: "cooldown_secs must be non-negative".to_string(),
        });
    }
    Ok(())
}
