//! Domain error types.

/// Top-level error type for fxpilot.
#[derive(Debug, thiserror::Error)]
pub enum FxpilotError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("connection failure during {operation}: {reason}")]
    Connection { operation: String, reason: String },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("insufficient balance: need {required:.2}, have {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("invalid risk input: {reason}")]
    InvalidRiskInput { reason: String },

    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient history for {symbol}: have {bars} bars, need {required}")]
    InsufficientBars {
        symbol: String,
        bars: usize,
        required: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FxpilotError {
    /// True for failures that a later attempt against the same endpoint may
    /// clear on its own. Only these are retried when placing orders.
    pub fn is_transient(&self) -> bool {
        matches!(self, FxpilotError::Connection { .. })
    }
}

impl From<&FxpilotError> for std::process::ExitCode {
    fn from(err: &FxpilotError) -> Self {
        let code: u8 = match err {
            FxpilotError::Io(_) => 1,
            FxpilotError::ConfigParse { .. }
            | FxpilotError::ConfigMissing { .. }
            | FxpilotError::ConfigInvalid { .. } => 2,
            FxpilotError::Connection { .. } => 3,
            FxpilotError::OrderRejected { .. }
            | FxpilotError::InsufficientBalance { .. }
            | FxpilotError::InvalidRiskInput { .. } => 4,
            FxpilotError::DataUnavailable { .. } | FxpilotError::InsufficientBars { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
