//! Domain error types.
//!
//! Data anomalies (gaps, warmup) are normally resolved to "no allocation"
//! inside the engine; the variants here surface only where a caller has to
//! make a decision (startup validation, I/O, broker calls).

/// Top-level error type for quadtrader.
#[derive(Debug, thiserror::Error)]
pub enum QuadtraderError {
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

    #[error("inconsistent configuration: {reason}")]
    ConfigInconsistency { reason: String },

    #[error("data gap for {ticker}: {reason}")]
    DataGap { ticker: String, reason: String },

    #[error("warmup incomplete: have {available} days, need {required}")]
    WarmupIncomplete { available: usize, required: usize },

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error("out-of-order session: {reason}")]
    Sequence { reason: String },

    #[error("execution failed for {ticker}: {reason}")]
    Execution { ticker: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("state persistence error: {reason}")]
    Persistence { reason: String },

    #[error("notification failed: {reason}")]
    Notification { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuadtraderError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        QuadtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        QuadtraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&QuadtraderError> for std::process::ExitCode {
    fn from(err: &QuadtraderError) -> Self {
        let code: u8 = match err {
            QuadtraderError::Io(_) => 1,
            QuadtraderError::ConfigParse { .. }
            | QuadtraderError::ConfigMissing { .. }
            | QuadtraderError::ConfigInvalid { .. }
            | QuadtraderError::ConfigInconsistency { .. } => 2,
            QuadtraderError::Persistence { .. }
            | QuadtraderError::Database { .. }
            | QuadtraderError::Json(_) => 3,
            QuadtraderError::Execution { .. } | QuadtraderError::Notification { .. } => 4,
            QuadtraderError::DataGap { .. }
            | QuadtraderError::WarmupIncomplete { .. }
            | QuadtraderError::NoData { .. }
            | QuadtraderError::Sequence { .. }
            | QuadtraderError::Csv(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message() {
        let err = QuadtraderError::invalid("strategy", "ema_period", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config value [strategy] ema_period: must be positive"
        );
    }

    #[test]
    fn execution_error_names_ticker() {
        let err = QuadtraderError::Execution {
            ticker: "GLD".into(),
            reason: "rejected".into(),
        };
        assert_eq!(err.to_string(), "execution failed for GLD: rejected");
    }

    #[test]
    fn warmup_message() {
        let err = QuadtraderError::WarmupIncomplete {
            available: 10,
            required: 51,
        };
        assert!(err.to_string().contains("need 51"));
    }
}
