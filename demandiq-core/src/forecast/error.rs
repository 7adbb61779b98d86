//! Structured error types for the forecasting core.
//!
//! Every failure reaches the caller with enough detail to tell a data problem
//! (bad token, degenerate series, empty horizon) from a model problem
//! (numerical fault) or a budget problem (timeout).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("invalid model type '{0}': choose 'prophet' or 'xgboost'")]
    InvalidModel(String),

    #[error("model fit failed: {0}")]
    ModelFit(String),

    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("forecast exceeded its {limit_ms} ms budget during {stage}")]
    TimeoutExceeded { limit_ms: u64, stage: String },

    #[error("an error occurred during forecasting: {0}")]
    ForecastingFailure(String),
}

impl ForecastError {
    /// Stable tag for logs and serialized error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InvalidModel(_) => "invalid_model",
            ForecastError::ModelFit(_) => "model_fit",
            ForecastError::FeatureMismatch(_) => "feature_mismatch",
            ForecastError::TimeoutExceeded { .. } => "timeout_exceeded",
            ForecastError::ForecastingFailure(_) => "forecasting_failure",
        }
    }

    /// True when the request itself is at fault (bad token, data, or horizon).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InvalidModel(_)
                | ForecastError::ModelFit(_)
                | ForecastError::FeatureMismatch(_)
        )
    }

    /// True when retrying (with a smaller horizon or another model) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForecastError::TimeoutExceeded { .. })
    }
}
