//! Error taxonomy for the analytics core

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    /// Not enough history to fill a warm-up window
    #[error("Insufficient data: need {required} price points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input for `{field}`: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// A calculation produced NaN or infinity despite the sentinel guards
    #[error("Degenerate math in {0}")]
    DegenerateMath(&'static str),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AnalyticsError {
    pub fn missing(field: &'static str) -> Self {
        Self::InvalidInput {
            field,
            reason: "required field is missing".to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Reject non-finite calculator outputs before they reach JSON.
pub(crate) fn ensure_finite(value: f64, context: &'static str) -> AnalyticsResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AnalyticsError::DegenerateMath(context))
    }
}
