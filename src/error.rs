//! Error types for the overlay pipeline.

use thiserror::Error;

/// Errors surfaced by the transform engine and coordinate mapper.
///
/// Expected runtime conditions (tracking gaps, NaN landmarks, slow frames) are
/// handled locally and never show up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("invalid transform config: {0}")]
    InvalidConfig(String),

    #[error("coordinate mapper has no valid transform config")]
    NotReady,
}

impl TransformError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Errors raised while validating a loaded configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("[{section}] {field}: {reason}")]
    OutOfRange {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(
        section: &'static str,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            section,
            field,
            reason: reason.into(),
        }
    }
}
