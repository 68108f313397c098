//! Error types for edu-mcp
//!
//! Two layers:
//! - [`BackendError`]: the content backend could not produce a result
//! - [`CapabilityError`]: what a capability invocation hands back to the server
//!
//! Adapters never translate a backend failure into another kind; a
//! `BackendError` reaches the server as `CapabilityError::Backend` with the
//! same variant it was raised with.

use std::time::Duration;
use thiserror::Error;

/// Failure of the content-generation backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend could not be reached or refused the request
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but produced no usable content
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Configured deadline elapsed before the backend answered
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        BackendError::Unavailable(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        BackendError::GenerationFailed(msg.into())
    }
}

/// Error returned by a capability invocation
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CapabilityError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CapabilityError::InvalidInput(msg.into())
    }
}

/// Result type alias using [`CapabilityError`]
pub type Result<T> = std::result::Result<T, CapabilityError>;
