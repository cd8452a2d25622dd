//! Error types for the guest check-in service.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::onboarding::state::TransitionError;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Onboarding error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the guest directory, visit ledger, blob storage or
/// image pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} returned {status}: {message}")]
    Backend {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Rejected by {service}: {reason}")]
    Rejected { service: String, reason: String },
}

impl RemoteError {
    /// Build a `RequestFailed` from a transport error, folding reqwest
    /// timeouts into `Timeout`.
    pub fn from_reqwest(service: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                service: service.to_string(),
                timeout,
            }
        } else {
            Self::RequestFailed {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// A single failed field check.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All field failures for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-field failure.
    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether a given field failed.
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing failed, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Profile image validation and processing errors.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid file type. Please upload a JPEG, PNG, or WebP image.")]
    UnsupportedType { content_type: String },

    #[error("File too large. Maximum size is 5MB.")]
    TooLarge { size: usize, max: usize },

    #[error("Image is empty")]
    Empty,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Errors surfaced by the onboarding flow controller.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Please wait for the current request to finish")]
    Busy,

    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Image(#[from] ImageError),

    #[error("Guest {0} is not in the directory")]
    UnknownGuest(Uuid),

    #[error("Onboarding session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Access denied: {0}")]
    AccessDenied(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
