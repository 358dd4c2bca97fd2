//! Cloud provider error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure reported by the remote management API.
///
/// Every remote-call failure is normalized into this shape by the provider
/// client, whatever transport produced it. `status_code` is `None` when the
/// request never got an HTTP response (connection reset, DNS, TLS...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderError {
    /// HTTP-like status code
    pub status_code: Option<u16>,

    /// Human-readable message
    pub message: String,

    /// Provider error code (e.g. "AllocationFailed", "ResourceNotFound")
    pub code: Option<String>,

    /// Additional provider-specific fields
    pub details: Option<serde_json::Value>,
}

impl ProviderError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Failure without any HTTP response
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code == Some(409)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code, Some(400..=499))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "status_code={} ", status)?,
            None => write!(f, "status_code=none ")?,
        }
        if let Some(code) = &self.code {
            write!(f, "code={} ", code)?;
        }
        write!(f, "message=\"{}\"", self.message)
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A resource identifier that does not match the expected path layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not parse {expected} id: {id}")]
pub struct ResourceIdError {
    /// Type marker that was expected in the id
    pub expected: String,

    /// The offending id
    pub id: String,
}

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Ran out of retry attempts invoking {invocation} after {attempts} attempts: {source}")]
    RetriesExhausted {
        invocation: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Resource id error: {0}")]
    ResourceId(#[from] ResourceIdError),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// The provider failure behind this error, if there is one.
    ///
    /// Retry exhaustion still exposes the last failure unchanged.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CloudError::Provider(e) => Some(e),
            CloudError::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.provider_error().and_then(|e| e.status_code)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
