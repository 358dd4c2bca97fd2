//! Azure provider error types
//!
//! Provisioning itself reports [`flotilla_cloud::CloudError`]; this type
//! covers setting the client up.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] flotilla_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, AzureError>;
