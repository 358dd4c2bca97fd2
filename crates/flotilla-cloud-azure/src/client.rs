//! Azure Resource Manager REST client
//!
//! Thin wrapper over `reqwest` that knows ARM paths, API versions and the
//! ARM error envelope. Every failure leaves this module as a
//! [`ProviderError`]; long-running writes are handed out as [`ArmCall`]s for
//! an [`AsyncOperation`](flotilla_cloud::AsyncOperation) to drive.

use crate::error::{AzureError, Result};
use crate::poller::{ArmCall, ArmMethod};
use flotilla_cloud::{Invocation, OperationOptions, ProviderError, ProviderResult};
use flotilla_config::Settings;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

pub const RESOURCES_API_VERSION: &str = "2021-04-01";
pub const NETWORK_API_VERSION: &str = "2023-09-01";
pub const COMPUTE_API_VERSION: &str = "2023-09-01";

pub const NETWORK_PROVIDER: &str = "Microsoft.Network";
pub const COMPUTE_PROVIDER: &str = "Microsoft.Compute";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connection settings for [`ArmClient`]
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub subscription_id: String,
    pub access_token: String,
    pub management_endpoint: String,
    /// Delay between polls when the service sends no `Retry-After`
    pub poll_interval: Duration,
}

impl AzureConfig {
    /// Create AzureConfig from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            subscription_id: env_var("AZURE_SUBSCRIPTION_ID")?,
            access_token: env_var("AZURE_ACCESS_TOKEN")?,
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Values from settings, falling back to the environment
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let credentials = &settings.credentials;
        let subscription_id = match &credentials.subscription_id {
            Some(id) => id.clone(),
            None => env_var("AZURE_SUBSCRIPTION_ID")?,
        };
        let access_token = match &credentials.access_token {
            Some(token) => token.clone(),
            None => env_var("AZURE_ACCESS_TOKEN")?,
        };

        Ok(Self {
            subscription_id,
            access_token,
            management_endpoint: settings
                .management_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| AzureError::MissingEnvVar(name.to_string()))
}

/// Operation options derived from the retry section of the settings
pub fn operation_options_from_settings(settings: &Settings) -> Result<OperationOptions> {
    let max_retries = settings
        .retry
        .max_retries_limit()
        .map_err(|e| AzureError::InvalidConfig(e.to_string()))?;
    Ok(OperationOptions {
        max_retries,
        backoff_unit: settings.retry.backoff_unit(),
        ..OperationOptions::default()
    })
}

/// ARM client scoped to one subscription
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    base_url: String,
    subscription_id: String,
    access_token: String,
    poll_interval: Duration,
    operation_options: OperationOptions,
}

impl ArmClient {
    pub fn new(config: AzureConfig) -> Result<Self> {
        let base_url = config.management_endpoint.trim_end_matches('/').to_string();
        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(AzureError::InvalidConfig(format!(
                "management endpoint must be an http(s) URL: {}",
                config.management_endpoint
            )));
        }
        if config.subscription_id.is_empty() {
            return Err(AzureError::InvalidConfig(
                "subscription id is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("flotilla/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            subscription_id: config.subscription_id,
            access_token: config.access_token,
            poll_interval: config.poll_interval,
            operation_options: OperationOptions::default(),
        })
    }

    /// Options every [`AsyncOperation`](flotilla_cloud::AsyncOperation)
    /// started through this client begins from
    pub fn with_operation_options(mut self, options: OperationOptions) -> Self {
        self.operation_options = options;
        self
    }

    pub fn operation_options(&self) -> OperationOptions {
        self.operation_options.clone()
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn resource_group_path(&self, resource_group: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            self.subscription_id, resource_group
        )
    }

    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{provider}/{segments...}`
    pub fn resource_path(&self, resource_group: &str, provider: &str, segments: &[&str]) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id,
            resource_group,
            provider,
            segments.join("/")
        )
    }

    pub fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, api_version)
    }

    /// Send a request; non-2xx responses come back as errors
    pub(crate) async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<reqwest::Response> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::trace!("{} {}", method, url);
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// GET a resource
    pub async fn get<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> ProviderResult<T> {
        let response = self.send(Method::GET, &self.url(path, api_version), None).await?;
        decode(response).await
    }

    /// HEAD a resource; 404 means it does not exist
    pub async fn exists(&self, path: &str, api_version: &str) -> ProviderResult<bool> {
        let response = self
            .http
            .head(self.url(path, api_version))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(error_from_response(response).await),
        }
    }

    /// PUT a resource that the service creates synchronously
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
        body: &serde_json::Value,
    ) -> ProviderResult<T> {
        let response = self
            .send(Method::PUT, &self.url(path, api_version), Some(body))
            .await?;
        decode(response).await
    }

    /// Deferred long-running PUT
    pub fn begin_put(
        &self,
        path: &str,
        api_version: &str,
        body: serde_json::Value,
        invocation: Invocation,
    ) -> ArmCall {
        ArmCall::new(
            self.clone(),
            ArmMethod::Put(body),
            self.url(path, api_version),
            invocation,
        )
    }

    /// Deferred long-running DELETE
    pub fn begin_delete(&self, path: &str, api_version: &str, invocation: Invocation) -> ArmCall {
        ArmCall::new(
            self.clone(),
            ArmMethod::Delete,
            self.url(path, api_version),
            invocation,
        )
    }
}

// ============ Response handling ============

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// The `error` object ARM uses in error responses and operation status
/// documents
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub(crate) fn into_provider_error(self, status: u16) -> ProviderError {
        let mut error = ProviderError::new(status, self.message);
        if let Some(code) = self.code {
            error = error.with_code(code);
        }
        match self.details {
            Some(details) if !details.is_null() => error.with_details(details),
            _ => error,
        }
    }
}

pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::transport(error.to_string())
}

pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    parse_error_body(
        status.as_u16(),
        &body,
        status.canonical_reason().unwrap_or("unknown error"),
    )
}

fn parse_error_body(status: u16, body: &str, fallback: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into_provider_error(status),
        Err(_) if body.trim().is_empty() => ProviderError::new(status, fallback),
        Err(_) => ProviderError::new(status, body.trim()),
    }
}

/// Read a JSON body; an empty body reads as `null`
pub(crate) async fn read_json(response: reqwest::Response) -> ProviderResult<serde_json::Value> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(transport_error)?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ProviderError::new(status, format!("invalid response body: {}", e)))
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
    let status = response.status().as_u16();
    let value = read_json(response).await?;
    serde_json::from_value(value)
        .map_err(|e| ProviderError::new(status, format!("unexpected response body: {}", e)))
}
