//! ARM long-running operations
//!
//! Submitting a PUT or DELETE yields an [`ArmPoller`] that follows the ARM
//! async pattern, in this order of preference:
//!
//! 1. `Azure-AsyncOperation` header: poll the status document until it
//!    reports `Succeeded`, `Failed` or `Canceled`, then GET the resource
//! 2. `Location` header: poll it while it answers 202
//! 3. neither: poll the resource until `properties.provisioningState` is
//!    terminal
//!
//! A status document reporting `Failed` is returned as a [`ProviderError`]
//! carrying the HTTP status of the poll response (200) and the document's
//! error message.

use crate::client::{ArmClient, ErrorBody, read_json};
use async_trait::async_trait;
use flotilla_cloud::{
    DeferredCall, Invocation, PendingHandle, PendingOperation, ProviderError, ProviderResult,
};
use reqwest::Method;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

#[derive(Debug, Clone)]
pub(crate) enum ArmMethod {
    Put(Value),
    Delete,
}

/// A deferred PUT or DELETE against one resource URL
pub struct ArmCall {
    client: ArmClient,
    method: ArmMethod,
    url: String,
    invocation: Invocation,
}

impl ArmCall {
    pub(crate) fn new(client: ArmClient, method: ArmMethod, url: String, invocation: Invocation) -> Self {
        Self {
            client,
            method,
            url,
            invocation,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn is_delete(&self) -> bool {
        matches!(self.method, ArmMethod::Delete)
    }
}

#[async_trait]
impl DeferredCall for ArmCall {
    fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    async fn invoke(&self) -> ProviderResult<Option<PendingHandle>> {
        let (method, body) = match &self.method {
            ArmMethod::Put(body) => (Method::PUT, Some(body)),
            ArmMethod::Delete => (Method::DELETE, None),
        };

        let response = self.client.send(method, &self.url, body).await?;
        let status = response.status().as_u16();

        // nothing to delete
        if self.is_delete() && status == 204 {
            return Ok(None);
        }

        let headers = response.headers();
        let async_operation_url = header_value(headers, AZURE_ASYNC_OPERATION);
        let location_url = header_value(headers, LOCATION.as_str());
        let retry_after = retry_after(headers);
        let body = read_json(response).await?;

        tracing::debug!(
            status,
            async_operation = async_operation_url.is_some(),
            location = location_url.is_some(),
            "submitted {}",
            self.invocation.operation
        );

        Ok(Some(Box::new(ArmPoller {
            client: self.client.clone(),
            resource_url: self.url.clone(),
            delete: self.is_delete(),
            async_operation_url,
            location_url,
            retry_after,
            initial_status: status,
            initial_body: body,
        })))
    }
}

/// Pending handle on a submitted ARM operation
pub struct ArmPoller {
    client: ArmClient,
    resource_url: String,
    delete: bool,
    async_operation_url: Option<String>,
    location_url: Option<String>,
    retry_after: Option<Duration>,
    initial_status: u16,
    initial_body: Value,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[async_trait]
impl PendingOperation for ArmPoller {
    async fn wait(&mut self) -> ProviderResult<Value> {
        if let Some(url) = self.async_operation_url.clone() {
            self.poll_async_operation(&url).await?;
            return self.final_resource().await;
        }
        if let Some(url) = self.location_url.clone() {
            return self.poll_location(&url).await;
        }
        self.poll_provisioning_state().await
    }
}

impl ArmPoller {
    async fn poll_async_operation(&mut self, url: &str) -> ProviderResult<()> {
        loop {
            let response = self.client.send(Method::GET, url, None).await?;
            let status = response.status().as_u16();
            self.update_retry_after(response.headers());

            let document: OperationStatus = serde_json::from_value(read_json(response).await?)
                .map_err(|e| ProviderError::new(status, format!("invalid operation status: {}", e)))?;

            match document.status.as_str() {
                s if s.eq_ignore_ascii_case("Succeeded") => return Ok(()),
                s if s.eq_ignore_ascii_case("Failed") || s.eq_ignore_ascii_case("Canceled") => {
                    return Err(match document.error {
                        Some(error) => error.into_provider_error(status),
                        None => ProviderError::new(status, format!("operation {}", s)),
                    });
                }
                s => {
                    tracing::trace!("operation status {}", s);
                    self.sleep().await;
                }
            }
        }
    }

    async fn poll_location(&mut self, url: &str) -> ProviderResult<Value> {
        loop {
            let response = self.client.send(Method::GET, url, None).await?;
            if response.status().as_u16() != 202 {
                let body = read_json(response).await?;
                if self.delete {
                    return Ok(Value::Null);
                }
                if body.is_null() {
                    return self.final_resource().await;
                }
                return Ok(body);
            }
            self.update_retry_after(response.headers());
            self.sleep().await;
        }
    }

    async fn poll_provisioning_state(&mut self) -> ProviderResult<Value> {
        if self.delete {
            return Ok(Value::Null);
        }

        let mut body = std::mem::take(&mut self.initial_body);
        let mut status = self.initial_status;
        loop {
            match provisioning_state(&body) {
                None => return Ok(body),
                Some(state) if state.eq_ignore_ascii_case("Succeeded") => return Ok(body),
                Some(state)
                    if state.eq_ignore_ascii_case("Failed")
                        || state.eq_ignore_ascii_case("Canceled") =>
                {
                    return Err(ProviderError::new(
                        status,
                        format!("provisioning state {} for {}", state, self.resource_url),
                    ));
                }
                Some(_) => {}
            }

            self.sleep().await;
            let response = self.client.send(Method::GET, &self.resource_url, None).await?;
            status = response.status().as_u16();
            self.update_retry_after(response.headers());
            body = read_json(response).await?;
        }
    }

    async fn final_resource(&self) -> ProviderResult<Value> {
        if self.delete {
            return Ok(Value::Null);
        }
        let response = self.client.send(Method::GET, &self.resource_url, None).await?;
        read_json(response).await
    }

    fn update_retry_after(&mut self, headers: &HeaderMap) {
        if let Some(delay) = retry_after(headers) {
            self.retry_after = Some(delay);
        }
    }

    async fn sleep(&self) {
        tokio::time::sleep(self.retry_after.unwrap_or(self.client.poll_interval())).await;
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// `Retry-After` in seconds; HTTP dates are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.get("properties")?.get("provisioningState")?.as_str()
}
