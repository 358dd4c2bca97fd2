//! Long-running operation wrapper with automatic retry
//!
//! [`AsyncOperation`] owns a [`DeferredCall`], submits it, waits on the
//! resulting [`PendingOperation`] and replays the call when waiting fails
//! with something worth retrying. Callers only see `result().await`.
//!
//! # Retry policy
//!
//! Every failure from waiting on the pending handle is classified:
//!
//! 1. status in `[400, 500)` (409 excepted when conflict retry is enabled):
//!    terminal, returned unchanged
//! 2. status 200 whose message contains `"Allocation failed"`: counted, and
//!    terminal once more than [`MAX_ALLOCATION_FAILURES`] were seen
//! 3. anything else: retried until the retry budget is exceeded
//!
//! Between attempts the operation sleeps a random 1 to 3 backoff units.

use crate::error::{CloudError, ProviderError, ProviderResult, Result};
use crate::invocation::{DeferredCall, Invocation};
use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::Instrument;

/// Message fragment the provider uses to report a capacity shortage
pub const ALLOCATION_FAILED_MESSAGE: &str = "Allocation failed";

/// Allocation failures tolerated per operation before giving up
pub const MAX_ALLOCATION_FAILURES: u32 = 10;

/// Handle on an in-flight long-running operation
#[async_trait]
pub trait PendingOperation: Send {
    /// Wait for the operation to finish and return the final resource
    /// representation (`null` for operations without a body).
    async fn wait(&mut self) -> ProviderResult<serde_json::Value>;
}

pub type PendingHandle = Box<dyn PendingOperation>;

/// Construction options for [`AsyncOperation`]
#[derive(Debug, Clone)]
pub struct OperationOptions {
    /// Maximum number of retries, `None` for unlimited
    pub max_retries: Option<u32>,

    /// Submit the call while constructing the operation
    pub auto_invoke: bool,

    /// Retry 409 Conflict responses
    pub retry_conflict: bool,

    /// One unit of backoff; each retry sleeps 1 to 3 units
    pub backoff_unit: Duration,

    /// Span the operation logs under
    pub span: Option<tracing::Span>,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            max_retries: None,
            auto_invoke: true,
            retry_conflict: false,
            backoff_unit: Duration::from_secs(1),
            span: None,
        }
    }
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn unlimited_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    pub fn auto_invoke(mut self, auto_invoke: bool) -> Self {
        self.auto_invoke = auto_invoke;
        self
    }

    pub fn retry_conflict(mut self, retry_conflict: bool) -> Self {
        self.retry_conflict = retry_conflict;
        self
    }

    pub fn backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// How a failure observed while waiting is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Client request error, never retried
    Terminal,
    /// Provider capacity shortage, retried a bounded number of times
    AllocationFailed,
    /// Retried while the retry budget lasts
    Retryable,
}

impl FailureKind {
    pub fn classify(error: &ProviderError, retry_conflict: bool) -> Self {
        match error.status_code {
            Some(status @ 400..=499) if status != 409 || !retry_conflict => FailureKind::Terminal,
            Some(200) if error.message.contains(ALLOCATION_FAILED_MESSAGE) => {
                FailureKind::AllocationFailed
            }
            _ => FailureKind::Retryable,
        }
    }
}

/// How a finished operation ended; later `result()` calls replay it
#[derive(Debug, Clone)]
enum Outcome {
    Completed(serde_json::Value),
    Failed(ProviderError),
    Exhausted {
        invocation: String,
        attempts: u32,
        error: ProviderError,
    },
}

impl Outcome {
    fn replay<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self {
            Outcome::Completed(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            Outcome::Failed(error) => Err(CloudError::Provider(error.clone())),
            Outcome::Exhausted {
                invocation,
                attempts,
                error,
            } => Err(CloudError::RetriesExhausted {
                invocation: invocation.clone(),
                attempts: *attempts,
                source: error.clone(),
            }),
        }
    }
}

/// A remote long-running operation invoked once logically, retried
/// physically.
pub struct AsyncOperation<T = serde_json::Value> {
    call: Box<dyn DeferredCall>,
    max_retries: Option<u32>,
    retry_conflict: bool,
    backoff_unit: Duration,
    retry_count: u32,
    allocation_failures: u32,
    pending: Option<PendingHandle>,
    outcome: Option<Outcome>,
    noop: bool,
    span: tracing::Span,
    _result: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("invocation", self.call.invocation())
            .field("retry_count", &self.retry_count)
            .field("allocation_failures", &self.allocation_failures)
            .field("pending", &self.pending.is_some())
            .field("finished", &self.outcome.is_some())
            .field("noop", &self.noop)
            .finish()
    }
}

impl<T: DeserializeOwned> AsyncOperation<T> {
    /// Wrap `call`. With `auto_invoke` the call is submitted right away and
    /// a submission failure is returned from here unchanged.
    pub async fn new(call: impl DeferredCall + 'static, options: OperationOptions) -> Result<Self> {
        let span = options.span.unwrap_or_else(|| {
            tracing::debug_span!(
                "async_operation",
                operation = %call.invocation().operation
            )
        });

        let mut operation = Self {
            call: Box::new(call),
            max_retries: options.max_retries,
            retry_conflict: options.retry_conflict,
            backoff_unit: options.backoff_unit,
            retry_count: 0,
            allocation_failures: 0,
            pending: None,
            outcome: None,
            noop: false,
            span,
            _result: PhantomData,
        };

        if options.auto_invoke {
            let span = operation.span.clone();
            operation.invoke().instrument(span).await?;
        }

        Ok(operation)
    }

    /// Wrap and submit `call` with default options
    pub async fn start(call: impl DeferredCall + 'static) -> Result<Self> {
        Self::new(call, OperationOptions::default()).await
    }

    pub fn invocation(&self) -> &Invocation {
        self.call.invocation()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_noop(&self) -> bool {
        self.noop
    }

    /// Wait for the final result.
    ///
    /// Returns `Ok(None)` when the provider had nothing to do. Once the
    /// operation has finished, later calls return the same outcome without
    /// touching the provider again.
    pub async fn result(&mut self) -> Result<Option<T>> {
        let span = self.span.clone();
        self.wait_with_retry().instrument(span).await
    }

    async fn wait_with_retry(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(outcome) = &self.outcome {
                return outcome.replay();
            }
            if self.noop {
                return Ok(None);
            }
            self.invoke().await?;

            let Some(pending) = self.pending.as_mut() else {
                return Ok(None);
            };
            let waited = pending.wait().await;

            // a handle is never waited on again
            self.pending = None;

            let error = match waited {
                Ok(value) => {
                    self.outcome = Some(Outcome::Completed(value));
                    continue;
                }
                Err(error) => error,
            };
            if let Some(outcome) = self.record_failure(&error) {
                self.outcome = Some(outcome);
                continue;
            }

            tokio::time::sleep(self.backoff_delay()).await;
            tracing::debug!(
                operation = %self.call.invocation().operation,
                status_code = ?error.status_code,
                retry_count = self.retry_count,
                max_retries = %format_limit(self.max_retries),
                "Attempting retry of operation: {}",
                error.message
            );
        }
    }

    async fn invoke(&mut self) -> Result<()> {
        if self.pending.is_none() && !self.noop {
            match self.call.invoke().await? {
                Some(handle) => self.pending = Some(handle),
                None => {
                    tracing::debug!(
                        "{} returned no pending operation, nothing to do",
                        self.call.invocation().operation
                    );
                    self.noop = true;
                }
            }
        }
        Ok(())
    }

    /// Apply the retry policy. Returns the terminal outcome, or `None` when
    /// the operation should be retried.
    fn record_failure(&mut self, error: &ProviderError) -> Option<Outcome> {
        match FailureKind::classify(error, self.retry_conflict) {
            FailureKind::Terminal => {
                tracing::error!(
                    status_code = ?error.status_code,
                    "not retrying {}: {}",
                    self.call.invocation().operation,
                    error.message
                );
                return Some(Outcome::Failed(error.clone()));
            }
            FailureKind::AllocationFailed => {
                self.allocation_failures += 1;
                if self.allocation_failures > MAX_ALLOCATION_FAILURES {
                    tracing::error!(
                        status_code = ?error.status_code,
                        allocation_failures = self.allocation_failures,
                        "giving up on {} after repeated allocation failures: {}",
                        self.call.invocation().operation,
                        error.message
                    );
                    return Some(Outcome::Failed(error.clone()));
                }
            }
            FailureKind::Retryable => {}
        }

        self.retry_count += 1;
        if self.max_retries.is_some_and(|max| self.retry_count > max) {
            tracing::error!(
                status_code = ?error.status_code,
                "Ran out of retry attempts invoking {}: {}",
                self.call.invocation(),
                error.message
            );
            return Some(Outcome::Exhausted {
                invocation: self.call.invocation().to_string(),
                attempts: self.retry_count,
                error: error.clone(),
            });
        }

        None
    }

    fn backoff_delay(&self) -> Duration {
        self.backoff_unit * rand::thread_rng().gen_range(1..=3u32)
    }
}

fn format_limit(max_retries: Option<u32>) -> String {
    match max_retries {
        Some(max) => max.to_string(),
        None => "inf".to_string(),
    }
}
