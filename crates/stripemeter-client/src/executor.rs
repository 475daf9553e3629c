//! Retrying request execution.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use stripemeter_core::ApiErrorBody;
use tokio::time::Instant;

use crate::error::ClientError;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{ApiRequest, RawResponse, Transport};

/// Sends requests through a [`Transport`], decoding responses and retrying
/// transient failures according to a [`RetryPolicy`].
///
/// Holds no per-request state; one executor serves any number of concurrent
/// callers.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `request` and decode a 2xx body as `T`.
    ///
    /// # Errors
    ///
    /// Returns the last classified error once the policy gives up: an
    /// [`ClientError::Api`] for non-2xx responses, [`ClientError::Transport`]
    /// when no response arrived, or [`ClientError::Serialization`] when a 2xx
    /// body does not decode.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(&request).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.policy.decide(&err, attempt, started.elapsed()) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        status = err.status_code(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Stripemeter request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    if err.is_retryable() {
                        tracing::error!(
                            method = %request.method,
                            path = %request.path,
                            attempts = attempt,
                            error = %err,
                            "Stripemeter request failed, giving up"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(serde_json::from_slice(&response.body)?);
        }
        Err(api_error(&response))
    }
}

/// Classify a non-2xx response, pulling a message out of the body when it is
/// JSON and falling back to the status text otherwise.
fn api_error(response: &RawResponse) -> ClientError {
    let data: Option<serde_json::Value> = serde_json::from_slice(&response.body).ok();
    let message = data
        .as_ref()
        .and_then(|v| ApiErrorBody::deserialize(v).ok())
        .and_then(|body| body.description().map(str::to_owned))
        .unwrap_or_else(|| status_text(response.status));

    ClientError::Api {
        status: response.status,
        message,
        data,
    }
}

fn status_text(status: u16) -> String {
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {status} {reason}"),
        None => format!("HTTP {status}"),
    }
}
