//! Asynchronous Stripemeter client.
//!
//! [`AsyncMeteringClient`] is the engine both calling conventions share: it
//! owns the key generator, the retrying executor and the event buffer. The
//! blocking [`crate::MeteringClient`] drives it on a private runtime.

use std::sync::Arc;

use stripemeter_core::{
    CoreError, IdempotencyKeyGenerator, IngestResponse, KeyAssignment, NewEvent,
    ProjectionRequest, ProjectionResponse, UsageEvent, UsageResponse,
};

use crate::buffer::{ingest_body, EventBuffer, INGEST_PATH};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::executor::RequestExecutor;
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, HttpTransport, Transport};

/// Current usage endpoint.
pub const USAGE_PATH: &str = "/v1/usage/current";
/// Cost projection endpoint.
pub const PROJECTION_PATH: &str = "/v1/usage/projection";

/// Non-blocking Stripemeter client.
///
/// Cheap to clone; clones share configuration, connection pool and buffer.
/// Concurrent calls run concurrently: only the buffer's snapshot step is
/// serialized, never a network call.
#[derive(Debug, Clone)]
pub struct AsyncMeteringClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    keys: IdempotencyKeyGenerator,
    executor: Arc<RequestExecutor>,
    buffer: EventBuffer,
}

impl AsyncMeteringClient {
    /// Create a client that talks HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let executor = Arc::new(RequestExecutor::new(
            transport,
            RetryPolicy::from_config(&config),
        ));
        let buffer = EventBuffer::new(Arc::clone(&executor), config.batch_size, config.flush_delay);
        let keys = IdempotencyKeyGenerator::new(config.tenant_id.clone(), config.key_strategy);

        tracing::debug!(
            base_url = %config.base_url,
            tenant_id = %config.tenant_id,
            batch_size = config.batch_size,
            key_strategy = ?keys.strategy(),
            max_attempts = executor.policy().max_attempts,
            "Stripemeter client created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                keys,
                executor,
                buffer,
            }),
        })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Send a single event immediately, bypassing the buffer.
    ///
    /// The timestamp defaults to now and the idempotency key is derived when
    /// the caller does not supply one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEvent`] without sending anything if the
    /// event is malformed, otherwise the executor's classified error.
    pub async fn track(&self, event: NewEvent) -> Result<IngestResponse, ClientError> {
        let event = self.inner.keys.stamp(event, KeyAssignment::PreferCaller)?;
        self.ingest(vec![event]).await
    }

    /// Send several events in one request.
    ///
    /// Each event is defaulted as in [`AsyncMeteringClient::track`]. The
    /// response is returned as the service reports it, including partial
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEvent`] if the batch is empty or any
    /// event is malformed, otherwise the executor's classified error.
    pub async fn track_batch(
        &self,
        events: impl IntoIterator<Item = NewEvent>,
    ) -> Result<IngestResponse, ClientError> {
        let events = events
            .into_iter()
            .map(|e| self.inner.keys.stamp(e, KeyAssignment::PreferCaller))
            .collect::<Result<Vec<_>, _>>()?;
        if events.is_empty() {
            return Err(CoreError::EmptyBatch.into());
        }
        self.ingest(events).await
    }

    /// Queue an event for batched delivery.
    ///
    /// The key is always derived here; a key set on `event` is ignored.
    /// Failures of a flush this call triggers are returned here; failures of
    /// a later deferred flush are only logged, and those events stay buffered
    /// for the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEvent`] for malformed events,
    /// [`ClientError::Closed`] after [`AsyncMeteringClient::close`], or the
    /// error of a flush triggered by reaching the batch size.
    pub async fn buffer(&self, event: NewEvent) -> Result<(), ClientError> {
        let event = self.inner.keys.stamp(event, KeyAssignment::AlwaysDerive)?;
        self.inner.buffer.add(event).await.map(|_| ())
    }

    /// Send every buffered event now.
    ///
    /// # Errors
    ///
    /// Returns the executor's error; the events stay buffered.
    pub async fn flush(&self) -> Result<Option<IngestResponse>, ClientError> {
        self.inner.buffer.flush().await
    }

    /// Number of events waiting in the buffer.
    pub async fn buffered_len(&self) -> usize {
        self.inner.buffer.len().await
    }

    /// Current usage for a customer.
    ///
    /// # Errors
    ///
    /// Returns the executor's classified error.
    pub async fn get_usage(&self, customer_ref: &str) -> Result<UsageResponse, ClientError> {
        let request = ApiRequest::get(USAGE_PATH)
            .with_query("tenantId", self.inner.config.tenant_id.as_str())
            .with_query("customerRef", customer_ref);
        self.inner.executor.execute(request).await
    }

    /// Projected cost for a customer, optionally over an explicit period.
    ///
    /// # Errors
    ///
    /// Returns the executor's classified error.
    pub async fn get_projection(
        &self,
        customer_ref: &str,
        period_start: Option<&str>,
        period_end: Option<&str>,
    ) -> Result<ProjectionResponse, ClientError> {
        let body = serde_json::to_value(ProjectionRequest {
            tenant_id: self.inner.config.tenant_id.clone(),
            customer_ref: customer_ref.to_string(),
            period_start: period_start.map(str::to_owned),
            period_end: period_end.map(str::to_owned),
        })?;
        self.inner
            .executor
            .execute(ApiRequest::post(PROJECTION_PATH, body))
            .await
    }

    /// Flush remaining events and stop buffering.
    ///
    /// Safe on an empty buffer and safe to call twice. `track`, queries and
    /// `flush` keep working afterwards, so a failed final flush can be
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub async fn close(&self) -> Result<Option<IngestResponse>, ClientError> {
        let result = self.inner.buffer.close().await;
        tracing::debug!(ok = result.is_ok(), "Stripemeter client closed");
        result
    }

    async fn ingest(&self, events: Vec<UsageEvent>) -> Result<IngestResponse, ClientError> {
        let body = ingest_body(&events)?;
        let response: IngestResponse = self
            .inner
            .executor
            .execute(ApiRequest::post(INGEST_PATH, body))
            .await?;

        tracing::debug!(
            events = events.len(),
            accepted = response.accepted,
            duplicates = response.duplicates,
            "Events ingested"
        );
        Ok(response)
    }
}
