//! Blocking Stripemeter client.
//!
//! A thin adapter over [`AsyncMeteringClient`]: each call is driven to
//! completion on a private tokio runtime. The runtime's worker thread also
//! hosts the deferred-flush timer, so buffered events are sent even while the
//! calling thread is busy elsewhere.
//!
//! Like `reqwest::blocking`, this client must not be created, used or dropped
//! from within an async runtime. Use [`AsyncMeteringClient`] there.

use std::sync::Arc;

use stripemeter_core::{IngestResponse, NewEvent, ProjectionResponse, UsageResponse};
use tokio::runtime::{Builder, Runtime};

use crate::client::AsyncMeteringClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::Transport;

/// Blocking Stripemeter client.
///
/// Exposes the same operations as [`AsyncMeteringClient`]. Dropping the
/// client shuts down its runtime and connection pool; call
/// [`MeteringClient::close`] first to send anything still buffered.
#[derive(Debug)]
pub struct MeteringClient {
    inner: AsyncMeteringClient,
    runtime: Runtime,
}

impl MeteringClient {
    /// Create a client that talks HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid
    /// or the runtime or HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = build_runtime()?;
        let inner = AsyncMeteringClient::new(config)?;
        Ok(Self { inner, runtime })
    }

    /// Create a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid
    /// or the runtime cannot be built.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let runtime = build_runtime()?;
        let inner = AsyncMeteringClient::with_transport(config, transport)?;
        Ok(Self { inner, runtime })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    /// See [`AsyncMeteringClient::track`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::track`].
    pub fn track(&self, event: NewEvent) -> Result<IngestResponse, ClientError> {
        self.runtime.block_on(self.inner.track(event))
    }

    /// See [`AsyncMeteringClient::track_batch`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::track_batch`].
    pub fn track_batch(
        &self,
        events: impl IntoIterator<Item = NewEvent>,
    ) -> Result<IngestResponse, ClientError> {
        self.runtime.block_on(self.inner.track_batch(events))
    }

    /// See [`AsyncMeteringClient::buffer`]. Blocks only when the call fills
    /// the batch and flushes inline.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::buffer`].
    pub fn buffer(&self, event: NewEvent) -> Result<(), ClientError> {
        self.runtime.block_on(self.inner.buffer(event))
    }

    /// See [`AsyncMeteringClient::flush`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::flush`].
    pub fn flush(&self) -> Result<Option<IngestResponse>, ClientError> {
        self.runtime.block_on(self.inner.flush())
    }

    /// Number of events waiting in the buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.runtime.block_on(self.inner.buffered_len())
    }

    /// See [`AsyncMeteringClient::get_usage`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::get_usage`].
    pub fn get_usage(&self, customer_ref: &str) -> Result<UsageResponse, ClientError> {
        self.runtime.block_on(self.inner.get_usage(customer_ref))
    }

    /// See [`AsyncMeteringClient::get_projection`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::get_projection`].
    pub fn get_projection(
        &self,
        customer_ref: &str,
        period_start: Option<&str>,
        period_end: Option<&str>,
    ) -> Result<ProjectionResponse, ClientError> {
        self.runtime
            .block_on(self.inner.get_projection(customer_ref, period_start, period_end))
    }

    /// See [`AsyncMeteringClient::close`].
    ///
    /// # Errors
    ///
    /// Same as [`AsyncMeteringClient::close`].
    pub fn close(&self) -> Result<Option<IngestResponse>, ClientError> {
        self.runtime.block_on(self.inner.close())
    }
}

fn build_runtime() -> Result<Runtime, ClientError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("stripemeter-worker")
        .enable_all()
        .build()
        .map_err(|e| ClientError::Configuration(format!("failed to start runtime: {e}")))
}
