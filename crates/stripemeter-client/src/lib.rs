//! Stripemeter Client SDK.
//!
//! This crate reports usage events to a Stripemeter service and reads back
//! current usage and cost projections.
//!
//! - [`AsyncMeteringClient`] for tokio applications
//! - [`MeteringClient`] for synchronous code; it runs the async client on a
//!   private runtime
//!
//! Events are sent either immediately ([`AsyncMeteringClient::track`]) or
//! through a buffer that flushes once it holds `batch_size` events or after
//! `flush_delay` without a new one ([`AsyncMeteringClient::buffer`]).
//! Transient failures (network errors, 5xx) are retried with exponential
//! backoff; 4xx responses are returned at once.
//!
//! # Example
//!
//! ```no_run
//! use stripemeter_client::{AsyncMeteringClient, ClientConfig, NewEvent};
//!
//! # async fn example() -> Result<(), stripemeter_client::ClientError> {
//! let client = AsyncMeteringClient::new(
//!     ClientConfig::new("http://localhost:3000", "tenant_123")
//!         .with_api_key("your-api-key"),
//! )?;
//!
//! // Report one event now
//! let response = client
//!     .track(NewEvent::new("api_calls", "cus_ABC", 100.0).with_resource_id("srv_1"))
//!     .await?;
//! println!("accepted {} (duplicates {})", response.accepted, response.duplicates);
//!
//! // Buffer high-volume events and send them in batches
//! client.buffer(NewEvent::new("bandwidth_gb", "cus_ABC", 0.5)).await?;
//!
//! let usage = client.get_usage("cus_ABC").await?;
//! for metric in &usage.metrics {
//!     println!("{}: {}", metric.name, metric.current);
//! }
//!
//! // Send whatever is still buffered
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod blocking;
mod buffer;
mod client;
mod config;
mod error;
mod executor;
mod retry;
mod transport;

#[cfg(test)]
mod testing;

pub use blocking::MeteringClient;
pub use buffer::{EventBuffer, INGEST_PATH};
pub use client::{AsyncMeteringClient, PROJECTION_PATH, USAGE_PATH};
pub use config::{
    ClientConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_DELAY, DEFAULT_MAX_RETRY_ELAPSED,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INITIAL_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_TIMEOUT,
};
pub use error::ClientError;
pub use executor::RequestExecutor;
pub use retry::{RetryDecision, RetryPolicy};
pub use stripemeter_core::{
    Alert, AlertSeverity, CoreError, EventSource, Freshness, IdempotencyKeyGenerator, IngestError,
    IngestResponse, IngestResult, IngestStatus, KeyStrategy, LineItem, Metadata, MetricUsage,
    NewEvent, Period, ProjectionResponse, UsageEvent, UsageResponse,
};
pub use transport::{ApiRequest, HttpTransport, RawResponse, Transport, USER_AGENT};
