//! Core types for the Stripemeter SDK.
//!
//! This crate holds everything the client needs that does not touch the
//! network:
//!
//! - **Events**: `UsageEvent`, `NewEvent`, `EventSource`, local validation
//! - **Idempotency**: `IdempotencyKeyGenerator`, `KeyStrategy`
//! - **Wire models**: `IngestRequest`, `IngestResponse`, `UsageResponse`,
//!   `ProjectionRequest`, `ProjectionResponse`
//!
//! # Idempotency keys
//!
//! Events without an explicit key get `evt_` followed by the first 16 hex
//! characters of `sha256(tenant|metric|customer|resource|minute)`. Under the
//! default [`KeyStrategy::Deterministic`] the same usage reported twice within
//! a minute produces the same key, so the service counts it once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod idempotency;
pub mod models;

pub use error::{CoreError, Result};
pub use event::{
    now_timestamp, parse_timestamp, EventSource, Metadata, NewEvent, UsageEvent, MAX_METRIC_LEN,
    MAX_REF_LEN,
};
pub use idempotency::{
    period_bucket, IdempotencyKeyGenerator, KeyAssignment, KeyStrategy, KEY_HASH_LEN, KEY_PREFIX,
};
pub use models::{
    Alert, AlertSeverity, ApiErrorBody, Freshness, IngestError, IngestRequest, IngestResponse,
    IngestResult, IngestStatus, LineItem, MetricUsage, Period, ProjectionRequest,
    ProjectionResponse, UsageResponse,
};
