//! Usage event types for Stripemeter.
//!
//! A [`NewEvent`] is what callers hand to the client: the metric, who used it,
//! how much, and optionally when and under which key. The client stamps it
//! with the tenant, a timestamp and an idempotency key to produce the
//! [`UsageEvent`] that goes over the wire.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Arbitrary key/value context attached to an event.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Maximum length of a metric name.
pub const MAX_METRIC_LEN: usize = 100;

/// Maximum length of customer refs, resource ids and idempotency keys.
pub const MAX_REF_LEN: usize = 255;

/// A usage event as accepted by `POST /v1/events/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Tenant that owns the meter.
    pub tenant_id: String,

    /// Metric name (e.g. `api_calls`).
    pub metric: String,

    /// Customer being metered.
    pub customer_ref: String,

    /// Quantity consumed. Must be positive and finite.
    pub quantity: f64,

    /// Resource the usage is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// When the usage occurred (ISO-8601).
    pub ts: String,

    /// Additional context.
    #[serde(default)]
    pub meta: Metadata,

    /// Key the service deduplicates on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Origin of the event.
    #[serde(default)]
    pub source: EventSource,
}

impl UsageEvent {
    /// Check the event against the limits the ingestion endpoint enforces.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidField`] or [`CoreError::InvalidTimestamp`]
    /// describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.is_empty() {
            return Err(CoreError::field("tenantId", "must not be empty"));
        }
        check_len("metric", &self.metric, 1, MAX_METRIC_LEN)?;
        check_len("customerRef", &self.customer_ref, 1, MAX_REF_LEN)?;
        if let Some(resource_id) = &self.resource_id {
            check_len("resourceId", resource_id, 0, MAX_REF_LEN)?;
        }
        if let Some(key) = &self.idempotency_key {
            check_len("idempotencyKey", key, 1, MAX_REF_LEN)?;
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(CoreError::field(
                "quantity",
                format!("must be positive and finite, got {}", self.quantity),
            ));
        }
        parse_timestamp(&self.ts)?;
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min {
        return Err(CoreError::field(field, "must not be empty"));
    }
    if len > max {
        return Err(CoreError::field(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Where an event originated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Submitted through an SDK.
    #[default]
    Sdk,
    /// Submitted directly over HTTP.
    Http,
    /// Loaded by an ETL job.
    Etl,
    /// Bulk import.
    Import,
    /// Generated by the service itself.
    System,
}

/// An event as described by the caller, before the client stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Metric name.
    pub metric: String,
    /// Customer being metered.
    pub customer_ref: String,
    /// Quantity consumed.
    pub quantity: f64,
    /// Optional resource attribution.
    pub resource_id: Option<String>,
    /// Optional ISO-8601 timestamp; defaults to now.
    pub timestamp: Option<String>,
    /// Additional context.
    pub meta: Metadata,
    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,
}

impl NewEvent {
    /// Describe a new event.
    #[must_use]
    pub fn new(metric: impl Into<String>, customer_ref: impl Into<String>, quantity: f64) -> Self {
        Self {
            metric: metric.into(),
            customer_ref: customer_ref.into(),
            quantity,
            resource_id: None,
            timestamp: None,
            meta: Metadata::new(),
            idempotency_key: None,
        }
    }

    /// Attribute the usage to a resource.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set when the usage occurred.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Replace the metadata map.
    #[must_use]
    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    /// Add a single metadata entry.
    #[must_use]
    pub fn with_meta_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Supply an explicit idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Current UTC time formatted the way events are stamped.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Date-time layouts tried after RFC 3339, with a `T` or a space separator.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339, minute precision, basic (`+HHMM`) or extended
/// (`+HH:MM`) offsets, `Z`, and a bare date, which is midnight UTC. Offsets
/// are honoured; a timestamp without one is read as UTC.
///
/// # Errors
///
/// Returns [`CoreError::InvalidTimestamp`] if the value cannot be parsed.
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Ok(parsed.with_timezone(&Utc));
    }

    // `%z` does not take `Z`.
    let zoned = match ts.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => ts.to_string(),
    };
    let with_offset = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&zoned, fmt).ok())
        .map(|parsed| parsed.with_timezone(&Utc));
    if let Some(parsed) = with_offset {
        return Ok(parsed);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(ts, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });
    naive
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CoreError::InvalidTimestamp(ts.to_string()))
}
