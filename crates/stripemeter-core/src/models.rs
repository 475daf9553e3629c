//! Request and response bodies exchanged with the metering service.

use serde::{Deserialize, Serialize};

use crate::event::UsageEvent;

/// Body of `POST /v1/events/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Events to ingest.
    pub events: Vec<UsageEvent>,
}

/// Response to an ingestion request.
///
/// Partial success is reported as the service returns it: some events may be
/// accepted, some recognised as duplicates and some rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// Number of events accepted.
    pub accepted: u64,
    /// Number of events already seen.
    pub duplicates: u64,
    /// Server-assigned request id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Per-event outcome, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<IngestResult>>,
    /// Rejected events by position in the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<IngestError>>,
}

impl IngestResponse {
    /// Whether any event in the request was rejected.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Outcome for a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    /// Key of the event this result refers to.
    pub idempotency_key: String,
    /// What happened to it.
    pub status: IngestStatus,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-event ingestion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Stored.
    Accepted,
    /// Already stored under the same key.
    Duplicate,
    /// Rejected.
    Error,
}

/// A rejected event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestError {
    /// Position of the event in the request.
    pub index: usize,
    /// Why it was rejected.
    pub error: String,
}

/// Current usage for a customer, from `GET /v1/usage/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    /// Customer the snapshot is for.
    pub customer_ref: String,
    /// Billing period covered.
    pub period: Period,
    /// Usage per metric.
    pub metrics: Vec<MetricUsage>,
    /// Active alerts.
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// A billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Period start (ISO-8601).
    pub start: String,
    /// Period end (ISO-8601).
    pub end: String,
}

/// Usage of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUsage {
    /// Metric name.
    pub name: String,
    /// Usage so far this period.
    pub current: f64,
    /// Configured limit, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    /// Unit of measure.
    pub unit: String,
}

/// A usage alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert type (e.g. `threshold`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable message.
    pub message: String,
    /// Severity.
    pub severity: AlertSeverity,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Approaching a limit.
    Warning,
    /// Limit reached or exceeded.
    Critical,
}

/// Body of `POST /v1/usage/projection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRequest {
    /// Tenant.
    pub tenant_id: String,
    /// Customer to project for.
    pub customer_ref: String,
    /// Start of the period; the service picks the current period if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<String>,
    /// End of the period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<String>,
}

/// Projected cost for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResponse {
    /// Customer the projection is for.
    pub customer_ref: String,
    /// Period start.
    pub period_start: String,
    /// Period end.
    pub period_end: String,
    /// Priced usage per metric.
    pub line_items: Vec<LineItem>,
    /// Sum of line items.
    pub subtotal: f64,
    /// Credits applied.
    pub credits: f64,
    /// Amount due.
    pub total: f64,
    /// ISO currency code.
    pub currency: String,
    /// How current the underlying counters are.
    pub freshness: Freshness,
}

/// One priced metric in a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Metric name.
    pub metric: String,
    /// Quantity used.
    pub quantity: f64,
    /// Price per unit.
    pub unit_price: f64,
    /// Line total.
    pub total: f64,
}

/// Data freshness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Freshness {
    /// Last counter update (ISO-8601).
    pub last_update: String,
    /// Staleness in seconds.
    pub staleness: u64,
}

/// Error body returned by the service on non-2xx responses.
///
/// Every field is optional; the service is not consistent about which one it
/// fills in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Preferred error description.
    #[serde(default)]
    pub message: Option<String>,
    /// Fallback error description.
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    /// The most specific description available.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
