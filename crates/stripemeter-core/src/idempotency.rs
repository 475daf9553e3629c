//! Idempotency key derivation.
//!
//! Keys are derived from the tuple `(tenant, metric, customer, resource,
//! minute bucket)` hashed with SHA-256, so two submissions of the same usage
//! within the same minute collapse into one on the server. The
//! [`KeyStrategy::Salted`] strategy mixes in the wall clock at generation
//! time, which makes every derived key unique and disables that collapsing.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::event::{now_timestamp, parse_timestamp, EventSource, NewEvent, UsageEvent};

/// Prefix carried by every derived key.
pub const KEY_PREFIX: &str = "evt_";

/// Number of hex characters of the digest kept in a key.
pub const KEY_HASH_LEN: usize = 16;

/// Sentinel used in place of a missing resource id.
const DEFAULT_RESOURCE: &str = "default";

/// How derived keys are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Identical inputs within the same minute yield identical keys.
    #[default]
    Deterministic,
    /// A microsecond wall-clock salt is appended, so keys never repeat.
    Salted,
}

/// Whether a caller-supplied key is kept when stamping an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAssignment {
    /// Use the caller's key when present, derive one otherwise.
    PreferCaller,
    /// Always derive, ignoring any caller key.
    AlwaysDerive,
}

/// Derives idempotency keys for a single tenant.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    tenant_id: String,
    strategy: KeyStrategy,
}

impl IdempotencyKeyGenerator {
    /// Create a generator for `tenant_id`.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, strategy: KeyStrategy) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            strategy,
        }
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Derive a key of the form `evt_<16 hex chars>`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidTimestamp`] if `timestamp` cannot be
    /// parsed.
    pub fn generate(
        &self,
        metric: &str,
        customer_ref: &str,
        timestamp: &str,
        resource_id: Option<&str>,
    ) -> Result<String> {
        let bucket = period_bucket(timestamp)?;

        let mut components = vec![
            self.tenant_id.clone(),
            metric.to_string(),
            customer_ref.to_string(),
            resource_id.unwrap_or(DEFAULT_RESOURCE).to_string(),
            bucket,
        ];
        if self.strategy == KeyStrategy::Salted {
            components.push(Utc::now().timestamp_micros().to_string());
        }

        let digest = Sha256::digest(components.join("|").as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(KEY_HASH_LEN);

        Ok(format!("{KEY_PREFIX}{hash}"))
    }

    /// Turn a caller's [`NewEvent`] into a wire-ready [`UsageEvent`].
    ///
    /// Missing timestamps default to now. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::CoreError`] if the event is invalid.
    pub fn stamp(&self, event: NewEvent, assignment: KeyAssignment) -> Result<UsageEvent> {
        let ts = event.timestamp.unwrap_or_else(now_timestamp);

        let caller_key = match assignment {
            KeyAssignment::PreferCaller => event.idempotency_key.filter(|k| !k.is_empty()),
            KeyAssignment::AlwaysDerive => None,
        };
        let key = match caller_key {
            Some(key) => key,
            None => self.generate(
                &event.metric,
                &event.customer_ref,
                &ts,
                event.resource_id.as_deref(),
            )?,
        };

        let stamped = UsageEvent {
            tenant_id: self.tenant_id.clone(),
            metric: event.metric,
            customer_ref: event.customer_ref,
            quantity: event.quantity,
            resource_id: event.resource_id,
            ts,
            meta: event.meta,
            idempotency_key: Some(key),
            source: EventSource::Sdk,
        };
        stamped.validate()?;
        Ok(stamped)
    }
}

/// Truncate a timestamp to its UTC minute (`YYYY-MM-DDTHH:MM`).
///
/// # Errors
///
/// Returns [`crate::CoreError::InvalidTimestamp`] if the value cannot be
/// parsed.
pub fn period_bucket(timestamp: &str) -> Result<String> {
    Ok(parse_timestamp(timestamp)?
        .format("%Y-%m-%dT%H:%M")
        .to_string())
}
