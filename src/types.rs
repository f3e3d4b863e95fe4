use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for a stored event.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of event IDs with other identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Unique identifier for a webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub String);

/// Identifier for one trigger-to-subscriber delivery.
///
/// Generated once per trigger and stable across all retry attempts,
/// distinguishing it from the attempt number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Lifecycle status of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
    Archived,
}

/// A stored, time-stamped event.
///
/// Immutable once created except for `status` and `updated_at`.
/// `timestamp` is event-time as reported by the producer, distinct
/// from `created_at` (ingestion time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub source: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Duration in milliseconds, if the event measures one.
    pub duration_ms: Option<u64>,
    pub data: Map<String, Value>,
    pub metadata: Option<Map<String, Value>>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied input for creating one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl EventInput {
    /// Create a minimal input with the given type and source.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            source: source.into(),
            user_id: None,
            session_id: None,
            duration_ms: None,
            data: Map::new(),
            metadata: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// Outcome of one item inside a batch submission.
///
/// Per-item failures are isolated: a failed item carries its error
/// message and the original input so the caller can resubmit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemResult {
    Created { event: Event },
    Failed { error: String, input: EventInput },
}

impl ItemResult {
    pub fn is_created(&self) -> bool {
        matches!(self, ItemResult::Created { .. })
    }
}

/// Summary counts for a batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Per-submission aggregate result, ordered as the input was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<ItemResult>,
    pub summary: BatchSummary,
}

/// Persisted fixed-window counter row for one (key, endpoint) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCounter {
    pub key: String,
    pub endpoint: String,
    pub count: u64,
    pub window_reset_at: DateTime<Utc>,
}

/// Result of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the current window resets.
    pub reset_at: i64,
}

impl RateLimitDecision {
    /// Render the standard rate-limit response headers.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.to_string()),
        ]
    }
}

/// A webhook subscription.
///
/// Read-only from the dispatcher's perspective; management operations
/// live outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub url: String,
    /// Shared secret used for HMAC signing.
    pub secret: Vec<u8>,
    pub event_types: Vec<String>,
    pub enabled: bool,
    /// Maximum delivery attempts (including the first).
    pub max_retries: u32,
}

impl Webhook {
    /// Create an enabled webhook with default retry settings.
    pub fn new(id: impl Into<String>, url: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id: WebhookId(id.into()),
            url: url.into(),
            secret: secret.into(),
            event_types: Vec::new(),
            enabled: true,
            max_retries: 3,
        }
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = event_types;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == event_type)
    }
}

/// Terminal status of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
    Pending,
}

/// Persisted record of one delivery attempt set.
///
/// Written exactly once per trigger per webhook, after the terminal
/// state is reached. Intermediate attempts are not separately
/// persisted; only the final outcome and the attempt count survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub webhook_id: WebhookId,
    pub delivery_id: DeliveryId,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_response: Option<String>,
    pub last_error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Supported aggregation granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    Minute,
    FiveMinutes,
    FifteenMinutes,
    Hour,
    Day,
}

impl Interval {
    /// Width of one bucket at this granularity.
    pub fn bucket_width(&self) -> Duration {
        match self {
            Interval::Minute => Duration::from_secs(60),
            Interval::FiveMinutes => Duration::from_secs(5 * 60),
            Interval::FifteenMinutes => Duration::from_secs(15 * 60),
            Interval::Hour => Duration::from_secs(60 * 60),
            Interval::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Filter predicates for event queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Transient query object for one aggregation read.
#[derive(Debug, Clone)]
pub struct AggregationQuery {
    pub interval: Interval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_type: Option<String>,
    pub source: Option<String>,
}

/// One bucketed row of aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub count: u64,
    pub avg_duration_ms: Option<f64>,
}
