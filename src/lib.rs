//! An event ingestion and notification engine.
//!
//! This crate ingests time-stamped events in **bounded concurrent
//! batches**, aggregates them into time-bucketed statistics, and
//! notifies subscribers through signed HTTP webhooks, all behind a
//! per-key fixed-window rate limiter.
//!
//! ## Guarantees
//! - Per-item isolation inside a batch, with input-ordered results
//! - Bounded peak concurrency (wave barrier between chunk groups)
//! - At-least-once, signed webhook delivery with bounded retries
//! - Linearizable rate-limit counting per (key, endpoint)
//!
//! ## Non-Guarantees
//! - Exactly-once delivery
//! - A storage engine (the durable store sits behind [`EventStore`])
//! - An HTTP routing layer or credential handling
//!
//! Collaborators are wired explicitly at the composition root; there is
//! no service locator.

mod aggregate;
mod dispatch;
mod error;
mod ingest;
mod rate_limit;
mod signing;
mod store;
mod types;

pub use aggregate::{generate_buckets, plan, suggest_interval, AggregationPlanner, QueryPlan};
pub use dispatch::{DispatcherConfig, Transport, TransportError, WebhookDispatcher, EVENT_CREATED};
pub use error::{Error, Result};
pub use ingest::{BatchIngestor, IngestConfig};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use signing::{compute_signature, verify_signature};
pub use store::{EventStore, InMemoryStore};
pub use types::{
    AggregateRow, AggregationQuery, BatchResult, BatchSummary, DeliveryId, DeliveryStatus, Event,
    EventFilter, EventId, EventInput, EventStatus, Interval, ItemResult, RateLimitCounter,
    RateLimitDecision, Webhook, WebhookDelivery, WebhookId,
};

#[cfg(feature = "http")]
pub use dispatch::HttpTransport;
