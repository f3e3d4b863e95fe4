//! Storage boundary.
//!
//! The durable store (relational / time-series engine) is an external
//! collaborator; this crate talks to it through [`EventStore`] and only
//! assumes per-row atomic upsert plus range queries. [`InMemoryStore`]
//! implements the contract for embedded use and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::aggregate::QueryPlan;
use crate::error::{Error, Result};
use crate::types::{
    AggregateRow, AggregationQuery, Event, EventFilter, EventId, EventInput, EventStatus,
    RateLimitCounter, Webhook, WebhookDelivery,
};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event. Status starts at `Pending`.
    async fn create_event(&self, input: EventInput) -> Result<Event>;

    /// Query events with filters. Returns the page plus the total match count.
    async fn find_events(&self, filter: &EventFilter) -> Result<(Vec<Event>, usize)>;

    /// Transition an event's status, bumping `updated_at`.
    async fn update_event_status(&self, id: &EventId, status: EventStatus) -> Result<Event>;

    /// Read bucketed aggregates from the precomputed view named by `plan`.
    async fn query_aggregates(
        &self,
        plan: &QueryPlan,
        query: &AggregationQuery,
    ) -> Result<Vec<AggregateRow>>;

    /// Atomically create-or-advance the fixed-window counter for
    /// (key, endpoint) and return the post-mutation row.
    ///
    /// Must be a single atomic read-modify-write: concurrent callers
    /// sharing a key may never both observe a fresh window.
    async fn rate_limit_upsert(
        &self,
        key: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<RateLimitCounter>;

    /// Delete counter rows whose window has passed. Background hygiene,
    /// not correctness-critical. Returns the number of rows removed.
    async fn delete_expired_windows(&self, now: DateTime<Utc>) -> Result<usize>;

    /// All subscriptions whose event-type list contains `event_type`,
    /// enabled or not. The dispatcher filters on `enabled`.
    async fn webhooks_for_event_type(&self, event_type: &str) -> Result<Vec<Webhook>>;

    /// Append the terminal record of one delivery attempt set.
    async fn record_delivery(&self, delivery: &WebhookDelivery) -> Result<()>;
}

/// In-memory store for embedded deployments and tests.
///
/// The rate-limit upsert runs under a single lock acquisition, which
/// gives the linearizability the trait demands.
#[derive(Default)]
pub struct InMemoryStore {
    events: Mutex<Vec<Event>>,
    counters: Mutex<HashMap<(String, String), RateLimitCounter>>,
    webhooks: Mutex<Vec<Webhook>>,
    deliveries: Mutex<Vec<WebhookDelivery>>,
    fail_event_types: Mutex<HashSet<String>>,
    fail_rate_limit: Mutex<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a webhook subscription.
    pub async fn add_webhook(&self, webhook: Webhook) {
        self.webhooks.lock().await.push(webhook);
    }

    /// Snapshot of persisted delivery records.
    pub async fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.deliveries.lock().await.clone()
    }

    /// Number of stored events.
    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Make every subsequent create of the given event type fail with a
    /// storage error. Fault-injection hook for exercising per-item
    /// isolation.
    pub async fn fail_creates_for_type(&self, event_type: impl Into<String>) {
        self.fail_event_types.lock().await.insert(event_type.into());
    }

    /// Make every subsequent rate-limit upsert fail with a storage
    /// error. Fault-injection hook for exercising limiter error
    /// propagation.
    pub async fn fail_rate_limit_upserts(&self) {
        *self.fail_rate_limit.lock().await = true;
    }
}

fn matches_filter(event: &Event, filter: &EventFilter) -> bool {
    if let Some(ref t) = filter.event_type {
        if &event.event_type != t {
            return false;
        }
    }
    if let Some(ref s) = filter.source {
        if &event.source != s {
            return false;
        }
    }
    if let Some(start) = filter.start {
        if event.timestamp < start {
            return false;
        }
    }
    if let Some(end) = filter.end {
        if event.timestamp >= end {
            return false;
        }
    }
    true
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn create_event(&self, input: EventInput) -> Result<Event> {
        if self.fail_event_types.lock().await.contains(&input.event_type) {
            return Err(Error::Database(format!(
                "insert failed for event type {}",
                input.event_type
            )));
        }

        let now = Utc::now();
        let event = Event {
            id: EventId::generate(),
            timestamp: input.timestamp,
            event_type: input.event_type,
            source: input.source,
            user_id: input.user_id,
            session_id: input.session_id,
            duration_ms: input.duration_ms,
            data: input.data,
            metadata: input.metadata,
            status: EventStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.events.lock().await.push(event.clone());
        Ok(event)
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<(Vec<Event>, usize)> {
        let events = self.events.lock().await;
        let matching: Vec<Event> = events
            .iter()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        let total = matching.len();

        let offset = filter.offset.unwrap_or(0).min(total);
        let limit = filter.limit.unwrap_or(total);
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }

    async fn update_event_status(&self, id: &EventId, status: EventStatus) -> Result<Event> {
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| Error::NotFound(format!("event {}", id.0)))?;

        event.status = status;
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn query_aggregates(
        &self,
        plan: &QueryPlan,
        query: &AggregationQuery,
    ) -> Result<Vec<AggregateRow>> {
        let events = self.events.lock().await;
        let buckets = crate::aggregate::generate_buckets(query.start, query.end, plan.interval);

        let rows = buckets
            .into_iter()
            .map(|(bucket_start, bucket_end)| {
                let mut count = 0u64;
                let mut duration_sum = 0u64;
                let mut duration_count = 0u64;

                for event in events.iter() {
                    if event.timestamp < bucket_start || event.timestamp >= bucket_end {
                        continue;
                    }
                    if let Some(ref t) = query.event_type {
                        if &event.event_type != t {
                            continue;
                        }
                    }
                    if let Some(ref s) = query.source {
                        if &event.source != s {
                            continue;
                        }
                    }
                    count += 1;
                    if let Some(d) = event.duration_ms {
                        duration_sum += d;
                        duration_count += 1;
                    }
                }

                AggregateRow {
                    bucket_start,
                    bucket_end,
                    count,
                    avg_duration_ms: (duration_count > 0)
                        .then(|| duration_sum as f64 / duration_count as f64),
                }
            })
            .collect();

        Ok(rows)
    }

    async fn rate_limit_upsert(
        &self,
        key: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<RateLimitCounter> {
        if *self.fail_rate_limit.lock().await {
            return Err(Error::Database("rate limit upsert failed".to_string()));
        }

        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry((key.to_string(), endpoint.to_string()))
            .and_modify(|c| {
                if now >= c.window_reset_at {
                    c.count = 1;
                    c.window_reset_at = now + window;
                } else {
                    c.count += 1;
                }
            })
            .or_insert_with(|| RateLimitCounter {
                key: key.to_string(),
                endpoint: endpoint.to_string(),
                count: 1,
                window_reset_at: now + window,
            });

        Ok(counter.clone())
    }

    async fn delete_expired_windows(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, c| now < c.window_reset_at);
        Ok(before - counters.len())
    }

    async fn webhooks_for_event_type(&self, event_type: &str) -> Result<Vec<Webhook>> {
        let webhooks = self.webhooks.lock().await;
        Ok(webhooks
            .iter()
            .filter(|w| w.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn record_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        self.deliveries.lock().await.push(delivery.clone());
        Ok(())
    }
}
