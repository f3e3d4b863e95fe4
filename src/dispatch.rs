//! Webhook fan-out.
//!
//! A trigger resolves the enabled subscribers for an event type, then
//! delivers to each one concurrently and independently. Retries for a
//! single subscriber are strictly sequential with a fixed backoff
//! schedule; subscribers never wait on each other. One terminal
//! [`WebhookDelivery`] record is persisted per subscriber per trigger.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::signing::compute_signature;
use crate::store::EventStore;
use crate::types::{DeliveryId, DeliveryStatus, Webhook, WebhookDelivery};

/// Event type fired for every successfully ingested event.
pub const EVENT_CREATED: &str = "event.created";

/// Failure modes of one HTTP delivery attempt.
///
/// All of them are eligible for retry; none escalate to the caller of
/// [`WebhookDispatcher::trigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

/// Outbound HTTP seam.
///
/// Production uses [`HttpTransport`] (behind the `http` feature); tests
/// inject a recording mock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` with the given headers, bounded by `timeout`.
    /// Returns the response status code.
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &[u8],
        timeout: Duration,
    ) -> std::result::Result<u16, TransportError>;
}

/// Real HTTP delivery via reqwest.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &[u8],
        timeout: Duration,
    ) -> std::result::Result<u16, TransportError> {
        let mut request = self
            .client
            .post(url)
            .body(body.to_vec())
            .timeout(timeout)
            .header("Content-Type", "application/json");

        for (name, value) in headers {
            request = request.header(*name, value);
        }

        match request.send().await {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(err) if err.is_timeout() => Err(TransportError::Timeout),
            Err(err) => Err(TransportError::Network(err.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-attempt request timeout. There is no overall-delivery timeout.
    pub timeout: Duration,

    /// Delay before retry attempt N+1, indexed by N-1 and clamped to the
    /// last entry. A short fixed table, not unbounded exponential.
    pub backoff: Vec<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ],
        }
    }
}

impl DispatcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Signs and delivers payloads to subscribers, recording outcomes.
pub struct WebhookDispatcher {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Construct a dispatcher backed by a real HTTP client.
    #[cfg(feature = "http")]
    pub fn with_http(store: Arc<dyn EventStore>, config: DispatcherConfig) -> Self {
        Self::new(store, Arc::new(HttpTransport::new()), config)
    }

    /// Deliver `payload` to every enabled subscriber of `event_type`.
    ///
    /// Resolves only after every subscriber has reached a terminal state;
    /// callers wanting fire-and-forget fan-out spawn this on a detached
    /// task, which is how the ingestion paths use it. Individual
    /// subscriber failures are recorded in the returned results, never
    /// raised as errors. `Err` here means subscriber resolution itself
    /// failed against the store.
    pub async fn trigger(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>> {
        let subscribers: Vec<Webhook> = self
            .store
            .webhooks_for_event_type(event_type)
            .await?
            .into_iter()
            .filter(|w| w.enabled)
            .collect();

        if subscribers.is_empty() {
            return Ok(Vec::new());
        }

        let body: Arc<Vec<u8>> = Arc::new(
            serde_json::to_vec(payload)
                .map_err(|err| Error::validation(format!("unserializable payload: {err}")))?,
        );

        let mut handles = Vec::with_capacity(subscribers.len());
        for webhook in subscribers {
            let webhook_id = webhook.id.clone();
            handles.push((
                webhook_id,
                tokio::spawn(deliver(
                    webhook,
                    event_type.to_string(),
                    body.clone(),
                    self.transport.clone(),
                    self.store.clone(),
                    self.config.clone(),
                )),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (webhook_id, handle) in handles {
            match handle.await {
                Ok(delivery) => results.push(delivery),
                Err(err) => {
                    // Every enabled subscriber gets exactly one result;
                    // a dead task still terminates as Failed.
                    tracing::error!(
                        webhook_id = %webhook_id.0,
                        error = %err,
                        "delivery task panicked"
                    );
                    let delivery = WebhookDelivery {
                        webhook_id,
                        delivery_id: DeliveryId::generate(),
                        event_type: event_type.to_string(),
                        status: DeliveryStatus::Failed,
                        attempts: 0,
                        last_response: None,
                        last_error: Some(format!("delivery task failed: {err}")),
                        completed_at: Utc::now(),
                    };
                    if let Err(err) = self.store.record_delivery(&delivery).await {
                        tracing::error!(
                            webhook_id = %delivery.webhook_id.0,
                            error = %err,
                            "failed to persist delivery record"
                        );
                    }
                    results.push(delivery);
                }
            }
        }

        Ok(results)
    }
}

/// Run one subscriber's delivery state machine to its terminal state.
async fn deliver(
    webhook: Webhook,
    event_type: String,
    body: Arc<Vec<u8>>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn EventStore>,
    config: DispatcherConfig,
) -> WebhookDelivery {
    let delivery_id = DeliveryId::generate();
    let signature = compute_signature(&webhook.secret, &body);
    let headers = [
        ("X-Webhook-Signature", signature),
        ("X-Webhook-Id", webhook.id.0.clone()),
        ("X-Delivery-Id", delivery_id.0.to_string()),
        ("X-Event-Type", event_type.clone()),
    ];

    let max_attempts = webhook.max_retries.max(1);
    let mut last_response = None;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let outcome = transport
            .post(&webhook.url, &headers, &body, config.timeout)
            .await;

        match outcome {
            Ok(status) if (200..300).contains(&status) => {
                tracing::info!(
                    webhook_id = %webhook.id.0,
                    delivery_id = %delivery_id.0,
                    attempt,
                    "webhook delivered"
                );
                return finish(
                    &store,
                    &webhook,
                    delivery_id,
                    event_type,
                    DeliveryStatus::Success,
                    attempt,
                    Some(status.to_string()),
                    None,
                )
                .await;
            }
            Ok(status) => {
                tracing::warn!(
                    webhook_id = %webhook.id.0,
                    delivery_id = %delivery_id.0,
                    attempt,
                    status,
                    "webhook delivery attempt failed"
                );
                last_response = Some(status.to_string());
                last_error = Some(format!("unexpected status {status}"));
            }
            Err(err) => {
                tracing::warn!(
                    webhook_id = %webhook.id.0,
                    delivery_id = %delivery_id.0,
                    attempt,
                    error = %err,
                    "webhook delivery attempt failed"
                );
                last_error = Some(err.to_string());
            }
        }

        if attempt < max_attempts {
            sleep(backoff_delay(&config.backoff, attempt)).await;
        }
    }

    finish(
        &store,
        &webhook,
        delivery_id,
        event_type,
        DeliveryStatus::Failed,
        max_attempts,
        last_response,
        last_error,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn finish(
    store: &Arc<dyn EventStore>,
    webhook: &Webhook,
    delivery_id: DeliveryId,
    event_type: String,
    status: DeliveryStatus,
    attempts: u32,
    last_response: Option<String>,
    last_error: Option<String>,
) -> WebhookDelivery {
    let delivery = WebhookDelivery {
        webhook_id: webhook.id.clone(),
        delivery_id,
        event_type,
        status,
        attempts,
        last_response,
        last_error,
        completed_at: Utc::now(),
    };

    if let Err(err) = store.record_delivery(&delivery).await {
        tracing::error!(
            webhook_id = %webhook.id.0,
            delivery_id = %delivery.delivery_id.0,
            error = %err,
            "failed to persist delivery record"
        );
    }

    delivery
}

/// Delay after the Nth failed attempt, clamped to the last table entry.
fn backoff_delay(table: &[Duration], attempt: u32) -> Duration {
    if table.is_empty() {
        return Duration::ZERO;
    }
    let index = (attempt as usize - 1).min(table.len() - 1);
    table[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_table_then_clamps() {
        let table = vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(15),
        ];
        assert_eq!(backoff_delay(&table, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&table, 2), Duration::from_secs(5));
        assert_eq!(backoff_delay(&table, 3), Duration::from_secs(15));
        assert_eq!(backoff_delay(&table, 7), Duration::from_secs(15));
    }

    #[test]
    fn empty_backoff_table_means_no_delay() {
        assert_eq!(backoff_delay(&[], 1), Duration::ZERO);
    }
}
