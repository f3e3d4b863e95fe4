//! Batch ingestion.
//!
//! A bulk submission is split into consecutive chunks, chunks run in
//! waves of bounded concurrency, and every item is isolated: one bad
//! item fails alone while its siblings proceed. Output order always
//! matches input order. Peak concurrency is bounded by
//! `max_concurrent_chunks * chunk_size`, because a wave must fully
//! finish before the next one starts.

use std::sync::Arc;

use crate::dispatch::{WebhookDispatcher, EVENT_CREATED};
use crate::error::{Error, Result};
use crate::store::EventStore;
use crate::types::{BatchResult, BatchSummary, Event, EventInput, ItemResult};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Items per chunk.
    pub chunk_size: usize,
    /// Chunks processed concurrently within one wave.
    pub max_concurrent_chunks: usize,
    /// Batches larger than this are rejected wholesale.
    pub max_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_concurrent_chunks: 4,
            max_batch_size: 1_000,
        }
    }
}

impl IngestConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrent_chunks(mut self, max_concurrent_chunks: usize) -> Self {
        self.max_concurrent_chunks = max_concurrent_chunks;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

/// Coordinates bulk event creation and the `event.created` fan-out.
pub struct BatchIngestor {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<WebhookDispatcher>,
    config: IngestConfig,
}

impl BatchIngestor {
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<WebhookDispatcher>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Ingest a batch, returning one result per item in input order.
    ///
    /// Only pre-validation fails the whole batch: an empty submission or
    /// one larger than `max_batch_size` is rejected before anything is
    /// stored. Past that point every item reports its own outcome and
    /// the summary is always present, even when all items fail.
    pub async fn ingest(&self, items: Vec<EventInput>) -> Result<BatchResult> {
        if items.is_empty() {
            return Err(Error::validation("batch must contain at least one event"));
        }
        if items.len() > self.config.max_batch_size {
            return Err(Error::Validation(format!(
                "batch of {} events exceeds the maximum of {}",
                items.len(),
                self.config.max_batch_size
            )));
        }

        let total = items.len();
        let chunk_size = self.config.chunk_size.max(1);
        let wave_size = self.config.max_concurrent_chunks.max(1);

        let mut chunks: Vec<Vec<EventInput>> = Vec::new();
        let mut iter = items.into_iter();
        loop {
            let chunk: Vec<EventInput> = iter.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }

        let mut results: Vec<ItemResult> = Vec::with_capacity(total);
        let mut chunks = chunks.into_iter().peekable();
        let mut wave = 0usize;

        // Waves are a hard barrier: wave N+1 only starts once every chunk
        // of wave N has finished, and results are joined back in chunk
        // order rather than completion order.
        while chunks.peek().is_some() {
            let current: Vec<Vec<EventInput>> = chunks.by_ref().take(wave_size).collect();
            tracing::debug!(wave, chunks = current.len(), "starting ingestion wave");

            let mut handles = Vec::with_capacity(current.len());
            for chunk in current {
                let store = self.store.clone();
                let inputs = chunk.clone();
                handles.push((inputs, tokio::spawn(ingest_chunk(store, chunk))));
            }

            for (inputs, handle) in handles {
                match handle.await {
                    Ok(chunk_results) => results.extend(chunk_results),
                    Err(err) => {
                        // A panicking store implementation still must not
                        // cost sibling chunks their results.
                        results.extend(inputs.into_iter().map(|input| ItemResult::Failed {
                            error: format!("ingestion task failed: {err}"),
                            input,
                        }));
                    }
                }
            }
            wave += 1;
        }

        let success = results.iter().filter(|r| r.is_created()).count();
        for result in &results {
            if let ItemResult::Created { event } = result {
                self.notify_created(event);
            }
        }

        Ok(BatchResult {
            summary: BatchSummary {
                total,
                success,
                failed: total - success,
            },
            results,
        })
    }

    /// Single-create path. Triggers `event.created` the same way the
    /// batch path does.
    pub async fn ingest_one(&self, input: EventInput) -> Result<Event> {
        let event = self.store.create_event(input).await?;
        self.notify_created(&event);
        Ok(event)
    }

    /// Fire-and-forget `event.created` fan-out. Ingestion never blocks
    /// on webhook delivery and a delivery failure never changes the
    /// reported ingestion result.
    fn notify_created(&self, event: &Event) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "could not serialize event for fan-out");
                return;
            }
        };

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.trigger(EVENT_CREATED, &payload).await {
                tracing::warn!(error = %err, "event.created fan-out failed");
            }
        });
    }
}

/// Create every item of one chunk concurrently, preserving item order
/// and isolating per-item failures.
async fn ingest_chunk(store: Arc<dyn EventStore>, chunk: Vec<EventInput>) -> Vec<ItemResult> {
    let mut handles = Vec::with_capacity(chunk.len());
    for input in chunk {
        let store = store.clone();
        let fallback = input.clone();
        handles.push((
            fallback,
            tokio::spawn(async move {
                let original = input.clone();
                match store.create_event(input).await {
                    Ok(event) => ItemResult::Created { event },
                    Err(err) => ItemResult::Failed {
                        error: err.to_string(),
                        input: original,
                    },
                }
            }),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (fallback, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(err) => results.push(ItemResult::Failed {
                error: format!("create task failed: {err}"),
                input: fallback,
            }),
        }
    }
    results
}
