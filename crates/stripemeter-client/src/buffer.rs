//! In-memory event buffer with size- and time-triggered flushing.
//!
//! Events accumulate until either `batch_size` of them are pending, which
//! flushes inline on the adding call, or `flush_delay` passes without a new
//! event, which flushes from a background task. A failed flush puts its
//! events back at the front of the buffer so nothing is dropped.
//!
//! One mutex guards the events, the deferred-flush handle and the closed flag.
//! It is held only to append, snapshot-and-clear or restore, never across a
//! network call, so an event added while a flush is in flight lands either in
//! that flush's snapshot or in the next one.

use std::sync::Arc;
use std::time::Duration;

use stripemeter_core::{IngestResponse, UsageEvent};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::executor::RequestExecutor;
use crate::transport::ApiRequest;

/// Ingestion endpoint.
pub const INGEST_PATH: &str = "/v1/events/ingest";

/// Buffers usage events and ships them in batches.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    executor: Arc<RequestExecutor>,
    batch_size: usize,
    flush_delay: Duration,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<UsageEvent>,
    timer: Option<DeferredFlush>,
    generation: u64,
    closed: bool,
}

/// Handle to the pending deferred flush.
#[derive(Debug)]
struct DeferredFlush {
    generation: u64,
    handle: JoinHandle<()>,
}

impl State {
    /// Take every pending event and cancel the deferred flush.
    fn take_snapshot(&mut self) -> Vec<UsageEvent> {
        self.cancel_timer();
        std::mem::take(&mut self.events)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    /// Put a failed snapshot back ahead of anything added since.
    ///
    /// Order is kept within a snapshot only. When overlapping flushes both
    /// fail, whichever restores last ends up in front.
    fn restore(&mut self, mut snapshot: Vec<UsageEvent>) {
        snapshot.append(&mut self.events);
        self.events = snapshot;
    }
}

impl EventBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new(executor: Arc<RequestExecutor>, batch_size: usize, flush_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                batch_size: batch_size.max(1),
                flush_delay,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Append an event.
    ///
    /// Reaching `batch_size` flushes immediately on this call and returns the
    /// ingestion response; otherwise the deferred flush is re-armed to fire
    /// `flush_delay` from now and `None` is returned.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after [`EventBuffer::close`], or the
    /// error of the inline flush. In the latter case the events remain
    /// buffered.
    pub async fn add(&self, event: UsageEvent) -> Result<Option<IngestResponse>, ClientError> {
        let snapshot = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(ClientError::Closed);
            }
            state.events.push(event);
            if state.events.len() >= self.inner.batch_size {
                Some(state.take_snapshot())
            } else {
                self.arm_timer(&mut state);
                None
            }
        };

        match snapshot {
            Some(events) => {
                tracing::debug!(events = events.len(), "Buffer full, flushing");
                self.send(events).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Send every buffered event in one ingestion request.
    ///
    /// Returns `None` without touching the network when the buffer is empty.
    ///
    /// # Errors
    ///
    /// Returns the executor's error after its retries are exhausted. The
    /// events are restored to the front of the buffer first.
    pub async fn flush(&self) -> Result<Option<IngestResponse>, ClientError> {
        let events = self.inner.state.lock().await.take_snapshot();
        if events.is_empty() {
            return Ok(None);
        }
        self.send(events).await.map(Some)
    }

    /// Flush one last time and stop accepting events.
    ///
    /// Safe to call repeatedly and on an empty buffer. If the final flush
    /// fails the events stay buffered and [`EventBuffer::flush`] can still be
    /// used to retry.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub async fn close(&self) -> Result<Option<IngestResponse>, ClientError> {
        let events = {
            let mut state = self.inner.state.lock().await;
            state.closed = true;
            state.take_snapshot()
        };
        if events.is_empty() {
            return Ok(None);
        }
        self.send(events).await.map(Some)
    }

    /// Number of events waiting to be sent.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.events.len()
    }

    /// Whether no events are waiting.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a deferred flush is scheduled.
    pub async fn has_pending_flush(&self) -> bool {
        self.inner.state.lock().await.timer.is_some()
    }

    /// Replace the deferred flush with one firing `flush_delay` from now.
    fn arm_timer(&self, state: &mut State) {
        state.cancel_timer();
        state.generation += 1;

        let generation = state.generation;
        let delay = self.inner.flush_delay;
        let buffer = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            buffer.deferred_flush(generation).await;
        });

        state.timer = Some(DeferredFlush { generation, handle });
    }

    /// Body of the deferred flush task.
    ///
    /// The task unregisters itself before sending so no other path can abort
    /// it halfway through a request.
    async fn deferred_flush(&self, generation: u64) {
        let events = {
            let mut state = self.inner.state.lock().await;
            if state.timer.as_ref().map(|t| t.generation) != Some(generation) {
                return;
            }
            state.timer = None;
            std::mem::take(&mut state.events)
        };
        if events.is_empty() {
            return;
        }

        tracing::debug!(events = events.len(), "Deferred flush firing");
        if let Err(err) = self.send(events).await {
            tracing::warn!(
                error = %err,
                status = err.status_code(),
                "Deferred flush failed, events kept in buffer"
            );
        }
    }

    async fn send(&self, events: Vec<UsageEvent>) -> Result<IngestResponse, ClientError> {
        let count = events.len();
        let result = match ingest_body(&events) {
            Ok(body) => {
                self.inner
                    .executor
                    .execute::<IngestResponse>(ApiRequest::post(INGEST_PATH, body))
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(response) => {
                tracing::info!(
                    events = count,
                    accepted = response.accepted,
                    duplicates = response.duplicates,
                    "Flushed buffered events"
                );
                Ok(response)
            }
            Err(err) => {
                self.inner.state.lock().await.restore(events);
                tracing::warn!(events = count, error = %err, "Flush failed, events restored");
                Err(err)
            }
        }
    }
}

/// JSON body for an ingestion request.
pub(crate) fn ingest_body(events: &[UsageEvent]) -> Result<serde_json::Value, ClientError> {
    let mut body = serde_json::Map::new();
    body.insert("events".into(), serde_json::to_value(events)?);
    Ok(serde_json::Value::Object(body))
}
