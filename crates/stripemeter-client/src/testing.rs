//! Scripted in-process transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use stripemeter_core::{IngestRequest, UsageEvent};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

use crate::error::ClientError;
use crate::transport::{ApiRequest, RawResponse, Transport};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// Respond with a status and JSON body.
    Status(u16, Value),
    /// Fail without a response.
    Fail(&'static str),
}

/// Records every request and answers from a script.
///
/// Once the script runs out, ingestion requests are acknowledged with
/// `accepted` equal to the number of events sent.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<(Instant, ApiRequest)>>,
    gate: Option<Arc<Semaphore>>,
    started: Arc<Notify>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `send` waits for a permit on `gate` after recording the request.
    pub(crate) fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub(crate) fn push(&self, outcome: Scripted) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn respond_always(&self, outcome: Scripted) {
        *self.fallback.lock().unwrap() = Some(outcome);
    }

    /// Notified each time a request is recorded.
    pub(crate) fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub(crate) fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Events of every ingestion request, in send order.
    pub(crate) fn ingested_batches(&self) -> Vec<Vec<UsageEvent>> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/v1/events/ingest")
            .filter_map(|r| r.body)
            .map(|body| {
                serde_json::from_value::<IngestRequest>(body)
                    .unwrap()
                    .events
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone());

        match scripted {
            Some(Scripted::Status(status, body)) => Ok(RawResponse {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            }),
            Some(Scripted::Fail(message)) => Err(ClientError::transport(message)),
            None => {
                let count = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("events"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok(RawResponse {
                    status: 200,
                    body: serde_json::to_vec(&json!({ "accepted": count, "duplicates": 0 }))
                        .unwrap(),
                })
            }
        }
    }
}
