#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use eventgate::{Transport, TransportError};

/// One outbound POST captured by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted transport: pops one response per call, then answers 200.
pub struct MockTransport {
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<VecDeque<Result<u16, TransportError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn scripted(responses: Vec<Result<u16, TransportError>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(responses.into()),
        }
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &[u8],
        _timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.calls.lock().await.push(RecordedCall {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
            body: body.to_vec(),
        });

        self.script.lock().await.pop_front().unwrap_or(Ok(200))
    }
}
