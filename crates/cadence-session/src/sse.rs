//! SSE-backed session adapter.
//!
//! Speaks a minimal server-sent-events protocol: the endpoint receives one
//! JSON request per response cycle and emits `{"delta": ...}` events, a
//! `[DONE]` sentinel on completion, and `{"error": ...}` as a terminal
//! payload. Deltas are accumulated here so consumers always see cumulative
//! snapshots.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::latest::latest_only;
use crate::session::{Session, SessionFactory, SnapshotStream};

/// Request payload for the generation endpoint
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    stream: bool,
}

/// One SSE data payload
#[derive(Debug, Deserialize)]
struct GenerateEvent {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// A session backed by one SSE generation endpoint.
pub struct SseSession {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    instructions: String,
}

#[async_trait]
impl Session for SseSession {
    async fn stream(&self, prompt: &str, cancel: CancellationToken) -> Result<SnapshotStream> {
        let request = GenerateRequest {
            prompt,
            instructions: (!self.instructions.is_empty()).then_some(self.instructions.as_str()),
            stream: true,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(endpoint = %self.endpoint, "opening generation stream");

        let event_source = EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(latest_only(Box::pin(create_stream(event_source, cancel))))
    }
}

/// Create the cumulative snapshot stream from SSE events
fn create_stream(
    mut event_source: EventSource,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String>> + Send {
    stream! {
        let mut content = String::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    event_source.close();
                    return;
                }
                event = event_source.next() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        event_source.close();
                        return;
                    }
                    match serde_json::from_str::<GenerateEvent>(&message.data) {
                        Ok(payload) => {
                            if let Some(err) = payload.error {
                                yield Err(Error::api(err.error_type, err.message));
                                event_source.close();
                                return;
                            }
                            if let Some(delta) = payload.delta {
                                content.push_str(&delta);
                                yield Ok(content.clone());
                            }
                        }
                        Err(e) => {
                            yield Err(Error::UnexpectedResponse(format!(
                                "bad event payload: {}",
                                e
                            )));
                            event_source.close();
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    event_source.close();
                    return;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    event_source.close();
                    return;
                }
            }
        }
    }
}

/// Builds `SseSession`s for a configured endpoint.
pub struct SseSessionFactory {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl SseSessionFactory {
    /// Create a factory for the given endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl SessionFactory for SseSessionFactory {
    fn create(&self, instructions: &str) -> Result<Arc<dyn Session>> {
        if self.endpoint.is_empty() {
            return Err(Error::NotConfigured);
        }
        Ok(Arc::new(SseSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            instructions: instructions.to_string(),
        }))
    }
}
