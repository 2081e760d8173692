//! Chat-completion streaming client
//!
//! Opens one streaming POST per request against an OpenAI-compatible
//! endpoint (LM Studio by default) and exposes the response as an ordered,
//! finite stream of text fragments.

use crate::errors::{BridgeError, Result};
use crate::streaming::parser::{parse_delta_line, LineEvent, SseLineDecoder};
use crate::types::{Fragment, Request};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, trace};

/// Default completion endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:1234/v1/chat/completions";

/// Connection timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between two chunks of an open stream
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Ordered, finite, non-restartable sequence of fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// Anything that can turn a request into a fragment stream
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Open a stream for one request
    ///
    /// Fails with `ConnectionFailure` when the service is unreachable or
    /// answers with a non-success status; no fragments are produced then.
    async fn submit(&self, request: &Request) -> Result<FragmentStream>;

    /// Endpoint used for diagnostics
    fn endpoint(&self) -> &str;
}

/// Transport settings for `CompletionClient`
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Deadline for a whole request, streaming included
    pub request_timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: None,
        }
    }
}

/// HTTP streaming client
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    idle_timeout: Duration,
}

impl CompletionClient {
    /// Create client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(ClientSettings::default())
    }

    /// Create client against a custom endpoint
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::with_settings(ClientSettings {
            endpoint: endpoint.to_string(),
            ..ClientSettings::default()
        })
    }

    /// Create client with custom transport settings
    pub fn with_settings(settings: ClientSettings) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(BridgeError::HttpError)?;

        Ok(Self {
            client,
            endpoint: settings.endpoint,
            idle_timeout: settings.idle_timeout,
        })
    }

    /// Check if the completion server is answering
    pub async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.models_url()).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List models the server reports as loaded
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.models_url();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connection_failure(None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::ConnectionFailure {
                endpoint: url,
                status: Some(status),
                body,
            });
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::StreamingError(format!("Failed to parse models: {}", e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    /// Sibling `/models` URL of the completion endpoint
    pub fn models_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match base.strip_suffix("/chat/completions") {
            Some(root) => format!("{}/models", root),
            None => format!("{}/models", base),
        }
    }

    /// Get idle timeout
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn connection_failure(&self, status: Option<u16>, body: String) -> BridgeError {
        BridgeError::ConnectionFailure {
            endpoint: self.endpoint.clone(),
            status,
            body,
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn submit(&self, request: &Request) -> Result<FragmentStream> {
        debug!(endpoint = %self.endpoint, model = ?request.model(), "Opening completion stream");

        let pending = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send();

        // Response headers fall under the same silence bound as stream chunks
        let response = tokio::time::timeout(self.idle_timeout, pending)
            .await
            .map_err(|_| {
                self.connection_failure(
                    None,
                    format!(
                        "no response within {}ms",
                        self.idle_timeout.as_millis()
                    ),
                )
            })?
            .map_err(|e| self.connection_failure(None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.connection_failure(Some(status), body));
        }

        Ok(fragment_stream(response.bytes_stream(), self.idle_timeout))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Turn a raw byte stream into fragments
///
/// Every chunk must arrive within `idle_timeout`. A stalled or broken
/// transport ends the stream with one error item.
pub fn fragment_stream<S, B, E>(bytes: S, idle_timeout: Duration) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseLineDecoder::new();

        loop {
            let chunk = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    yield Err(BridgeError::StreamingError(e.to_string()));
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    yield Err(BridgeError::Timeout {
                        duration_ms: idle_timeout.as_millis() as u64,
                    });
                    return;
                }
            };

            let lines = match decoder.push(chunk.as_ref()) {
                Ok(lines) => lines,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for line in lines {
                match parse_delta_line(&line) {
                    LineEvent::Fragment(fragment) => yield Ok(fragment),
                    LineEvent::Empty => {}
                    LineEvent::Skipped => {
                        if !line.trim().is_empty() {
                            trace!(line = %line, "Skipping stream line");
                        }
                    }
                }
            }
        }

        if let Some(line) = decoder.finish() {
            if let LineEvent::Fragment(fragment) = parse_delta_line(&line) {
                yield Ok(fragment);
            }
        }
    })
}

/// OpenAI-compatible models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
