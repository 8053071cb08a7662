//! Ollama HTTP client.
//!
//! Three call shapes: `GET /api/tags`, buffered `POST /api/chat` and
//! streamed `POST /api/chat`. Each call carries its own timeout from
//! [`BackendConfig`].

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BackendChatPayload, BackendStatus, ChunkStream, InferenceBackend, TagsResponse};
use crate::config::BackendConfig;
use crate::error::GatewayError;

/// Longest slice of a backend error body copied into the error message.
const ERROR_BODY_LIMIT: usize = 200;

pub struct OllamaClient {
    http: Client,
    config: BackendConfig,
}

impl OllamaClient {
    pub fn new(config: BackendConfig) -> reqwest::Result<Self> {
        let http = Client::builder().pool_max_idle_per_host(10).build()?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn get_tags(&self, timeout: Duration) -> Result<Response, GatewayError> {
        let url = self.url("/api/tags");
        debug!(url = %url, timeout_secs = timeout.as_secs(), "GET Ollama tags");
        Ok(self.http.get(&url).timeout(timeout).send().await?)
    }
}

/// Turn any non-200 answer into [`GatewayError::BackendError`].
async fn ensure_ok(response: Response, call: &str) -> Result<Response, GatewayError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
    warn!(call = %call, status = status.as_u16(), body = %snippet, "Ollama returned an error status");

    let message = if snippet.is_empty() {
        format!("{call} failed")
    } else {
        format!("{call} failed: {snippet}")
    };

    Err(GatewayError::BackendError {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn list_models(&self) -> Result<TagsResponse, GatewayError> {
        let response = self.get_tags(self.config.models_timeout).await?;
        let response = ensure_ok(response, "model listing").await?;
        Ok(response.json::<TagsResponse>().await?)
    }

    async fn probe(&self) -> BackendStatus {
        let response = match self.get_tags(self.config.health_timeout).await {
            Ok(r) => r,
            Err(e) => return BackendStatus::Error(backend_detail(e)),
        };

        if response.status() != StatusCode::OK {
            return BackendStatus::Unhealthy {
                status: response.status().as_u16(),
            };
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => BackendStatus::Healthy {
                models: tags.models.len(),
            },
            Err(e) => BackendStatus::Error(e.to_string()),
        }
    }

    async fn chat(&self, payload: &BackendChatPayload) -> Result<Value, GatewayError> {
        let url = self.url("/api/chat");
        debug!(url = %url, model = %payload.model, "POST Ollama chat (buffered)");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.chat_timeout)
            .json(payload)
            .send()
            .await?;
        let response = ensure_ok(response, "chat completion").await?;

        Ok(response.json::<Value>().await?)
    }

    async fn chat_stream(&self, payload: &BackendChatPayload) -> Result<ChunkStream, GatewayError> {
        let url = self.url("/api/chat");
        let idle = self.config.chat_timeout;
        debug!(url = %url, model = %payload.model, "POST Ollama chat (stream)");

        // Bounded: connection setup and each idle gap. Unbounded: total length.
        let send = self.http.post(&url).json(payload).send();
        let response = tokio::time::timeout(idle, send).await.map_err(|_| {
            GatewayError::BackendUnavailable(format!(
                "no response from Ollama within {idle:?}"
            ))
        })??;
        let response = ensure_ok(response, "chat stream").await?;

        let upstream = Box::pin(response.bytes_stream());
        let chunks = stream::unfold(Some(upstream), move |state| async move {
            let mut upstream = state?;
            match tokio::time::timeout(idle, upstream.next()).await {
                Ok(Some(Ok(bytes))) => Some((Ok(bytes), Some(upstream))),
                Ok(Some(Err(e))) => {
                    Some((Err(GatewayError::StreamChunk(e.to_string())), Some(upstream)))
                }
                Ok(None) => None,
                Err(_) => Some((
                    Err(GatewayError::StreamChunk(format!(
                        "Ollama sent no data for {idle:?}"
                    ))),
                    None,
                )),
            }
        });

        Ok(chunks.boxed())
    }

    async fn chat_raw(&self, body: &Value) -> Result<Value, GatewayError> {
        let url = self.url("/api/chat");
        debug!(url = %url, "POST Ollama chat (passthrough)");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.chat_timeout)
            .json(body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            warn!(
                status = response.status().as_u16(),
                "Ollama returned an error status, relaying body as-is"
            );
        }

        Ok(response.json::<Value>().await?)
    }
}

fn backend_detail(err: GatewayError) -> String {
    match err {
        GatewayError::BackendUnavailable(detail) => detail,
        other => other.to_string(),
    }
}
