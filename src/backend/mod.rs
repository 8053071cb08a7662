//! Inference backend access.
//!
//! - [`InferenceBackend`]: the calls the gateway makes against an inference server
//! - [`ollama`]: the `reqwest` implementation talking to Ollama's HTTP API
//!
//! The wire types here are Ollama's native schema.

pub mod ollama;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Raw body chunks of a streamed chat, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendChatPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
    pub stream: bool,
}

/// Sampling options in Ollama's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f64,
    pub num_predict: i64,
}

/// Response of `GET /api/tags`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

/// Outcome of a liveness probe against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Healthy { models: usize },
    Unhealthy { status: u16 },
    Error(String),
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Healthy { models } => write!(f, "healthy - {models} models"),
            BackendStatus::Unhealthy { .. } => write!(f, "unhealthy"),
            BackendStatus::Error(msg) => {
                let short: String = msg.chars().take(50).collect();
                write!(f, "error: {short}")
            }
        }
    }
}

/// Calls the gateway issues against the inference server.
///
/// Implementations make a single attempt per call and surface failures
/// immediately; there is no retry or backoff.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// `GET /api/tags` for the model listing.
    async fn list_models(&self) -> Result<TagsResponse, GatewayError>;

    /// `GET /api/tags` with the short health timeout. Never fails; the
    /// outcome is folded into [`BackendStatus`].
    async fn probe(&self) -> BackendStatus;

    /// Buffered `POST /api/chat`; returns the backend JSON verbatim.
    async fn chat(&self, payload: &BackendChatPayload) -> Result<Value, GatewayError>;

    /// Streaming `POST /api/chat`. Errors here mean the stream never opened.
    async fn chat_stream(&self, payload: &BackendChatPayload) -> Result<ChunkStream, GatewayError>;

    /// Forward an arbitrary JSON body to `POST /api/chat` and return whatever
    /// JSON comes back, whatever the status.
    async fn chat_raw(&self, body: &Value) -> Result<Value, GatewayError>;
}
