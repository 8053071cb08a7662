//! Gateway chat schema and its translation into Ollama's native payload.

use serde::Deserialize;

use crate::backend::{BackendChatPayload, ChatMessage, ChatOptions};
use crate::error::GatewayError;

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> i64 {
    2048
}

/// Chat completion request as accepted on `POST /api/chat/completions`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub stream: bool,
}

/// Wire shape before validation; explicit `null` means "use the default".
#[derive(Debug, Deserialize)]
struct RawChatRequest {
    model: Option<String>,
    messages: Option<Vec<ChatMessage>>,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    stream: Option<bool>,
}

impl ChatRequest {
    /// Parse and validate a request body.
    ///
    /// Fails with [`GatewayError::Validation`] when the body is not a JSON
    /// object of the right shape, when `model` or `messages` is missing, or
    /// when `messages` is empty.
    pub fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        let raw: RawChatRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Validation(format!("malformed request body: {e}")))?;

        let model = raw
            .model
            .ok_or_else(|| GatewayError::Validation("field `model` is required".to_string()))?;
        let messages = raw
            .messages
            .ok_or_else(|| GatewayError::Validation("field `messages` is required".to_string()))?;
        if messages.is_empty() {
            return Err(GatewayError::Validation(
                "field `messages` must not be empty".to_string(),
            ));
        }

        Ok(Self {
            model,
            messages,
            temperature: raw.temperature.unwrap_or_else(default_temperature),
            max_tokens: raw.max_tokens.unwrap_or_else(default_max_tokens),
            stream: raw.stream.unwrap_or(false),
        })
    }
}

/// Map a validated request onto Ollama's `/api/chat` body.
///
/// Total: values are copied as-is, with no clamping or model lookup.
/// `max_tokens` becomes `options.num_predict`.
pub fn translate(request: &ChatRequest) -> BackendChatPayload {
    BackendChatPayload {
        model: request.model.clone(),
        messages: request.messages.clone(),
        options: ChatOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
        stream: request.stream,
    }
}
