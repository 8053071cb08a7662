//! Chat-completion relay.
//!
//! - [`translate`]: gateway request schema and translation to Ollama's payload
//! - [`streaming`]: SSE framing of streamed chunks
//!
//! [`relay_chat`] picks the mode from the request's `stream` flag; the two
//! modes are never mixed within one call.

pub mod streaming;
pub mod translate;

use futures::stream::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backend::InferenceBackend;
use crate::error::GatewayError;
use crate::relay::streaming::{sse_relay, EventStream};
use crate::relay::translate::{translate, ChatRequest};

/// Result of a relayed chat call.
pub enum ChatRelay {
    /// Backend JSON body, returned verbatim.
    Buffered(Value),
    /// SSE events, forwarded as they arrive.
    Stream(EventStream),
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRelay::Buffered(body) => f.debug_tuple("Buffered").field(body).finish(),
            ChatRelay::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Translate `request`, dispatch it to the backend and relay the result.
///
/// A streamed relay also ends when `shutdown` is cancelled. Errors returned
/// here happen before any frame is produced.
pub async fn relay_chat(
    backend: &dyn InferenceBackend,
    request: &ChatRequest,
    shutdown: CancellationToken,
) -> Result<ChatRelay, GatewayError> {
    let payload = translate(request);

    if payload.stream {
        let upstream = backend.chat_stream(&payload).await.inspect_err(|e| {
            error!(model = %payload.model, error = %e, "Failed to open chat stream");
        })?;
        info!(model = %payload.model, "Relaying chat stream");

        let frames = sse_relay(upstream).take_until(shutdown.cancelled_owned());
        Ok(ChatRelay::Stream(frames.boxed()))
    } else {
        let body = backend.chat(&payload).await.inspect_err(|e| {
            error!(model = %payload.model, error = %e, "Chat completion failed");
        })?;
        Ok(ChatRelay::Buffered(body))
    }
}
