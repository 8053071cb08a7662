//! SSE (Server-Sent Events) relay of streamed chat output.
//!
//! Each backend chunk becomes exactly one `data:` event, in arrival order.
//! A chunk that cannot be relayed is replaced by a single error event and
//! the stream carries on with the next chunk.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::backend::ChunkStream;
use crate::error::GatewayError;

/// SSE events ready to be served through `axum::response::sse::Sse`.
pub type EventStream = BoxStream<'static, Result<Event, Infallible>>;

/// Drop trailing line terminators and fold CRLF into LF.
///
/// Returns `None` when nothing but line terminators is left.
fn chunk_payload(chunk: &str) -> Option<String> {
    let body = chunk.trim_end_matches(['\r', '\n']);
    (!body.is_empty()).then(|| body.replace("\r\n", "\n"))
}

/// Event for one decoded chunk; remaining line breaks become extra `data:` lines.
pub fn chunk_event(payload: &str) -> Event {
    Event::default().data(payload)
}

/// Event carrying `{"error": "<message>"}`.
pub fn error_event(err: &GatewayError) -> Event {
    let body = serde_json::json!({ "error": err.to_string() });
    Event::default().data(body.to_string())
}

/// Incremental UTF-8 decoding of chunk bytes.
///
/// A multi-byte character split across two chunks is held back and completed
/// by the next chunk. Bytes that can never be valid UTF-8 reject the chunk.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk. An empty result means nothing is ready yet.
    pub fn push(&mut self, chunk: &[u8]) -> Result<String, GatewayError> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        match String::from_utf8(buf) {
            Ok(text) => Ok(text),
            Err(e) => {
                let utf8 = e.utf8_error();
                let valid = utf8.valid_up_to();
                match utf8.error_len() {
                    // Truncated sequence at the end: keep it for the next chunk.
                    None => {
                        let mut bytes = e.into_bytes();
                        self.pending = bytes.split_off(valid);
                        Ok(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(_) => Err(GatewayError::StreamChunk(format!(
                        "invalid UTF-8 in chunk at byte {valid}"
                    ))),
                }
            }
        }
    }

    /// Signal end of stream; fails if a partial character is still pending.
    pub fn finish(&mut self) -> Result<(), GatewayError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.clear();
        Err(GatewayError::StreamChunk(
            "stream ended inside a UTF-8 sequence".to_string(),
        ))
    }
}

struct RelayState {
    upstream: ChunkStream,
    decoder: Utf8ChunkDecoder,
    frames: u64,
    done: bool,
}

/// Convert backend chunks into SSE events.
///
/// Ends when the backend closes its side. No trailer is appended.
pub fn sse_relay(
    upstream: ChunkStream,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let state = RelayState {
        upstream,
        decoder: Utf8ChunkDecoder::new(),
        frames: 0,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            match st.upstream.next().await {
                Some(Ok(bytes)) => match st.decoder.push(&bytes) {
                    Ok(text) => {
                        let Some(payload) = chunk_payload(&text) else {
                            continue;
                        };
                        st.frames += 1;
                        return Some((Ok(chunk_event(&payload)), st));
                    }
                    Err(e) => {
                        warn!(error = %e, frame = st.frames, "Replacing malformed chunk with error frame");
                        st.frames += 1;
                        return Some((Ok(error_event(&e)), st));
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, frame = st.frames, "Upstream chunk failed");
                    st.frames += 1;
                    return Some((Ok(error_event(&e)), st));
                }
                None => {
                    st.done = true;
                    debug!(frames = st.frames, "Upstream stream closed");
                    return match st.decoder.finish() {
                        Ok(()) => None,
                        Err(e) => Some((Ok(error_event(&e)), st)),
                    };
                }
            }
        }
    })
}
