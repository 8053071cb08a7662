//! ollama-gateway: a thin HTTP gateway in front of a local Ollama server.
//!
//! Exposes health, metadata, model listing, Prometheus metrics and a chat
//! completion relay that translates OpenAI-style requests into Ollama's
//! native `/api/chat` payload, returning either one buffered JSON body or a
//! server-sent-event stream.

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;
