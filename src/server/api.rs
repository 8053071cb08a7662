//! HTTP API of the gateway.
//!
//! Routes:
//! - GET /health
//! - GET /
//! - GET /api/info
//! - GET /api/models
//! - POST /api/chat
//! - POST /api/chat/completions
//! - GET /metrics

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{InferenceBackend, OllamaModel};
use crate::config::{Config, CorsConfig, CounterScope, Profile};
use crate::error::{ErrorResponse, GatewayError};
use crate::metrics::Metrics;
use crate::relay::translate::ChatRequest;
use crate::relay::{relay_chat, ChatRelay};

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn InferenceBackend>,
    pub metrics: Arc<Metrics>,
    /// Cancelled when the server starts shutting down; ends open streams.
    pub shutdown: CancellationToken,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/info", get(api_info))
        .route("/api/models", get(list_models))
        .route("/api/chat", post(chat_passthrough))
        .route("/api/chat/completions", post(chat_completions))
        .route("/metrics", get(metrics));

    if state.config.counter_scope == CounterScope::AllRequests {
        router = router.layer(middleware::from_fn_with_state(state.clone(), count_requests));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors)),
        )
        .with_state(state)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    match cors {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowList(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_credentials(true)
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
        }
    }
}

async fn count_requests(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    state.metrics.record_request();
    next.run(req).await
}

// ─── Response Types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MinimalHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
}

/// Health check response with backend probe.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub request_count: u64,
    pub environment: String,
    pub services: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub api: &'static str,
    pub ollama: String,
}

#[derive(Debug, Serialize)]
pub struct MinimalRoot {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub timestamp: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub metrics: &'static str,
    pub models: &'static str,
    pub info: &'static str,
}

/// One entry of the model listing.
#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub name: Option<String>,
    pub size: u64,
    pub modified: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization: Option<String>,
}

impl From<OllamaModel> for ModelSummary {
    fn from(model: OllamaModel) -> Self {
        let details = model.details.unwrap_or_default();
        Self {
            name: model.name,
            size: model.size,
            modified: model.modified_at,
            parameter_size: details.parameter_size,
            quantization: details.quantization_level,
        }
    }
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<ModelSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub api_version: &'static str,
    pub platform: &'static str,
    pub features: Vec<&'static str>,
    pub models_available: ModelList,
}

const FEATURES: &[&str] = &[
    "Multi-LLM Support",
    "Chat Completion Relay",
    "Streaming Responses (SSE)",
    "Monitoring",
    "Authentication",
];

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Response {
    if state.config.counter_scope == CounterScope::HealthOnly {
        state.metrics.record_request();
    }

    match state.config.profile {
        Profile::Minimal => Json(MinimalHealth {
            status: "healthy",
            version: state.config.profile.version(),
            environment: state.config.environment.clone(),
        })
        .into_response(),
        Profile::Enhanced => {
            let ollama = state.backend.probe().await;
            Json(HealthResponse {
                status: "healthy",
                timestamp: Utc::now().to_rfc3339(),
                uptime_seconds: state.metrics.uptime_seconds(),
                request_count: state.metrics.request_count(),
                environment: state.config.environment.clone(),
                services: ServiceStatus {
                    api: "healthy",
                    ollama: ollama.to_string(),
                },
            })
            .into_response()
        }
    }
}

async fn root(State(state): State<Arc<AppState>>) -> Response {
    let profile = state.config.profile;
    match profile {
        Profile::Minimal => Json(MinimalRoot {
            name: profile.name(),
            version: profile.version(),
            status: "online",
            environment: state.config.environment.clone(),
        })
        .into_response(),
        Profile::Enhanced => Json(RootResponse {
            name: profile.name(),
            version: profile.version(),
            status: "operational",
            timestamp: Utc::now().to_rfc3339(),
            endpoints: Endpoints {
                health: "/health",
                metrics: "/metrics",
                models: "/api/models",
                info: "/api/info",
            },
        })
        .into_response(),
    }
}

async fn fetch_model_list(backend: &dyn InferenceBackend) -> Result<ModelList, GatewayError> {
    let tags = backend.list_models().await.inspect_err(|e| {
        error!(error = %e, "Failed to retrieve models from Ollama");
    })?;

    let models: Vec<ModelSummary> = tags.models.into_iter().map(ModelSummary::from).collect();
    Ok(ModelList {
        count: models.len(),
        models,
    })
}

async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    match fetch_model_list(state.backend.as_ref()).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => e.into_response_with(state.config.error_style),
    }
}

async fn api_info(State(state): State<Arc<AppState>>) -> Response {
    match fetch_model_list(state.backend.as_ref()).await {
        Ok(models) => Json(ApiInfo {
            api_version: state.config.profile.version(),
            platform: state.config.profile.platform(),
            features: FEATURES.to_vec(),
            models_available: models,
        })
        .into_response(),
        Err(e) => e.into_response_with(state.config.error_style),
    }
}

/// Forward an arbitrary JSON object to Ollama's `/api/chat`.
async fn chat_passthrough(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let style = state.config.error_style;

    if let Err(e) = state.config.auth.authorize(&headers) {
        warn!(error = %e, "Rejected chat request");
        return e.into_response_with(style);
    }

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            return GatewayError::Validation("request body must be a JSON object".to_string())
                .into_response_with(style)
        }
        Err(e) => {
            return GatewayError::Validation(format!("malformed request body: {e}"))
                .into_response_with(style)
        }
    };

    match state.backend.chat_raw(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(error = %e, "Chat passthrough failed");
            e.into_response_with(style)
        }
    }
}

/// Typed chat completion with buffered or streamed relay.
async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let style = state.config.error_style;

    let request = match ChatRequest::from_json(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Rejected chat completion request");
            return e.into_response_with(style);
        }
    };

    info!(
        request_id = %request_id,
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "Chat completion request"
    );

    match relay_chat(state.backend.as_ref(), &request, state.shutdown.clone()).await {
        Ok(ChatRelay::Buffered(body)) => Json(body).into_response(),
        // Only relayed chunks go on the wire; no keep-alive comments.
        Ok(ChatRelay::Stream(events)) => Sse::new(events).into_response(),
        Err(e) => e.into_response_with(style),
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(CONTENT_TYPE, state.metrics.content_type())],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to render metrics: {e}"),
                }),
            )
                .into_response()
        }
    }
}
