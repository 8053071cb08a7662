//! Router-level tests against an in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ollama_gateway::auth::AuthPolicy;
use ollama_gateway::backend::{
    BackendChatPayload, BackendStatus, ChunkStream, InferenceBackend, ModelDetails, OllamaModel,
    TagsResponse,
};
use ollama_gateway::config::{Config, CorsConfig, CounterScope, ErrorStyle, Profile};
use ollama_gateway::error::GatewayError;
use ollama_gateway::metrics::Metrics;
use ollama_gateway::server::{build_router, AppState};

// ── Fake backend ────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Failure {
    /// Backend answers with HTTP 500.
    Status500,
    /// Backend cannot be reached.
    Unreachable,
}

#[derive(Clone, Default)]
struct FakeBackend {
    models: Vec<OllamaModel>,
    chunks: Vec<Vec<u8>>,
    failure: Option<Failure>,
}

impl FakeBackend {
    fn error(&self) -> Option<GatewayError> {
        self.failure.map(|f| match f {
            Failure::Status500 => GatewayError::BackendError {
                status: 500,
                message: "chat completion failed".to_string(),
            },
            Failure::Unreachable => {
                GatewayError::BackendUnavailable("connection refused".to_string())
            }
        })
    }
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    async fn list_models(&self) -> Result<TagsResponse, GatewayError> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(TagsResponse {
                models: self.models.clone(),
            }),
        }
    }

    async fn probe(&self) -> BackendStatus {
        match self.failure {
            Some(Failure::Status500) => BackendStatus::Unhealthy { status: 500 },
            Some(Failure::Unreachable) => BackendStatus::Error("connection refused".to_string()),
            None => BackendStatus::Healthy {
                models: self.models.len(),
            },
        }
    }

    async fn chat(&self, _payload: &BackendChatPayload) -> Result<Value, GatewayError> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(json!({"message": "hi"})),
        }
    }

    async fn chat_stream(&self, _payload: &BackendChatPayload) -> Result<ChunkStream, GatewayError> {
        if let Some(e) = self.error() {
            return Err(e);
        }
        let items: Vec<Result<Bytes, GatewayError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn chat_raw(&self, body: &Value) -> Result<Value, GatewayError> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(json!({"echo": body})),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn model(name: &str) -> OllamaModel {
    OllamaModel {
        name: Some(name.to_string()),
        size: 1024,
        modified_at: Some("2024-05-01T10:00:00Z".to_string()),
        details: Some(ModelDetails {
            parameter_size: Some("8B".to_string()),
            quantization_level: Some("Q4_K_M".to_string()),
        }),
    }
}

fn app_with(config: Config, backend: FakeBackend) -> (Router, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let state = Arc::new(AppState {
        config: Arc::new(config),
        backend: Arc::new(backend),
        metrics: metrics.clone(),
        shutdown: CancellationToken::new(),
    });
    (build_router(state), metrics)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response) -> Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body).unwrap_or_else(|e| panic!("Expected valid JSON body: {e}"))
}

fn chat_body(stream: bool) -> Value {
    json!({
        "model": "llama3",
        "messages": [{"role": "user", "content": "hello"}],
        "stream": stream
    })
}

// ── /api/models ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn models_empty_listing_is_not_an_error() {
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    let response = app.oneshot(get("/api/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"models": [], "count": 0}));
}

#[tokio::test]
async fn models_listing_is_summarised() {
    let backend = FakeBackend {
        models: vec![model("llama3:8b"), model("mistral:7b")],
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);

    let json = body_json(app.oneshot(get("/api/models")).await.unwrap()).await;

    assert_eq!(json["count"], 2);
    assert_eq!(
        json["models"][0],
        json!({
            "name": "llama3:8b",
            "size": 1024,
            "modified": "2024-05-01T10:00:00Z",
            "parameter_size": "8B",
            "quantization": "Q4_K_M"
        })
    );
}

#[tokio::test]
async fn models_status_style_maps_backend_failures() {
    let backend = FakeBackend {
        failure: Some(Failure::Status500),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);
    let response = app.oneshot(get("/api/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await.get("error").is_some());

    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);
    let response = app.oneshot(get("/api/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await.get("error").is_some());
}

#[tokio::test]
async fn models_embedded_style_returns_200_with_error() {
    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend);

    let response = app.oneshot(get("/api/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("connection refused"));
}

// ── /api/chat/completions ───────────────────────────────────────────────────

#[tokio::test]
async fn chat_buffered_returns_backend_body_unchanged() {
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), FakeBackend::default());

    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": "hi"}));
}

#[tokio::test]
async fn chat_buffered_backend_500_yields_error_object() {
    let backend = FakeBackend {
        failure: Some(Failure::Status500),
        ..Default::default()
    };

    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend.clone());
    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.get("error").is_some());

    let mut config = Config::for_profile(Profile::Minimal);
    config.error_style = ErrorStyle::Status;
    let (app, _) = app_with(config, backend);
    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await.get("error").is_some());
}

#[tokio::test]
async fn chat_stream_emits_one_frame_per_chunk() {
    let backend = FakeBackend {
        chunks: vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend);

    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(true)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(
        body_bytes(response).await,
        Bytes::from_static(b"data: a\n\ndata: b\n\ndata: c\n\n")
    );
}

#[tokio::test]
async fn chat_stream_bad_chunk_is_replaced_not_fatal() {
    let backend = FakeBackend {
        chunks: vec![b"a".to_vec(), vec![0xff, 0xfe], b"c".to_vec()],
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend);

    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(true)))
        .await
        .unwrap();
    let body = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();

    let frames: Vec<&str> = body.split_terminator("\n\n").collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], "data: a");
    let error: Value = serde_json::from_str(frames[1].strip_prefix("data: ").unwrap()).unwrap();
    assert!(error.get("error").is_some());
    assert_eq!(frames[2], "data: c");
}

#[tokio::test]
async fn chat_stream_open_failure_is_request_level() {
    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);

    let response = app
        .oneshot(post_json("/api/chat/completions", chat_body(true)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(body_json(response).await.get("error").is_some());
}

#[tokio::test]
async fn chat_validation_errors_are_422() {
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), FakeBackend::default());

    for body in [
        json!({"model": "llama3", "messages": []}),
        json!({"messages": [{"role": "user", "content": "x"}]}),
        json!({"model": "llama3"}),
    ] {
        let response = app
            .clone()
            .oneshot(post_json("/api/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await.get("error").is_some());
    }
}

// ── /api/chat (passthrough) ─────────────────────────────────────────────────

#[tokio::test]
async fn passthrough_requires_valid_bearer_token() {
    let mut config = Config::for_profile(Profile::Enhanced);
    config.auth = AuthPolicy::bearer("s3cret");
    let (app, _) = app_with(config, FakeBackend::default());

    let response = app
        .clone()
        .oneshot(post_json("/api/chat", json!({"model": "llama3"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .header("authorization", "Bearer s3cret")
        .body(Body::from(json!({"model": "llama3"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"echo": {"model": "llama3"}}));
}

#[tokio::test]
async fn passthrough_rejects_non_object_body() {
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    let response = app
        .oneshot(post_json("/api/chat", json!([1, 2, 3])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn passthrough_unreachable_backend_follows_error_style() {
    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };

    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend.clone());
    let response = app
        .oneshot(post_json("/api/chat", json!({"model": "llama3"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("connection refused"));

    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend);
    let response = app
        .oneshot(post_json("/api/chat", json!({"model": "llama3"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.get("error").is_some());
}

// ── /health, /, /api/info ───────────────────────────────────────────────────

#[tokio::test]
async fn enhanced_health_reports_probe_and_counts_itself() {
    let backend = FakeBackend {
        models: vec![model("a"), model("b")],
        ..Default::default()
    };
    let (app, metrics) = app_with(Config::for_profile(Profile::Enhanced), backend);

    app.clone().oneshot(get("/api/models")).await.unwrap();
    let json = body_json(app.oneshot(get("/health")).await.unwrap()).await;

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["environment"], "development");
    assert_eq!(json["services"]["api"], "healthy");
    assert_eq!(json["services"]["ollama"], "healthy - 2 models");
    assert_eq!(json["request_count"], 1);
    assert!(json["uptime_seconds"].is_u64());
    assert!(json["timestamp"].is_string());
    assert_eq!(metrics.request_count(), 1);
}

#[tokio::test]
async fn enhanced_health_survives_unreachable_backend() {
    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["services"]["ollama"], "error: connection refused");
}

#[tokio::test]
async fn minimal_health_and_root_shapes() {
    let (app, _) = app_with(Config::for_profile(Profile::Minimal), FakeBackend::default());

    let health = body_json(app.clone().oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(
        health,
        json!({"status": "healthy", "version": "2.0.0", "environment": "production"})
    );

    let root = body_json(app.oneshot(get("/")).await.unwrap()).await;
    assert_eq!(root["status"], "online");
    assert_eq!(root["version"], "2.0.0");
    assert_eq!(root["environment"], "production");
}

#[tokio::test]
async fn enhanced_root_lists_endpoints() {
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    let root = body_json(app.oneshot(get("/")).await.unwrap()).await;

    assert_eq!(root["status"], "operational");
    assert_eq!(root["endpoints"]["health"], "/health");
    assert_eq!(root["endpoints"]["metrics"], "/metrics");
}

#[tokio::test]
async fn api_info_nests_model_listing() {
    let backend = FakeBackend {
        models: vec![model("llama3:8b")],
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);

    let json = body_json(app.oneshot(get("/api/info")).await.unwrap()).await;

    assert_eq!(json["api_version"], "1.0.0");
    assert_eq!(json["platform"], "AI Behar");
    assert!(json["features"]
        .as_array()
        .unwrap()
        .contains(&json!("Multi-LLM Support")));
    assert_eq!(json["models_available"]["count"], 1);
}

#[tokio::test]
async fn api_info_propagates_listing_failures() {
    let backend = FakeBackend {
        failure: Some(Failure::Status500),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend.clone());
    let response = app.oneshot(get("/api/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert!(json.get("error").is_some());
    assert!(json.get("models_available").is_none());

    let (app, _) = app_with(Config::for_profile(Profile::Minimal), backend);
    let response = app.oneshot(get("/api/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.get("error").is_some());

    let backend = FakeBackend {
        failure: Some(Failure::Unreachable),
        ..Default::default()
    };
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), backend);
    let response = app.oneshot(get("/api/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── CORS ────────────────────────────────────────────────────────────────────

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/api/models")
        .header("origin", origin)
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn cors_allow_list_admits_listed_origins_only() {
    let mut config = Config::for_profile(Profile::Enhanced);
    config.cors = CorsConfig::AllowList(vec![
        "https://a.example".to_string(),
        "https://b.example".to_string(),
    ]);
    let (app, _) = app_with(config, FakeBackend::default());

    let response = app.clone().oneshot(preflight("https://a.example")).await.unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://a.example"
    );
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");

    let request = Request::builder()
        .uri("/api/models")
        .header("origin", "https://b.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://b.example"
    );

    let response = app.oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn cors_allow_all_answers_any_origin() {
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    let response = app.oneshot(preflight("https://anywhere.example")).await.unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

// ── /metrics and the request counter ────────────────────────────────────────

#[tokio::test]
async fn metrics_exposition_format() {
    let (app, _) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    app.clone().oneshot(get("/health")).await.unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let text = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(text.contains("# TYPE api_requests_total counter"));
    assert!(text.contains("api_requests_total 1"));
    assert!(text.contains("# TYPE api_uptime_seconds gauge"));
    assert!(text.contains("api_health_status 1"));
}

#[tokio::test]
async fn health_only_scope_ignores_other_routes() {
    let (app, metrics) = app_with(Config::for_profile(Profile::Enhanced), FakeBackend::default());

    app.clone().oneshot(get("/")).await.unwrap();
    app.clone().oneshot(get("/api/models")).await.unwrap();
    assert_eq!(metrics.request_count(), 0);

    app.oneshot(get("/health")).await.unwrap();
    assert_eq!(metrics.request_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_all_counted() {
    let mut config = Config::for_profile(Profile::Enhanced);
    config.counter_scope = CounterScope::AllRequests;
    let (app, metrics) = app_with(config, FakeBackend::default());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let app = app.clone();
            let uri = if i % 2 == 0 { "/api/models" } else { "/" };
            tokio::spawn(async move { app.oneshot(get(uri)).await.unwrap().status() })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(metrics.request_count(), 50);
}
