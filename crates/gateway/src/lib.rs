//! HTTP API surface for Verdant.
//!
//! Exposes the chat pipeline, read-only insight and memory snapshots, the
//! trace viewer feed, and a health check. Authentication happens upstream;
//! this layer receives an already-authenticated user id in the `X-User-Id`
//! header. Gateway (LLM) failures never reach the wire — the pipeline
//! degrades internally — and fatal store errors map to a calm, retryable
//! 503, never raw error text.
//!
//! Built on Axum.

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use verdant_config::AppConfig;
use verdant_core::error::Error;
use verdant_core::message::ConversationId;
use verdant_pipeline::{derive_insights, InsightSummary, Orchestrator};
use verdant_telemetry::{TraceEntry, TraceStore};

/// Shared application state for the API.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub traces: Arc<TraceStore>,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/insights", get(insights_handler))
        .route("/api/memory", get(memory_handler))
        .route("/api/traces", get(traces_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Build state from config and start the HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let provider = verdant_providers::build_from_config(&config.provider)?;

    let store: Arc<dyn verdant_core::MemoryStore> = match config.memory.backend.as_str() {
        "in_memory" => Arc::new(verdant_memory::InMemoryStore::new()),
        _ => Arc::new(verdant_memory::SqliteStore::new(&config.memory.path).await?),
    };

    let traces = Arc::new(if config.telemetry.enabled {
        TraceStore::new(config.telemetry.trace_capacity)
    } else {
        TraceStore::disabled()
    });

    let orchestrator = Orchestrator::new(
        store,
        provider,
        traces.clone(),
        std::time::Duration::from_secs(config.provider.timeout_secs),
    );

    let state = Arc::new(AppState {
        orchestrator,
        traces,
    });

    let app = build_router(state);
    info!(addr = %addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    conversation_id: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ApiError {
    detail: String,
}

#[derive(Deserialize)]
struct TracesQuery {
    #[serde(default = "default_trace_limit")]
    limit: usize,
}

fn default_trace_limit() -> usize {
    20
}

/// The calm message shown when the memory store is down. The user never
/// sees raw store or gateway error text.
const CALM_FAILURE: &str =
    "I'm having a moment of reflection. Could you share that thought again?";

fn user_id_from(headers: &HeaderMap) -> Result<String, (StatusCode, Json<ApiError>)> {
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                detail: "Missing X-User-Id header".into(),
            }),
        ))
}

fn fatal(error: Error) -> (StatusCode, Json<ApiError>) {
    error!(error = %error, "Request failed on a required store operation");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError {
            detail: CALM_FAILURE.into(),
        }),
    )
}

// --- Handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = user_id_from(&headers)?;
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                detail: "Message must not be empty".into(),
            }),
        ));
    }

    let conversation_id = payload
        .conversation_id
        .map(|id| ConversationId::from(&id))
        .unwrap_or_default();

    let response = state
        .orchestrator
        .handle(&user_id, &conversation_id, &payload.message)
        .await
        .map_err(fatal)?;

    Ok(Json(ChatResponse {
        response,
        conversation_id: conversation_id.0,
    }))
}

async fn insights_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<InsightSummary>, (StatusCode, Json<ApiError>)> {
    let user_id = user_id_from(&headers)?;
    let memory = state
        .orchestrator
        .memory_snapshot(&user_id)
        .await
        .map_err(fatal)?;
    Ok(Json(derive_insights(&memory)))
}

async fn memory_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<verdant_core::UserMemory>, (StatusCode, Json<ApiError>)> {
    let user_id = user_id_from(&headers)?;
    let memory = state
        .orchestrator
        .memory_snapshot(&user_id)
        .await
        .map_err(fatal)?;
    Ok(Json(memory))
}

async fn traces_handler(
    State(state): State<SharedState>,
    Query(query): Query<TracesQuery>,
) -> Json<Vec<TraceEntry>> {
    let limit = query.limit.clamp(1, 100);
    Json(state.traces.recent(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use verdant_core::error::ProviderError;
    use verdant_core::provider::{CompletionRequest, CompletionResponse, Provider};
    use verdant_memory::InMemoryStore;

    struct ScriptedGateway;

    #[async_trait]
    impl Provider for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            let text = if request.prompt.contains("mentor-student") {
                r#"{"clarity_score": 50, "understanding_delta": 0,
                    "confusion_trend": "stable", "reasoning": "ok"}"#
                    .to_string()
            } else if request.expect_structured {
                r#"{"strategy": "support", "tone": "warm", "verbosity": "normal",
                    "pacing": "normal", "should_ask_question": false}"#
                    .to_string()
            } else {
                "A steady reply.".to_string()
            };
            Ok(CompletionResponse {
                text,
                model: "scripted-model".into(),
                usage: None,
            })
        }
    }

    fn test_state() -> SharedState {
        let traces = Arc::new(TraceStore::default());
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ScriptedGateway),
            traces.clone(),
            std::time::Duration::from_secs(5),
        );
        Arc::new(AppState {
            orchestrator,
            traces,
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_requires_user_header() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"message": "hello"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_returns_reply_and_conversation_id() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .header("X-User-Id", "user-1")
            .body(Body::from(r#"{"message": "What should I learn next?"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response"], "A steady reply.");
        assert!(!json["conversation_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .header("X-User-Id", "user-1")
            .body(Body::from(r#"{"message": "   "}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn insights_endpoint_returns_momentum() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/api/insights")
            .header("X-User-Id", "user-1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["momentum"]["state"], "starting");
        assert!(json["effort"]["note"]
            .as_str()
            .unwrap()
            .contains("not understanding"));
    }

    #[tokio::test]
    async fn memory_endpoint_returns_snapshot() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/api/memory")
            .header("X-User-Id", "user-7")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["user_id"], "user-7");
    }

    #[tokio::test]
    async fn traces_endpoint_serves_recent_entries() {
        let state = test_state();
        let app = build_router(state.clone());

        // Drive one chat through so traces exist
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("Content-Type", "application/json")
            .header("X-User-Id", "user-1")
            .body(Body::from(r#"{"message": "hello"}"#))
            .unwrap();
        app.clone().oneshot(req).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/traces?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let entries = json.as_array().unwrap();
        assert!(entries
            .iter()
            .any(|e| e["action"] == "response_ready"));
    }
}
