//! HTTP server.
//!
//! Exposes the RAG pipeline, direct generation, search, and context
//! administration as a JSON API. Streaming endpoints answer with
//! server-sent events.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Welcome message |
//! | `GET`  | `/health` | Liveness check (returns version) |
//! | `GET`  | `/api/health/status` | Search and model backend status |
//! | `POST` | `/api/rag` | Retrieve context and generate an answer |
//! | `POST` | `/api/rag/stream` | Same, streamed as SSE |
//! | `POST` | `/api/generate` | Generate without retrieval |
//! | `POST` | `/api/generate/stream` | Same, streamed as SSE |
//! | `POST` | `/api/search` | Full ranked search results |
//! | `GET`  | `/api/context` | List context documents |
//! | `POST` | `/api/context` | Add a context document |
//! | `GET`  | `/api/context/{id}` | Fetch one document |
//! | `PUT`  | `/api/context/{id}` | Partially update a document |
//! | `DELETE` | `/api/context/{id}` | Delete a document |
//! | `POST` | `/api/context/create_mock_data` | Seed the sample corpus |
//! | `POST` | `/agents/run` | Answer with the search-tool agent |
//! | `POST` | `/agents/stream` | Stream the model's answer to the bare query |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `backend_error` (502),
//! `unavailable` (503).
//!
//! # Streaming
//!
//! Each SSE event is named after its kind and carries the JSON element as
//! data:
//!
//! ```text
//! event: chunk
//! data: {"kind":"chunk","text":"Artificial"}
//!
//! event: end
//! data: {"kind":"end"}
//! ```
//!
//! A stream ends with exactly one `end` or `error` event.

use std::convert::Infallible;

use anyhow::Context as _;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use rag_harness_core::admin::SeedMode;
use rag_harness_core::error::{
    AdminError, AgentError, GenerationError, PipelineCause, PipelineError, RequestError,
    StoreError,
};
use rag_harness_core::models::{ContextDocument, GenerationRequest, GenerationResult, SearchHit};
use rag_harness_core::pipeline::EventStream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::Services;
use crate::config::{Config, ServerConfig};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    services: Services,
    seed_mode: SeedMode,
}

/// Starts the HTTP server against the configured backends.
///
/// Binds to `[server].bind` and runs until Ctrl-C. When
/// `[seed].on_startup` is set, the sample corpus is seeded first; a
/// seeding failure is logged and does not prevent startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;

    if config.seed.on_startup {
        match services.admin.seed_sample_corpus(config.seed.mode).await {
            Ok(added) => info!(added = added.len(), "startup seeding complete"),
            Err(e) => warn!(error = %e, "startup seeding failed"),
        }
    }

    let app = router(config, services)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, "ragd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("ragd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Builds the application router around already-constructed services.
pub fn router(config: &Config, services: Services) -> anyhow::Result<Router> {
    let state = AppState {
        services,
        seed_mode: config.seed.mode,
    };

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/health/status", get(handle_health_status))
        .route("/api/rag", post(handle_rag))
        .route("/api/rag/stream", post(handle_rag_stream))
        .route("/api/generate", post(handle_generate))
        .route("/api/generate/stream", post(handle_generate_stream))
        .route("/api/search", post(handle_search))
        .route("/api/context", get(handle_list_context).post(handle_add_context))
        .route("/api/context/create_mock_data", post(handle_create_mock_data))
        .route(
            "/api/context/{id}",
            get(handle_get_context)
                .put(handle_update_context)
                .delete(handle_delete_context),
        )
        .route("/agents/run", post(handle_agent_run))
        .route("/agents/stream", post(handle_agent_stream))
        .layer(cors_layer(&config.server)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origin = if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o == "*")
    {
        AllowOrigin::from(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: &'static str,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Status and code for a store failure.
fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        StoreError::Write(_) | StoreError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
    }
}

fn generation_status(err: &GenerationError) -> (StatusCode, &'static str) {
    match err {
        GenerationError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        GenerationError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
    }
}

impl AppError {
    fn with(status: (StatusCode, &'static str), message: String) -> Self {
        Self {
            status: status.0,
            code: status.1,
            message,
        }
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        bad_request(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        bad_request(err.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::with(store_status(&err), err.to_string())
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        Self::with(generation_status(&err), err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err.cause {
            PipelineCause::Store(e) => store_status(e),
            PipelineCause::Generation(e) => generation_status(e),
        };
        Self::with(status, err.to_string())
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        Self::with(store_status(&err.source), err.to_string())
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::Tool(e) => store_status(e),
            AgentError::Model(e) => generation_status(e),
            AgentError::StepLimit(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
        };
        Self::with(status, err.to_string())
    }
}

// ============ Request / response bodies ============

#[derive(Deserialize)]
struct RagBody {
    query: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct AgentResponse {
    response: String,
}

#[derive(Deserialize)]
struct GenerateBody {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    generated_text: String,
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct ContextBody {
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct ContextPatchBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ContextListResponse {
    contexts: Vec<ContextDocument>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct BackendStatus {
    /// `"connected"` or `"error"`.
    status: &'static str,
    details: Value,
}

impl BackendStatus {
    fn from_check<E: std::fmt::Display>(check: Result<Value, E>) -> Self {
        match check {
            Ok(details) => Self {
                status: "connected",
                details,
            },
            Err(e) => Self {
                status: "error",
                details: Value::String(e.to_string()),
            },
        }
    }
}

#[derive(Serialize)]
struct HealthStatusResponse {
    search: BackendStatus,
    model: BackendStatus,
}

// ============ Handlers ============

async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the RAG Harness API" }))
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Checks both backends concurrently. Never fails; problems are reported
/// in the body.
async fn handle_health_status(State(state): State<AppState>) -> Json<HealthStatusResponse> {
    let (search, model) = tokio::join!(
        state.services.store.health(),
        state.services.generator.health()
    );
    Json(HealthStatusResponse {
        search: BackendStatus::from_check(search),
        model: BackendStatus::from_check(model),
    })
}

fn rag_request(state: &AppState, body: RagBody) -> Result<GenerationRequest, AppError> {
    Ok(GenerationRequest::new(
        body.query,
        body.model,
        &state.services.default_model,
    )?)
}

async fn handle_rag(
    State(state): State<AppState>,
    payload: Result<Json<RagBody>, JsonRejection>,
) -> Result<Json<GenerationResult>, AppError> {
    let Json(body) = payload?;
    let request = rag_request(&state, body)?;
    let result = state.services.rag.run(&request).await?;
    Ok(Json(result))
}

async fn handle_rag_stream(
    State(state): State<AppState>,
    payload: Result<Json<RagBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(body) = payload?;
    let request = rag_request(&state, body)?;
    Ok(sse(state.services.rag.run_stream(request)))
}

fn generate_request(state: &AppState, body: GenerateBody) -> Result<GenerationRequest, AppError> {
    Ok(GenerationRequest::new(
        body.prompt,
        body.model,
        &state.services.default_model,
    )?)
}

async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let Json(body) = payload?;
    let request = generate_request(&state, body)?;
    let generated_text = state
        .services
        .rag
        .generate(&request.query, &request.model)
        .await?;
    Ok(Json(GenerateResponse { generated_text }))
}

async fn handle_generate_stream(
    State(state): State<AppState>,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(body) = payload?;
    let request = generate_request(&state, body)?;
    Ok(sse(state
        .services
        .rag
        .generate_stream(request.query, request.model)))
}

async fn handle_agent_run(
    State(state): State<AppState>,
    payload: Result<Json<RagBody>, JsonRejection>,
) -> Result<Json<AgentResponse>, AppError> {
    let Json(body) = payload?;
    let request = rag_request(&state, body)?;
    let response = state.services.agent.run(&request).await?;
    Ok(Json(AgentResponse { response }))
}

async fn handle_agent_stream(
    State(state): State<AppState>,
    payload: Result<Json<RagBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(body) = payload?;
    let request = rag_request(&state, body)?;
    Ok(sse(state.services.agent.stream(request)))
}

/// Render pipeline events as named SSE events with JSON data.
///
/// The stream closes after the first `end` or `error` event.
fn sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = events
        .map(|event| event_payload(event.kind(), &event))
        .scan(false, |closed, (name, data)| {
            if *closed {
                return future::ready(None);
            }
            *closed = matches!(name, "end" | "error");
            future::ready(Some(Ok::<_, Infallible>(
                Event::default().event(name).data(data),
            )))
        });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Event name and JSON data. A payload that cannot be encoded is sent as
/// an `error` event.
fn event_payload<T: Serialize>(kind: &'static str, event: &T) -> (&'static str, String) {
    match serde_json::to_string(event) {
        Ok(data) => (kind, data),
        Err(err) => {
            warn!(error = %err, kind, "failed to encode stream event");
            let message = format!("failed to encode stream event: {}", err);
            ("error", json!({ "kind": "error", "message": message }).to_string())
        }
    }
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(body) = payload?;
    if body.query.trim().is_empty() {
        return Err(RequestError::EmptyQuery.into());
    }
    let results = state.services.rag.search(&body.query).await?;
    Ok(Json(SearchResponse { results }))
}

async fn handle_list_context(
    State(state): State<AppState>,
) -> Result<Json<ContextListResponse>, AppError> {
    let contexts = state.services.admin.list_all().await?;
    Ok(Json(ContextListResponse { contexts }))
}

async fn handle_add_context(
    State(state): State<AppState>,
    payload: Result<Json<ContextBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(body) = payload?;
    let id = state.services.admin.add(&body.title, &body.content).await?;
    Ok(Json(MessageResponse {
        message: "Context added successfully".to_string(),
        id: Some(id),
    }))
}

async fn handle_get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContextDocument>, AppError> {
    Ok(Json(state.services.admin.get(&id).await?))
}

async fn handle_update_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContextPatchBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(body) = payload?;
    if body.title.is_none() && body.content.is_none() {
        return Err(bad_request("update requires title or content"));
    }
    state
        .services
        .admin
        .update(&id, body.title, body.content)
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "Context {} updated successfully",
        id
    ))))
}

async fn handle_delete_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.services.admin.delete(&id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Context {} deleted successfully",
        id
    ))))
}

async fn handle_create_mock_data(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let added = state.services.admin.seed_sample_corpus(state.seed_mode).await?;
    Ok(Json(json!({
        "message": "Mock context data created successfully",
        "added": added.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_harness_core::models::StreamEvent;

    #[test]
    fn test_store_errors_map_to_status() {
        let err: AppError = StoreError::DocumentNotFound("x".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");

        let err: AppError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = StoreError::Write("rejected".into()).into();
        assert_eq!(err.code, "backend_error");
    }

    #[test]
    fn test_pipeline_error_uses_cause_status() {
        let err: AppError =
            PipelineError::generate(GenerationError::Unavailable("refused".into())).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.message.starts_with("generate stage failed"));
    }

    #[test]
    fn test_admin_error_keeps_operation_in_message() {
        let err: AppError = AdminError {
            operation: "delete",
            source: StoreError::DocumentNotFound("abc".into()),
        }
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "delete failed: document not found: abc");
    }

    #[test]
    fn test_event_payload_names_event_by_kind() {
        let event = StreamEvent::Chunk { text: "Hi".into() };
        let (name, data) = event_payload(event.kind(), &event);
        assert_eq!(name, "chunk");
        assert_eq!(data, r#"{"kind":"chunk","text":"Hi"}"#);
    }

    #[test]
    fn test_unencodable_payload_becomes_error_event() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), "non-string key");
        let (name, data) = event_payload("chunk", &bad);
        assert_eq!(name, "error");
        let parsed: StreamEvent = serde_json::from_str(&data).unwrap();
        assert!(matches!(parsed, StreamEvent::Error { .. }));
        assert!(parsed.is_terminal());
    }

    #[tokio::test]
    async fn test_sse_closes_after_terminal_event() {
        use futures_util::stream;

        let events: EventStream = stream::iter(vec![
            StreamEvent::Chunk { text: "a".into() },
            StreamEvent::Error {
                message: "boom".into(),
            },
            StreamEvent::Chunk { text: "late".into() },
        ])
        .boxed();
        let response = sse(events).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: error"));
        assert!(!text.contains("late"));
    }

    #[test]
    fn test_agent_error_status() {
        let err: AppError = AgentError::Tool(StoreError::Unavailable("down".into())).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        let err: AppError = AgentError::Model(GenerationError::Backend("bad".into())).into();
        assert_eq!(err.code, "backend_error");
        let err: AppError = AgentError::StepLimit(6).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_cors_origins() {
        assert!(cors_layer(&ServerConfig::default()).is_ok());
        let config = ServerConfig {
            bind: "127.0.0.1:0".into(),
            cors_origins: vec!["bad\norigin".into()],
        };
        assert!(cors_layer(&config).is_err());
    }
}
