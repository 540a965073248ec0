//! REST API server
//!
//! Exposes the chat service over HTTP for a chat front-end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::LedgerChatError;
use crate::session::{ChatService, SessionId};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    pub group_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: SessionId,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchGroupRequest {
    pub group_id: u64,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn failure(e: LedgerChatError) -> ApiResult {
    let status = match &e {
        LedgerChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        LedgerChatError::AuthError(_) => StatusCode::UNAUTHORIZED,
        LedgerChatError::TransportError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%status, error = %e, "Request failed");
    (status, Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ChatService>,
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn open_session(
    State(state): State<ApiState>,
    Json(req): Json<OpenSessionRequest>,
) -> ApiResult {
    info!(group_id = req.group_id, "Opening session");

    match state.service.open_session(req.group_id).await {
        Ok(info) => (StatusCode::CREATED, Json(ApiResponse::success(info))),
        Err(e) => failure(e),
    }
}

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message must not be empty".into())),
        );
    }

    match state.service.ask(req.session_id, &req.message).await {
        Ok(answer) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": req.session_id,
                "answer": answer,
            }))),
        ),
        Err(e) => failure(e),
    }
}

async fn switch_group(
    State(state): State<ApiState>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<SwitchGroupRequest>,
) -> ApiResult {
    match state.service.switch_group(session_id, req.group_id).await {
        Ok(info) => (StatusCode::OK, Json(ApiResponse::success(info))),
        Err(e) => failure(e),
    }
}

async fn session_history(
    State(state): State<ApiState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult {
    match state.service.history(session_id).await {
        Ok(turns) => (StatusCode::OK, Json(ApiResponse::success(turns))),
        Err(e) => failure(e),
    }
}

async fn close_session(
    State(state): State<ApiState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult {
    match state.service.close_session(session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "session_id": session_id }))),
        ),
        Err(e) => failure(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(service: Arc<ChatService>) -> Router {
    let state = ApiState { service };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:id", delete(close_session))
        .route("/api/sessions/:id/group", post(switch_group))
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    service: Arc<ChatService>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
