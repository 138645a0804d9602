//! HTTP request handlers

use super::stream::fragment_response;
use super::types::{
    ChatBody, Envelope, ModelBody, ModelInfo, ModelsData, SystemPromptBody, ToolsBody,
};
use super::AppState;
use crate::llm;
use crate::session::{SessionError, SessionState, SessionSummary};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session operations
        .route("/api/session/:id/chat", post(send_chat))
        .route("/api/session/:id/messages", get(get_messages))
        .route("/api/session/:id/model", post(update_model))
        .route("/api/session/:id/system-prompt", post(update_system_prompt))
        .route("/api/session/:id/tools", post(update_tools))
        .route("/api/session/:id/clear", delete(clear_session))
        // Listings
        .route("/api/sessions", get(list_sessions))
        .route("/api/models", get(list_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Operations
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let session = state.sessions.handle(&id).await;

    if body.stream {
        let fragments = session.chat_streaming(body.message, body.model).await?;
        Ok(fragment_response(fragments))
    } else {
        let snapshot = session.chat_buffered(body.message, body.model).await?;
        Ok(Json(Envelope::ok(snapshot)).into_response())
    }
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<SessionState>>, ApiError> {
    let snapshot = state.sessions.handle(&id).await.state().await?;
    Ok(Json(Envelope::ok(snapshot)))
}

async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ModelBody>, JsonRejection>,
) -> Result<Json<Envelope<SessionState>>, ApiError> {
    let Json(body) = payload?;
    let snapshot = state
        .sessions
        .handle(&id)
        .await
        .update_model(body.model)
        .await?;
    Ok(Json(Envelope::ok(snapshot)))
}

async fn update_system_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SystemPromptBody>, JsonRejection>,
) -> Result<Json<Envelope<SessionState>>, ApiError> {
    let Json(body) = payload?;
    let snapshot = state
        .sessions
        .handle(&id)
        .await
        .update_system_prompt(body.system_prompt)
        .await?;
    Ok(Json(Envelope::ok(snapshot)))
}

async fn update_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ToolsBody>, JsonRejection>,
) -> Result<Json<Envelope<SessionState>>, ApiError> {
    let Json(body) = payload?;
    let snapshot = state
        .sessions
        .handle(&id)
        .await
        .update_tools(body.tools)
        .await?;
    Ok(Json(Envelope::ok(snapshot)))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<SessionState>>, ApiError> {
    let snapshot = state.sessions.handle(&id).await.clear().await?;
    Ok(Json(Envelope::ok(snapshot)))
}

// ============================================================
// Listings
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
) -> Json<Envelope<Vec<SessionSummary>>> {
    Json(Envelope::ok(state.sessions.list().await))
}

async fn list_models() -> Json<Envelope<ModelsData>> {
    let models = llm::catalog()
        .iter()
        .map(|m| ModelInfo {
            id: m.id.to_string(),
            display_name: m.display_name.to_string(),
        })
        .collect();

    Json(Envelope::ok(ModelsData {
        models,
        default: llm::DEFAULT_MODEL.to_string(),
    }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("colloquy ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

/// Handler-level failure, mapped onto a status plus error envelope
pub enum ApiError {
    Session(SessionError),
    Malformed(String),
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        Self::Session(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Session(error) => {
                let status = match &error {
                    SessionError::EmptyInput | SessionError::InvalidConfig(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    SessionError::Busy => StatusCode::CONFLICT,
                    SessionError::Backend(_) => StatusCode::BAD_GATEWAY,
                    SessionError::Closed => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
            ApiError::Malformed(message) => {
                tracing::warn!(error = %message, "rejected malformed payload");
                (StatusCode::BAD_REQUEST, message)
            }
        };

        (status, Json(Envelope::error(message))).into_response()
    }
}
