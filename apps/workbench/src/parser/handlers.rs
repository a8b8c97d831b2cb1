//! Axum route handlers for the message parsing API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::parser::ParseOutput;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Body of a parse call: the full text of the message so far, not a delta.
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub cleared_messages: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/messages/:message_id/parse
///
/// Returns the cleaned display text of the whole message plus the events
/// produced by this chunk. Closed actions are dispatched as a side effect.
pub async fn handle_parse(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseOutput>, AppError> {
    validate_message_id(&message_id)?;
    let output = state.parser.lock().parse(&message_id, &request.text);
    Ok(Json(output))
}

/// POST /api/v1/messages/:message_id/finish
///
/// Last chunk of a stream. Held-back text that never became a tag is released.
pub async fn handle_finish(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseOutput>, AppError> {
    validate_message_id(&message_id)?;
    let output = state.parser.lock().finish(&message_id, &request.text);
    Ok(Json(output))
}

/// DELETE /api/v1/messages/:message_id
pub async fn handle_forget(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.parser.lock().forget(&message_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Message {message_id} is not tracked")))
    }
}

/// POST /api/v1/parser/reset
///
/// Starts a fresh turn: parser state, dispatch queues and the artifact store
/// are all cleared.
pub async fn handle_reset(State(state): State<AppState>) -> Json<ResetResponse> {
    let cleared_messages = {
        let mut parser = state.parser.lock();
        let count = parser.message_count();
        parser.reset();
        count
    };
    state.dispatcher.clear();
    state.store.clear();
    info!("Parser reset ({cleared_messages} messages cleared)");

    Json(ResetResponse { cleared_messages })
}

fn validate_message_id(message_id: &str) -> Result<(), AppError> {
    if message_id.trim().is_empty() {
        return Err(AppError::Validation("message_id cannot be empty".to_string()));
    }
    Ok(())
}
