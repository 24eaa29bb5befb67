//! Chat handlers
//!
//! Single-shot and streaming message exchange plus session listing,
//! history retrieval, and deletion. Every endpoint serves both
//! anonymous and bearer-authenticated callers; the viewer identity
//! scopes which sessions are visible.

use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use cortexify_common::{
    auth::MaybeAuthContext,
    db::models::{ChatMessage, ChatSession},
    errors::Result,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000, message = "Message must be 1-8000 characters"))]
    pub message: String,

    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub ai_message: String,
    pub user_message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Exchange one message for a complete assistant reply
///
/// POST /api/chat
#[instrument(skip(state, auth, request), fields(session_id = ?request.session_id))]
pub async fn send_message(
    State(state): State<AppState>,
    auth: MaybeAuthContext,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate()?;

    let exchange = state
        .chat
        .send_message(request.session_id, auth.user_id(), request.message)
        .await?;

    Ok(Json(ChatResponse {
        session_id: exchange.session_id,
        ai_message: exchange.ai_message.message,
        user_message: exchange.user_message.message,
    }))
}

/// Exchange one message for a streamed assistant reply.
///
/// POST /api/chat/stream
///
/// Server-sent events: each token arrives as `{"token": "..."}` and a
/// final `[DONE]` marker closes the stream.
#[instrument(skip(state, auth, request), fields(session_id = ?request.session_id))]
pub async fn stream_message(
    State(state): State<AppState>,
    auth: MaybeAuthContext,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    request.validate()?;

    let tokens = state
        .chat
        .stream_message(request.session_id, auth.user_id(), request.message)
        .await?;

    let events = event_payloads(tokens).map(|payload| Ok(Event::default().data(payload)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE data payloads for a token stream: one `{"token": ...}` object
/// per token, closed by a `[DONE]` marker
fn event_payloads(
    tokens: cortexify_common::llm::TokenStream,
) -> impl Stream<Item = String> + Send {
    tokens
        .filter_map(|token| async move { token.ok() })
        .map(|token| json!({ "token": token }).to_string())
        .chain(stream::once(async { "[DONE]".to_string() }))
}

/// Sessions visible to the caller, most recently updated first
///
/// GET /api/chat/sessions
#[instrument(skip(state, auth))]
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: MaybeAuthContext,
) -> Result<Json<Vec<ChatSession>>> {
    let sessions = state.chat.list_sessions(auth.user_id()).await?;
    Ok(Json(sessions))
}

/// Message history of one session, oldest first
///
/// GET /api/chat/session/{session_id}
#[instrument(skip(state, auth))]
pub async fn get_history(
    State(state): State<AppState>,
    auth: MaybeAuthContext,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>> {
    let messages = state.chat.get_history(&session_id, auth.user_id()).await?;
    Ok(Json(messages))
}

/// Delete a session and its messages
///
/// DELETE /api/chat/session/{session_id}
#[instrument(skip(state, auth))]
pub async fn delete_session(
    State(state): State<AppState>,
    auth: MaybeAuthContext,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.chat.delete_session(&session_id, auth.user_id()).await?;

    Ok(Json(DeleteResponse {
        message: "Session deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_rejects_empty_message() {
        let request = ChatRequest {
            message: String::new(),
            session_id: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_chat_request_rejects_oversized_message() {
        let request = ChatRequest {
            message: "a".repeat(8001),
            session_id: Some("s1".to_string()),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_chat_request_accepts_plain_message() {
        let request = ChatRequest {
            message: "Hello there".to_string(),
            session_id: None,
        };
        assert!(request.validate().is_ok());
    }

    fn token_stream(
        items: Vec<cortexify_common::errors::Result<String>>,
    ) -> cortexify_common::llm::TokenStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_event_payloads_frame_tokens_and_done_marker() {
        let tokens = token_stream(vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
        let payloads: Vec<String> = event_payloads(tokens).collect().await;

        assert_eq!(
            payloads,
            vec![
                r#"{"token":"Hel"}"#.to_string(),
                r#"{"token":"lo"}"#.to_string(),
                "[DONE]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_event_payloads_escape_token_content() {
        let tokens = token_stream(vec![Ok("line\"one\"\n".to_string())]);
        let payloads: Vec<String> = event_payloads(tokens).collect().await;

        assert_eq!(payloads[0], r#"{"token":"line\"one\"\n"}"#);
        assert_eq!(payloads.last().unwrap(), "[DONE]");
    }

    #[tokio::test]
    async fn test_event_payloads_empty_stream_still_closes() {
        let payloads: Vec<String> = event_payloads(token_stream(vec![])).collect().await;
        assert_eq!(payloads, vec!["[DONE]".to_string()]);
    }
}
