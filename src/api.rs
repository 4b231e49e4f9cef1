//! HTTP handlers: thin translation between the wire and the state layer.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::auth;
use crate::error::ApiError;
use crate::messages::RangeQuery;
use crate::state::AppState;
use crate::types::{Message, MessageId};

const DEFAULT_PAGE_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub agent_id: String,
    pub name: String,
    /// Shown exactly once; the server never returns it again
    pub credential: String,
}

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let (agent, credential) = state
        .register_agent(addr.ip(), &body.name, body.avatar)
        .await?;

    Ok(Json(RegisterResponse {
        agent_id: agent.id,
        name: agent.name,
        credential,
    }))
}

/// GET /stream: the long-lived SSE feed.
///
/// The first frame is always the history replay; message and stats events
/// follow until the client disconnects or its queue backs up.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (guard, rx) = state.open_feed(addr.ip()).await?;

    let stream = ReceiverStream::new(rx).map(move |frame| {
        // The guard lives inside the stream; dropping the stream on
        // disconnect deregisters the connection
        let _ = &guard;
        Ok::<_, Infallible>(Event::default().event(frame.event).data(frame.data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// POST /messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let agent = auth::require_agent(&state, &headers).await?;
    let message = state.post_message(&agent, &body.content).await?;
    Ok(Json(json!({ "message": message })))
}

/// Raw query params for GET /messages; cursors arrive as strings so a
/// non-numeric value can be rejected with 400 instead of axum's default.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// GET /messages?limit&before&after
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let range = parse_range(&query, DEFAULT_PAGE_LIMIT)?;
    let messages = state.list_messages(range).await;
    Ok(Json(MessagesResponse { messages }))
}

pub(crate) fn parse_range(
    query: &MessagesQuery,
    default_limit: usize,
) -> Result<RangeQuery, ApiError> {
    let limit = match &query.limit {
        Some(raw) => parse_cursor(raw, "limit")? as usize,
        None => default_limit,
    };
    let before = query
        .before
        .as_deref()
        .map(|raw| parse_cursor(raw, "before"))
        .transpose()?;
    let after = query
        .after
        .as_deref()
        .map(|raw| parse_cursor(raw, "after"))
        .transpose()?;

    if before.is_some() && after.is_some() {
        return Err(ApiError::Validation(
            "specify at most one of 'before' and 'after'".to_string(),
        ));
    }

    Ok(RangeQuery {
        before,
        after,
        limit: limit.max(1),
    })
}

fn parse_cursor(raw: &str, field: &str) -> Result<MessageId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("'{field}' must be a non-negative integer")))
}

/// GET /agents
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Value> {
    let agents = state
        .directory
        .list_online(state.config.presence_timeout)
        .await;
    let stats = state.stats().await;
    Json(json!({ "agents": agents, "stats": stats }))
}

/// POST /heartbeat: authentication itself refreshes presence.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let agent = auth::require_agent(&state, &headers).await?;
    Ok(Json(json!({ "ok": true, "agentId": agent.id })))
}

/// POST /disconnect: explicit presence clear.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let agent = auth::require_agent(&state, &headers).await?;
    state.directory.mark_offline(&agent.id).await;
    tracing::info!(agent = %agent.name, "agent disconnected");
    Ok(Json(json!({ "ok": true })))
}

/// GET /health: mounted outside the admission middleware.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>, before: Option<&str>, after: Option<&str>) -> MessagesQuery {
        MessagesQuery {
            limit: limit.map(String::from),
            before: before.map(String::from),
            after: after.map(String::from),
        }
    }

    #[test]
    fn test_parse_range_defaults() {
        let range = parse_range(&query(None, None, None), 50).unwrap();
        assert_eq!(range.limit, 50);
        assert!(range.before.is_none());
        assert!(range.after.is_none());
    }

    #[test]
    fn test_parse_range_cursors() {
        let range = parse_range(&query(Some("10"), None, Some("7")), 50).unwrap();
        assert_eq!(range.limit, 10);
        assert_eq!(range.after, Some(7));
    }

    #[test]
    fn test_non_numeric_cursor_rejected() {
        assert!(matches!(
            parse_range(&query(None, Some("abc"), None), 50),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            parse_range(&query(Some("-3"), None, None), 50),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_both_cursors_rejected() {
        assert!(matches!(
            parse_range(&query(None, Some("5"), Some("2")), 50),
            Err(ApiError::Validation(_))
        ));
    }
}
