//! HTTP handlers for Parley server.
//!
//! This module maps verbs and paths onto chat operations and chat failures
//! onto status codes.

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parley_core::{
    ChatError, ChatService, MarkupSanitizer, Message, MessageId, Participant, ValidationPipeline,
};
use parley_protocol::{
    paths, ErrorBody, HealthResponse, LimitError, ListQuery, MessageRequest, RegisterRequest,
    USER_HEADER,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The chat engine.
    pub chat: ChatService,
}

impl AppState {
    /// Create new app state over in-process backends.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let validation =
            ValidationPipeline::new(Arc::new(MarkupSanitizer), config.validation_limits());
        Self {
            chat: ChatService::in_memory(validation),
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            paths::PARTICIPANTS,
            post(register_participant).get(list_participants),
        )
        .route(paths::MESSAGES, post(send_message).get(list_messages))
        .route(paths::MESSAGE, put(update_message).delete(delete_message))
        .route(paths::STATUS, post(heartbeat))
        .route(paths::HEALTH, get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(&config));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Parley server listening on {}", addr);

    let sweeper = state.chat.sweeper(config.sweeper()).start();

    let served = axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    info!("Parley server stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// A failed request.
#[derive(Debug)]
pub enum ApiError {
    /// A chat operation failed.
    Chat(ChatError),
    /// The path id is not a message id.
    UnknownMessage(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl From<LimitError> for ApiError {
    fn from(err: LimitError) -> Self {
        Self::Chat(ChatError::Validation(vec![err.to_string()]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Chat(err) => {
                metrics::record_error(err.kind());
                if let ChatError::Internal(cause) = &err {
                    error!(error = %cause, "Internal failure");
                } else {
                    debug!(error = %err, "Request rejected");
                }

                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(ErrorBody::from_error(&err))).into_response()
            }
            ApiError::UnknownMessage(raw) => {
                metrics::record_error("message_not_found");
                let body = ErrorBody::Message {
                    error: format!("Message not found: {raw}"),
                };
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
        }
    }
}

/// The claimed identity of the caller.
///
/// The header is read as raw UTF-8 so names outside ASCII can be claimed.
fn requester(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_HEADER)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
}

fn message_id(raw: &str) -> Result<MessageId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::UnknownMessage(raw.to_string()))
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::ok(env!("CARGO_PKG_VERSION")))
}

async fn register_participant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Participant>), ApiError> {
    let participant = state
        .chat
        .register_participant(body.name.as_deref())
        .await?;
    metrics::record_registration();
    Ok((StatusCode::CREATED, Json(participant)))
}

async fn list_participants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    let participants = state.chat.list_participants().await?;
    metrics::set_live_participants(participants.len());
    Ok(Json(participants))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .chat
        .send_message(requester(&headers), &body.into_raw())
        .await?;
    metrics::record_message(message.kind.as_str());
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let limit = query.limit()?;
    let messages = state
        .chat
        .list_messages(requester(&headers), limit)
        .await?;
    Ok(Json(messages))
}

async fn update_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MessageRequest>,
) -> Result<StatusCode, ApiError> {
    let id = message_id(&id)?;
    state
        .chat
        .update_message(id, requester(&headers), &body.into_raw())
        .await?;
    Ok(StatusCode::OK)
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = message_id(&id)?;
    state.chat.delete_message(id, requester(&headers)).await?;
    Ok(StatusCode::OK)
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state.chat.heartbeat(requester(&headers)).await?;
    metrics::record_heartbeat();
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(Arc::new(AppState::new(&Config::default())))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let value = axum::http::HeaderValue::from_bytes(user.as_bytes()).unwrap();
            builder = builder.header(USER_HEADER, value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_scenario() {
        let app = test_app();

        let (status, body) = call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Alice");

        let (status, _) = call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, sent) = call(
            &app,
            "POST",
            "/messages",
            Some("Alice"),
            Some(json!({"to": "Todos", "text": "hi", "type": "message"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = sent["id"].as_u64().unwrap();

        let (status, listed) = call(&app, "GET", "/messages", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = listed.as_array().unwrap().clone();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["type"], "status");
        assert_eq!(listed[1]["text"], "hi");

        let uri = format!("/messages/{id}");
        let (status, _) = call(&app, "DELETE", &uri, Some("Bob"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "DELETE", &uri, Some("Alice"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(&app, "GET", "/messages", Some("Alice"), None).await;
        assert!(listed
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["id"].as_u64() != Some(id)));
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let app = test_app();
        let (status, body) = call(&app, "POST", "/participants", None, Some(json!({"name": "<b>Al</b>"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"errors": ["name must be at least 3 characters long"]}));
    }

    #[tokio::test]
    async fn test_list_participants() {
        let app = test_app();
        call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        call(&app, "POST", "/participants", None, Some(json!({"name": "Bob"}))).await;

        let (status, body) = call(&app, "GET", "/participants", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert!(body[0]["lastStatus"].is_u64());
    }

    #[tokio::test]
    async fn test_send_from_unknown_user() {
        let app = test_app();
        let (status, body) = call(
            &app,
            "POST",
            "/messages",
            None,
            Some(json!({"to": "Todos", "text": "hi", "type": "message"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"errors": ["invalid user"]}));
    }

    #[tokio::test]
    async fn test_list_messages_limit() {
        let app = test_app();
        call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        for text in ["one", "two", "three"] {
            call(
                &app,
                "POST",
                "/messages",
                Some("Alice"),
                Some(json!({"to": "Todos", "text": text, "type": "message"})),
            )
            .await;
        }

        let (status, body) = call(&app, "GET", "/messages?limit=2", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let texts: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, ["two", "three"]);

        let (status, body) = call(&app, "GET", "/messages?limit=abc", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"errors": ["limit must be a positive integer"]}));

        let (status, _) = call(&app, "GET", "/messages", Some("Ghost"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_update_message() {
        let app = test_app();
        call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        call(&app, "POST", "/participants", None, Some(json!({"name": "Bob"}))).await;
        let (_, sent) = call(
            &app,
            "POST",
            "/messages",
            Some("Alice"),
            Some(json!({"to": "Todos", "text": "hi", "type": "message"})),
        )
        .await;
        let uri = format!("/messages/{}", sent["id"]);
        let edit = json!({"to": "Todos", "text": "hello", "type": "message"});

        let (status, _) = call(&app, "PUT", &uri, Some("Bob"), Some(edit.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "PUT", "/messages/999", Some("Alice"), Some(edit.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "PUT", &uri, Some("Alice"), Some(json!({"to": "Todos"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&app, "PUT", &uri, Some("Alice"), Some(edit)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(&app, "GET", "/messages", Some("Bob"), None).await;
        assert!(listed
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["text"] == "hello"));
    }

    #[tokio::test]
    async fn test_unparsable_message_id() {
        let app = test_app();
        let (status, body) = call(&app, "DELETE", "/messages/not-an-id", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Message not found: not-an-id"}));
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let app = test_app();
        let (status, _) = call(&app, "POST", "/status", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(&app, "POST", "/participants", None, Some(json!({"name": "Alice"}))).await;
        let (status, _) = call(&app, "POST", "/status", Some("Alice"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_ascii_identity() {
        let app = test_app();

        let (status, _) = call(&app, "POST", "/participants", None, Some(json!({"name": "João"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, sent) = call(
            &app,
            "POST",
            "/messages",
            Some("João"),
            Some(json!({"to": "Todos", "text": "olá", "type": "message"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["from"], "João");

        let (status, _) = call(&app, "POST", "/status", Some("João"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, listed) = call(&app, "GET", "/messages", Some("João"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }
}
