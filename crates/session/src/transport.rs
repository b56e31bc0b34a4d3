//! Streaming transport — the three verbs C9 exposes on the protected route:
//! POST (request-response), GET (resume/SSE), DELETE (terminate).
//!
//! Grounded in the MCP Streamable HTTP transport shape referenced by
//! SPEC_FULL.md's component notes (`agentgateway`'s `mcp/sse.rs` uses the
//! same `axum::response::sse` primitives for the resume path).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream;
use serde::{Deserialize, Serialize};
use vaultgate_core::tool::ToolCall;

use crate::manager::{SessionError, TransportSessionManager, SESSION_HEADER};

pub fn router(manager: Arc<TransportSessionManager>) -> Router {
    Router::new()
        .route("/", post(handle_request).get(handle_resume).delete(handle_terminate))
        .with_state(manager)
}

#[derive(Deserialize)]
struct ToolCallRequest {
    id: String,
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    error_description: String,
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_request(
    State(manager): State<Arc<TransportSessionManager>>,
    headers: HeaderMap,
    Json(body): Json<ToolCallRequest>,
) -> Response {
    let session = match session_id_from(&headers).and_then(|id| manager.get(&id)) {
        Some(session) => session,
        None => match manager.create() {
            Ok(session) => session,
            Err(SessionError::CapacityReached) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody {
                        error: "server_error",
                        error_description: "session capacity reached".into(),
                    }),
                )
                    .into_response()
            }
            Err(SessionError::NotFound) => unreachable!("create() cannot return NotFound"),
        },
    };

    let call = ToolCall {
        id: body.id,
        name: body.name,
        arguments: body.arguments,
    };
    let result = session.tools.execute(&call).await;

    let mut response = Json(result).into_response();
    response
        .headers_mut()
        .insert(SESSION_HEADER, session.id.parse().unwrap());
    response
}

async fn handle_resume(
    State(manager): State<Arc<TransportSessionManager>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request",
                error_description: format!("missing {SESSION_HEADER} header"),
            }),
        )
            .into_response();
    };

    let Some(session) = manager.get(&session_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request",
                error_description: "unknown or expired session".into(),
            }),
        )
            .into_response();
    };

    let stream = stream::once(async move {
        Ok::<Event, Infallible>(Event::default().event("resumed").data(session.id.clone()))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

async fn handle_terminate(
    State(manager): State<Arc<TransportSessionManager>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request",
                error_description: format!("missing {SESSION_HEADER} header"),
            }),
        )
            .into_response();
    };

    if manager.terminate(&session_id) {
        StatusCode::OK.into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request",
                error_description: "unknown or expired session".into(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tower::ServiceExt;
    use vaultgate_vcs::{CoordinatorConfig, DebouncedCommitCoordinator};

    fn test_manager() -> Arc<TransportSessionManager> {
        let dir = tempfile::tempdir().unwrap();
        let vault_root = dir.path().to_path_buf();
        std::mem::forget(dir);
        let coordinator = DebouncedCommitCoordinator::new(CoordinatorConfig {
            vault_path: vault_root.clone(),
            remote_url: "https://example.com/vault.git".into(),
            remote_branch: "main".into(),
            user_name: "vaultgate".into(),
            user_email: "vaultgate@example.com".into(),
            debounce: StdDuration::from_secs(3600),
            secret_env_vars: vec![],
        });
        Arc::new(TransportSessionManager::new(vault_root, coordinator, 10))
    }

    #[tokio::test]
    async fn post_without_session_header_creates_one() {
        let app = router(test_manager());
        let body = serde_json::json!({"id": "1", "name": "tags", "arguments": {}});
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SESSION_HEADER));
    }

    #[tokio::test]
    async fn resume_without_session_header_is_rejected() {
        let app = router(test_manager());
        let req = axum::http::Request::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn terminate_unknown_session_is_rejected() {
        let app = router(test_manager());
        let req = axum::http::Request::builder()
            .method("DELETE")
            .uri("/")
            .header(SESSION_HEADER, "nope")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn terminate_known_session_succeeds() {
        let manager = test_manager();
        let session = manager.create().unwrap();
        let app = router(manager);
        let req = axum::http::Request::builder()
            .method("DELETE")
            .uri("/")
            .header(SESSION_HEADER, session.id.clone())
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
