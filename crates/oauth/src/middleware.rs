//! Bearer token middleware — C8. Guards every protected route: extracts
//! `Authorization: Bearer <token>`, verifies it against the access-token
//! issuer, and rejects with a spec-compliant `WWW-Authenticate` challenge on
//! any failure so clients can discover the protected-resource metadata and
//! restart the OAuth dance.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::OAuthState;
use crate::token::AccessTokenClaims;

/// spec.md §4.8: "the protocol does not distinguish callers beyond
/// authorization" — a valid bearer token authorizes all tools equally, so
/// the middleware deliberately does not inject the verified claims into
/// request extensions for downstream handlers to consume.
pub async fn require_bearer_token(
    State(state): State<Arc<OAuthState>>,
    request: Request,
    next: Next,
) -> Response {
    match extract_and_verify(&state, &request) {
        Some(_claims) => next.run(request).await,
        None => unauthorized(&state),
    }
}

fn extract_and_verify(state: &Arc<OAuthState>, request: &Request) -> Option<AccessTokenClaims> {
    let header_value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header_value.strip_prefix("Bearer ")?;
    state.tokens.verify(token)
}

fn unauthorized(state: &Arc<OAuthState>) -> Response {
    let challenge = format!(
        "Bearer resource_metadata=\"{}{}\"",
        state.server_url,
        OAuthState::discovery_path()
    );
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, challenge.parse().unwrap());
    response
}
