//! OAuth Endpoint Handlers — C7. Discovery, dynamic client registration,
//! authorize, federated callback, and token exchange.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};

use crate::client::{AuthMethod, GrantType, RegisterParams, ResponseType};
use crate::error::OAuthError;
use crate::federation::FederationSessionPayload;
use crate::pkce;
use crate::state::OAuthState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.code(),
            error_description: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<OAuthState>) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route("/oauth/register", post(register))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/github/callback", get(federated_callback))
        .route("/oauth/token", post(token))
        .with_state(state)
}

// --- Discovery -------------------------------------------------------------

#[derive(Serialize)]
struct ProtectedResourceMetadata {
    resource: String,
    authorization_servers: Vec<String>,
}

async fn protected_resource_metadata(State(state): State<Arc<OAuthState>>) -> Json<ProtectedResourceMetadata> {
    Json(ProtectedResourceMetadata {
        resource: state.server_url.clone(),
        authorization_servers: vec![state.server_url.clone()],
    })
}

#[derive(Serialize)]
struct AuthorizationServerMetadata {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    registration_endpoint: String,
    response_types_supported: Vec<&'static str>,
    grant_types_supported: Vec<&'static str>,
    token_endpoint_auth_methods_supported: Vec<&'static str>,
    code_challenge_methods_supported: Vec<&'static str>,
}

async fn authorization_server_metadata(
    State(state): State<Arc<OAuthState>>,
) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata {
        issuer: state.server_url.clone(),
        authorization_endpoint: format!("{}/oauth/authorize", state.server_url),
        token_endpoint: format!("{}/oauth/token", state.server_url),
        registration_endpoint: format!("{}/oauth/register", state.server_url),
        response_types_supported: vec!["code"],
        grant_types_supported: vec!["authorization_code", "refresh_token"],
        token_endpoint_auth_methods_supported: vec!["client_secret_post", "none"],
        code_challenge_methods_supported: vec!["S256"],
    })
}

// --- Registration -----------------------------------------------------------

#[derive(Deserialize)]
struct RegisterRequest {
    client_name: String,
    redirect_uris: Vec<String>,
    #[serde(default)]
    grant_types: Option<Vec<String>>,
    #[serde(default)]
    response_types: Option<Vec<String>>,
    #[serde(default)]
    token_endpoint_auth_method: Option<String>,
}

async fn register(
    State(state): State<Arc<OAuthState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, OAuthError> {
    let grant_types = parse_grant_types(req.grant_types.unwrap_or_else(|| vec!["authorization_code".into()]))?;
    let response_types = parse_response_types(req.response_types.unwrap_or_else(|| vec!["code".into()]))?;
    let auth_method = match req.token_endpoint_auth_method.as_deref() {
        None | Some("client_secret_post") => AuthMethod::ConfidentialPost,
        Some("none") => AuthMethod::Public,
        Some(other) => {
            return Err(OAuthError::InvalidRequest(format!(
                "unsupported token_endpoint_auth_method: {other}"
            )))
        }
    };

    let client = state.clients.register(RegisterParams {
        client_name: req.client_name,
        redirect_uris: req.redirect_uris,
        grant_types,
        response_types,
        auth_method,
    })?;

    Ok((StatusCode::CREATED, Json(client)).into_response())
}

fn parse_grant_types(raw: Vec<String>) -> Result<Vec<GrantType>, OAuthError> {
    raw.into_iter()
        .map(|g| match g.as_str() {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(OAuthError::InvalidRequest(format!("unsupported grant_type: {other}"))),
        })
        .collect()
}

fn parse_response_types(raw: Vec<String>) -> Result<Vec<ResponseType>, OAuthError> {
    raw.into_iter()
        .map(|r| match r.as_str() {
            "code" => Ok(ResponseType::Code),
            other => Err(OAuthError::InvalidRequest(format!("unsupported response_type: {other}"))),
        })
        .collect()
}

// --- Authorize ---------------------------------------------------------------

#[derive(Deserialize)]
struct AuthorizeParams {
    response_type: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
}

async fn authorize(
    State(state): State<Arc<OAuthState>>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, OAuthError> {
    let response_type = params
        .response_type
        .ok_or_else(|| OAuthError::InvalidRequest("missing response_type".into()))?;
    let client_id = params
        .client_id
        .ok_or_else(|| OAuthError::InvalidRequest("missing client_id".into()))?;
    let redirect_uri = params
        .redirect_uri
        .ok_or_else(|| OAuthError::InvalidRequest("missing redirect_uri".into()))?;
    let state_param = params
        .state
        .ok_or_else(|| OAuthError::InvalidRequest("missing state".into()))?;
    let code_challenge = params
        .code_challenge
        .ok_or_else(|| OAuthError::InvalidRequest("missing code_challenge".into()))?;
    let code_challenge_method = params
        .code_challenge_method
        .ok_or_else(|| OAuthError::InvalidRequest("missing code_challenge_method".into()))?;

    if response_type != "code" {
        return Err(OAuthError::InvalidRequest("response_type must be 'code'".into()));
    }
    if code_challenge_method != "S256" {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be 'S256'".into(),
        ));
    }

    let client = state
        .clients
        .get_client(&client_id)
        .ok_or_else(|| OAuthError::InvalidRequest("unknown client_id".into()))?;

    if !client.redirect_uris.iter().any(|u| u == &redirect_uri) {
        return Err(OAuthError::InvalidRequest(
            "redirect_uri does not match a registered URI".into(),
        ));
    }

    let session_key = state
        .federation
        .create(FederationSessionPayload {
            client_id,
            redirect_uri,
            state: state_param,
            code_challenge,
            code_challenge_method,
        })
        .ok_or_else(|| OAuthError::ServerError("Too many pending authorization sessions".into()))?;

    let idp_url = format!(
        "{}?client_id={}&scope={}&state={}&redirect_uri={}/oauth/github/callback",
        state.idp.authorize_url(),
        urlencoding_component(&idp_client_id(&state)),
        urlencoding_component(crate::federated_idp::FEDERATED_SCOPE),
        urlencoding_component(&session_key),
        urlencoding_component(&state.server_url),
    );

    Ok(Redirect::to(&idp_url))
}

/// The GitHub-issued client id is embedded in the idp client's internal
/// oauth2 `BasicClient`, which doesn't expose it back out; the config layer
/// also hands it to `OAuthState` indirectly via the idp client's
/// construction, so thread it through explicitly instead of re-parsing.
fn idp_client_id(state: &Arc<OAuthState>) -> String {
    state.idp.client_id().to_string()
}

fn urlencoding_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

// --- Federated callback -------------------------------------------------------

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: String,
    error: Option<String>,
}

async fn federated_callback(
    State(state): State<Arc<OAuthState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, OAuthError> {
    let session = state
        .federation
        .consume(&params.state)
        .ok_or_else(|| OAuthError::InvalidRequest("invalid or expired session".into()))?;

    if let Some(provider_error) = params.error {
        tracing::warn!(error = %provider_error, "federated provider returned an error");
        return Ok(deny_redirect(&session));
    }

    let Some(code) = params.code else {
        return Ok(deny_redirect(&session));
    };

    let user_login = match state.idp.exchange_and_fetch_user(&code).await {
        Ok(login) => login,
        Err(e) => {
            tracing::error!(error = %e, "federated token exchange failed");
            return Ok(deny_redirect(&session));
        }
    };

    if !state.allowed_users.iter().any(|u| u == &user_login) {
        vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::AllowlistDenied {
            federated_user: &user_login,
        });
        return Ok(deny_redirect(&session));
    }

    let code = state.grants.issue_authorization_code(
        &session.client_id,
        &session.redirect_uri,
        &session.code_challenge,
    );
    vaultgate_security::record_audit_event(
        &vaultgate_security::AuditEvent::AuthorizationCodeIssued {
            client_id: &session.client_id,
        },
    );

    let redirect_url = format!(
        "{}?code={}&state={}",
        session.redirect_uri,
        urlencoding_component(&code),
        urlencoding_component(&session.state),
    );
    Ok(Redirect::to(&redirect_url))
}

fn deny_redirect(session: &FederationSessionPayload) -> Redirect {
    let url = format!(
        "{}?error=access_denied&error_description=User+not+authorized&state={}",
        session.redirect_uri,
        urlencoding_component(&session.state),
    );
    Redirect::to(&url)
}

// --- Token ---------------------------------------------------------------

#[derive(Deserialize)]
struct TokenRequest {
    grant_type: String,
    code: Option<String>,
    redirect_uri: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    code_verifier: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
}

async fn token(
    State(state): State<Arc<OAuthState>>,
    Form(req): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let response = match req.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, req).await?,
        "refresh_token" => refresh_token_grant(&state, req).await?,
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    let mut http_response = (StatusCode::OK, Json(response)).into_response();
    http_response
        .headers_mut()
        .insert(header::CACHE_CONTROL, "no-store".parse().unwrap());
    Ok(http_response)
}

async fn authorization_code_grant(
    state: &Arc<OAuthState>,
    req: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let code = req
        .code
        .ok_or_else(|| OAuthError::InvalidRequest("missing code".into()))?;
    let redirect_uri = req
        .redirect_uri
        .ok_or_else(|| OAuthError::InvalidRequest("missing redirect_uri".into()))?;
    let client_id = req
        .client_id
        .ok_or_else(|| OAuthError::InvalidRequest("missing client_id".into()))?;
    let code_verifier = req
        .code_verifier
        .ok_or_else(|| OAuthError::InvalidRequest("missing code_verifier".into()))?;

    if !state.clients.authenticate(&client_id, req.client_secret.as_deref()) {
        return Err(OAuthError::InvalidClient("client authentication failed".into()));
    }

    // Consuming deletes the code regardless of what we find next — one-time
    // use holds even when the rest of the checks fail.
    let record = state
        .grants
        .consume_authorization_code(&code)
        .ok_or_else(|| OAuthError::InvalidGrant("authorization code is invalid or expired".into()))?;

    if record.client_id != client_id {
        return Err(OAuthError::InvalidGrant("client_id does not match the issued code".into()));
    }
    if record.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant("redirect_uri does not match the issued code".into()));
    }
    if !pkce::verify(&code_verifier, &record.code_challenge) {
        return Err(OAuthError::InvalidGrant("PKCE verification failed".into()));
    }

    issue_pair(state, &client_id)
}

async fn refresh_token_grant(state: &Arc<OAuthState>, req: TokenRequest) -> Result<TokenResponse, OAuthError> {
    let refresh_token = req
        .refresh_token
        .ok_or_else(|| OAuthError::InvalidRequest("missing refresh_token".into()))?;
    let client_id = req
        .client_id
        .ok_or_else(|| OAuthError::InvalidRequest("missing client_id".into()))?;

    if !state.clients.authenticate(&client_id, req.client_secret.as_deref()) {
        return Err(OAuthError::InvalidClient("client authentication failed".into()));
    }

    let record = state
        .grants
        .consume_refresh_token(&refresh_token)
        .ok_or_else(|| OAuthError::InvalidGrant("refresh token is invalid or expired".into()))?;

    if record.client_id != client_id {
        return Err(OAuthError::InvalidGrant("client_id does not match the refresh token".into()));
    }

    vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::RefreshTokenRotated {
        client_id: &client_id,
    });
    issue_pair(state, &client_id)
}

fn issue_pair(state: &Arc<OAuthState>, client_id: &str) -> Result<TokenResponse, OAuthError> {
    let access_token = state
        .tokens
        .issue(client_id, state.access_token_ttl)
        .map_err(|e| OAuthError::ServerError(e.to_string()))?;
    let refresh_token = state.grants.issue_refresh_token(client_id, state.refresh_token_ttl);

    vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::AccessTokenIssued {
        client_id,
    });

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.access_token_ttl.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientRegistry;
    use crate::federated_idp::FederatedIdpClient;
    use crate::federation::FederationSessionBridge;
    use crate::grants::AuthorizationGrantStore;
    use crate::token::AccessTokenIssuer;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> Arc<OAuthState> {
        Arc::new(OAuthState {
            clients: ClientRegistry::new(vec!["trusted.example".into()]),
            grants: AuthorizationGrantStore::new(),
            federation: FederationSessionBridge::new(),
            tokens: AccessTokenIssuer::new("a".repeat(32)),
            idp: FederatedIdpClient::new("idp-client", "idp-secret"),
            server_url: "https://vault.example.com".into(),
            allowed_users: vec!["alice".into()],
            access_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(2_592_000),
        })
    }

    #[tokio::test]
    async fn discovery_endpoints_are_public() {
        let app = router(test_state());
        let req = axum::http::Request::builder()
            .uri("/.well-known/oauth-protected-resource")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_then_duplicate_redirect_rejected() {
        let state = test_state();
        let app = router(state.clone());
        let body = serde_json::json!({
            "client_name": "Test Client",
            "redirect_uris": ["https://evil.example/cb"]
        });
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/oauth/register")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_client() {
        let state = test_state();
        let app = router(state);
        let req = axum::http::Request::builder()
            .uri("/oauth/authorize?response_type=code&client_id=nope&redirect_uri=https://trusted.example/cb&state=S&code_challenge=c&code_challenge_method=S256")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorize_missing_query_param_yields_structured_json_error() {
        let state = test_state();
        let app = router(state);
        let req = axum::http::Request::builder()
            .uri("/oauth/authorize?response_type=code&client_id=nope")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "invalid_request");
        assert!(parsed["error_description"].as_str().unwrap().contains("redirect_uri"));
    }

    #[tokio::test]
    async fn token_unsupported_grant_type_rejected() {
        let state = test_state();
        let app = router(state);
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from("grant_type=password"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn auth_code_reuse_is_rejected_on_second_exchange() {
        let state = test_state();
        let client = state
            .clients
            .register(RegisterParams {
                client_name: "X".into(),
                redirect_uris: vec!["https://trusted.example/cb".into()],
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                response_types: vec![ResponseType::Code],
                auth_method: AuthMethod::ConfidentialPost,
            })
            .unwrap();

        let verifier = "a-sufficiently-long-verifier-string";
        let challenge = {
            use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
            use sha2::{Digest, Sha256};
            URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
        };
        let code = state.grants.issue_authorization_code(
            &client.client_id,
            "https://trusted.example/cb",
            &challenge,
        );

        let form = format!(
            "grant_type=authorization_code&code={}&redirect_uri=https://trusted.example/cb&client_id={}&client_secret={}&code_verifier={}",
            code,
            client.client_id,
            client.client_secret.clone().unwrap(),
            verifier,
        );

        let app = router(state.clone());
        let req1 = axum::http::Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from(form.clone()))
            .unwrap();
        let resp1 = app.clone().oneshot(req1).await.unwrap();
        assert_eq!(resp1.status(), StatusCode::OK);

        let req2 = axum::http::Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from(form))
            .unwrap();
        let resp2 = app.oneshot(req2).await.unwrap();
        assert_eq!(resp2.status(), StatusCode::BAD_REQUEST);
    }
}
