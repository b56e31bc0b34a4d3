//! OAuth error taxonomy — spec.md §6/§7: the standard OAuth error codes,
//! surfaced either as a JSON error body or (for the authorize/callback
//! redirects) folded into a `redirect_uri` query string by the caller.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidClient(String),

    #[error("{0}")]
    InvalidGrant(String),

    #[error("unsupported grant_type")]
    UnsupportedGrantType,

    #[error("access_denied")]
    AccessDenied,

    #[error("{0}")]
    ServerBusy(String),

    #[error("internal error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// The standard OAuth error code string for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::ServerBusy(_) => "server_error",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status this error maps to when surfaced directly as a JSON body
    /// (the authorize/callback handlers instead fold it into a redirect).
    pub fn http_status(&self) -> u16 {
        match self {
            OAuthError::InvalidRequest(_) => 400,
            OAuthError::InvalidClient(_) => 401,
            OAuthError::InvalidGrant(_) => 400,
            OAuthError::UnsupportedGrantType => 400,
            OAuthError::AccessDenied => 403,
            OAuthError::ServerBusy(_) => 503,
            OAuthError::ServerError(_) => 500,
        }
    }
}
