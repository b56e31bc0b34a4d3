//! Federated identity provider bridge — the client side of the round-trip to
//! the external identity provider (spec.md calls it "an external identity
//! provider" generically; this gateway concretizes it as GitHub OAuth, the
//! natural fit for a git-backed vault's user allowlist). Exchanges the
//! provider's authorization code for its access token, then fetches the
//! authenticated user's login.
//!
//! Grounded in `turbomcp-auth`'s `OAuth2Client` (the `oauth2` crate's
//! typestate `BasicClient`, paired with a `reqwest::Client` configured with
//! `redirect::Policy::none()` to avoid SSRF via a malicious redirect chain).

use std::time::Duration;

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, TokenResponse, TokenUrl};
use serde::Deserialize;

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_API: &str = "https://api.github.com/user";

/// spec.md §5: "Outbound identity-provider calls have a 10-second deadline."
const IDP_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Scope requested when redirecting to the provider (spec.md §4.7: "a fixed
/// scope").
pub const FEDERATED_SCOPE: &str = "read:user";

#[derive(Debug, thiserror::Error)]
pub enum FederatedIdpError {
    #[error("provider returned an error: {0}")]
    ProviderDenied(String),
    #[error("token exchange with provider failed: {0}")]
    TokenExchangeFailed(String),
    #[error("userinfo fetch failed: {0}")]
    UserinfoFailed(String),
}

#[derive(Deserialize)]
struct GitHubUser {
    login: String,
}

/// The client-id/secret pair and HTTP plumbing needed to talk to the
/// federated identity provider. Constructed once at startup from
/// `FEDERATED_CLIENT_ID` / `FEDERATED_CLIENT_SECRET`.
pub struct FederatedIdpClient {
    client_id: String,
    oauth_client:
        BasicClient<oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>,
    http: reqwest::Client,
}

impl FederatedIdpClient {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        let oauth_client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(AuthUrl::new(GITHUB_AUTH_URL.to_string()).expect("static URL"))
            .set_token_uri(TokenUrl::new(GITHUB_TOKEN_URL.to_string()).expect("static URL"));

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("vaultgate")
            .build()
            .expect("reqwest client construction cannot fail with this configuration");

        Self {
            client_id: client_id.to_string(),
            oauth_client,
            http,
        }
    }

    pub fn authorize_url(&self) -> &str {
        GITHUB_AUTH_URL
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Exchange the provider's authorization `code` for its access token,
    /// then fetch and return the authenticated user's login (lowercased —
    /// the allowlist comparison in C7 is case-insensitive). Each outbound
    /// call is bounded by a 10-second deadline (spec.md §5).
    pub async fn exchange_and_fetch_user(&self, code: &str) -> Result<String, FederatedIdpError> {
        let token_response = tokio::time::timeout(
            IDP_CALL_TIMEOUT,
            self.oauth_client
                .exchange_code(AuthorizationCode::new(code.to_string()))
                .request_async(&self.http),
        )
        .await
        .map_err(|_| FederatedIdpError::TokenExchangeFailed("timed out".into()))?
        .map_err(|e| FederatedIdpError::TokenExchangeFailed(e.to_string()))?;

        let access_token = token_response.access_token().secret();

        let user: GitHubUser = tokio::time::timeout(IDP_CALL_TIMEOUT, async {
            self.http
                .get(GITHUB_USER_API)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| FederatedIdpError::UserinfoFailed(e.to_string()))?
                .error_for_status()
                .map_err(|e| FederatedIdpError::UserinfoFailed(e.to_string()))?
                .json()
                .await
                .map_err(|e| FederatedIdpError::UserinfoFailed(e.to_string()))
        })
        .await
        .map_err(|_| FederatedIdpError::UserinfoFailed("timed out".into()))??;

        Ok(user.login.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_without_network_access() {
        let client = FederatedIdpClient::new("id", "secret");
        assert_eq!(client.authorize_url(), GITHUB_AUTH_URL);
    }
}
