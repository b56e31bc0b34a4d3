//! OAuth 2.1 authorization server for the vault gateway: dynamic client
//! registration, PKCE authorization-code + refresh-token grants, a
//! federation bridge to an external identity provider, and the bearer
//! middleware that guards every protected route.

pub mod client;
pub mod error;
pub mod federated_idp;
pub mod federation;
pub mod grants;
pub mod handlers;
pub mod middleware;
pub mod pkce;
pub mod state;
pub mod token;

pub use client::{AuthMethod, ClientRegistry, GrantType, RegisterParams, RegisteredClient, ResponseType};
pub use error::OAuthError;
pub use federated_idp::{FederatedIdpClient, FederatedIdpError};
pub use federation::{FederationSessionBridge, FederationSessionPayload};
pub use grants::{AuthorizationCodeRecord, AuthorizationGrantStore, RefreshTokenRecord};
pub use handlers::router as oauth_router;
pub use middleware::require_bearer_token;
pub use state::OAuthState;
pub use token::{AccessTokenClaims, AccessTokenIssuer};
