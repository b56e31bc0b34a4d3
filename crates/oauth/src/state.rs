//! Shared, process-wide OAuth state — the singleton stores spec.md §9 calls
//! out as module-level in the source, gathered here into one struct so the
//! CLI can construct it explicitly and hand it to the router (spec.md §9:
//! "prefer explicit construction and injection").

use std::time::Duration;

use crate::client::ClientRegistry;
use crate::federated_idp::FederatedIdpClient;
use crate::federation::FederationSessionBridge;
use crate::grants::AuthorizationGrantStore;
use crate::token::AccessTokenIssuer;

pub struct OAuthState {
    pub clients: ClientRegistry,
    pub grants: AuthorizationGrantStore,
    pub federation: FederationSessionBridge,
    pub tokens: AccessTokenIssuer,
    pub idp: FederatedIdpClient,
    pub server_url: String,
    /// Lowercased at config load time; compared case-insensitively.
    pub allowed_users: Vec<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl OAuthState {
    pub fn discovery_path() -> &'static str {
        "/.well-known/oauth-protected-resource"
    }

    /// Periodic housekeeping — called every minute by C9's sweeper.
    pub fn cleanup(&self) {
        self.clients.cleanup();
        self.grants.cleanup();
        self.federation.cleanup();
    }
}
