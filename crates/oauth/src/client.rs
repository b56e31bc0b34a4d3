//! Client Registry — C3. Registered-client records and credential
//! verification for dynamic client registration (RFC 7591-shaped).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::OAuthError;

const MAX_CLIENTS: usize = 500;
const CLIENT_NAME_MAX_LEN: usize = 256;
const MIN_REDIRECT_URIS: usize = 1;
const MAX_REDIRECT_URIS: usize = 10;
const STALENESS_HORIZON: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ConfidentialPost,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    /// Absent for public clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<ResponseType>,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
}

pub struct RegisterParams {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<ResponseType>,
    pub auth_method: AuthMethod,
}

/// Per-process registry of dynamically registered OAuth clients. A plain
/// `Mutex<HashMap<..>>` held briefly, same discipline as C1's rate limiter —
/// registration and lookup are cheap, non-blocking operations.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, (RegisteredClient, Instant)>>,
    trusted_frontend_hosts: Vec<String>,
}

impl ClientRegistry {
    /// `trusted_frontend_hosts`: non-loopback `https` redirect URIs are only
    /// accepted when their host is in this allowlist (spec.md §4.3). The
    /// config layer seeds this from `SERVER_URL`'s own host — the only
    /// front-end this single-tenant gateway is expected to serve.
    pub fn new(trusted_frontend_hosts: Vec<String>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            trusted_frontend_hosts,
        }
    }

    pub fn register(&self, params: RegisterParams) -> Result<RegisteredClient, OAuthError> {
        validate_client_name(&params.client_name)?;
        validate_redirect_uris(&params.redirect_uris, &self.trusted_frontend_hosts)?;

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() >= MAX_CLIENTS {
            return Err(OAuthError::ServerBusy("client registry at capacity".into()));
        }

        let client_id = random_hex_id(16);
        let client_secret = match params.auth_method {
            AuthMethod::Public => None,
            AuthMethod::ConfidentialPost => Some(random_hex_id(32)),
        };

        let record = RegisteredClient {
            client_id: client_id.clone(),
            client_secret,
            client_name: params.client_name,
            redirect_uris: params.redirect_uris,
            grant_types: params.grant_types,
            response_types: params.response_types,
            auth_method: params.auth_method,
            created_at: Utc::now(),
        };

        clients.insert(client_id, (record.clone(), Instant::now()));
        vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::ClientRegistered {
            client_id: &record.client_id,
        });
        Ok(record)
    }

    pub fn get_client(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_id)
            .map(|(c, _)| c.clone())
    }

    /// Constant-time credential check. Any mismatch — confidential-without-
    /// secret, public-with-secret, or plain mismatch — returns `false`.
    pub fn authenticate(&self, client_id: &str, presented_secret: Option<&str>) -> bool {
        let Some(client) = self.get_client(client_id) else {
            return false;
        };
        match (client.auth_method, client.client_secret.as_deref(), presented_secret) {
            (AuthMethod::Public, _, None) => true,
            (AuthMethod::Public, _, Some(_)) => false,
            (AuthMethod::ConfidentialPost, Some(stored), Some(presented)) => {
                if stored.len() != presented.len() {
                    return false;
                }
                stored.as_bytes().ct_eq(presented.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// Only evicts once the registry is at ≥90% capacity; below that,
    /// registered clients are treated as stable and left alone.
    pub fn cleanup(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if clients.len() < (MAX_CLIENTS * 9) / 10 {
            return;
        }
        let now = Instant::now();
        clients.retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) < STALENESS_HORIZON);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

fn validate_client_name(name: &str) -> Result<(), OAuthError> {
    if name.is_empty() || name.len() > CLIENT_NAME_MAX_LEN {
        return Err(OAuthError::InvalidRequest(format!(
            "client_name must be 1-{CLIENT_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_redirect_uris(uris: &[String], trusted_hosts: &[String]) -> Result<(), OAuthError> {
    if uris.len() < MIN_REDIRECT_URIS || uris.len() > MAX_REDIRECT_URIS {
        return Err(OAuthError::InvalidRequest(format!(
            "redirect_uris must contain {MIN_REDIRECT_URIS}-{MAX_REDIRECT_URIS} entries"
        )));
    }
    for uri in uris {
        let parsed = url::Url::parse(uri)
            .map_err(|_| OAuthError::InvalidRequest(format!("invalid redirect_uri: {uri}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| OAuthError::InvalidRequest(format!("redirect_uri missing host: {uri}")))?;
        let is_loopback = matches!(host, "localhost" | "127.0.0.1" | "::1");
        match parsed.scheme() {
            "http" | "https" if is_loopback => {}
            "https" if trusted_hosts.iter().any(|h| h == host) => {}
            _ => {
                return Err(OAuthError::InvalidRequest(format!(
                    "redirect_uri host not allowed: {uri}"
                )));
            }
        }
    }
    Ok(())
}

fn random_hex_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(vec!["trusted.example".into()])
    }

    fn confidential_params(redirect: &str) -> RegisterParams {
        RegisterParams {
            client_name: "X".into(),
            redirect_uris: vec![redirect.into()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            response_types: vec![ResponseType::Code],
            auth_method: AuthMethod::ConfidentialPost,
        }
    }

    #[test]
    fn register_confidential_client_gets_a_secret() {
        let registry = registry();
        let client = registry
            .register(confidential_params("https://trusted.example/cb"))
            .unwrap();
        assert!(client.client_secret.is_some());
    }

    #[test]
    fn register_public_client_gets_no_secret() {
        let registry = registry();
        let mut params = confidential_params("http://localhost:3000/cb");
        params.auth_method = AuthMethod::Public;
        let client = registry.register(params).unwrap();
        assert!(client.client_secret.is_none());
    }

    #[test]
    fn untrusted_https_host_rejected() {
        let registry = registry();
        let err = registry
            .register(confidential_params("https://evil.example/cb"))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn loopback_http_is_allowed_without_trust_list() {
        let registry = registry();
        let client = registry
            .register(confidential_params("http://127.0.0.1:9000/cb"))
            .unwrap();
        assert!(client.client_secret.is_some());
    }

    #[test]
    fn authenticate_confidential_requires_matching_secret() {
        let registry = registry();
        let client = registry
            .register(confidential_params("https://trusted.example/cb"))
            .unwrap();
        let secret = client.client_secret.clone().unwrap();
        assert!(registry.authenticate(&client.client_id, Some(&secret)));
        assert!(!registry.authenticate(&client.client_id, Some("wrong")));
        assert!(!registry.authenticate(&client.client_id, None));
    }

    #[test]
    fn authenticate_public_requires_absent_secret() {
        let registry = registry();
        let mut params = confidential_params("http://localhost/cb");
        params.auth_method = AuthMethod::Public;
        let client = registry.register(params).unwrap();
        assert!(registry.authenticate(&client.client_id, None));
        assert!(!registry.authenticate(&client.client_id, Some("anything")));
    }

    #[test]
    fn unknown_client_never_authenticates() {
        let registry = registry();
        assert!(!registry.authenticate("nope", None));
    }

    #[test]
    fn capacity_breach_rejects_registration() {
        let registry = registry();
        for i in 0..MAX_CLIENTS {
            let params = confidential_params(&format!("http://127.0.0.1:{}/cb", 10000 + i));
            registry.register(params).unwrap();
        }
        let err = registry
            .register(confidential_params("http://127.0.0.1:1/cb"))
            .unwrap_err();
        assert_eq!(err.code(), "server_error");
    }
}
