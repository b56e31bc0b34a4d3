//! Authorization Grant Store — C4. Short-lived authorization codes and
//! rotating refresh tokens, each consumed at most once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::RngCore;

const MAX_CODES: usize = 1000;
const MAX_REFRESH_TOKENS: usize = 2000;
const CODE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub client_id: String,
}

struct Entry<T> {
    record: T,
    expires_at: Instant,
    inserted_at: Instant,
}

/// A bounded, one-time-use, insertion-ordered store shared by authorization
/// codes and refresh tokens — issue installs with an eviction-on-capacity
/// policy, consume is an atomic look-up-and-delete.
struct GrantMap<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    order: Mutex<Vec<String>>,
    capacity: usize,
}

impl<T: Clone> GrantMap<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn issue(&self, token: String, record: T, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
            while let Some(oldest) = order.first().cloned() {
                order.remove(0);
                if entries.remove(&oldest).is_some() {
                    break;
                }
            }
        }
        entries.insert(
            token.clone(),
            Entry {
                record,
                expires_at: now + ttl,
                inserted_at: now,
            },
        );
        self.order.lock().unwrap_or_else(|e| e.into_inner()).push(token);
    }

    /// Atomic look-up-and-delete: the first consume always removes the
    /// entry, even when it turns out to be expired.
    fn consume(&self, token: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.remove(token)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.record)
    }

    fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| e.expires_at > now);
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.retain(|k| entries.contains_key(k));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[cfg(test)]
    fn oldest_inserted_at(&self) -> Option<Instant> {
        self.entries.lock().unwrap().values().map(|e| e.inserted_at).min()
    }
}

pub struct AuthorizationGrantStore {
    codes: GrantMap<AuthorizationCodeRecord>,
    refresh_tokens: GrantMap<RefreshTokenRecord>,
}

impl Default for AuthorizationGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationGrantStore {
    pub fn new() -> Self {
        Self {
            codes: GrantMap::new(MAX_CODES),
            refresh_tokens: GrantMap::new(MAX_REFRESH_TOKENS),
        }
    }

    pub fn issue_authorization_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
    ) -> String {
        let code = random_hex(32);
        self.codes.issue(
            code.clone(),
            AuthorizationCodeRecord {
                client_id: client_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                code_challenge: code_challenge.to_string(),
            },
            CODE_TTL,
        );
        code
    }

    pub fn consume_authorization_code(&self, code: &str) -> Option<AuthorizationCodeRecord> {
        self.codes.consume(code)
    }

    pub fn issue_refresh_token(&self, client_id: &str, ttl: Duration) -> String {
        let token = random_hex(32);
        self.refresh_tokens.issue(
            token.clone(),
            RefreshTokenRecord {
                client_id: client_id.to_string(),
            },
            ttl,
        );
        token
    }

    pub fn consume_refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.refresh_tokens.consume(token)
    }

    pub fn cleanup(&self) {
        self.codes.cleanup();
        self.refresh_tokens.cleanup();
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_code_consumed_exactly_once() {
        let store = AuthorizationGrantStore::new();
        let code = store.issue_authorization_code("client1", "https://cb", "challenge");
        assert!(store.consume_authorization_code(&code).is_some());
        assert!(store.consume_authorization_code(&code).is_none());
    }

    #[test]
    fn refresh_token_consumed_exactly_once() {
        let store = AuthorizationGrantStore::new();
        let token = store.issue_refresh_token("client1", Duration::from_secs(60));
        assert!(store.consume_refresh_token(&token).is_some());
        assert!(store.consume_refresh_token(&token).is_none());
    }

    #[test]
    fn unknown_code_returns_none() {
        let store = AuthorizationGrantStore::new();
        assert!(store.consume_authorization_code("nope").is_none());
    }

    #[test]
    fn expired_code_returns_none_and_is_removed() {
        let store = AuthorizationGrantStore::new();
        // Issue with an already-elapsed ttl by issuing then sleeping past it
        // via a tiny ttl on the underlying map directly isn't exposed, so
        // exercise through the public API with a code whose ttl we can't
        // shrink — instead assert the removed-on-first-consume invariant
        // holds for a fresh, unexpired code (covered above) and rely on
        // `GrantMap::consume`'s unconditional remove for the expiry case.
        let code = store.issue_authorization_code("c", "https://cb", "chal");
        store.codes.entries.lock().unwrap().get_mut(&code).unwrap().expires_at =
            Instant::now() - Duration::from_secs(1);
        assert!(store.consume_authorization_code(&code).is_none());
        assert!(store.consume_authorization_code(&code).is_none());
    }

    #[test]
    fn capacity_eviction_drops_oldest_code() {
        let store = AuthorizationGrantStore::new();
        let first = store.issue_authorization_code("c", "https://cb", "chal");
        for _ in 0..MAX_CODES - 1 {
            store.issue_authorization_code("c", "https://cb", "chal");
        }
        assert_eq!(store.codes.len(), MAX_CODES);
        // One more push should evict the oldest (first).
        store.issue_authorization_code("c", "https://cb", "chal");
        assert!(store.consume_authorization_code(&first).is_none());
        assert!(store.codes.oldest_inserted_at().is_some());
    }

    #[test]
    fn refresh_rotation_invalidates_prior_token() {
        let store = AuthorizationGrantStore::new();
        let old = store.issue_refresh_token("client1", Duration::from_secs(3600));
        let record = store.consume_refresh_token(&old).unwrap();
        let new = store.issue_refresh_token(&record.client_id, Duration::from_secs(3600));
        assert!(store.consume_refresh_token(&old).is_none());
        assert!(store.consume_refresh_token(&new).is_some());
    }
}
