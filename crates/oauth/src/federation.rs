//! Federation Session Bridge — C5. A one-shot opaque key that carries PKCE
//! state and the client's own `state` parameter across the round-trip to the
//! external identity provider, which only ever sees the opaque key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::RngCore;

/// spec.md §9 open question: no uniform cap is documented upstream; 1000
/// with a 10-minute TTL is this implementation's resolved bound.
const MAX_SESSIONS: usize = 1000;
const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct FederationSessionPayload {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

struct Entry {
    payload: FederationSessionPayload,
    expires_at: Instant,
    inserted_at: Instant,
}

pub struct FederationSessionBridge {
    entries: Mutex<HashMap<String, Entry>>,
    order: Mutex<Vec<String>>,
}

impl Default for FederationSessionBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FederationSessionBridge {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Returns `None` when at capacity — callers surface this as
    /// `server_error` / "Too many pending authorization sessions".
    pub fn create(&self, payload: FederationSessionPayload) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= MAX_SESSIONS {
            return None;
        }
        let key = random_hex(32);
        let now = Instant::now();
        entries.insert(
            key.clone(),
            Entry {
                payload,
                expires_at: now + SESSION_TTL,
                inserted_at: now,
            },
        );
        self.order.lock().unwrap_or_else(|e| e.into_inner()).push(key.clone());
        Some(key)
    }

    /// Atomic look-up-and-delete. One-time use is a security invariant.
    pub fn consume(&self, key: &str) -> Option<FederationSessionPayload> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.remove(key)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.payload)
    }

    pub fn cleanup(&self) {
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
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
fn sample_payload() -> FederationSessionPayload {
    FederationSessionPayload {
        client_id: "client1".into(),
        redirect_uri: "https://trusted.example/cb".into(),
        state: "S".into(),
        code_challenge: "chal".into(),
        code_challenge_method: "S256".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_consumed_exactly_once() {
        let bridge = FederationSessionBridge::new();
        let key = bridge.create(sample_payload()).unwrap();
        let consumed = bridge.consume(&key).unwrap();
        assert_eq!(consumed.state, "S");
        assert!(bridge.consume(&key).is_none());
    }

    #[test]
    fn unknown_key_returns_none() {
        let bridge = FederationSessionBridge::new();
        assert!(bridge.consume("nope").is_none());
    }

    #[test]
    fn capacity_breach_returns_none() {
        let bridge = FederationSessionBridge::new();
        for _ in 0..MAX_SESSIONS {
            assert!(bridge.create(sample_payload()).is_some());
        }
        assert!(bridge.create(sample_payload()).is_none());
        assert_eq!(bridge.len(), MAX_SESSIONS);
    }

    #[test]
    fn expired_session_is_rejected() {
        let bridge = FederationSessionBridge::new();
        let key = bridge.create(sample_payload()).unwrap();
        bridge.entries.lock().unwrap().get_mut(&key).unwrap().expires_at =
            Instant::now() - Duration::from_secs(1);
        assert!(bridge.consume(&key).is_none());
    }
}
