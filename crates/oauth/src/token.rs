//! Access-Token Issuer/Verifier — C6. Signed bearer tokens with bounded
//! lifetime and issuer/audience binding, via `jsonwebtoken` (HS256) rather
//! than hand-rolled HMAC — SPEC_FULL.md component notes ground this in
//! `turbomcp-auth`'s `jsonwebtoken` usage.

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ISSUER: &str = "vaultgate";
pub const AUDIENCE: &str = "vaultgate-vault";
const SUBJECT: &str = "vault-principal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub client_id: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AccessTokenIssuer {
    secret: String,
}

impl AccessTokenIssuer {
    /// Panics if `secret` is shorter than 32 bytes — the caller
    /// (`vaultgate-config`) already validates this at startup, so reaching
    /// here with a weak secret is an invariant violation, not a request
    /// error (spec.md §9: "process-level panics only for invariant
    /// violations").
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        assert!(secret.len() >= 32, "JWT secret must be at least 32 bytes");
        Self { secret }
    }

    pub fn issue(&self, client_id: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: SUBJECT.to_string(),
            client_id: client_id.to_string(),
            aud: AUDIENCE.to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Any failure — bad signature, wrong algorithm, issuer/audience
    /// mismatch, expiry — returns `None` without distinguishing the cause.
    pub fn verify(&self, token: &str) -> Option<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = true;
        decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .ok()
        .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::new("a".repeat(32))
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = issuer();
        let token = issuer.issue("client1", Duration::from_secs(3600)).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.client_id, "client1");
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn expired_token_fails_verification() {
        let issuer = issuer();
        let token = issuer.issue("client1", Duration::from_secs(0)).unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(issuer.verify(&token).is_none());
    }

    #[test]
    fn token_signed_with_different_secret_fails() {
        let issuer_a = AccessTokenIssuer::new("a".repeat(32));
        let issuer_b = AccessTokenIssuer::new("b".repeat(32));
        let token = issuer_a.issue("client1", Duration::from_secs(3600)).unwrap();
        assert!(issuer_b.verify(&token).is_none());
    }

    #[test]
    fn garbage_token_fails_verification() {
        let issuer = issuer();
        assert!(issuer.verify("not-a-jwt").is_none());
    }

    #[test]
    #[should_panic]
    fn short_secret_panics() {
        AccessTokenIssuer::new("short");
    }
}
