//! PKCE (RFC 7636) S256 verification, shared by the token endpoint (C7).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// `base64url(SHA256(verifier))`, compared byte-for-byte against the stored
/// challenge under constant-time equality. Different-length inputs are
/// rejected up front (constant-time equality requires equal-length buffers);
/// a length mismatch is itself not a secret worth hiding.
pub fn verify(verifier: &str, stored_challenge: &str) -> bool {
    let digest = Sha256::digest(verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(digest);
    if computed.len() != stored_challenge.len() {
        return false;
    }
    computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_verifier_succeeds() {
        let verifier = "a-random-verifier-of-sufficient-entropy";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        assert!(verify(verifier, &challenge));
    }

    #[test]
    fn wrong_verifier_fails() {
        let verifier = "correct-verifier";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        assert!(!verify("wrong-verifier", &challenge));
    }

    #[test]
    fn equal_length_wrong_bytes_fails() {
        let verifier = "verifier-one";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        // "verifier-two" hashes differently but to the same length class.
        assert!(!verify("verifier-two", &challenge));
    }
}
