//! Hashing, secret generation, and the signed session token.
//!
//! The session token is a self-contained signed value:
//! `base64url(json payload) + "." + hex(SHA-256(payload_b64 || key))`.
//! Anyone holding the token key can mint and verify; nothing is stored
//! server-side, which keeps token checks off the hot path of the store.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Secret bytes for generated passwords and keys (128 bits of entropy).
const SECRET_BYTES: usize = 16;

/// Hex-encoded SHA-256 of a string.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Generate a url-safe random secret for first-boot credentials.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    /// Orchestrator the token was issued to.
    pub orchestrator_name: String,

    /// Client IP the token is bound to.
    pub orchestrator_ip: String,

    /// Expiration as whole seconds since the epoch.
    pub expiration: i64,
}

/// Sign token claims with the agent's token key.
pub fn sign_token(data: &TokenData, key: &str) -> String {
    // Serialization of a struct has a fixed field order, so the payload is
    // deterministic and the tag can be recomputed byte for byte.
    let payload = serde_json::to_string(data).expect("token claims serialize");
    let body = URL_SAFE_NO_PAD.encode(payload);
    let tag = sha256_hex(&format!("{body}{key}"));
    format!("{body}.{tag}")
}

/// Verify a token's tag and decode its claims.
///
/// Expiration and IP binding are checked by the caller; this only proves
/// the token was minted with the given key.
pub fn verify_token(token: &str, key: &str) -> Option<TokenData> {
    let (body, tag) = token.split_once('.')?;
    if sha256_hex(&format!("{body}{key}")) != tag {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(body).ok()?;
    serde_json::from_slice(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> TokenData {
        TokenData {
            orchestrator_name: "orch-1".to_string(),
            orchestrator_ip: "10.0.0.1".to_string(),
            expiration: 2_000_000_000,
        }
    }

    #[test]
    fn token_round_trips() {
        let token = sign_token(&claims(), "key");
        let decoded = verify_token(&token, "key").unwrap();
        assert_eq!(decoded.orchestrator_name, "orch-1");
        assert_eq!(decoded.orchestrator_ip, "10.0.0.1");
        assert_eq!(decoded.expiration, 2_000_000_000);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_token(&claims(), "key");
        assert!(verify_token(&token, "other").is_none());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = sign_token(&claims(), "key");
        let (body, tag) = token.split_once('.').unwrap();
        let mut forged_claims = claims();
        forged_claims.orchestrator_ip = "10.0.0.2".to_string();
        let forged_body =
            URL_SAFE_NO_PAD.encode(serde_json::to_string(&forged_claims).unwrap());
        assert_ne!(body, forged_body);
        assert!(verify_token(&format!("{forged_body}.{tag}"), "key").is_none());
    }

    #[test]
    fn secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn hash_matches_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
