//! Cursor Tokens
//!
//! A cursor token binds a cursor position to one job and one session for a
//! short time. Wire format: `base64url(claims_json) "." base64url(hmac)`,
//! where the HMAC-SHA256 is computed over the encoded claims segment.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("cursor signing secret is not configured")]
    MissingSecret,
    #[error("failed to initialize cursor signer: {0}")]
    InvalidKey(String),
    #[error("failed to encode cursor claims: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Signed claims carried by a cursor token
///
/// Field order is fixed so serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorClaims {
    #[serde(rename = "r")]
    pub job_id: Uuid,
    #[serde(rename = "s")]
    pub session_hash: String,
    #[serde(rename = "c")]
    pub cursor: u64,
    /// Unix seconds
    #[serde(rename = "e")]
    pub expires_at: i64,
    #[serde(rename = "n")]
    pub nonce: String,
}

/// Issues and verifies cursor tokens with a server-held secret
#[derive(Clone)]
pub struct CursorSigner {
    secret: Vec<u8>,
    token_ttl: Duration,
}

impl std::fmt::Debug for CursorSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorSigner")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl CursorSigner {
    /// Create a signer; an empty secret is a configuration error
    pub fn new(secret: &str, token_ttl: Duration) -> Result<Self, SigningError> {
        if secret.trim().is_empty() {
            return Err(SigningError::MissingSecret);
        }

        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            token_ttl,
        })
    }

    /// Issue a fresh token for `cursor`, valid for the configured TTL
    pub fn issue(
        &self,
        job_id: Uuid,
        session_hash: &str,
        cursor: u64,
    ) -> Result<String, SigningError> {
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = CursorClaims {
            job_id,
            session_hash: session_hash.to_string(),
            cursor,
            expires_at: Utc::now().timestamp().saturating_add(ttl),
            nonce: URL_SAFE_NO_PAD.encode(rand::random::<[u8; 8]>()),
        };

        self.sign(&claims)
    }

    /// Sign arbitrary claims
    pub fn sign(&self, claims: &CursorClaims) -> Result<String, SigningError> {
        let claims_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(claims_segment.as_bytes());
        let signature_segment = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{claims_segment}.{signature_segment}"))
    }

    /// Check that `token` was issued by this signer for exactly this job,
    /// session and cursor, and has not expired
    ///
    /// Every failure yields `false`; callers cannot tell which check failed.
    pub fn verify(&self, token: &str, job_id: Uuid, session_hash: &str, cursor: u64) -> bool {
        self.verify_at(token, job_id, session_hash, cursor, Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        token: &str,
        job_id: Uuid,
        session_hash: &str,
        cursor: u64,
        now: i64,
    ) -> bool {
        if token.is_empty() || session_hash.is_empty() {
            return false;
        }

        let Some((claims_segment, signature_segment)) = token.split_once('.') else {
            return false;
        };
        if claims_segment.is_empty() || signature_segment.is_empty() {
            return false;
        }

        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature_segment) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(claims_segment.as_bytes());
        // verify_slice compares in constant time
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        let Ok(claims_bytes) = URL_SAFE_NO_PAD.decode(claims_segment) else {
            return false;
        };
        let Ok(claims) = serde_json::from_slice::<CursorClaims>(&claims_bytes) else {
            return false;
        };

        claims.job_id == job_id
            && claims.session_hash == session_hash
            && claims.cursor == cursor
            && claims.expires_at >= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    fn signer(secret: &str) -> CursorSigner {
        CursorSigner::new(secret, Duration::from_secs(120)).unwrap()
    }

    #[test]
    fn test_missing_secret_rejected() {
        assert!(matches!(
            CursorSigner::new("", Duration::from_secs(120)),
            Err(SigningError::MissingSecret)
        ));
        assert!(matches!(
            CursorSigner::new("   ", Duration::from_secs(120)),
            Err(SigningError::MissingSecret)
        ));
    }

    #[test]
    fn test_issue_then_verify() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();
        let token = signer.issue(job_id, SESSION, 7).unwrap();

        assert!(signer.verify(&token, job_id, SESSION, 7));
    }

    #[test]
    fn test_verify_rejects_mismatched_claims() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();
        let token = signer.issue(job_id, SESSION, 7).unwrap();

        assert!(!signer.verify(&token, Uuid::new_v4(), SESSION, 7));
        assert!(!signer.verify(&token, job_id, "other-session", 7));
        assert!(!signer.verify(&token, job_id, SESSION, 8));
        assert!(!signer.verify(&token, job_id, "", 7));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let job_id = Uuid::new_v4();
        let forged = signer("attacker").issue(job_id, SESSION, 0).unwrap();

        assert!(!signer("secret").verify(&forged, job_id, SESSION, 0));
    }

    #[test]
    fn test_verify_rejects_tampered_claims() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();
        let token = signer.issue(job_id, SESSION, 0).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = CursorClaims {
            job_id,
            session_hash: SESSION.to_string(),
            cursor: 100,
            expires_at: Utc::now().timestamp() + 3600,
            nonce: "AAAAAAAAAAA".to_string(),
        };
        let forged_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{forged_segment}.{signature}");

        assert!(!signer.verify(&forged, job_id, SESSION, 100));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();
        let claims = CursorClaims {
            job_id,
            session_hash: SESSION.to_string(),
            cursor: 3,
            expires_at: Utc::now().timestamp() - 1,
            nonce: "bm9uY2U".to_string(),
        };
        let token = signer.sign(&claims).unwrap();

        assert!(!signer.verify(&token, job_id, SESSION, 3));
        assert!(signer.verify_at(&token, job_id, SESSION, 3, claims.expires_at));
    }

    #[test]
    fn test_verify_rejects_malformed_tokens() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();

        for token in ["", ".", "abc", "abc.", ".abc", "!!!.???", "a.b.c"] {
            assert!(!signer.verify(token, job_id, SESSION, 0), "accepted {token:?}");
        }
    }

    #[test]
    fn test_tokens_for_same_cursor_differ() {
        let signer = signer("secret");
        let job_id = Uuid::new_v4();

        let first = signer.issue(job_id, SESSION, 0).unwrap();
        let second = signer.issue(job_id, SESSION, 0).unwrap();

        assert_ne!(first, second);
        assert!(signer.verify(&first, job_id, SESSION, 0));
        assert!(signer.verify(&second, job_id, SESSION, 0));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", signer("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
