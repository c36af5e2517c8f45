//! Stateless signed bearer tokens.
//!
//! Format: `v1.<user_id>.<expiry_epoch>.<hmac_hex>` where the MAC is
//! HMAC-SHA256 over `<user_id>.<expiry_epoch>` with the configured secret.
//! There is no server-side token state: verification is signature + expiry
//! only, so a token stays valid until it expires regardless of client-side
//! logout.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::store::{constant_time_eq, epoch_secs};

type HmacSha256 = Hmac<Sha256>;

/// Token format version prefix.
const TOKEN_VERSION: &str = "v1";

/// Signs and verifies bearer tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_days: u32) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: i64::from(ttl_days) * 24 * 3600,
        }
    }

    /// Issue a token for a user, valid for the configured lifetime.
    pub fn issue(&self, user_id: &str) -> String {
        self.issue_with_expiry(user_id, epoch_secs() + self.ttl_secs)
    }

    fn issue_with_expiry(&self, user_id: &str, expires_at: i64) -> String {
        let payload = format!("{user_id}.{expires_at}");
        format!("{TOKEN_VERSION}.{payload}.{}", self.sign(&payload))
    }

    /// Verify signature and expiry; returns the embedded user id.
    pub fn verify(&self, token: &str) -> Option<String> {
        let rest = token.strip_prefix("v1.")?;
        // user_id may not contain '.', so split from the right
        let (payload, sig) = rest.rsplit_once('.')?;
        if !constant_time_eq(self.sign(payload).as_bytes(), sig.as_bytes()) {
            return None;
        }

        let (user_id, expiry) = payload.rsplit_once('.')?;
        let expires_at: i64 = expiry.parse().ok()?;
        if expires_at <= epoch_secs() {
            return None;
        }
        Some(user_id.to_string())
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret", 30)
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let s = signer();
        let token = s.issue("user-abc-123");
        assert_eq!(s.verify(&token).as_deref(), Some("user-abc-123"));
    }

    #[test]
    fn token_carries_version_prefix() {
        let token = signer().issue("user-1");
        assert!(token.starts_with("v1."));
    }

    #[test]
    fn tampered_payload_rejected() {
        let s = signer();
        let token = s.issue("user-1");
        let tampered = token.replacen("user-1", "user-2", 1);
        assert!(s.verify(&tampered).is_none());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = TokenSigner::new("secret-a", 30).issue("user-1");
        assert!(TokenSigner::new("secret-b", 30).verify(&token).is_none());
    }

    #[test]
    fn expired_token_rejected() {
        let s = signer();
        let token = s.issue_with_expiry("user-1", epoch_secs() - 1);
        assert!(s.verify(&token).is_none());
    }

    #[test]
    fn malformed_tokens_rejected() {
        let s = signer();
        assert!(s.verify("").is_none());
        assert!(s.verify("v1.").is_none());
        assert!(s.verify("garbage-token").is_none());
        assert!(s.verify("v2.user.9999999999.abcd").is_none());
    }
}
