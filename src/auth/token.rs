use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of a generated signing secret in bytes.
pub const SECRET_BYTES: usize = 32;

/// Claims carried inside a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies signed, time-limited bearer credentials.
///
/// Format: `base64url(claims_json) "." base64url(hmac_sha256(secret, first_segment))`.
pub struct CredentialSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl CredentialSigner {
    #[must_use]
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            key: key.to_vec(),
            ttl,
        }
    }

    /// Builds a signer from a hex-encoded secret as written by [`generate_secret`].
    pub fn from_hex(secret: &str, ttl: Duration) -> Result<Self> {
        let key = hex::decode(secret.trim())
            .map_err(|e| Error::Config(format!("invalid secret key: {e}")))?;
        if key.len() < SECRET_BYTES {
            return Err(Error::Config(format!(
                "secret key must be at least {SECRET_BYTES} bytes"
            )));
        }
        Ok(Self::new(&key, ttl))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Config(format!("invalid signing key: {e}")))
    }

    /// Issues a credential for `user_id`. Returns the token and its expiry.
    pub fn issue(&self, user_id: &str, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>)> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| Error::Config("credential lifetime out of range".to_string()))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| Error::Config(format!("failed to encode claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok((format!("{payload}.{signature}"), expires_at))
    }

    /// Verifies signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let (payload, signature) = token.split_once('.').ok_or(Error::InvalidTokenFormat)?;
        if payload.is_empty() || signature.contains('.') {
            return Err(Error::InvalidTokenFormat);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::InvalidTokenFormat)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(Error::InvalidTokenFormat)?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(Error::InvalidTokenFormat)?;
        if expires_at <= now {
            return Err(Error::TokenExpired);
        }

        Ok(claims)
    }
}

/// Generates a random hex-encoded signing secret.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CredentialSigner {
        CredentialSigner::new(&[7u8; SECRET_BYTES], Duration::days(7))
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = signer();
        let now = Utc::now();
        let (token, expires_at) = signer.issue("user-1", now).unwrap();

        assert_eq!(token.matches('.').count(), 1);
        assert_eq!(expires_at, now + Duration::days(7));

        let claims = signer.verify(&token, now).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_expired_token() {
        let signer = signer();
        let issued = Utc::now() - Duration::days(8);
        let (token, _) = signer.issue("user-1", issued).unwrap();

        assert!(matches!(
            signer.verify(&token, Utc::now()),
            Err(Error::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (token, _) = signer().issue("user-1", Utc::now()).unwrap();
        let other = CredentialSigner::new(&[9u8; SECRET_BYTES], Duration::days(7));

        assert!(matches!(
            other.verify(&token, Utc::now()),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let signer = signer();
        let now = Utc::now();
        let (token, _) = signer.issue("user-1", now).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged = Claims {
            sub: "user-2".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(365)).timestamp(),
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{forged_payload}.{signature}");

        assert!(matches!(
            signer.verify(&forged_token, now),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = signer();
        let now = Utc::now();
        for token in ["", "no-dot", ".sig", "a.b.c", "payload.!!!"] {
            assert!(
                matches!(signer.verify(token, now), Err(Error::InvalidTokenFormat)),
                "expected {token:?} to be malformed"
            );
        }
    }

    #[test]
    fn test_overflowing_lifetime_is_an_error() {
        let signer = CredentialSigner::new(&[7u8; SECRET_BYTES], Duration::MAX);
        assert!(matches!(
            signer.issue("user-1", Utc::now()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_generated_secret_round_trips() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_BYTES * 2);

        let signer = CredentialSigner::from_hex(&secret, Duration::hours(1)).unwrap();
        let (token, _) = signer.issue("user-1", Utc::now()).unwrap();
        assert!(signer.verify(&token, Utc::now()).is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            CredentialSigner::from_hex("abcd", Duration::hours(1)),
            Err(Error::Config(_))
        ));
        assert!(CredentialSigner::from_hex("not hex", Duration::hours(1)).is_err());
    }
}
