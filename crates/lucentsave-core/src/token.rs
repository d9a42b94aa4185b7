//! Stateless session tokens.
//!
//! A token is a compact HS256 JWS: `header.claims.signature`, each part
//! base64url without padding. Claims carry the user id plus issue and
//! expiry instants in Unix milliseconds. Nothing is stored server-side;
//! revoking a session means letting the cookie expire.
//!
//! Expiration slides: every successful request gets a fresh token via
//! [`TokenService::refresh`], whose expiry is strictly later than the one
//! it replaces.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),
}

/// Signed payload of a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    /// Issued at, Unix milliseconds.
    pub iat: i64,
    /// Expires at, Unix milliseconds. Valid while `now < exp`.
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// An encoded token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub claims: Claims,
}

/// Issues and validates session tokens with one HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    ttl_ms: i64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret(secret.len()));
        }
        let mac =
            HmacSha256::new_from_slice(secret).map_err(|_| TokenError::WeakSecret(secret.len()))?;
        Ok(Self {
            mac,
            ttl_ms: ttl.as_millis().min(i64::MAX as u128) as i64,
        })
    }

    pub fn issue(&self, user_id: UserId) -> IssuedToken {
        self.issue_at(user_id, now_ms())
    }

    /// Issue a token for `user_id` as if the clock read `now` (Unix ms).
    pub fn issue_at(&self, user_id: UserId, now: i64) -> IssuedToken {
        self.encode(Claims {
            sub: user_id,
            iat: now,
            exp: now.saturating_add(self.ttl_ms),
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, now_ms())
    }

    /// Check structure, algorithm, signature and expiry, in that order.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_part(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(signing_input(header_b64, claims_b64).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_part(claims_b64)?;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Reissue for the same user with a later expiry.
    ///
    /// The new `iat` is at least one millisecond after the previous one, so
    /// two refreshes within the same millisecond still move the expiry.
    pub fn refresh(&self, previous: &Claims, now: i64) -> IssuedToken {
        let iat = now.max(previous.iat.saturating_add(1));
        self.issue_at(previous.sub, iat)
    }

    fn encode(&self, claims: Claims) -> IssuedToken {
        let header = serde_json::json!({ "alg": ALGORITHM, "typ": "JWT" });
        let payload = serde_json::json!({
            "sub": claims.sub,
            "iat": claims.iat,
            "exp": claims.exp,
        });
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_b64 = URL_SAFE_NO_PAD.encode(payload.to_string());

        let mut mac = self.mac.clone();
        mac.update(signing_input(&header_b64, &claims_b64).as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        IssuedToken {
            value: format!("{}.{}.{}", header_b64, claims_b64, sig_b64),
            claims,
        }
    }
}

fn signing_input(header_b64: &str, claims_b64: &str) -> String {
    format!("{}.{}", header_b64, claims_b64)
}

fn decode_part<T: serde::de::DeserializeOwned>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Current time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const T0: i64 = 1_700_000_000_000;

    fn service() -> TokenService {
        TokenService::new(SECRET, DEFAULT_TTL).unwrap()
    }

    fn ttl_ms() -> i64 {
        DEFAULT_TTL.as_millis() as i64
    }

    #[test]
    fn test_valid_until_just_before_expiry() {
        let svc = service();
        let token = svc.issue_at(42, T0);
        let claims = svc.validate_at(&token.value, T0 + ttl_ms() - 1).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(
            svc.validate_at(&token.value, T0 + ttl_ms() + 1),
            Err(TokenError::Expired)
        );
        assert_eq!(
            svc.validate_at(&token.value, T0 + ttl_ms()),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_refresh_strictly_extends_expiry() {
        let svc = service();
        let first = svc.issue_at(7, T0);
        let same_ms = svc.refresh(&first.claims, T0);
        assert!(same_ms.claims.exp > first.claims.exp);

        let later = svc.refresh(&same_ms.claims, T0 + 60_000);
        assert_eq!(later.claims.exp, T0 + 60_000 + ttl_ms());
        assert_eq!(later.claims.sub, 7);
        assert!(svc.validate_at(&later.value, T0 + ttl_ms() + 1).is_ok());
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let svc = service();
        let token = svc.issue_at(1, T0);
        let parts: Vec<&str> = token.value.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":2,"iat":{},"exp":{}}}"#,
            T0,
            T0 + ttl_ms()
        ));
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(svc.validate_at(&forged, T0), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = service().issue_at(1, T0);
        let other = TokenService::new(b"ffffffffffffffffffffffffffffffff", DEFAULT_TTL).unwrap();
        assert_eq!(
            other.validate_at(&token.value, T0),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let svc = service();
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            assert_eq!(svc.validate_at(bad, T0), Err(TokenError::Malformed), "{bad}");
        }
    }

    #[test]
    fn test_non_hs256_algorithm_rejected() {
        let svc = service();
        let token = svc.issue_at(1, T0);
        let parts: Vec<&str> = token.value.split('.').collect();
        let none_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.", none_header, parts[1]);
        assert_eq!(svc.validate_at(&forged, T0), Err(TokenError::Malformed));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert_eq!(
            TokenService::new(b"short", DEFAULT_TTL).unwrap_err(),
            TokenError::WeakSecret(5)
        );
    }
}
