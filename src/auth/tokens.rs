//! Bearer token signing and verification
//!
//! Two token kinds share one codec: short-lived access tokens and long-lived
//! refresh tokens, each signed HS256 with its own secret and lifetime. A
//! token signed for one kind never verifies as the other because the secrets
//! are independent (enforced distinct at construction).
//!
//! Verification is pure: it checks signature and expiry against the claims
//! only and never consults the credential store. Decode leeway is zero so
//! expiry follows the `exp` claim exactly.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::WicketError;

/// Which of the two bearer tokens a value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Why a token failed verification. Never surfaced to clients verbatim;
/// the HTTP boundary collapses all of these to a uniform 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id (ObjectId hex)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

#[derive(Clone)]
struct Signer {
    secret: String,
    ttl_seconds: u64,
}

/// Signs and verifies both token kinds.
#[derive(Clone)]
pub struct TokenCodec {
    access: Signer,
    refresh: Signer,
}

impl TokenCodec {
    /// Create a codec from the two secret/TTL pairs.
    ///
    /// Secrets must be at least 32 characters and must differ from each
    /// other; a shared secret would let one kind verify as the other.
    pub fn new(
        access_secret: String,
        access_ttl_seconds: u64,
        refresh_secret: String,
        refresh_ttl_seconds: u64,
    ) -> Result<Self, WicketError> {
        for (kind, secret) in [("access", &access_secret), ("refresh", &refresh_secret)] {
            if secret.len() < 32 {
                return Err(WicketError::Config(format!(
                    "{} token secret must be at least 32 characters",
                    kind
                )));
            }
        }
        if access_secret == refresh_secret {
            return Err(WicketError::Config(
                "access and refresh token secrets must differ".into(),
            ));
        }

        Ok(Self {
            access: Signer {
                secret: access_secret,
                ttl_seconds: access_ttl_seconds,
            },
            refresh: Signer {
                secret: refresh_secret,
                ttl_seconds: refresh_ttl_seconds,
            },
        })
    }

    fn signer(&self, kind: TokenKind) -> &Signer {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Configured lifetime for a token kind.
    pub fn ttl_seconds(&self, kind: TokenKind) -> u64 {
        self.signer(kind).ttl_seconds
    }

    /// Sign a token of the given kind for a principal.
    pub fn issue(&self, kind: TokenKind, principal_id: &str) -> Result<String, WicketError> {
        Ok(self.issue_with_expiry(kind, principal_id)?.0)
    }

    /// Sign a token and return it with its expiry timestamp, so callers
    /// reporting the expiry do not have to decode the token again.
    pub fn issue_with_expiry(
        &self,
        kind: TokenKind,
        principal_id: &str,
    ) -> Result<(String, u64), WicketError> {
        let now = unix_now()?;
        let signer = self.signer(kind);

        let claims = Claims {
            sub: principal_id.to_string(),
            iat: now,
            exp: now + signer.ttl_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(signer.secret.as_bytes()),
        )
        .map_err(|e| {
            WicketError::Internal(format!("failed to sign {} token: {}", kind.as_str(), e))
        })?;

        Ok((token, claims.exp))
    }

    /// Verify and decode a token of the given kind.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, TokenError> {
        let signer = self.signer(kind);
        let mut validation = Validation::default();
        validation.leeway = 0;

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(signer.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                Err(match err.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    _ => TokenError::Malformed,
                })
            }
        }
    }
}

fn unix_now() -> Result<u64, WicketError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| WicketError::Internal(format!("system time error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &str = "access-secret-that-is-at-least-32-chars";
    const REFRESH_SECRET: &str = "refresh-secret-that-is-at-least-32-chars";

    fn codec() -> TokenCodec {
        TokenCodec::new(ACCESS_SECRET.into(), 3600, REFRESH_SECRET.into(), 86400).unwrap()
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let codec = codec();

        let token = codec.issue(TokenKind::Access, "principal-123").unwrap();
        let claims = codec.verify(TokenKind::Access, &token).unwrap();

        assert_eq!(claims.sub, "principal-123");
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn reported_expiry_matches_the_token() {
        let codec = codec();

        let (token, expires_at) = codec
            .issue_with_expiry(TokenKind::Access, "principal-123")
            .unwrap();
        let claims = codec.verify(TokenKind::Access, &token).unwrap();

        assert_eq!(expires_at, claims.exp);
        assert_eq!(expires_at, claims.iat + 3600);
    }

    #[test]
    fn wrong_kind_never_validates() {
        let codec = codec();

        let access = codec.issue(TokenKind::Access, "principal-123").unwrap();
        let refresh = codec.issue(TokenKind::Refresh, "principal-123").unwrap();

        assert_eq!(
            codec.verify(TokenKind::Refresh, &access),
            Err(TokenError::BadSignature)
        );
        assert_eq!(
            codec.verify(TokenKind::Access, &refresh),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn expired_token_is_classified() {
        let codec = codec();

        // Craft a token whose exp is already in the past, signed with the
        // right secret, so only the expiry check can reject it.
        let claims = Claims {
            sub: "principal-123".into(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(ACCESS_SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(
            codec.verify(TokenKind::Access, &token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = codec();
        assert_eq!(
            codec.verify(TokenKind::Access, "not-a-jwt"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn short_or_shared_secrets_are_rejected() {
        assert!(TokenCodec::new("short".into(), 3600, REFRESH_SECRET.into(), 86400).is_err());
        assert!(TokenCodec::new(ACCESS_SECRET.into(), 3600, "short".into(), 86400).is_err());
        assert!(
            TokenCodec::new(ACCESS_SECRET.into(), 3600, ACCESS_SECRET.into(), 86400).is_err()
        );
    }
}
