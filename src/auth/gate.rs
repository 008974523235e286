//! Auth gate: request-time access-token verification
//!
//! Resolves the bearer value from the `accessToken` cookie or the
//! `Authorization` header (in that order), verifies it as an access token,
//! and loads the principal it names. Every failure collapses to the same
//! Unauthorized error so the response never tells a caller whether the token
//! was missing, malformed, expired, or belonged to a deleted principal; the
//! actual cause is logged server-side only.

use bson::oid::ObjectId;
use tracing::warn;

use crate::auth::tokens::{TokenCodec, TokenKind};
use crate::db::schemas::PublicUser;
use crate::db::store::UserStore;
use crate::types::WicketError;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "accessToken";

/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Extract a token from an Authorization header value.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Extract a named cookie value from a Cookie header.
pub fn cookie_value<'a>(cookie_header: Option<&'a str>, name: &str) -> Option<&'a str> {
    let header = cookie_header?;

    for pair in header.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=') {
            if key == name && !value.is_empty() {
                return Some(value);
            }
        }
    }

    None
}

/// Resolve the access token a request carries: cookie first, then header.
pub fn access_token_from<'a>(
    cookie_header: Option<&'a str>,
    auth_header: Option<&'a str>,
) -> Option<&'a str> {
    cookie_value(cookie_header, ACCESS_COOKIE).or_else(|| extract_bearer(auth_header))
}

/// Verify the request's access token and load the principal it names.
///
/// The returned context excludes the password hash and the stored refresh
/// token value.
pub async fn authenticate(
    store: &dyn UserStore,
    codec: &TokenCodec,
    cookie_header: Option<&str>,
    auth_header: Option<&str>,
) -> Result<PublicUser, WicketError> {
    let token = match access_token_from(cookie_header, auth_header) {
        Some(t) => t,
        None => return Err(unauthorized()),
    };

    let claims = match codec.verify(TokenKind::Access, token) {
        Ok(c) => c,
        Err(e) => {
            warn!("access token rejected: {}", e);
            return Err(unauthorized());
        }
    };

    let id = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            warn!("access token subject is not a principal id");
            return Err(unauthorized());
        }
    };

    match store.find_by_id(&id).await? {
        Some(user) => Ok(user.to_public()),
        None => {
            warn!("access token for missing principal {}", claims.sub);
            Err(unauthorized())
        }
    }
}

fn unauthorized() -> WicketError {
    WicketError::Unauthorized("invalid access token".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryUserStore;
    use crate::db::store::NewUser;

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(Some("abc123")), Some("abc123"));
        assert_eq!(extract_bearer(None), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("Basic abc123")), None);
    }

    #[test]
    fn cookie_extraction() {
        assert_eq!(
            cookie_value(Some("accessToken=abc123"), "accessToken"),
            Some("abc123")
        );
        assert_eq!(
            cookie_value(Some("theme=dark; accessToken=abc123"), "accessToken"),
            Some("abc123")
        );
        assert_eq!(cookie_value(Some("accessToken="), "accessToken"), None);
        assert_eq!(cookie_value(Some("theme=dark"), "accessToken"), None);
        assert_eq!(cookie_value(None, "accessToken"), None);
    }

    #[test]
    fn cookie_wins_over_header() {
        let token = access_token_from(Some("accessToken=from-cookie"), Some("Bearer from-header"));
        assert_eq!(token, Some("from-cookie"));
    }

    fn test_codec() -> TokenCodec {
        TokenCodec::new(
            "access-secret-that-is-at-least-32-chars".into(),
            3600,
            "refresh-secret-that-is-at-least-32-chars".into(),
            86400,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn authenticate_loads_sanitized_principal() {
        let store = MemoryUserStore::new();
        let user = store
            .create(NewUser {
                username: "gatekeeper".into(),
                email: "gate@example.com".into(),
                full_name: "Gate Keeper".into(),
                password_hash: "$argon2id$fake".into(),
            })
            .await
            .unwrap();

        let codec = test_codec();
        let token = codec
            .issue(TokenKind::Access, &user._id.unwrap().to_hex())
            .unwrap();

        let ctx = authenticate(&store, &codec, None, Some(&format!("Bearer {}", token)))
            .await
            .unwrap();
        assert_eq!(ctx.username, "gatekeeper");
    }

    #[tokio::test]
    async fn authenticate_rejects_missing_and_bogus_tokens() {
        let store = MemoryUserStore::new();
        let codec = test_codec();

        assert!(authenticate(&store, &codec, None, None).await.is_err());
        assert!(authenticate(&store, &codec, None, Some("Bearer nope"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn authenticate_rejects_deleted_principal() {
        let store = MemoryUserStore::new();
        let codec = test_codec();

        // Valid token for a principal that does not exist in the store.
        let token = codec
            .issue(TokenKind::Access, &ObjectId::new().to_hex())
            .unwrap();

        let err = authenticate(&store, &codec, None, Some(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, WicketError::Unauthorized(_)));
    }
}
