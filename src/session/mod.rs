//! Session lifecycle: login, refresh rotation, logout, password change
//!
//! The session manager owns the one-live-refresh-token-per-principal
//! invariant. A refresh token mints a new pair iff it verifies
//! cryptographically, has not expired, and is byte-equal to the value
//! currently stored on the principal record. Any mismatch is treated as
//! reuse of a stolen or already-rotated token: the stored value is revoked
//! outright and the caller must re-authenticate.

use std::sync::Arc;

use bson::oid::ObjectId;
use tracing::{info, warn};

use crate::auth::password;
use crate::auth::tokens::{TokenCodec, TokenKind};
use crate::db::schemas::PublicUser;
use crate::db::store::UserStore;
use crate::types::WicketError;

/// Outcome of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp at which the access token expires
    pub expires_at: u64,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn UserStore>,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(store: Arc<dyn UserStore>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    /// Authenticate by username-or-email and password, issue a token pair,
    /// and persist the refresh token on the principal record.
    ///
    /// Issuance and persistence are one logical unit: if the store write
    /// fails, the caller gets an error and no tokens.
    pub async fn login(&self, identifier: &str, plaintext: &str) -> Result<Session, WicketError> {
        if identifier.trim().is_empty() || plaintext.is_empty() {
            return Err(WicketError::BadRequest(
                "identifier and password are required".into(),
            ));
        }

        let user = self
            .store
            .find_by_username_or_email(identifier)
            .await?
            .ok_or_else(|| WicketError::NotFound("user does not exist".into()))?;

        if !self.verify_password(plaintext, &user.password_hash).await? {
            warn!("login failed for {}: bad credentials", user.username);
            return Err(WicketError::Unauthorized("invalid credentials".into()));
        }

        let id = user
            ._id
            .ok_or_else(|| WicketError::Internal("principal record has no id".into()))?;

        let (access_token, refresh_token, expires_at) = self.issue_pair(&id).await?;

        // Re-read after the refresh-token write so the returned view
        // reflects the persisted record.
        let user = self
            .store
            .find_by_id(&id)
            .await?
            .ok_or_else(|| WicketError::Internal("principal vanished during login".into()))?;

        info!("login successful: {}", user.username);

        Ok(Session {
            user: user.to_public(),
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Exchange a live refresh token for a new pair, rotating the stored
    /// value atomically.
    ///
    /// Signature and expiry are checked first so forged or stale tokens are
    /// rejected without a store round-trip. A presented token that verifies
    /// but does not match the stored value means the token was already
    /// rotated or stolen; the stored value is cleared (defensive
    /// revocation) before the call fails.
    pub async fn refresh(&self, presented: &str) -> Result<Session, WicketError> {
        if presented.is_empty() {
            return Err(WicketError::Unauthorized("no refresh token provided".into()));
        }

        let claims = self
            .codec
            .verify(TokenKind::Refresh, presented)
            .map_err(|e| {
                warn!("refresh token rejected: {}", e);
                WicketError::from(e)
            })?;

        let id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| WicketError::Unauthorized("invalid refresh token".into()))?;

        let user = self
            .store
            .find_by_id(&id)
            .await?
            .ok_or_else(|| WicketError::Unauthorized("invalid refresh token".into()))?;

        if user.refresh_token.as_deref() != Some(presented) {
            warn!(
                "refresh token reuse detected for {}; revoking stored token",
                user.username
            );
            self.store.set_refresh_token(&id, None).await?;
            return Err(WicketError::RefreshReused(
                "refresh token is expired or already used".into(),
            ));
        }

        let sub = id.to_hex();
        let (access_token, expires_at) = self.codec.issue_with_expiry(TokenKind::Access, &sub)?;
        let new_refresh = self.codec.issue(TokenKind::Refresh, &sub)?;

        let swapped = self
            .store
            .rotate_refresh_token(&id, presented, &new_refresh)
            .await?;
        if !swapped {
            // A concurrent refresh rotated the value between our read and
            // the swap. Same posture as reuse: revoke and fail.
            warn!(
                "concurrent refresh lost the rotation race for {}; revoking stored token",
                user.username
            );
            self.store.set_refresh_token(&id, None).await?;
            return Err(WicketError::RefreshReused(
                "refresh token is expired or already used".into(),
            ));
        }

        info!("rotated refresh token for {}", user.username);

        Ok(Session {
            user: user.to_public(),
            access_token,
            refresh_token: new_refresh,
            expires_at,
        })
    }

    /// Clear the stored refresh token. Idempotent; logging out twice is
    /// not an error. Outstanding access tokens stay valid until they expire.
    pub async fn logout(&self, principal_id: &ObjectId) -> Result<(), WicketError> {
        self.store.set_refresh_token(principal_id, None).await?;
        info!("logged out principal {}", principal_id.to_hex());
        Ok(())
    }

    /// Verify the old password and store a hash of the new one.
    ///
    /// The confirmation must match before anything touches the store.
    /// Deliberately leaves the stored refresh token in place: outstanding
    /// sessions survive a password change until they expire or log out.
    pub async fn change_password(
        &self,
        principal_id: &ObjectId,
        old_plaintext: &str,
        new_plaintext: &str,
        confirm_plaintext: &str,
    ) -> Result<(), WicketError> {
        if old_plaintext.trim().is_empty()
            || new_plaintext.trim().is_empty()
            || confirm_plaintext.trim().is_empty()
        {
            return Err(WicketError::BadRequest(
                "all password fields are required".into(),
            ));
        }

        if new_plaintext != confirm_plaintext {
            return Err(WicketError::BadRequest(
                "new password and confirmation do not match".into(),
            ));
        }

        let user = self
            .store
            .find_by_id(principal_id)
            .await?
            .ok_or_else(|| WicketError::Unauthorized("unauthorized access".into()))?;

        if !self
            .verify_password(old_plaintext, &user.password_hash)
            .await?
        {
            return Err(WicketError::BadRequest("invalid old password".into()));
        }

        let hash = self.hash_password(new_plaintext).await?;
        self.store.set_password_hash(principal_id, &hash).await?;

        info!("password changed for {}", user.username);
        Ok(())
    }

    /// Issue both tokens and persist the refresh value. Any failure here is
    /// surfaced as a single internal error: the pair could not be generated
    /// and persisted, so nothing was handed out.
    async fn issue_pair(&self, id: &ObjectId) -> Result<(String, String, u64), WicketError> {
        let sub = id.to_hex();
        let (access, expires_at) = self.codec.issue_with_expiry(TokenKind::Access, &sub)?;
        let refresh = self.codec.issue(TokenKind::Refresh, &sub)?;

        self.store
            .set_refresh_token(id, Some(&refresh))
            .await
            .map_err(|e| {
                warn!("failed to persist refresh token for {}: {}", sub, e);
                WicketError::Internal("failed to generate and persist token pair".into())
            })?;

        Ok((access, refresh, expires_at))
    }

    /// Argon2 is deliberately slow; run it off the async workers so it
    /// cannot starve token verification.
    async fn verify_password(&self, plaintext: &str, stored: &str) -> Result<bool, WicketError> {
        let plaintext = plaintext.to_string();
        let stored = stored.to_string();
        let outcome = tokio::task::spawn_blocking(move || password::verify(&plaintext, &stored))
            .await
            .map_err(|e| WicketError::Internal(format!("hashing task failed: {}", e)))?;

        match outcome {
            Ok(valid) => Ok(valid),
            Err(e) => {
                // An unreadable stored hash can never match.
                warn!("stored password hash rejected: {}", e);
                Ok(false)
            }
        }
    }

    async fn hash_password(&self, plaintext: &str) -> Result<String, WicketError> {
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || password::hash(&plaintext))
            .await
            .map_err(|e| WicketError::Internal(format!("hashing task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryUserStore;
    use crate::db::store::NewUser;

    const PASSWORD: &str = "correct-horse-battery-staple";

    fn codec() -> TokenCodec {
        TokenCodec::new(
            "access-secret-that-is-at-least-32-chars".into(),
            3600,
            "refresh-secret-that-is-at-least-32-chars".into(),
            86400,
        )
        .unwrap()
    }

    async fn manager_with_user() -> (SessionManager, Arc<MemoryUserStore>, ObjectId) {
        let store = Arc::new(MemoryUserStore::new());
        let user = store
            .create(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                full_name: "Alice Example".into(),
                password_hash: password::hash(PASSWORD).unwrap(),
            })
            .await
            .unwrap();
        let id = user._id.unwrap();
        let manager = SessionManager::new(store.clone(), codec());
        (manager, store, id)
    }

    #[tokio::test]
    async fn login_issues_and_persists_pair() {
        let (manager, store, id) = manager_with_user().await;

        let session = manager.login("alice", PASSWORD).await.unwrap();
        assert_eq!(session.user.username, "alice");
        assert!(!session.access_token.is_empty());
        assert_ne!(session.access_token, session.refresh_token);

        // Advertised expiry matches the access token's own exp claim.
        let claims = codec()
            .verify(TokenKind::Access, &session.access_token)
            .unwrap();
        assert_eq!(session.expires_at, claims.exp);

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.refresh_token.as_deref(),
            Some(session.refresh_token.as_str())
        );
    }

    #[tokio::test]
    async fn login_accepts_email_identifier() {
        let (manager, _store, _id) = manager_with_user().await;
        assert!(manager.login("alice@example.com", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let (manager, _store, _id) = manager_with_user().await;

        let err = manager.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, WicketError::Unauthorized(_)));

        let err = manager.login("nobody", PASSWORD).await.unwrap_err();
        assert!(matches!(err, WicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_rotates_the_stored_value() {
        let (manager, store, id) = manager_with_user().await;

        let first = manager.login("alice", PASSWORD).await.unwrap();
        let second = manager.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.refresh_token.as_deref(),
            Some(second.refresh_token.as_str())
        );
    }

    #[tokio::test]
    async fn replayed_refresh_revokes_everything() {
        let (manager, store, id) = manager_with_user().await;

        let first = manager.login("alice", PASSWORD).await.unwrap();
        let second = manager.refresh(&first.refresh_token).await.unwrap();

        // Replay of the rotated token fails and revokes the stored value.
        let err = manager.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, WicketError::RefreshReused(_)));

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());

        // The never-replayed successor is collateral damage by design.
        let err = manager.refresh(&second.refresh_token).await.unwrap_err();
        assert!(matches!(err, WicketError::RefreshReused(_)));
    }

    #[tokio::test]
    async fn refresh_after_logout_is_unauthorized() {
        let (manager, _store, id) = manager_with_user().await;

        let session = manager.login("alice", PASSWORD).await.unwrap();
        manager.logout(&id).await.unwrap();
        manager.logout(&id).await.unwrap(); // idempotent

        let err = manager.refresh(&session.refresh_token).await.unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_refresh_never_reaches_the_store() {
        let (manager, _store, _id) = manager_with_user().await;

        let err = manager.refresh("forged-token").await.unwrap_err();
        assert!(matches!(err, WicketError::Token(_)));
    }

    #[tokio::test]
    async fn change_password_requires_matching_confirmation() {
        let (manager, store, id) = manager_with_user().await;
        let before = store.find_by_id(&id).await.unwrap().unwrap().password_hash;

        let err = manager
            .change_password(&id, PASSWORD, "new-password", "different")
            .await
            .unwrap_err();
        assert!(matches!(err, WicketError::BadRequest(_)));

        // No store mutation happened.
        let after = store.find_by_id(&id).await.unwrap().unwrap().password_hash;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn change_password_verifies_the_old_one() {
        let (manager, _store, id) = manager_with_user().await;

        let err = manager
            .change_password(&id, "wrong-old", "new-password", "new-password")
            .await
            .unwrap_err();
        assert!(matches!(err, WicketError::BadRequest(_)));
    }

    #[tokio::test]
    async fn change_password_keeps_the_session_alive() {
        let (manager, _store, id) = manager_with_user().await;

        let session = manager.login("alice", PASSWORD).await.unwrap();
        manager
            .change_password(&id, PASSWORD, "brand-new-password", "brand-new-password")
            .await
            .unwrap();

        // Documented behavior: the stored refresh token is not revoked.
        assert!(manager.refresh(&session.refresh_token).await.is_ok());

        // And the new password is the one that logs in now.
        assert!(manager.login("alice", PASSWORD).await.is_err());
        assert!(manager.login("alice", "brand-new-password").await.is_ok());
    }
}
