//! Credential store contract and MongoDB implementation
//!
//! The session manager depends on this trait rather than on a concrete
//! backend. The one non-obvious requirement is `rotate_refresh_token`: it
//! must be a per-principal compare-and-swap so that of two refresh calls
//! racing on the same stored value, exactly one can win.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::types::WicketError;

/// Fields required to create a principal record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>, WicketError>;

    /// Look up by username (case-insensitive) or email.
    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserDoc>, WicketError>;

    /// Create a principal. Fails with `Conflict` when the username or email
    /// is already taken.
    async fn create(&self, fields: NewUser) -> Result<UserDoc, WicketError>;

    /// Unconditionally set or clear the stored refresh-token value.
    /// Clearing is idempotent; setting fails with `NotFound` for a missing
    /// principal.
    async fn set_refresh_token(
        &self,
        id: &ObjectId,
        value: Option<&str>,
    ) -> Result<(), WicketError>;

    /// Swap the stored refresh-token value from `expected` to `new` as one
    /// atomic step. Returns `false` when the stored value no longer matches
    /// `expected` (a concurrent rotation or revocation won).
    async fn rotate_refresh_token(
        &self,
        id: &ObjectId,
        expected: &str,
        new: &str,
    ) -> Result<bool, WicketError>;

    async fn set_password_hash(&self, id: &ObjectId, hash: &str) -> Result<(), WicketError>;
}

/// MongoDB-backed credential store.
///
/// Rotation atomicity comes from filtering the update on the expected
/// stored value: MongoDB applies a single-document update atomically, so
/// `matched_count` tells us whether this call won the swap.
pub struct MongoUserStore {
    users: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(client: &MongoClient) -> Result<Self, WicketError> {
        Ok(Self {
            users: client.collection::<UserDoc>(USER_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>, WicketError> {
        self.users.find_one(doc! { "_id": id }).await
    }

    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserDoc>, WicketError> {
        self.users
            .find_one(doc! {
                "$or": [
                    { "username": identifier.to_lowercase() },
                    { "email": identifier },
                ]
            })
            .await
    }

    async fn create(&self, fields: NewUser) -> Result<UserDoc, WicketError> {
        let existing = self
            .find_by_username_or_email(&fields.username)
            .await?
            .or(self.find_by_username_or_email(&fields.email).await?);
        if existing.is_some() {
            return Err(WicketError::Conflict(
                "an account with this username or email already exists".into(),
            ));
        }

        let user = UserDoc::new(
            fields.username,
            fields.email,
            fields.full_name,
            fields.password_hash,
        );

        let id = match self.users.insert_one(user).await {
            Ok(id) => id,
            Err(e) => {
                // Unique index catches the lookup/insert race
                let msg = e.to_string();
                if msg.contains("duplicate key") || msg.contains("E11000") {
                    return Err(WicketError::Conflict(
                        "an account with this username or email already exists".into(),
                    ));
                }
                return Err(e);
            }
        };

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| WicketError::Internal("created user not readable".into()))
    }

    async fn set_refresh_token(
        &self,
        id: &ObjectId,
        value: Option<&str>,
    ) -> Result<(), WicketError> {
        let update = match value {
            Some(token) => doc! {
                "$set": {
                    "refresh_token": token,
                    "metadata.updated_at": bson::DateTime::now(),
                }
            },
            None => doc! {
                "$unset": { "refresh_token": "" },
                "$set": { "metadata.updated_at": bson::DateTime::now() },
            },
        };

        let result = self.users.update_one(doc! { "_id": id }, update).await?;

        // Clearing an already-cleared or missing record is not an error.
        if value.is_some() && result.matched_count == 0 {
            return Err(WicketError::NotFound("principal not found".into()));
        }

        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: &ObjectId,
        expected: &str,
        new: &str,
    ) -> Result<bool, WicketError> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id, "refresh_token": expected },
                doc! {
                    "$set": {
                        "refresh_token": new,
                        "metadata.updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?;

        Ok(result.matched_count == 1)
    }

    async fn set_password_hash(&self, id: &ObjectId, hash: &str) -> Result<(), WicketError> {
        let result = self
            .users
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "password_hash": hash,
                        "metadata.updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(WicketError::NotFound("principal not found".into()));
        }

        Ok(())
    }
}
