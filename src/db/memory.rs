//! In-memory credential store
//!
//! Backs tests and storeless development. `DashMap::get_mut` holds the shard
//! lock for the duration of the guard, so each read-modify-write on a record
//! is serialized per entry; that is what makes `rotate_refresh_token` a real
//! compare-and-swap here.

use async_trait::async_trait;
use bson::oid::ObjectId;
use dashmap::DashMap;

use crate::db::schemas::{Metadata, UserDoc};
use crate::db::store::{NewUser, UserStore};
use crate::types::WicketError;

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<ObjectId, UserDoc>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>, WicketError> {
        Ok(self.users.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserDoc>, WicketError> {
        let username = identifier.to_lowercase();
        Ok(self
            .users
            .iter()
            .find(|entry| entry.username == username || entry.email == identifier)
            .map(|entry| entry.clone()))
    }

    async fn create(&self, fields: NewUser) -> Result<UserDoc, WicketError> {
        let username = fields.username.to_lowercase();
        let taken = self
            .users
            .iter()
            .any(|entry| entry.username == username || entry.email == fields.email);
        if taken {
            return Err(WicketError::Conflict(
                "an account with this username or email already exists".into(),
            ));
        }

        let mut user = UserDoc::new(
            fields.username,
            fields.email,
            fields.full_name,
            fields.password_hash,
        );
        let id = ObjectId::new();
        user._id = Some(id);
        user.metadata = Metadata::new();

        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn set_refresh_token(
        &self,
        id: &ObjectId,
        value: Option<&str>,
    ) -> Result<(), WicketError> {
        match self.users.get_mut(id) {
            Some(mut entry) => {
                entry.refresh_token = value.map(|v| v.to_string());
                Ok(())
            }
            None if value.is_none() => Ok(()),
            None => Err(WicketError::NotFound("principal not found".into())),
        }
    }

    async fn rotate_refresh_token(
        &self,
        id: &ObjectId,
        expected: &str,
        new: &str,
    ) -> Result<bool, WicketError> {
        match self.users.get_mut(id) {
            Some(mut entry) if entry.refresh_token.as_deref() == Some(expected) => {
                entry.refresh_token = Some(new.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_hash(&self, id: &ObjectId, hash: &str) -> Result<(), WicketError> {
        match self.users.get_mut(id) {
            Some(mut entry) => {
                entry.password_hash = hash.to_string();
                Ok(())
            }
            None => Err(WicketError::NotFound("principal not found".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> NewUser {
        NewUser {
            username: "Sample".into(),
            email: "sample@example.com".into(),
            full_name: "Sample User".into(),
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let store = MemoryUserStore::new();
        let user = store.create(sample_user()).await.unwrap();

        // Username lookup is case-insensitive; storage is lowercase.
        let by_name = store.find_by_username_or_email("SAMPLE").await.unwrap();
        assert_eq!(by_name.unwrap()._id, user._id);

        let by_email = store
            .find_by_username_or_email("sample@example.com")
            .await
            .unwrap();
        assert_eq!(by_email.unwrap()._id, user._id);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MemoryUserStore::new();
        store.create(sample_user()).await.unwrap();

        let err = store.create(sample_user()).await.unwrap_err();
        assert!(matches!(err, WicketError::Conflict(_)));
    }

    #[tokio::test]
    async fn rotate_is_compare_and_swap() {
        let store = MemoryUserStore::new();
        let user = store.create(sample_user()).await.unwrap();
        let id = user._id.unwrap();

        store.set_refresh_token(&id, Some("r1")).await.unwrap();

        assert!(store.rotate_refresh_token(&id, "r1", "r2").await.unwrap());
        // Stale expected value loses.
        assert!(!store.rotate_refresh_token(&id, "r1", "r3").await.unwrap());

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn clearing_is_idempotent() {
        let store = MemoryUserStore::new();
        let user = store.create(sample_user()).await.unwrap();
        let id = user._id.unwrap();

        store.set_refresh_token(&id, Some("r1")).await.unwrap();
        store.set_refresh_token(&id, None).await.unwrap();
        store.set_refresh_token(&id, None).await.unwrap();

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
    }
}
