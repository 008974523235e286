//! Principal document schema
//!
//! One record per principal. The `refresh_token` field holds the single live
//! refresh-token value; any previously issued refresh token becomes invalid
//! the moment this field changes or is cleared. The record is mutated only
//! through `UserStore` operations.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for principals
pub const USER_COLLECTION: &str = "users";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Unique login name, stored lowercase
    pub username: String,

    /// Unique email address
    pub email: String,

    /// Display name
    pub full_name: String,

    /// Argon2 password hash (PHC string)
    pub password_hash: String,

    /// The currently live refresh token. `None` means logged out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl UserDoc {
    pub fn new(username: String, email: String, full_name: String, password_hash: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            username: username.to_lowercase(),
            email,
            full_name,
            password_hash,
            refresh_token: None,
        }
    }

    /// Sanitized view: excludes the password hash and refresh token.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            created_at: self
                .metadata
                .created_at
                .and_then(|d| d.try_to_rfc3339_string().ok()),
        }
    }
}

/// What the auth gate attaches to a request and what handlers return.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_view_excludes_credentials() {
        let mut user = UserDoc::new(
            "Alice".into(),
            "alice@example.com".into(),
            "Alice Example".into(),
            "$argon2id$secret".into(),
        );
        user._id = Some(ObjectId::new());
        user.refresh_token = Some("live-token".into());

        let public = user.to_public();
        let json = serde_json::to_string(&public).unwrap();

        assert_eq!(public.username, "alice");
        assert!(!json.contains("argon2"));
        assert!(!json.contains("live-token"));
    }
}
