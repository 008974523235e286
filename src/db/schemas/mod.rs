//! Document schemas for the credential store

mod metadata;
mod user;

pub use metadata::Metadata;
pub use user::{PublicUser, UserDoc, USER_COLLECTION};
