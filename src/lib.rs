//! Wicket - credential and session gateway
//!
//! Authenticates principals by password, issues a pair of bearer JWTs
//! (short-lived access token, long-lived refresh token), persists the refresh
//! token server-side so it can be rotated and revoked, and verifies access
//! tokens on protected requests.
//!
//! ## Components
//!
//! - **Password hasher**: argon2id hashing and verification
//! - **Token codec**: HS256 signing/verification with independent secrets
//!   and lifetimes per token kind
//! - **Session manager**: login, refresh rotation, logout, password change;
//!   enforces the one-live-refresh-token-per-principal invariant
//! - **Auth gate**: per-request access-token verification producing a
//!   sanitized principal context
//! - **Credential store**: MongoDB-backed principal records, with an
//!   in-memory implementation for tests and storeless development

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod session;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, WicketError};
