//! Authentication primitives for Wicket
//!
//! Provides:
//! - Password hashing with Argon2
//! - Access/refresh token signing and verification
//! - The auth gate that turns a bearer token into a principal context

pub mod gate;
pub mod password;
pub mod tokens;

pub use gate::{authenticate, extract_bearer, ACCESS_COOKIE, REFRESH_COOKIE};
pub use tokens::{Claims, TokenCodec, TokenError, TokenKind};
