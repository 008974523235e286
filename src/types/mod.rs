//! Shared types for Wicket

mod error;

pub use error::{Result, WicketError};
