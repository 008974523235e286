//! Configuration for Wicket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// Wicket - credential and session gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "wicket")]
#[command(about = "Credential and session gateway: password login, JWT pair issuance, refresh rotation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "wicket")]
    pub mongodb_db: String,

    /// Signing secret for access tokens (required, at least 32 characters)
    #[arg(long, env = "ACCESS_TOKEN_SECRET")]
    pub access_token_secret: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value = "3600")]
    pub access_token_ttl_secs: u64,

    /// Signing secret for refresh tokens (required, must differ from the access secret)
    #[arg(long, env = "REFRESH_TOKEN_SECRET")]
    pub refresh_token_secret: String,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value = "864000")]
    pub refresh_token_ttl_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.access_token_secret.len() < 32 {
            return Err("ACCESS_TOKEN_SECRET must be at least 32 characters".to_string());
        }

        if self.refresh_token_secret.len() < 32 {
            return Err("REFRESH_TOKEN_SECRET must be at least 32 characters".to_string());
        }

        if self.access_token_secret == self.refresh_token_secret {
            return Err(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be distinct".to_string(),
            );
        }

        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            return Err("token lifetimes must be non-zero".to_string());
        }

        if self.access_token_ttl_secs >= self.refresh_token_ttl_secs {
            return Err(
                "ACCESS_TOKEN_TTL_SECS must be shorter than REFRESH_TOKEN_TTL_SECS".to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_args() -> Args {
        Args {
            listen: "0.0.0.0:8080".parse().unwrap(),
            mongodb_uri: "mongodb://localhost:27017".into(),
            mongodb_db: "wicket".into(),
            access_token_secret: "access-secret-that-is-at-least-32-chars".into(),
            access_token_ttl_secs: 3600,
            refresh_token_secret: "refresh-secret-that-is-at-least-32-chars".into(),
            refresh_token_ttl_secs: 864_000,
            log_level: "info".into(),
        }
    }

    #[test]
    fn accepts_sane_defaults() {
        assert!(valid_args().validate().is_ok());
    }

    #[test]
    fn rejects_short_secrets() {
        let mut args = valid_args();
        args.access_token_secret = "short".into();
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_shared_secret() {
        let mut args = valid_args();
        args.refresh_token_secret = args.access_token_secret.clone();
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_inverted_lifetimes() {
        let mut args = valid_args();
        args.access_token_ttl_secs = args.refresh_token_ttl_secs;
        assert!(args.validate().is_err());
    }
}
