//! Wicket - credential and session gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wicket::{
    config::Args,
    db::{MongoClient, MongoUserStore},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wicket={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Wicket - credential gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Access token TTL: {}s", args.access_token_ttl_secs);
    info!("Refresh token TTL: {}s", args.refresh_token_ttl_secs);
    info!("======================================");

    // Connect to MongoDB
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            client
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let store = match MongoUserStore::new(&mongo).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to initialize user store: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::new(args, store) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    server::run(state).await?;

    Ok(())
}
