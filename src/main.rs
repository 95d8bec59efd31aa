//! Civic Watch - issue lifecycle backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use civic_watch::{
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    identity::{IdentityProvider, MemoryIdentityProvider, MongoIdentityProvider},
    logging,
    server::{self, AppState},
    services::{CodeDelivery, LogDelivery, RelayDelivery, TriageScheduler},
    store::{MemoryStore, MongoStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Civic Watch");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongo.mongodb_uri, args.mongo.mongodb_db);
    info!(
        "Triage: {} (every {}s, floor {})",
        if args.triage.triage_enabled { "enabled" } else { "disabled" },
        args.triage.triage_interval_secs,
        args.triage.triage_activity_floor
    );
    info!("======================================");

    let jwt = if args.dev_mode && args.jwt_secret.is_none() {
        warn!("No JWT_SECRET in dev mode, using the built-in development secret");
        JwtValidator::new_dev()
    } else {
        JwtValidator::new(
            args.jwt_secret.clone().unwrap_or_default(),
            args.jwt_expiry_seconds,
        )?
    };

    let delivery: Arc<dyn CodeDelivery> = match &args.mail_relay_url {
        Some(url) => Arc::new(RelayDelivery::new(url.clone(), args.mail_from.clone())?),
        None => {
            if !args.dev_mode {
                warn!("MAIL_RELAY_URL not set, verification codes are only logged");
            }
            Arc::new(LogDelivery)
        }
    };

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!(
                    "MongoDB connection failed (dev mode, continuing with in-memory store): {}",
                    e
                );
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = match mongo {
        Some(client) => {
            let store = Arc::new(MongoStore::connect(client.clone(), args.tx_max_attempts).await?);
            let identities: Arc<dyn IdentityProvider> =
                Arc::new(MongoIdentityProvider::connect(&client).await?);
            AppState::new(args.clone(), store, identities, delivery, jwt)
                .with_store_backend("mongodb")
        }
        None => {
            let store = Arc::new(MemoryStore::new(args.tx_max_attempts));
            let identities: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentityProvider::new());
            AppState::new(args.clone(), store, identities, delivery, jwt)
        }
    };
    let state = Arc::new(state);

    if args.triage.triage_enabled {
        let scheduler = Arc::new(TriageScheduler::new(
            args.node_id.to_string(),
            Arc::clone(&state.issues),
            Arc::clone(&state.leases),
            args.triage.config(),
        ));
        scheduler.start().await;
    } else {
        info!("Severity triage disabled on this node");
    }

    server::run(state).await?;

    Ok(())
}
