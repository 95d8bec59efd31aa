//! Configuration for Civic Watch
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::services::TriageConfig;

/// Longest accepted gap between triage passes (30 days)
pub const MAX_TRIAGE_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted triage lease (7 days)
pub const MAX_TRIAGE_LEASE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Civic Watch - issue lifecycle backend
#[derive(Parser, Debug, Clone)]
#[command(name = "civic-watch")]
#[command(about = "Issue lifecycle backend: zone-scoped triage, resolution and archiving")]
pub struct Args {
    /// Unique node identifier; also the holder name for job leases
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, log-only mail)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB configuration
    #[command(flatten)]
    pub mongo: MongoArgs,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Triage scheduler configuration
    #[command(flatten)]
    pub triage: TriageArgs,

    /// Attempts per store transaction before giving up
    #[arg(long, env = "TX_MAX_ATTEMPTS", default_value = "5")]
    pub tx_max_attempts: u32,

    /// HTTP mail relay for verification codes (log-only when unset)
    #[arg(long, env = "MAIL_RELAY_URL")]
    pub mail_relay_url: Option<String>,

    /// Sender address passed to the mail relay
    #[arg(long, env = "MAIL_FROM")]
    pub mail_from: Option<String>,
}

/// MongoDB connection configuration
#[derive(Parser, Debug, Clone)]
pub struct MongoArgs {
    /// MongoDB connection URI (must be a replica set for transactions)
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "civic_watch")]
    pub mongodb_db: String,
}

/// Severity triage configuration
#[derive(Parser, Debug, Clone)]
pub struct TriageArgs {
    /// Run the periodic severity triage on this node
    #[arg(long, env = "TRIAGE_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub triage_enabled: bool,

    /// Seconds between triage passes
    #[arg(long, env = "TRIAGE_INTERVAL_SECS", default_value = "43200")]
    pub triage_interval_secs: u64,

    /// Minimum top vote count before severities are recomputed
    #[arg(long, env = "TRIAGE_ACTIVITY_FLOOR", default_value = "3")]
    pub triage_activity_floor: u32,

    /// Seconds a node holds the triage lease
    #[arg(long, env = "TRIAGE_LEASE_TTL_SECS", default_value = "3600")]
    pub triage_lease_ttl_secs: u64,
}

impl TriageArgs {
    pub fn config(&self) -> TriageConfig {
        TriageConfig {
            interval: Duration::from_secs(self.triage_interval_secs),
            activity_floor: self.triage_activity_floor,
            lease_ttl: Duration::from_secs(self.triage_lease_ttl_secs),
        }
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("JWT_SECRET is required in production mode".to_string())
                }
                Some(secret) if secret.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if self.triage.triage_interval_secs == 0 {
            return Err("TRIAGE_INTERVAL_SECS must be greater than zero".to_string());
        }

        if self.triage.triage_interval_secs > MAX_TRIAGE_INTERVAL_SECS {
            return Err(format!(
                "TRIAGE_INTERVAL_SECS must be at most {}",
                MAX_TRIAGE_INTERVAL_SECS
            ));
        }

        if self.triage.triage_lease_ttl_secs == 0
            || self.triage.triage_lease_ttl_secs > MAX_TRIAGE_LEASE_TTL_SECS
        {
            return Err(format!(
                "TRIAGE_LEASE_TTL_SECS must be between 1 and {}",
                MAX_TRIAGE_LEASE_TTL_SECS
            ));
        }

        if self.tx_max_attempts == 0 {
            return Err("TX_MAX_ATTEMPTS must be at least 1".to_string());
        }

        Ok(())
    }
}
