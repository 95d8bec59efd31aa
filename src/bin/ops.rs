//! Civic Watch Ops - one-shot maintenance commands
//!
//! Usage:
//!   civic-watch-ops backfill-geohash
//!   civic-watch-ops grant-superadmin --uid <uid>
//!   civic-watch-ops mint-token --uid <uid>
//!   civic-watch-ops import-issues --file issues.json
//!
//! Environment variables:
//!   MONGODB_URI, MONGODB_DB - store to operate on
//!   JWT_SECRET, JWT_EXPIRY_SECONDS - signing key for mint-token

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use civic_watch::{
    auth::{CallerRole, JwtValidator, TokenInput},
    config::MongoArgs,
    db::MongoClient,
    geo,
    identity::{IdentityProvider, MongoIdentityProvider},
    logging,
    model::Issue,
    store::{MongoStore, DEFAULT_MAX_TX_ATTEMPTS},
};

#[derive(Parser, Debug)]
#[command(name = "civic-watch-ops")]
#[command(about = "Maintenance commands for Civic Watch")]
#[command(version)]
struct Args {
    #[command(flatten)]
    mongo: MongoArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute the geohash position of every active issue
    BackfillGeohash,

    /// Give an existing identity the superadmin role
    GrantSuperadmin {
        #[arg(long)]
        uid: String,
    },

    /// Print a bearer token for an existing identity, carrying its claims
    MintToken {
        #[arg(long)]
        uid: String,

        #[arg(long, env = "JWT_SECRET")]
        jwt_secret: String,

        #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
        jwt_expiry_seconds: u64,
    },

    /// Load issues from a JSON array, indexing their positions
    ImportIssues {
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    logging::init(&args.log_level, false);

    let client = MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db)
        .await
        .context("MongoDB connection failed")?;

    match args.command {
        Command::BackfillGeohash => {
            let store = MongoStore::connect(client, DEFAULT_MAX_TX_ATTEMPTS).await?;
            let report = geo::backfill(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::GrantSuperadmin { uid } => {
            let identities = MongoIdentityProvider::connect(&client).await?;
            identities
                .set_claims(&uid, &CallerRole::SuperAdmin)
                .await
                .with_context(|| format!("Failed to grant superadmin to {}", uid))?;
            info!(uid = %uid, "Superadmin claims set");
            println!("Superadmin claims set for {}", uid);
        }

        Command::MintToken {
            uid,
            jwt_secret,
            jwt_expiry_seconds,
        } => {
            let identities = MongoIdentityProvider::connect(&client).await?;
            let Some(identity) = identities.get_identity(&uid).await? else {
                bail!("Identity {} not found", uid);
            };
            let validator = JwtValidator::new(jwt_secret, jwt_expiry_seconds)?;
            let token = validator.generate_token(TokenInput {
                uid: identity.uid,
                email: Some(identity.email),
                role: identity.claims,
            })?;
            println!("{}", token);
        }

        Command::ImportIssues { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let issues: Vec<Issue> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let store = MongoStore::connect(client, DEFAULT_MAX_TX_ATTEMPTS).await?;
            let total = issues.len();
            for issue in issues {
                let id = issue.id.clone();
                geo::insert_indexed(&store, issue)
                    .await
                    .with_context(|| format!("Failed to import issue {}", id))?;
            }
            info!(count = total, "Issues imported");
            println!("Imported {} issues", total);
        }
    }

    Ok(())
}
