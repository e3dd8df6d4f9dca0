//! # seed
//!
//! Operator tooling for an rp-board deployment.
//!
//! ```text
//! seed catalog skill-actions.json   # upsert the skill-action catalog
//! seed token --user <uuid> --moderator
//! ```
//!
//! Reads the same configuration as the server (`config/`, `RPB__*`, `.env`).

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

use auth_adapters::JwtIdentity;
use configs::Settings;
use domains::ports::SkillCatalog;
use domains::{Actor, Capabilities, SkillAction, UserId};
use storage_adapters::PgStore;

#[derive(Parser, Debug)]
#[command(name = "seed")]
#[command(about = "Seed the skill-action catalog and mint development tokens")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upsert every action in a JSON array file into the database
    Catalog {
        file: PathBuf,
    },
    /// Print a bearer token for the given user
    Token {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        moderator: bool,
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "seed=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;

    match cli.command {
        Command::Catalog { file } => seed_catalog(&settings, file).await,
        Command::Token {
            user,
            moderator,
            admin,
        } => {
            let identity = JwtIdentity::new(&settings.auth.jwt_secret, settings.auth.token_ttl_secs)?;
            let actor = Actor {
                user_id: UserId(user),
                capabilities: Capabilities {
                    is_moderator: moderator,
                    is_admin: admin,
                },
            };
            println!("{}", identity.issue(&actor)?);
            Ok(())
        }
    }
}

async fn seed_catalog(settings: &Settings, file: PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let actions = parse_catalog(&raw)?;

    let Some(url) = &settings.database.url else {
        bail!("database.url is not configured; the catalog can only be seeded into postgres");
    };
    let store = PgStore::connect(url.expose_secret(), settings.database.max_connections).await?;
    store.migrate().await?;

    let count = actions.len();
    for action in actions {
        store.upsert_action(action).await?;
    }
    info!(count, file = %file.display(), "skill-action catalog seeded");
    Ok(())
}

/// Parses a JSON array of actions and refuses duplicate ids.
fn parse_catalog(raw: &str) -> anyhow::Result<Vec<SkillAction>> {
    let actions: Vec<SkillAction> = serde_json::from_str(raw).context("parsing catalog JSON")?;
    let mut seen = HashSet::new();
    for action in &actions {
        if !seen.insert(action.id) {
            bail!("skill action {} appears more than once", action.id);
        }
        if action.action.trim().is_empty() || action.category.trim().is_empty() {
            bail!("skill action {} needs a category and an action name", action.id);
        }
    }
    Ok(actions)
}
