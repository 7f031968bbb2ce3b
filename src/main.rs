use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tessera::settings::Settings;
use tessera::storage;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    version,
    about = "Operator tool for the OAuth2 storage engine"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and indexes if they are missing; run before any other command
    Init,
    /// Delete expired tokens, authorization codes and rate-limit buckets
    Purge,
    /// Clear the rate-limit bucket for a key
    ResetLimit { key: String },
    /// Inspect or remove a registered client
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand, Debug)]
enum ClientAction {
    Show { client_id: String },
    /// Delete the client, revoke its tokens and invalidate its codes
    Delete { client_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::info!(engine = ?settings.database.engine, "Loaded configuration");

    let store = storage::connect(&settings.database).await?;

    let outcome = run(store.as_ref(), cli.command).await;
    store.close().await?;
    outcome
}

async fn run(store: &dyn storage::StorageAdapter, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            store.initialize().await?;
            println!("schema ready ({} engine)", store.engine_name());
        }
        Command::Purge => {
            let report = store.purge_expired().await?;
            println!(
                "purged {} tokens, {} authorization codes, {} rate-limit buckets",
                report.tokens, report.auth_codes, report.rate_limits
            );
        }
        Command::ResetLimit { key } => {
            if store.reset_rate_limit(&key).await? {
                println!("reset rate limit '{key}'");
            } else {
                println!("no rate-limit bucket for '{key}'");
            }
        }
        Command::Client {
            action: ClientAction::Show { client_id },
        } => match store.get_client(&client_id).await? {
            Some(client) => {
                println!("{}", serde_json::to_string_pretty(&client).into_diagnostic()?)
            }
            None => miette::bail!("client '{client_id}' not found"),
        },
        Command::Client {
            action: ClientAction::Delete { client_id },
        } => {
            if !store.delete_client(&client_id).await? {
                miette::bail!("client '{client_id}' not found");
            }
            let tokens = store.revoke_all_for_client(&client_id).await?;
            let codes = store.invalidate_auth_codes_for_client(&client_id).await?;
            println!(
                "deleted client '{client_id}', revoked {tokens} tokens, invalidated {codes} codes"
            );
        }
    }
    Ok(())
}
