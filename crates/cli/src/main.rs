//! WASP CLI
//!
//! A command-line interface for browsing and editing WASP/Conduit collections.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};
use wasp_client::{WaspClient, WaspConfig};

/// Query and edit records of a WASP/Conduit service.
#[derive(Parser, Debug)]
#[command(name = "wasp", version, about)]
struct Cli {
    /// TOML configuration file. `WASP_*` variables override its values.
    #[arg(long, env = "WASP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Server URL; repeat or separate with commas for failover.
    #[arg(long = "server", value_delimiter = ',', global = true)]
    servers: Vec<String>,

    /// Upload-only server URL; repeat or separate with commas.
    #[arg(long = "upload", value_delimiter = ',', global = true)]
    uploads: Vec<String>,

    /// Bearer token for authentication.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Number of passes over the server list before giving up.
    #[arg(long, global = true)]
    retry_rounds: Option<u32>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find records in a collection.
    Find(commands::records::FindArgs),
    /// Store a new record.
    Add(commands::records::AddArgs),
    /// Update a mutable record in place.
    Update(commands::records::UpdateArgs),
    /// Delete a record and its history.
    Delete(commands::records::RecordRef),
    /// Show every version of a record, oldest first.
    History(commands::records::RecordRef),
    /// Show or change whether a record accepts in-place updates.
    Mutable(commands::mutable::MutableArgs),
    /// Change metadata tags of a record.
    Meta(commands::records::MetaArgs),
    /// Show the tag schema of a collection.
    SystemInfo(commands::schema::SystemInfoArgs),
    /// List a collection through one of its views.
    View(commands::schema::ViewArgs),
    /// List the distinct values of a tag.
    TagValues(commands::schema::TagValuesArgs),
    /// Download a stored file.
    Download(commands::files::DownloadArgs),
    /// Run a server-side action.
    Action(commands::action::ActionArgs),
}

fn load_config(cli: &Cli) -> anyhow::Result<WaspConfig> {
    let config = match &cli.config {
        Some(path) => WaspConfig::from_file(path)?,
        None => WaspConfig::default(),
    };
    let mut config = config.with_env();

    if !cli.servers.is_empty() {
        config.server_urls.clone_from(&cli.servers);
    }
    if !cli.uploads.is_empty() {
        config.upload_urls.clone_from(&cli.uploads);
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    if let Some(rounds) = cli.retry_rounds {
        config.retry_rounds = Some(rounds);
    }
    if config.server_urls.is_empty() {
        anyhow::bail!("no server configured: pass --server, set WASP_SERVER_URLS or use --config");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    debug!(servers = ?config.server_urls, uploads = ?config.upload_urls, "configuration loaded");
    let client = WaspClient::from_config(&config)?;

    match cli.command {
        Command::Find(args) => commands::records::find(&client, &args, &cli.format).await,
        Command::Add(args) => commands::records::add(&client, &args, &cli.format).await,
        Command::Update(args) => commands::records::update(&client, &args, &cli.format).await,
        Command::Delete(args) => commands::records::delete(&client, &args).await,
        Command::History(args) => commands::records::history(&client, &args, &cli.format).await,
        Command::Mutable(args) => commands::mutable::run(&client, &args, &cli.format).await,
        Command::Meta(args) => commands::records::meta(&client, &args, &cli.format).await,
        Command::SystemInfo(args) => {
            commands::schema::system_info(&client, &args, &cli.format).await
        }
        Command::View(args) => commands::schema::view(&client, &args, &cli.format).await,
        Command::TagValues(args) => {
            commands::schema::tag_values(&client, &args, &cli.format).await
        }
        Command::Download(args) => commands::files::download(&client, &args).await,
        Command::Action(args) => commands::action::run(&client, &args, &cli.format).await,
    }
}
