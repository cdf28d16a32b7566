//! Raid log ingestion CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use raidlog::{
    error::Result,
    models::{Config, LadderFilter},
    pipeline,
    rpc::RpcClient,
    storage::{MemoryStore, RaidStore, SqliteStore},
};
use tokio_util::sync::CancellationToken;

/// raidlog - Raid combat log ingestion
#[derive(Parser, Debug)]
#[command(
    name = "raidlog",
    version,
    about = "Ingest raid combat logs from the game panel"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the raid ladder and save raids, encounters and rosters
    Ingest {
        /// Instance map id filter
        #[arg(long)]
        map: Option<String>,

        /// Difficulty id filter
        #[arg(long)]
        difficulty: Option<String>,

        /// Instance type filter
        #[arg(long)]
        instance_type: Option<String>,

        /// Guild name filter
        #[arg(long)]
        guild: Option<String>,

        /// Stop after this many ladder pages
        #[arg(long)]
        max_pages: Option<usize>,

        /// Resolve into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Panel account name
        #[arg(long, env = "RAIDLOG_USERNAME")]
        username: Option<String>,

        /// Panel account password
        #[arg(long, env = "RAIDLOG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Show row counts of the database
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping at the next call boundary");
            token.cancel();
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    log::debug!("Using configuration {}", cli.config.display());

    match cli.command {
        Command::Ingest {
            map,
            difficulty,
            instance_type,
            guild,
            max_pages,
            dry_run,
            username,
            password,
        } => {
            if max_pages.is_some() {
                config.crawler.max_ladder_pages = max_pages;
            }
            if username.is_some() {
                config.rpc.username = username;
            }
            if password.is_some() {
                config.rpc.password = password;
            }
            config.validate()?;

            let filter = LadderFilter {
                map: map.or_else(|| config.ladder.map.clone()),
                difficulty: difficulty.or_else(|| config.ladder.difficulty.clone()),
                instance_type: instance_type.or_else(|| config.ladder.instance_type.clone()),
                guild: guild.or_else(|| config.ladder.guild.clone()),
            };

            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let client = RpcClient::new(&config.rpc)?.with_cancel(cancel.clone());
            match (&config.rpc.username, &config.rpc.password) {
                (Some(username), Some(password)) => client.login(username, password).await?,
                _ => log::warn!("No panel credentials configured; calling without a session"),
            }

            let report = if dry_run {
                log::info!("Dry run: nothing is written to the database");
                let store = MemoryStore::new();
                pipeline::run_ingest(&config, &client, &store, &filter, cancel).await?
            } else {
                let store = SqliteStore::open(&config.storage.database_path)?;
                pipeline::run_ingest(&config, &client, &store, &filter, cancel).await?
            };

            log::info!(
                "Created {} rows, skipped {} records",
                report.created(),
                report.skipped()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Info => {
            let path = &config.storage.database_path;
            log::info!("Database: {}", path.display());

            if !path.exists() {
                log::info!("No database found yet.");
                return Ok(());
            }

            let store = SqliteStore::open(path)?;
            let counts = store.counts().await?;
            log::info!("Players: {}", counts.players);
            log::info!("Character specs: {}", counts.character_specs);
            log::info!("Raid types: {}", counts.raid_types);
            log::info!("Raids: {}", counts.raids);
            log::info!("Encounters: {}", counts.encounters);
            log::info!("Player encounters: {}", counts.player_encounters);
        }
    }

    log::info!("Done!");

    Ok(())
}
