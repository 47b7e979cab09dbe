// ABOUTME: CLI entry point for crm-replicator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Args, Parser, Subcommand};
use crm_replicator::commands;
use crm_replicator::sync::SyncMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crm-replicator")]
#[command(about = "CRM-to-SQLite replication CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    /// CRM instance base URL
    #[arg(long = "base-url", env = "CRM_BASE_URL")]
    base_url: Option<String>,
    /// CRM API username
    #[arg(long, env = "CRM_USERNAME")]
    username: Option<String>,
    /// CRM API password
    #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Clone, Default)]
struct StoreArgs {
    /// Local database path (falls back to the stored target, then crm_sync.db)
    #[arg(long, env = "CRM_DATABASE")]
    database: Option<PathBuf>,
    /// Path to crm-replicator.toml describing sync behavior
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synchronization pass (or a timer loop with --watch/--daemon)
    Sync {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        store: StoreArgs,
        /// Entity type to sync (defaults to the configured entities)
        #[arg(long)]
        entity: Option<String>,
        /// Sync mode
        #[arg(long, value_enum, default_value = "incremental")]
        mode: SyncMode,
        /// Disable deletion propagation for this run
        #[arg(long)]
        no_deletes: bool,
        /// Keep running, one incremental cycle per interval
        #[arg(long)]
        watch: bool,
        /// Seconds between cycles in watch/daemon mode
        #[arg(long)]
        interval: Option<u64>,
        /// Run the watch loop as a background daemon (detaches from terminal)
        #[arg(long)]
        daemon: bool,
        /// Stop a running sync daemon
        #[arg(long)]
        stop: bool,
        /// Show status of the sync daemon
        #[arg(long)]
        daemon_status: bool,
    },
    /// Show the latest sync state per entity
    Status {
        #[command(flatten)]
        store: StoreArgs,
        /// Entity type to show (defaults to the configured entities)
        #[arg(long)]
        entity: Option<String>,
        /// Number of recent passes to show per entity
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },
    /// List recent sync log entries, newest first
    Logs {
        #[command(flatten)]
        store: StoreArgs,
        /// Entity type to list (defaults to the configured entities)
        #[arg(long)]
        entity: Option<String>,
        /// Maximum entries per entity
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Validate CRM credentials, entity metadata, and the local database
    Validate {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Manage the default local database path
    Target {
        #[command(flatten)]
        args: commands::target::TargetArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Detaching forks, so it has to happen before the runtime spawns worker
    // threads; only the forking thread survives into the child.
    if let Commands::Sync {
        daemon: true,
        stop: false,
        daemon_status: false,
        ..
    } = &cli.command
    {
        crm_replicator::daemon::detach()?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sync {
            connection,
            store,
            entity,
            mode,
            no_deletes,
            watch,
            interval,
            daemon,
            stop,
            daemon_status,
        } => {
            commands::sync::run(commands::sync::SyncOptions {
                base_url: connection.base_url,
                username: connection.username,
                password: connection.password,
                database: store.database,
                config_path: store.config_path,
                entity,
                mode,
                no_deletes,
                watch,
                interval,
                daemon,
                stop,
                daemon_status,
            })
            .await
        }
        Commands::Status {
            store,
            entity,
            limit,
        } => commands::status::run(commands::status::StatusOptions {
            database: store.database,
            config_path: store.config_path,
            entity,
            limit,
        }),
        Commands::Logs {
            store,
            entity,
            limit,
        } => commands::logs::run(commands::logs::LogsOptions {
            database: store.database,
            config_path: store.config_path,
            entity,
            limit,
        }),
        Commands::Validate { connection, store } => {
            commands::validate::run(commands::validate::ValidateOptions {
                base_url: connection.base_url,
                username: connection.username,
                password: connection.password,
                database: store.database,
                config_path: store.config_path,
            })
            .await
        }
        Commands::Target { args } => commands::target::command(args),
    }
}
