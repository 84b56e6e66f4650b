//! woosync CLI - migrations, manual syncs, and connector management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! woosync migrate
//!
//! # Pull orders modified since a date (stored as sync_orders_since)
//! woosync sync orders --since 2024-01-01
//!
//! # Run one incremental pull from the watermark
//! woosync sync cron
//!
//! # Import a single storefront order now
//! woosync import 1001
//!
//! # Register with the storefront
//! woosync activate
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sync` - Order and inventory syncs
//! - `import` - Import one order
//! - `lock` / `unlock` - Manage the order import lock
//! - `activate` / `deactivate` / `reinstall` - Storefront registration
//! - `diagnostics` - Connection report
//! - `config` - Read and write connector settings

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "woosync")]
#[command(author, version, about = "woosync CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run a sync
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Import one storefront order, bypassing the queue
    Import {
        /// Storefront order number
        increment_id: String,
    },
    /// Take the order import lock
    Lock,
    /// Release the order import lock
    Unlock,
    /// Register the fulfillment service with the storefront
    Activate,
    /// Unregister and clear all sync state
    Deactivate,
    /// Register again
    Reinstall,
    /// Print the connection report
    Diagnostics,
    /// Manage connector settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Pull orders modified since `sync_orders_since` (or the watermark)
    Orders {
        /// Start date (YYYY-MM-DD), saved as `sync_orders_since`
        #[arg(short, long)]
        since: Option<String>,
    },
    /// Pull orders modified since the watermark
    Cron,
    /// Ask the storefront to pull a full inventory snapshot
    Inventory,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a setting
    Get {
        /// Setting key (e.g. `api_url`)
        key: String,
    },
    /// Store a setting
    Set {
        /// Setting key (e.g. `api_url`)
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "woosync=info,woosync_engine=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync { target } => match target {
            SyncTarget::Orders { since } => commands::sync::orders(since.as_deref()).await?,
            SyncTarget::Cron => commands::sync::cron().await?,
            SyncTarget::Inventory => commands::sync::inventory().await?,
        },
        Commands::Import { increment_id } => commands::sync::import(&increment_id).await?,
        Commands::Lock => commands::lifecycle::lock().await?,
        Commands::Unlock => commands::lifecycle::unlock().await?,
        Commands::Activate => commands::lifecycle::activate().await?,
        Commands::Deactivate => commands::lifecycle::deactivate().await?,
        Commands::Reinstall => commands::lifecycle::reinstall().await?,
        Commands::Diagnostics => commands::lifecycle::diagnostics().await?,
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => commands::settings::get(&key).await?,
            ConfigAction::Set { key, value } => commands::settings::set(&key, &value).await?,
        },
    }
    Ok(())
}
