//! Command implementations.

pub mod lifecycle;
pub mod migrate;
pub mod settings;
pub mod sync;

use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::oneshot;
use woosync_engine::Connector;
use woosync_engine::bootstrap::{self, BootstrapError, Runtime};
use woosync_engine::config::{ConfigError, ServerConfig};
use woosync_engine::error::SyncError;
use woosync_engine::settings::SettingsError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    /// The connector refused a request.
    #[error("{0}")]
    Refused(String),

    #[error("Event worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// `DATABASE_URL` from the environment (after `.env`).
pub(crate) fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))
}

/// Run `command` against a fully wired connector.
///
/// Events queued by the command are processed in-process before returning.
pub(crate) async fn with_connector<T, F, Fut>(command: F) -> Result<T, CommandError>
where
    F: FnOnce(Connector) -> Fut,
    Fut: Future<Output = Result<T, CommandError>>,
{
    let config = ServerConfig::from_env()?;
    let Runtime {
        connector,
        mut worker,
        ..
    } = bootstrap::connect(&config.database_url, &config.warehouse).await?;

    let (stop, stopped) = oneshot::channel::<()>();
    let worker_task = tokio::spawn(async move {
        worker
            .run(async {
                let _ = stopped.await;
            })
            .await;
        worker.drain().await
    });

    let result = command(connector).await;
    let _ = stop.send(());
    let drained = worker_task.await?;
    if drained > 0 {
        tracing::info!(drained, "Processed remaining queued events");
    }
    result
}
