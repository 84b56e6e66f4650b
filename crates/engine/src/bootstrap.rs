//! Wiring of the production collaborators.
//!
//! Shared by the server binary and the CLI so both talk to the same
//! settings table, sync state, storefront, and warehouse.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::clock::SystemClock;
use crate::config::WarehouseConfig;
use crate::connector::Connector;
use crate::db::{self, PgStore};
use crate::events::{EventWorker, QUEUE_CAPACITY, QueueBus};
use crate::local::LocalError;
use crate::remote::RemoteError;
use crate::settings::{ConnectorSettings, EnvConfigStore, LayeredConfigStore, SettingsError};

/// Errors while assembling the connector.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Storefront connection: {0}")]
    Remote(#[from] RemoteError),
    #[error("Warehouse connection: {0}")]
    Local(#[from] LocalError),
}

/// A connector and the worker draining its event queue.
pub struct Runtime {
    pub pool: PgPool,
    pub connector: Connector,
    pub worker: EventWorker,
}

/// Build the connector on top of Postgres settings and state.
///
/// Settings stored in the database take precedence over `WOOSYNC_<KEY>`
/// environment variables.
///
/// # Errors
///
/// Returns `BootstrapError` if the database is unreachable or the storefront
/// or warehouse connection settings are missing or invalid.
pub async fn connect(
    database_url: &secrecy::SecretString,
    warehouse: &WarehouseConfig,
) -> Result<Runtime, BootstrapError> {
    let pool = db::create_pool(database_url).await?;
    info!("Database pool created");

    let store = Arc::new(PgStore::new(pool.clone()));
    let config = Arc::new(LayeredConfigStore::new(
        store.clone(),
        Arc::new(EnvConfigStore::from_env()),
    ));

    let settings = ConnectorSettings::load(config.as_ref()).await?;
    let remote = settings.remote_client()?;
    let local = warehouse.client()?;

    let (bus, receiver) = QueueBus::channel(QUEUE_CAPACITY);
    let connector = Connector::new(
        config,
        Arc::new(remote),
        Arc::new(local),
        store,
        Arc::new(bus),
        Arc::new(SystemClock),
    );
    let worker = EventWorker::new(receiver, Arc::new(connector.clone()));

    Ok(Runtime {
        pool,
        connector,
        worker,
    })
}
