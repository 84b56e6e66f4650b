//! Connector settings commands.
//!
//! Settings live in the `woosync.settings` table; `WOOSYNC_<KEY>` variables
//! are only a fallback for the server.
//!
//! # Usage
//!
//! ```bash
//! woosync config set api_url https://shop.example.com
//! woosync config get auto_fulfill_status
//! ```

use woosync_engine::db::{self, PgStore};
use woosync_engine::settings::{ConfigStore, SettingKey};

use super::{CommandError, database_url};

fn parse_key(key: &str) -> Result<SettingKey, CommandError> {
    key.parse::<SettingKey>().map_err(|_| {
        let known: Vec<&str> = SettingKey::ALL.iter().map(|k| k.as_str()).collect();
        CommandError::Refused(format!(
            "Unknown setting '{key}'. Known settings: {}",
            known.join(", ")
        ))
    })
}

async fn store() -> Result<PgStore, CommandError> {
    let pool = db::create_pool(&database_url()?).await?;
    Ok(PgStore::new(pool))
}

/// Print a stored setting.
///
/// # Errors
///
/// Returns `CommandError` for an unknown key or a database failure.
pub async fn get(key: &str) -> Result<(), CommandError> {
    let key = parse_key(key)?;
    let value = store().await?.get(key).await?;
    #[allow(clippy::print_stdout)]
    match value {
        Some(value) if key.is_secret() => println!("{key} = [REDACTED] ({} chars)", value.len()),
        Some(value) => println!("{key} = {value}"),
        None => println!("{key} is not set"),
    }
    Ok(())
}

/// Store a setting; an empty value removes it.
///
/// # Errors
///
/// Returns `CommandError` for an unknown key or a database failure.
pub async fn set(key: &str, value: &str) -> Result<(), CommandError> {
    let key = parse_key(key)?;
    let store = store().await?;
    if value.trim().is_empty() {
        store.delete_setting(key).await?;
        tracing::info!(key = %key, "Setting removed");
    } else {
        store.set(key, value).await?;
        tracing::info!(key = %key, "Setting stored");
    }
    Ok(())
}
