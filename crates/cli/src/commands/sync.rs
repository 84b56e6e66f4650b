//! Order and inventory sync commands.
//!
//! # Usage
//!
//! ```bash
//! woosync sync orders --since 2024-01-01
//! woosync sync cron
//! woosync sync inventory
//! woosync import 1001
//! ```

use woosync_core::ExternalRef;
use woosync_core::timestamp::parse_date;
use woosync_engine::cursor::PollSummary;
use woosync_engine::error::{SyncError, ValidationError};
use woosync_engine::settings::SettingKey;

use super::{CommandError, with_connector};

/// Pull orders modified since `sync_orders_since`, storing `since` first
/// when given.
///
/// # Errors
///
/// Returns `CommandError` if the date is invalid or the pull fails.
pub async fn orders(since: Option<&str>) -> Result<(), CommandError> {
    if let Some(since) = since
        && parse_date(since.trim()).is_none()
    {
        return Err(SyncError::from(ValidationError::InvalidDate {
            key: SettingKey::SyncOrdersSince.as_str(),
            value: since.to_string(),
        })
        .into());
    }

    with_connector(|connector| async move {
        if let Some(since) = since {
            let stored = connector
                .config()
                .set(SettingKey::SyncOrdersSince, since.trim())
                .await?;
            if !stored {
                return Err(CommandError::Refused(
                    "Settings store is read-only".to_string(),
                ));
            }
        }
        report(connector.sync_orders().await?);
        Ok(())
    })
    .await
}

/// Run one incremental pull from the watermark.
///
/// # Errors
///
/// Returns `CommandError` if the pull fails.
pub async fn cron() -> Result<(), CommandError> {
    with_connector(|connector| async move {
        report(connector.cron_sync_orders().await?);
        Ok(())
    })
    .await
}

/// Ask the storefront to pull a full inventory snapshot.
///
/// # Errors
///
/// Returns `CommandError` if the storefront refuses.
pub async fn inventory() -> Result<(), CommandError> {
    with_connector(|connector| async move {
        connector.sync_inventory().await?;
        tracing::info!("Inventory sync requested");
        Ok(())
    })
    .await
}

/// Import one order immediately.
///
/// # Errors
///
/// Returns `CommandError` if the import fails.
pub async fn import(increment_id: &str) -> Result<(), CommandError> {
    let external_ref = ExternalRef::new(increment_id.trim());
    with_connector(|connector| async move {
        let outcome = connector.import_order(&external_ref).await?;
        tracing::info!(external_ref = %external_ref, outcome = ?outcome, "Import finished");
        Ok(())
    })
    .await
}

fn report(summary: Option<PollSummary>) {
    match summary {
        Some(summary) => tracing::info!(
            from = %summary.from,
            to = %summary.to,
            pages = summary.pages,
            queued = summary.queued,
            "Order sync complete"
        ),
        None => tracing::warn!("Automatic order import is disabled (auto_fulfill_status)"),
    }
}
