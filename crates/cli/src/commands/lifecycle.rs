//! Lock, registration, and diagnostics commands.
//!
//! # Usage
//!
//! ```bash
//! woosync lock
//! woosync unlock
//! woosync activate
//! woosync deactivate
//! woosync diagnostics
//! ```

use super::{CommandError, with_connector};

/// Take the order import lock.
///
/// # Errors
///
/// Returns `CommandError` if the lock is held elsewhere past the wait.
pub async fn lock() -> Result<(), CommandError> {
    with_connector(|connector| async move {
        connector.lock_import().await?;
        tracing::info!("Order import locked");
        Ok(())
    })
    .await
}

/// Release the order import lock.
///
/// # Errors
///
/// Returns `CommandError` if the connector cannot be started.
pub async fn unlock() -> Result<(), CommandError> {
    with_connector(|connector| async move {
        connector.unlock_import().await;
        tracing::info!("Order import unlocked");
        Ok(())
    })
    .await
}

/// Register with the storefront.
///
/// # Errors
///
/// Returns `CommandError::Refused` with the registration warnings.
pub async fn activate() -> Result<(), CommandError> {
    with_connector(|connector| async move { refused_if_any(connector.activate().await) }).await
}

/// Register with the storefront again.
///
/// # Errors
///
/// Returns `CommandError::Refused` with the registration warnings.
pub async fn reinstall() -> Result<(), CommandError> {
    with_connector(|connector| async move { refused_if_any(connector.reinstall().await) }).await
}

/// Unregister and clear all sync state.
///
/// # Errors
///
/// Returns `CommandError::Refused` with the errors collected on the way.
pub async fn deactivate() -> Result<(), CommandError> {
    with_connector(|connector| async move { refused_if_any(connector.deactivate().await) }).await
}

/// Print the connection report.
///
/// # Errors
///
/// Returns `CommandError` if the storefront cannot be reached.
pub async fn diagnostics() -> Result<(), CommandError> {
    with_connector(|connector| async move {
        let lines = connector.diagnostics().await?;
        #[allow(clippy::print_stdout)]
        for line in lines {
            println!("{line}");
        }
        Ok(())
    })
    .await
}

fn refused_if_any(messages: Vec<String>) -> Result<(), CommandError> {
    if messages.is_empty() {
        tracing::info!("Done");
        Ok(())
    } else {
        Err(CommandError::Refused(messages.join("; ")))
    }
}
