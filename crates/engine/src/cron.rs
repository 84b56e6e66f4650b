//! Periodic incremental order pull.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::connector::Connector;

/// Run `cron_sync_orders` every `period` until `shutdown` resolves.
///
/// The first pass runs one period after start. A failed pass is logged and
/// the next tick tries again from the unchanged watermark.
pub async fn run_ticker(
    connector: Connector,
    period: Duration,
    shutdown: impl Future<Output = ()> + Send,
) {
    info!(period_secs = period.as_secs(), "Order sync ticker started");
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Order sync ticker stopping");
                break;
            }
            _ = ticker.tick() => {
                match connector.cron_sync_orders().await {
                    Ok(Some(summary)) => info!(
                        pages = summary.pages,
                        queued = summary.queued,
                        watermark = %summary.to,
                        "Order sync pass complete"
                    ),
                    Ok(None) => {}
                    Err(e) if e.is_retryable() => warn!(error = %e, "Order sync pass failed"),
                    Err(e) => error!(error = %e, "Order sync pass failed"),
                }
            }
        }
    }
}
