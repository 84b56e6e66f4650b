//! Order import and order syncs.

use serde_json::{Value as JsonValue, json};
use tracing::{error, info, instrument, warn};
use woosync_core::timestamp::parse_date;
use woosync_core::{
    ExternalRef, FeedbackStatus, ImportOutcome, ImportResult, LocalOrderId, NormalizedOrder,
    RemoteOrderRecord,
};

use super::Connector;
use crate::classify;
use crate::cursor::PollSummary;
use crate::error::{SyncError, ValidationError};
use crate::events::SyncEvent;
use crate::local::{Entity, LocalError};
use crate::remote::{HttpMethod, RemoteError, endpoints};
use crate::settings::{ConnectorSettings, SettingKey};
use crate::transform::{self, TransformError, Transformed, YamlScript};

/// An order ready to commit.
struct Prepared {
    order: NormalizedOrder,
    log: Vec<String>,
}

/// What happened inside the import lock.
enum Committed {
    Created(LocalOrderId),
    Existing(LocalOrderId),
}

impl Connector {
    /// Import one storefront order into the warehouse.
    ///
    /// Orders already in the warehouse are reported, never duplicated.
    /// Failures after the order was fetched are reported to the storefront
    /// as `failed_to_submit` and returned as `SyncError::Submission`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` for a blank reference,
    /// `SyncError::Local`/`SyncError::Remote` when the lookup or fetch fails,
    /// `SyncError::Lock` when the import lock cannot be taken, and
    /// `SyncError::Submission` for everything else.
    #[instrument(skip(self), fields(external_ref = %external_ref))]
    pub async fn import_order(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<ImportOutcome, SyncError> {
        if external_ref.is_blank() {
            return Err(ValidationError::MissingField("increment_id").into());
        }
        let subject = transform::subject(external_ref.as_str());

        if let Some(existing) = self.guard.already_imported(external_ref).await? {
            return Ok(ImportOutcome::AlreadyImported {
                unique_id: existing.unique_id,
            });
        }

        let remote = self.fetch_order(external_ref).await?;
        let settings = self.settings().await?;

        let prepared = match self.prepare(&remote, &settings, &subject).await {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(outcome)) => return Ok(outcome),
            Err(e) => return Err(self.submission_failed(external_ref, e).await),
        };

        let committed = self
            .guard
            .with_import_lock(|| async {
                if let Some(existing) = self.guard.already_imported(external_ref).await? {
                    return Ok::<_, SyncError>(Committed::Existing(existing.unique_id));
                }
                match self.commit(&prepared.order, &subject).await {
                    Ok(unique_id) => Ok(Committed::Created(unique_id)),
                    Err(e) => Err(self.submission_failed(external_ref, e).await),
                }
            })
            .await?;

        let unique_id = match committed {
            Committed::Existing(unique_id) => {
                return Ok(ImportOutcome::AlreadyImported { unique_id });
            }
            Committed::Created(unique_id) => unique_id,
        };

        self.feedback
            .comment(
                external_ref,
                FeedbackStatus::Submitted,
                &format!("Submitted to warehouse: Order # {unique_id}"),
            )
            .await;

        if !prepared.log.is_empty()
            && let Err(e) = self
                .local
                .comment(unique_id.as_str(), &prepared.log.join("\n"))
                .await
        {
            warn!(error = %e, "{subject}: could not attach transform log");
        }

        Ok(ImportOutcome::Submitted { unique_id })
    }

    /// Fetch the full storefront record of an order.
    async fn fetch_order(&self, external_ref: &ExternalRef) -> Result<RemoteOrderRecord, SyncError> {
        let response = self
            .remote
            .request(
                endpoints::ORDER_INFO,
                HttpMethod::Post,
                JsonValue::String(external_ref.to_string()),
            )
            .await?;
        serde_json::from_value(response)
            .map_err(|e| RemoteError::UnexpectedResponse(format!("order {external_ref}: {e}")).into())
    }

    /// Build and transform the import payload.
    ///
    /// `Ok(Err(_))` carries an outcome that ends the import without a commit.
    async fn prepare(
        &self,
        remote: &RemoteOrderRecord,
        settings: &ConnectorSettings,
        subject: &str,
    ) -> Result<Result<Prepared, ImportOutcome>, SyncError> {
        if remote.items.iter().all(|item| item.has_parent()) {
            info!("{subject}: no items to import");
            return Ok(Err(ImportOutcome::NoItems));
        }

        let rules = settings.shipping_rules()?;
        let method = classify::shipping_method(remote, &rules)?;
        let order = NormalizedOrder::from_remote(remote, method, self.clock.now());

        let script = load_script(settings, subject)?;
        let transformed = transform::apply(
            order,
            remote,
            script.as_ref().map(|s| s as &dyn transform::TransformScript),
            self.local.as_ref(),
        )
        .await?;

        match transformed {
            Transformed::Order { order, log } => Ok(Ok(Prepared { order, log })),
            Transformed::Skipped { reason } => Ok(Err(ImportOutcome::Skipped { reason })),
        }
    }

    /// Submit the payload to the warehouse.
    async fn commit(&self, order: &NormalizedOrder, subject: &str) -> Result<LocalOrderId, SyncError> {
        info!("{subject}: Submitting Order...");
        let fields = serde_json::to_value(order).map_err(TransformError::Payload)?;
        let response = self.local.create(Entity::Order, fields).await?;
        let result: ImportResult = serde_json::from_value(response).map_err(LocalError::Parse)?;

        if !result.success {
            return Err(SyncError::Rejected(
                result
                    .message
                    .unwrap_or_else(|| "Order import was rejected".to_string()),
            ));
        }
        let unique_id = result
            .unique_id
            .ok_or_else(|| SyncError::Rejected("Order import returned no order number".to_string()))?;

        info!(unique_id = %unique_id, "{subject}: Order Submitted to warehouse: Order # {unique_id}");
        Ok(unique_id)
    }

    /// Report a failed import to the storefront and mark it final.
    async fn submission_failed(&self, external_ref: &ExternalRef, source: SyncError) -> SyncError {
        error!(error = %source, "{}: import failed", transform::subject(external_ref.as_str()));
        self.feedback
            .comment(
                external_ref,
                FeedbackStatus::FailedToSubmit,
                &format!("Failed to Submit to warehouse: {source}"),
            )
            .await;
        SyncError::Submission {
            order_ref: external_ref.clone(),
            source: Box::new(source),
        }
    }

    // =========================================================================
    // Order Syncs
    // =========================================================================

    /// Pull orders modified since the `sync_orders_since` date, or since the
    /// watermark when that setting is empty.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` when the setting is not `YYYY-MM-DD`
    /// and `SyncError::Poll` when the pull fails.
    pub async fn sync_orders(&self) -> Result<Option<PollSummary>, SyncError> {
        let settings = self.settings().await?;
        let since = match settings.sync_orders_since.as_deref() {
            Some(raw) => {
                let date = parse_date(raw.trim()).ok_or_else(|| ValidationError::InvalidDate {
                    key: SettingKey::SyncOrdersSince.as_str(),
                    value: raw.to_string(),
                })?;
                date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
            }
            None => None,
        };
        Ok(self.cursor.run(&settings.status_filter, since).await?)
    }

    /// Pull orders modified since the watermark.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Poll` when the pull fails.
    pub async fn cron_sync_orders(&self) -> Result<Option<PollSummary>, SyncError> {
        let settings = self.settings().await?;
        Ok(self.cursor.run(&settings.status_filter, None).await?)
    }

    /// Queue an import for a storefront order created or updated just now.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` for a blank reference and
    /// `SyncError::Dispatch` if the queue is closed.
    pub async fn queue_import(&self, external_ref: ExternalRef) -> Result<(), SyncError> {
        if external_ref.is_blank() {
            return Err(ValidationError::MissingField("increment_id").into());
        }
        let event_id = self
            .bus
            .dispatch(SyncEvent::ImportOrder {
                external_ref: external_ref.clone(),
            })
            .await?;
        info!(event_id = %event_id, external_ref = %external_ref, "Order import queued");
        Ok(())
    }
}

fn load_script(settings: &ConnectorSettings, subject: &str) -> Result<Option<YamlScript>, TransformError> {
    settings
        .transform_script
        .as_deref()
        .map(YamlScript::parse)
        .transpose()
        .map_err(|source| TransformError::Script {
            subject: subject.to_string(),
            source,
        })
}
