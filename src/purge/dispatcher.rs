//! Purge dispatch for one tenant.
//!
//! Delivers invalidations either straight to the backend or through the
//! tenant's queue, and drains that queue when the scheduler asks. Content
//! mutations go through [`Dispatcher::handle_event`], which never fails; the
//! operator paths return typed errors instead.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use super::backend::{BackendError, PurgeBackend, ZoneAccess};
use super::config::TenantCacheConfig;
use super::error::PurgeError;
use super::events::{ContentMutationEvent, EventSubscriber};
use super::graph::ContentGraph;
use super::item::PurgeItem;
use super::options::{OptionStore, OptionStoreExt, StoreError, TenantId};
use super::queue::PurgeQueue;
use super::resolver::{Delivery, resolve};

const METRIC_PURGE_REQUESTS: &str = "edgepurge_purge_requests_total";
const METRIC_BACKEND_FAILURES: &str = "edgepurge_backend_failures_total";
const METRIC_DRAIN_MS: &str = "edgepurge_drain_ms";

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeReceipt {
    /// URLs were purged at the backend.
    Purged { urls: usize },
    /// The whole zone was purged.
    PurgedEverything,
    /// Items were appended to the queue for the next drain.
    Queued { added: usize },
    /// A purge-all is already waiting in the queue.
    PurgeAllPending,
    NothingToDo,
}

impl PurgeReceipt {
    /// Human-readable summary for operators.
    pub fn describe(&self) -> String {
        match self {
            PurgeReceipt::Purged { urls: 1 } => "purged 1 URL".to_string(),
            PurgeReceipt::Purged { urls } => format!("purged {urls} URLs"),
            PurgeReceipt::PurgedEverything => "purged everything".to_string(),
            PurgeReceipt::Queued { added: 0 } => "already queued".to_string(),
            PurgeReceipt::Queued { added } => format!("queued {added} item(s) for the next run"),
            PurgeReceipt::PurgeAllPending => {
                "a full purge is already queued; wait for the next run".to_string()
            }
            PurgeReceipt::NothingToDo => "nothing to purge".to_string(),
        }
    }
}

/// Dispatcher bound to one tenant.
///
/// Configuration is read from the option store on every call so operator
/// changes take effect without a restart.
#[derive(Clone)]
pub struct Dispatcher {
    tenant: TenantId,
    store: Arc<dyn OptionStore>,
    graph: Arc<dyn ContentGraph>,
    backend: Arc<dyn PurgeBackend>,
}

impl Dispatcher {
    pub fn new(
        tenant: TenantId,
        store: Arc<dyn OptionStore>,
        graph: Arc<dyn ContentGraph>,
        backend: Arc<dyn PurgeBackend>,
    ) -> Self {
        Self {
            tenant,
            store,
            graph,
            backend,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn config(&self) -> Result<TenantCacheConfig, StoreError> {
        self.store.load_config(self.tenant)
    }

    pub fn queue(&self) -> Result<PurgeQueue, StoreError> {
        let config = self.config()?;
        Ok(self.queue_for(&config))
    }

    fn queue_for(&self, config: &TenantCacheConfig) -> PurgeQueue {
        PurgeQueue::new(self.tenant, self.store.clone(), config.max_display_items)
    }

    /// React to a content mutation. Failures are logged, never returned.
    #[instrument(skip_all, fields(tenant = %self.tenant, event_id = %event.event_id))]
    pub async fn handle_event(&self, event: &ContentMutationEvent) {
        let config = match self.config() {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "Skipping automatic purge: config unavailable");
                return;
            }
        };
        if !config.auto_purge_on_change || !config.is_available() {
            debug!(
                auto_purge = config.auto_purge_on_change,
                availability = ?config.availability(),
                "Automatic purge not active"
            );
            return;
        }

        let resolution = match resolve(event, self.graph.as_ref()) {
            Ok(resolution) => resolution,
            Err(reason) => {
                debug!(reason = %reason, "Content mutation needs no purge");
                return;
            }
        };

        match self
            .deliver(&config, resolution.items, resolution.delivery)
            .await
        {
            Ok(receipt) => debug!(receipt = ?receipt, "Automatic purge dispatched"),
            Err(err) => warn!(
                error = %err,
                kind = err.kind(),
                "Automatic purge failed; content change unaffected"
            ),
        }
    }

    /// Purge explicit items following the tenant's delivery mode.
    pub async fn purge_items(&self, items: Vec<PurgeItem>) -> Result<PurgeReceipt, PurgeError> {
        let config = self.config()?;
        self.deliver(&config, items, Delivery::TenantMode).await
    }

    /// Purge the whole zone, or queue a single purge-all marker in queue mode.
    #[instrument(skip_all, fields(tenant = %self.tenant))]
    pub async fn purge_all(&self) -> Result<PurgeReceipt, PurgeError> {
        let config = self.config()?;
        let access = ZoneAccess::from_config(&config)?;

        if config.queue_mode {
            let queue = self.queue_for(&config);
            if queue.contains_purge_all()? {
                info!("Full purge already pending");
                return Ok(PurgeReceipt::PurgeAllPending);
            }
            queue.add(PurgeItem::PurgeAll)?;
            counter!(METRIC_PURGE_REQUESTS, "mode" => "queued").increment(1);
            return Ok(PurgeReceipt::Queued { added: 1 });
        }

        self.send_everything(&access).await?;
        Ok(PurgeReceipt::PurgedEverything)
    }

    /// Flush the queue in one backend call.
    ///
    /// On failure the queue is untouched and the next drain retries it. Items
    /// queued while the call was in flight survive a successful drain.
    #[instrument(skip_all, fields(tenant = %self.tenant))]
    pub async fn drain(&self) -> Result<PurgeReceipt, PurgeError> {
        let started_at = Instant::now();
        let config = self.config()?;
        let queue = self.queue_for(&config);
        let pending = queue.all()?;
        if pending.is_empty() {
            return Ok(PurgeReceipt::NothingToDo);
        }
        let access = ZoneAccess::from_config(&config)?;

        info!(items = pending.len(), "Draining purge queue");
        let receipt = if pending.iter().any(PurgeItem::is_purge_all) {
            self.send_everything(&access).await?;
            PurgeReceipt::PurgedEverything
        } else {
            let urls = self.urls_for(&pending);
            if urls.is_empty() {
                debug!("No queued item resolved to a URL");
                PurgeReceipt::NothingToDo
            } else {
                self.send_urls(&access, &urls).await?;
                PurgeReceipt::Purged { urls: urls.len() }
            }
        };

        queue.remove_items(&pending)?;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_DRAIN_MS).record(elapsed_ms);
        info!(
            items = pending.len(),
            receipt = ?receipt,
            elapsed_ms,
            "Purge queue drained"
        );
        Ok(receipt)
    }

    async fn deliver(
        &self,
        config: &TenantCacheConfig,
        items: Vec<PurgeItem>,
        delivery: Delivery,
    ) -> Result<PurgeReceipt, PurgeError> {
        let access = ZoneAccess::from_config(config)?;
        if items.is_empty() {
            return Ok(PurgeReceipt::NothingToDo);
        }

        if config.queue_mode && delivery == Delivery::TenantMode {
            let added = self.queue_for(config).extend(items)?;
            counter!(METRIC_PURGE_REQUESTS, "mode" => "queued").increment(1);
            return Ok(PurgeReceipt::Queued { added });
        }

        if items.iter().any(PurgeItem::is_purge_all) {
            self.send_everything(&access).await?;
            return Ok(PurgeReceipt::PurgedEverything);
        }
        let urls = self.urls_for(&items);
        if urls.is_empty() {
            return Ok(PurgeReceipt::NothingToDo);
        }
        self.send_urls(&access, &urls).await?;
        Ok(PurgeReceipt::Purged { urls: urls.len() })
    }

    /// Resolve items to URLs now; ids whose content has vanished are dropped.
    fn urls_for(&self, items: &[PurgeItem]) -> Vec<String> {
        let mut urls: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let url = match item {
                PurgeItem::Url { url } => Some(url.clone()),
                PurgeItem::PostId { id } => self.graph.permalink_of(*id),
                PurgeItem::Term { term_id, taxonomy } => self.graph.term_link(*term_id, taxonomy),
                PurgeItem::PurgeAll => None,
            };
            match url {
                Some(url) if !urls.contains(&url) => urls.push(url),
                Some(_) => {}
                None => debug!(item = %item, "Purge item did not resolve to a URL"),
            }
        }
        urls
    }

    async fn send_urls(&self, access: &ZoneAccess, urls: &[String]) -> Result<(), PurgeError> {
        counter!(METRIC_PURGE_REQUESTS, "mode" => "urls").increment(1);
        self.backend
            .purge_urls(access, urls)
            .await
            .map_err(|err| self.backend_failure(err))?;
        info!(tenant = %self.tenant, urls = urls.len(), mode = "urls", "Purge sent");
        Ok(())
    }

    async fn send_everything(&self, access: &ZoneAccess) -> Result<(), PurgeError> {
        counter!(METRIC_PURGE_REQUESTS, "mode" => "everything").increment(1);
        self.backend
            .purge_all(access)
            .await
            .map_err(|err| self.backend_failure(err))?;
        info!(tenant = %self.tenant, mode = "everything", "Purge sent");
        Ok(())
    }

    fn backend_failure(&self, err: BackendError) -> PurgeError {
        counter!(METRIC_BACKEND_FAILURES, "kind" => err.kind()).increment(1);
        warn!(tenant = %self.tenant, error = %err, "Purge backend call failed");
        PurgeError::Backend(err)
    }
}

/// Event subscriber purging on content changes.
pub struct AutoPurge {
    dispatcher: Dispatcher,
}

impl AutoPurge {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventSubscriber for AutoPurge {
    fn name(&self) -> &'static str {
        "auto-purge"
    }

    async fn on_event(&self, event: &ContentMutationEvent) {
        self.dispatcher.handle_event(event).await;
    }
}
