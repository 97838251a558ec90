//! Operator surface shared by the CLI and the admin API.
//!
//! Every purge action returns an [`OperatorResult`] that keeps three cases
//! apart: the feature is not available, the operation failed, or there was
//! nothing to do. Malformed input is rejected with [`AppError::Validation`]
//! before anything reaches the queue or the backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use url::Url;

use crate::purge::{
    CacheDecision, ContentMutationEvent, DecisionEngine, EventBus, PurgeBackend, PurgeError,
    PurgeItem, PurgeReceipt, QueueSelection, RequestContext, RequestScope, TenantCacheConfig,
    TenantDirectory, TenantId, Zone,
    dispatcher::{AutoPurge, Dispatcher},
    headers::apply_decision,
    fanout::{NetworkCoordinator, NetworkOutcome},
    options::{OptionStore, OptionStoreExt},
    schedule::{DrainReport, drain_all_tenants},
};
use crate::infra::error::InfraError;

use super::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorStatus {
    Success,
    Warning,
    Error,
}

/// What kind of result the operator is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Done,
    Queued,
    NothingToDo,
    NotAvailable,
    Failed,
    PartialFailure,
}

/// One row of a network-wide breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantRow {
    pub site: u64,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorResult {
    pub status: OperatorStatus,
    pub kind: OutcomeKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sites: Vec<TenantRow>,
}

impl OperatorResult {
    fn new(status: OperatorStatus, kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            sites: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == OperatorStatus::Error
    }

    fn from_receipt(receipt: &PurgeReceipt) -> Self {
        let message = receipt.describe();
        match receipt {
            PurgeReceipt::Purged { .. } | PurgeReceipt::PurgedEverything => {
                Self::new(OperatorStatus::Success, OutcomeKind::Done, message)
            }
            PurgeReceipt::Queued { added } if *added > 0 => {
                Self::new(OperatorStatus::Success, OutcomeKind::Queued, message)
            }
            PurgeReceipt::PurgeAllPending => {
                Self::new(OperatorStatus::Warning, OutcomeKind::NothingToDo, message)
            }
            PurgeReceipt::Queued { .. } | PurgeReceipt::NothingToDo => {
                Self::new(OperatorStatus::Success, OutcomeKind::NothingToDo, message)
            }
        }
    }

    /// Configuration and backend failures become results; store failures stay errors.
    fn from_purge(result: Result<PurgeReceipt, PurgeError>) -> Result<Self, AppError> {
        match result {
            Ok(receipt) => Ok(Self::from_receipt(&receipt)),
            Err(PurgeError::Configuration(err)) => Ok(Self::new(
                OperatorStatus::Error,
                OutcomeKind::NotAvailable,
                format!("Cache purge not available: {err}"),
            )),
            Err(PurgeError::Backend(err)) => Ok(Self::new(
                OperatorStatus::Error,
                OutcomeKind::Failed,
                format!("Purge failed: {err}"),
            )),
            Err(PurgeError::Store(err)) => Err(AppError::from(err)),
        }
    }

    fn from_network(outcome: &NetworkOutcome) -> Self {
        let (status, kind) = if outcome.all_failed() {
            (OperatorStatus::Error, OutcomeKind::Failed)
        } else if outcome.all_succeeded() {
            (OperatorStatus::Success, OutcomeKind::Done)
        } else {
            (OperatorStatus::Warning, OutcomeKind::PartialFailure)
        };
        let mut result = Self::new(status, kind, outcome.summary());
        result.sites = outcome
            .outcomes
            .iter()
            .map(|site| TenantRow {
                site: site.tenant.0,
                result: match (site.success, site.queued) {
                    (false, _) => "failed",
                    (true, true) => "queued",
                    (true, false) => "purged",
                },
                reason: match (site.success, &site.reason) {
                    (false, None) => Some("unknown".to_string()),
                    (_, reason) => reason.clone(),
                },
            })
            .collect();
        result
    }

    fn from_drain(report: &DrainReport) -> Self {
        let mut result = if report.failed.is_empty() {
            let kind = if report.drained == 0 {
                OutcomeKind::NothingToDo
            } else {
                OutcomeKind::Done
            };
            Self::new(
                OperatorStatus::Success,
                kind,
                format!("Drained {} site queue(s); {} idle", report.drained, report.idle),
            )
        } else if report.all_failed() {
            Self::new(
                OperatorStatus::Error,
                OutcomeKind::Failed,
                format!(
                    "Drain failed for all {} site(s); queues left in place for the next run",
                    report.failed.len()
                ),
            )
        } else {
            Self::new(
                OperatorStatus::Warning,
                OutcomeKind::PartialFailure,
                format!(
                    "Drained {} site queue(s); {} left in place for the next run",
                    report.drained,
                    report.failed.len()
                ),
            )
        };
        result.sites = report
            .failed
            .iter()
            .map(|(tenant, reason)| TenantRow {
                site: tenant.0,
                result: "failed",
                reason: Some(reason.clone()),
            })
            .collect();
        result
    }
}

/// A queued item as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// Identifier accepted by `remove_queue_items`.
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueListing {
    pub items: Vec<QueueEntry>,
    pub total: usize,
    pub contains_purge_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A cache decision with the response headers it produces.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReport {
    #[serde(flatten)]
    pub decision: CacheDecision,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct PurgeOperations {
    directory: Arc<dyn TenantDirectory>,
    store: Arc<dyn OptionStore>,
    backend: Arc<dyn PurgeBackend>,
    engine: DecisionEngine,
}

impl PurgeOperations {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        store: Arc<dyn OptionStore>,
        backend: Arc<dyn PurgeBackend>,
    ) -> Self {
        Self {
            directory,
            store,
            backend,
            engine: DecisionEngine::default(),
        }
    }

    pub fn with_decision_engine(mut self, engine: DecisionEngine) -> Self {
        self.engine = engine;
        self
    }

    fn dispatcher(&self, tenant: TenantId) -> Result<Dispatcher, AppError> {
        Ok(self.directory.switch_to(tenant)?.dispatcher)
    }

    pub fn sites(&self) -> Result<Vec<TenantId>, AppError> {
        Ok(self.directory.tenants()?)
    }

    pub async fn purge_url(&self, tenant: TenantId, url: &str) -> Result<OperatorResult, AppError> {
        let url = validate_url(url)?;
        self.purge_items(tenant, vec![PurgeItem::url(url)]).await
    }

    pub async fn purge_urls(
        &self,
        tenant: TenantId,
        urls: &[String],
    ) -> Result<OperatorResult, AppError> {
        if urls.is_empty() {
            return Err(AppError::validation("at least one URL is required"));
        }
        let items = urls
            .iter()
            .map(|url| validate_url(url).map(PurgeItem::url))
            .collect::<Result<Vec<_>, _>>()?;
        self.purge_items(tenant, items).await
    }

    pub async fn purge_post(&self, tenant: TenantId, post_id: u64) -> Result<OperatorResult, AppError> {
        if post_id == 0 {
            return Err(AppError::validation("post id must be a positive integer"));
        }
        self.purge_items(tenant, vec![PurgeItem::post(post_id)]).await
    }

    pub async fn purge_term(
        &self,
        tenant: TenantId,
        term_id: u64,
        taxonomy: &str,
    ) -> Result<OperatorResult, AppError> {
        if term_id == 0 {
            return Err(AppError::validation("term id must be a positive integer"));
        }
        let taxonomy = validate_slug("taxonomy", taxonomy)?;
        self.purge_items(tenant, vec![PurgeItem::term(term_id, taxonomy)])
            .await
    }

    async fn purge_items(
        &self,
        tenant: TenantId,
        items: Vec<PurgeItem>,
    ) -> Result<OperatorResult, AppError> {
        let dispatcher = self.dispatcher(tenant)?;
        let result = OperatorResult::from_purge(dispatcher.purge_items(items).await)?;
        info!(tenant = %tenant, kind = ?result.kind, "Operator purge finished");
        Ok(result)
    }

    pub async fn purge_all(&self, tenant: TenantId) -> Result<OperatorResult, AppError> {
        let dispatcher = self.dispatcher(tenant)?;
        OperatorResult::from_purge(dispatcher.purge_all().await)
    }

    pub async fn purge_all_network(&self) -> Result<OperatorResult, AppError> {
        let coordinator = NetworkCoordinator::new(self.directory.clone());
        let outcome = coordinator.purge_all_tenants().await?;
        Ok(OperatorResult::from_network(&outcome))
    }

    pub async fn drain(&self, tenant: TenantId) -> Result<OperatorResult, AppError> {
        let dispatcher = self.dispatcher(tenant)?;
        OperatorResult::from_purge(dispatcher.drain().await)
    }

    pub async fn drain_all(&self) -> Result<OperatorResult, AppError> {
        let report = drain_all_tenants(self.directory.as_ref()).await?;
        Ok(OperatorResult::from_drain(&report))
    }

    pub fn clear_queue(&self, tenant: TenantId) -> Result<OperatorResult, AppError> {
        let queue = self.dispatcher(tenant)?.queue()?;
        let count = queue.count()?;
        if queue.clear()? {
            Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::Done,
                format!("Removed {count} queued item(s)"),
            ))
        } else {
            Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::NothingToDo,
                "Queue is already empty",
            ))
        }
    }

    /// Remove items by operator key; `"all"` clears the queue.
    pub fn remove_queue_items(
        &self,
        tenant: TenantId,
        keys: &[String],
    ) -> Result<OperatorResult, AppError> {
        if keys.is_empty() {
            return Err(AppError::validation("no queue items selected"));
        }
        let selection = QueueSelection::from_keys(keys.iter().cloned());
        if selection == QueueSelection::All {
            return self.clear_queue(tenant);
        }
        let queue = self.dispatcher(tenant)?.queue()?;
        if queue.remove(&selection)? {
            Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::Done,
                "Selected items removed from the queue",
            ))
        } else {
            Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::NothingToDo,
                "None of the selected items are queued",
            ))
        }
    }

    pub fn queue_items(&self, tenant: TenantId, limit: usize) -> Result<QueueListing, AppError> {
        let dispatcher = self.dispatcher(tenant)?;
        let config = dispatcher.config()?;
        let snapshot = dispatcher.queue()?.snapshot(limit)?;
        let warning = snapshot.over_threshold.then(|| {
            format!(
                "The queue holds {} items, more than the {} recommended; drain or clear it",
                snapshot.total, config.max_display_items
            )
        });
        Ok(QueueListing {
            items: snapshot
                .items
                .iter()
                .map(|item| QueueEntry {
                    key: item.display_key(),
                    label: item.to_string(),
                })
                .collect(),
            total: snapshot.total,
            contains_purge_all: snapshot.contains_purge_all,
            warning,
        })
    }

    /// The site's configuration with secrets redacted.
    pub fn get_config(&self, tenant: TenantId) -> Result<TenantCacheConfig, AppError> {
        let context = self.directory.switch_to(tenant)?;
        Ok(context.config.redacted())
    }

    /// Store a site's configuration, registering the site if it is new.
    ///
    /// Credentials echoed back in redacted form keep the stored secret.
    pub fn set_config(
        &self,
        tenant: TenantId,
        mut config: TenantCacheConfig,
    ) -> Result<OperatorResult, AppError> {
        validate_config(&config)?;
        if config.credentials.as_ref().is_some_and(|creds| creds.is_redacted()) {
            config.credentials = self.store.load_config(tenant)?.credentials;
        }
        if let Some(zone) = config.zone_id.as_mut() {
            *zone = zone.trim().to_string();
        }
        self.store.save_config(tenant, &config)?;
        info!(tenant = %tenant, availability = ?config.availability(), "Site configuration saved");

        let availability = config.availability();
        if config.is_available() {
            Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::Done,
                "Configuration saved",
            ))
        } else {
            Ok(OperatorResult::new(
                OperatorStatus::Warning,
                OutcomeKind::NotAvailable,
                format!("Configuration saved; {}", availability.guidance()),
            ))
        }
    }

    /// Zones visible to the site's credentials.
    pub async fn zones(&self, tenant: TenantId) -> Result<Vec<Zone>, AppError> {
        let config = self.directory.switch_to(tenant)?.config;
        let credentials = config
            .credentials
            .ok_or_else(|| AppError::validation("no backend credentials are configured"))?;
        self.backend
            .list_zones(&credentials)
            .await
            .map_err(|err| AppError::from(InfraError::http_client(err.to_string())))
    }

    /// Look up the site's configured zone at the backend.
    pub async fn verify_zone(&self, tenant: TenantId) -> Result<OperatorResult, AppError> {
        let config = self.directory.switch_to(tenant)?.config;
        let (Some(credentials), Some(zone_id)) = (config.credentials, config.zone_id) else {
            return Ok(OperatorResult::new(
                OperatorStatus::Error,
                OutcomeKind::NotAvailable,
                "Credentials and zone must both be configured",
            ));
        };
        match self.backend.zone_by_id(&credentials, &zone_id).await {
            Ok(Some(zone)) => Ok(OperatorResult::new(
                OperatorStatus::Success,
                OutcomeKind::Done,
                format!("Zone {} ({}) is reachable", zone.name, zone.id),
            )),
            Ok(None) => Ok(OperatorResult::new(
                OperatorStatus::Error,
                OutcomeKind::NotAvailable,
                format!("Zone {zone_id} was not found for these credentials"),
            )),
            Err(err) => Ok(OperatorResult::new(
                OperatorStatus::Error,
                OutcomeKind::Failed,
                format!("Zone lookup failed: {err}"),
            )),
        }
    }

    /// Decide cacheability for a host request that was already resolved.
    pub fn decide(
        &self,
        tenant: TenantId,
        context: RequestContext,
    ) -> Result<DecisionReport, AppError> {
        let config = self.directory.switch_to(tenant)?.config;
        let decision = RequestScope::new(context).finalize(&self.engine, &config);

        let mut headers = HeaderMap::new();
        apply_decision(&mut headers, &decision, OffsetDateTime::now_utc());
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        Ok(DecisionReport { decision, headers })
    }

    /// Feed a content mutation from the host. Purge failures never fail the call.
    pub async fn record_mutation(
        &self,
        tenant: TenantId,
        event: ContentMutationEvent,
    ) -> Result<(), AppError> {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(AutoPurge::new(self.dispatcher(tenant)?)));
        bus.publish(event).await;
        Ok(())
    }
}

/// Accept absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<String, AppError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|err| AppError::validation(format!("`{raw}` is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::validation(format!(
            "`{raw}` must be an absolute http(s) URL"
        )));
    }
    Ok(parsed.to_string())
}

fn validate_slug<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(value)
    } else {
        Err(AppError::validation(format!("invalid {field} `{value}`")))
    }
}

fn validate_config(config: &TenantCacheConfig) -> Result<(), AppError> {
    if config
        .zone_id
        .as_deref()
        .is_some_and(|zone| zone.trim().is_empty())
    {
        return Err(AppError::validation("zone id must not be blank"));
    }
    if config.default_ttl == Some(0) {
        return Err(AppError::validation("default TTL must be positive"));
    }
    if let Some((key, _)) = config
        .ttl_by_post_type
        .iter()
        .chain(config.ttl_by_taxonomy.iter())
        .find(|(_, ttl)| ttl.seconds() == 0)
    {
        return Err(AppError::validation(format!("TTL for `{key}` must be positive")));
    }
    if config.max_display_items == 0 {
        return Err(AppError::validation("max display items must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::MemoryOptionStore;
    use crate::infra::tenants::StoreTenantDirectory;
    use crate::purge::backend::fake::RecordingBackend;
    use crate::purge::config::Credentials;
    use crate::purge::resolver::tests::FakeGraph;

    struct Fixture {
        ops: PurgeOperations,
        backend: Arc<RecordingBackend>,
    }

    fn ready(zone: &str, queue_mode: bool) -> TenantCacheConfig {
        TenantCacheConfig {
            purge_enabled: true,
            queue_mode,
            credentials: Some(Credentials::ApiToken {
                token: "secret-token".to_string(),
            }),
            zone_id: Some(zone.to_string()),
            ..Default::default()
        }
    }

    fn fixture(configs: &[TenantCacheConfig]) -> Fixture {
        let store: Arc<dyn OptionStore> = Arc::new(MemoryOptionStore::new());
        for (index, config) in configs.iter().enumerate() {
            store
                .save_config(TenantId(index as u64 + 1), config)
                .unwrap();
        }
        let backend = Arc::new(RecordingBackend::default());
        let graph = FakeGraph::default().with_post(5, "post", "https://x/five/");
        let directory =
            StoreTenantDirectory::new(store.clone(), Arc::new(graph), backend.clone());
        Fixture {
            ops: PurgeOperations::new(Arc::new(directory), store, backend.clone()),
            backend,
        }
    }

    #[tokio::test]
    async fn invalid_urls_never_reach_the_backend() {
        let f = fixture(&[ready("zone-1", false)]);

        let err = f
            .ops
            .purge_url(TenantId(1), "ftp://x/file")
            .await
            .expect_err("invalid");
        assert!(matches!(err, AppError::Validation(_)));

        let err = f
            .ops
            .purge_urls(TenantId(1), &["https://x/a".to_string(), "nope".to_string()])
            .await
            .expect_err("invalid");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn results_distinguish_unavailable_failed_and_idle() {
        let f = fixture(&[ready("zone-1", false), TenantCacheConfig::default()]);

        let result = f.ops.purge_all(TenantId(2)).await.unwrap();
        assert_eq!(result.kind, OutcomeKind::NotAvailable);
        assert!(result.is_error());

        f.backend.fail_zone("zone-1");
        let result = f.ops.purge_post(TenantId(1), 5).await.unwrap();
        assert_eq!(result.kind, OutcomeKind::Failed);

        let result = f.ops.clear_queue(TenantId(1)).unwrap();
        assert_eq!(result.kind, OutcomeKind::NothingToDo);
        assert_eq!(result.status, OperatorStatus::Success);
    }

    #[tokio::test]
    async fn unknown_site_is_reported() {
        let f = fixture(&[ready("zone-1", false)]);
        let err = f.ops.purge_all(TenantId(9)).await.expect_err("unknown");
        assert!(matches!(err, AppError::UnknownSite(9)));
    }

    #[tokio::test]
    async fn queue_listing_warns_over_threshold() {
        let mut config = ready("zone-1", true);
        config.max_display_items = 2;
        let f = fixture(&[config]);
        for id in 1..=3 {
            f.ops.purge_post(TenantId(1), id).await.unwrap();
        }

        let listing = f.ops.queue_items(TenantId(1), 2).unwrap();
        assert_eq!(listing.total, 3);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].key, "1");
        assert!(listing.warning.is_some());

        let result = f
            .ops
            .remove_queue_items(TenantId(1), &["1".to_string(), "bogus".to_string()])
            .unwrap();
        assert_eq!(result.kind, OutcomeKind::Done);
        assert_eq!(f.ops.queue_items(TenantId(1), 10).unwrap().total, 2);

        f.ops
            .remove_queue_items(TenantId(1), &["all".to_string()])
            .unwrap();
        assert_eq!(f.ops.queue_items(TenantId(1), 10).unwrap().total, 0);
    }

    #[tokio::test]
    async fn network_purge_reports_each_site() {
        let f = fixture(&[
            ready("zone-1", false),
            ready("zone-2", false),
            ready("zone-3", true),
        ]);
        f.backend.fail_zone("zone-2");

        let result = f.ops.purge_all_network().await.unwrap();

        assert_eq!(result.status, OperatorStatus::Warning);
        assert_eq!(result.kind, OutcomeKind::PartialFailure);
        assert_eq!(result.message, "2 of 3 sites purged");
        let results: Vec<_> = result.sites.iter().map(|row| row.result).collect();
        assert_eq!(results, vec!["purged", "failed", "queued"]);
    }

    #[test]
    fn config_round_trip_keeps_secrets_out_and_in() {
        let f = fixture(&[ready("zone-1", false)]);

        let shown = f.ops.get_config(TenantId(1)).unwrap();
        assert!(shown.credentials.as_ref().unwrap().is_redacted());

        let mut edited = shown.clone();
        edited.queue_mode = true;
        let result = f.ops.set_config(TenantId(1), edited).unwrap();
        assert_eq!(result.status, OperatorStatus::Success);

        let stored = f.ops.store.load_config(TenantId(1)).unwrap();
        assert!(stored.queue_mode);
        assert_eq!(
            stored.credentials,
            Some(Credentials::ApiToken {
                token: "secret-token".to_string()
            })
        );
    }

    #[test]
    fn incomplete_config_is_saved_with_guidance() {
        let f = fixture(&[]);
        let result = f
            .ops
            .set_config(
                TenantId(4),
                TenantCacheConfig {
                    purge_enabled: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(result.kind, OutcomeKind::NotAvailable);
        assert!(result.message.contains("credentials"));
        assert_eq!(f.ops.sites().unwrap(), vec![TenantId(4)]);
    }

    #[test]
    fn url_validation_normalizes() {
        assert_eq!(validate_url(" https://x.test ").unwrap(), "https://x.test/");
        assert!(validate_url("/relative").is_err());
        assert!(validate_slug("taxonomy", "Bad Tax").is_err());
        assert_eq!(validate_slug("taxonomy", "post_tag").unwrap(), "post_tag");
    }

    #[test]
    fn decisions_come_with_headers() {
        let f = fixture(&[ready("zone-1", false)]);
        let ops = f.ops.with_decision_engine(DecisionEngine::new(Some(120)));

        let report = ops
            .decide(
                TenantId(1),
                RequestContext::frontend(crate::purge::Viewer::Anonymous).with_content(
                    crate::purge::ResolvedContent::new(crate::purge::PageView::Singular {
                        post_id: 5,
                        post_type: "post".to_string(),
                    }),
                ),
            )
            .unwrap();

        assert!(report.decision.cacheable);
        assert_eq!(report.decision.ttl_seconds, 120);
        assert_eq!(
            report.headers.get("cache-control").map(String::as_str),
            Some("public, max-age=120, s-maxage=120")
        );
        assert_eq!(
            report.headers.get("x-edge-cache-decision").map(String::as_str),
            Some("default-types")
        );
    }

    #[tokio::test]
    async fn recorded_mutations_purge_without_failing() {
        let f = fixture(&[ready("zone-1", false)]);
        f.backend.fail_zone("zone-1");

        f.ops
            .record_mutation(TenantId(1), ContentMutationEvent::saved(5))
            .await
            .expect("mutation never fails");

        f.backend.heal();
        f.ops
            .record_mutation(TenantId(1), ContentMutationEvent::saved(5))
            .await
            .unwrap();
        assert_eq!(f.backend.calls().len(), 1);
    }

    struct UnavailableStore;

    impl OptionStore for UnavailableStore {
        fn get(
            &self,
            _tenant: TenantId,
            _key: &str,
        ) -> Result<Option<serde_json::Value>, crate::purge::options::StoreError> {
            Err(crate::purge::options::StoreError::unavailable("disk gone"))
        }
        fn set(
            &self,
            _tenant: TenantId,
            _key: &str,
            _value: serde_json::Value,
        ) -> Result<(), crate::purge::options::StoreError> {
            Err(crate::purge::options::StoreError::unavailable("disk gone"))
        }
        fn delete(&self, _tenant: TenantId, _key: &str) -> Result<(), crate::purge::options::StoreError> {
            Err(crate::purge::options::StoreError::unavailable("disk gone"))
        }
        fn tenants(&self) -> Result<Vec<TenantId>, crate::purge::options::StoreError> {
            Err(crate::purge::options::StoreError::unavailable("disk gone"))
        }
    }

    #[tokio::test]
    async fn drain_all_surfaces_store_failures() {
        let store: Arc<dyn OptionStore> = Arc::new(UnavailableStore);
        let backend = Arc::new(RecordingBackend::default());
        let directory = StoreTenantDirectory::new(
            store.clone(),
            Arc::new(FakeGraph::default()),
            backend.clone(),
        );
        let ops = PurgeOperations::new(Arc::new(directory), store, backend);

        let err = ops.drain_all().await.expect_err("store is down");
        assert!(matches!(err, AppError::Infra(InfraError::Store(_))));
    }

    #[tokio::test]
    async fn drain_all_reports_failure_when_every_site_fails() {
        let f = fixture(&[ready("zone-1", true), ready("zone-1", true)]);
        for site in [1, 2] {
            f.ops
                .purge_url(TenantId(site), "https://x/a/")
                .await
                .unwrap();
        }
        f.backend.fail_zone("zone-1");

        let result = f.ops.drain_all().await.expect("sites listed");
        assert_eq!(result.status, OperatorStatus::Error);
        assert_eq!(result.kind, OutcomeKind::Failed);
        assert_eq!(result.sites.len(), 2);

        f.backend.heal();
        let result = f.ops.drain_all().await.expect("sites listed");
        assert_eq!(result.kind, OutcomeKind::Done);
    }

    #[tokio::test]
    async fn drain_all_with_empty_queues_has_nothing_to_do() {
        let f = fixture(&[ready("zone-1", true)]);

        let result = f.ops.drain_all().await.expect("sites listed");
        assert_eq!(result.status, OperatorStatus::Success);
        assert_eq!(result.kind, OutcomeKind::NothingToDo);
    }
}
