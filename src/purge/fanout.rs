//! Network-wide purge across every tenant.
//!
//! Tenants are visited one at a time. Each visit produces a `DispatchOutcome`;
//! the coordinator never stops early, so one broken site cannot hide the state
//! of the others.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::config::TenantCacheConfig;
use super::dispatcher::Dispatcher;
use super::error::ConfigurationError;
use super::options::{StoreError, TenantId};

/// A tenant switched into: its configuration and a dispatcher bound to it.
pub struct TenantContext {
    pub tenant: TenantId,
    pub config: TenantCacheConfig,
    pub dispatcher: Dispatcher,
}

/// Enumerates tenants and switches into them.
pub trait TenantDirectory: Send + Sync {
    fn tenants(&self) -> Result<Vec<TenantId>, StoreError>;
    fn switch_to(&self, tenant: TenantId) -> Result<TenantContext, StoreError>;
}

/// Result of one tenant's purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub tenant: TenantId,
    pub success: bool,
    /// Why the tenant failed; `None` when unknown, such as a failed context switch.
    pub reason: Option<String>,
    /// The purge was queued for the next scheduled run rather than sent.
    pub queued: bool,
}

impl DispatchOutcome {
    fn succeeded(tenant: TenantId, queued: bool) -> Self {
        Self {
            tenant,
            success: true,
            reason: None,
            queued,
        }
    }

    fn failed(tenant: TenantId, reason: Option<String>) -> Self {
        Self {
            tenant,
            success: false,
            reason,
            queued: false,
        }
    }
}

/// Aggregate of every tenant's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOutcome {
    pub outcomes: Vec<DispatchOutcome>,
}

impl NetworkOutcome {
    pub fn tenant_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.success).count()
    }

    pub fn all_failed(&self) -> bool {
        self.failed_count() == self.tenant_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }

    /// Failing tenants, only when some but not all failed.
    pub fn partial_failures(&self) -> Vec<&DispatchOutcome> {
        if self.all_failed() || self.all_succeeded() {
            return Vec::new();
        }
        self.outcomes.iter().filter(|outcome| !outcome.success).collect()
    }

    pub fn queued_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.queued).count()
    }

    /// One-line operator summary.
    pub fn summary(&self) -> String {
        let total = self.tenant_count();
        let succeeded = total - self.failed_count();
        if self.all_failed() {
            return format!("Purge failed on all {total} sites");
        }
        if !self.all_succeeded() {
            return format!("{succeeded} of {total} sites purged");
        }
        let mut message = format!("Purged all {total} sites");
        let queued = self.queued_count();
        if queued > 0 {
            message.push_str(&format!(
                "; {queued} site(s) use queued purge and will be purged on the next scheduled run"
            ));
        }
        message
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("no sites found")]
    NoTenants,
    #[error("failed to list sites: {0}")]
    Directory(#[from] StoreError),
}

pub struct NetworkCoordinator {
    directory: Arc<dyn TenantDirectory>,
}

impl NetworkCoordinator {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    /// Purge everything on every tenant.
    #[instrument(skip_all)]
    pub async fn purge_all_tenants(&self) -> Result<NetworkOutcome, FanoutError> {
        let tenants = self.directory.tenants()?;
        if tenants.is_empty() {
            return Err(FanoutError::NoTenants);
        }

        let mut outcomes = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let outcome = self.purge_tenant(tenant).await;
            if outcome.success {
                info!(tenant = %tenant, queued = outcome.queued, "Site purged");
            } else {
                warn!(tenant = %tenant, reason = ?outcome.reason, "Site purge failed");
            }
            outcomes.push(outcome);
        }

        let outcome = NetworkOutcome { outcomes };
        info!(
            tenants = outcome.tenant_count(),
            failed = outcome.failed_count(),
            "Network purge finished"
        );
        Ok(outcome)
    }

    async fn purge_tenant(&self, tenant: TenantId) -> DispatchOutcome {
        let context = match self.directory.switch_to(tenant) {
            Ok(context) => context,
            Err(err) => {
                warn!(tenant = %tenant, error = %err, "Could not switch to site");
                return DispatchOutcome::failed(tenant, None);
            }
        };

        if let Some(err) = ConfigurationError::from_availability(context.config.availability()) {
            return DispatchOutcome::failed(tenant, Some(err.to_string()));
        }

        match context.dispatcher.purge_all().await {
            Ok(_) => DispatchOutcome::succeeded(tenant, context.config.queue_mode),
            Err(err) => DispatchOutcome::failed(tenant, Some(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::infra::store::MemoryOptionStore;
    use crate::purge::backend::fake::RecordingBackend;
    use crate::purge::config::Credentials;
    use crate::purge::options::{OptionStore, OptionStoreExt};
    use crate::purge::resolver::tests::FakeGraph;

    struct Directory {
        store: Arc<MemoryOptionStore>,
        backend: Arc<RecordingBackend>,
        unreachable: HashSet<TenantId>,
    }

    impl TenantDirectory for Directory {
        fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
            self.store.tenants()
        }

        fn switch_to(&self, tenant: TenantId) -> Result<TenantContext, StoreError> {
            if self.unreachable.contains(&tenant) {
                return Err(StoreError::UnknownTenant(tenant));
            }
            Ok(TenantContext {
                tenant,
                config: self.store.load_config(tenant)?,
                dispatcher: Dispatcher::new(
                    tenant,
                    self.store.clone(),
                    Arc::new(FakeGraph::default()),
                    self.backend.clone(),
                ),
            })
        }
    }

    fn config(zone: &str, queue_mode: bool) -> TenantCacheConfig {
        TenantCacheConfig {
            purge_enabled: true,
            queue_mode,
            credentials: Some(Credentials::ApiToken {
                token: "tok".to_string(),
            }),
            zone_id: Some(zone.to_string()),
            ..Default::default()
        }
    }

    fn network(configs: &[TenantCacheConfig]) -> Directory {
        let store = Arc::new(MemoryOptionStore::new());
        for (index, config) in configs.iter().enumerate() {
            store
                .save_config(TenantId(index as u64 + 1), config)
                .expect("save");
        }
        Directory {
            store,
            backend: Arc::new(RecordingBackend::default()),
            unreachable: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn one_timeout_is_a_partial_failure() {
        let directory = network(&[
            config("zone-1", false),
            config("zone-2", false),
            config("zone-3", false),
        ]);
        directory.backend.fail_zone("zone-2");
        let coordinator = NetworkCoordinator::new(Arc::new(directory));

        let outcome = coordinator.purge_all_tenants().await.expect("fan-out");

        assert!(!outcome.all_failed());
        assert!(!outcome.all_succeeded());
        let failures = outcome.partial_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].tenant, TenantId(2));
        assert!(failures[0].reason.as_deref().unwrap().contains("timed out"));
        assert_eq!(outcome.summary(), "2 of 3 sites purged");
    }

    #[tokio::test]
    async fn every_failure_is_total_failure() {
        let directory = network(&[config("zone-1", false), config("zone-2", false)]);
        directory.backend.fail_zone("zone-1");
        directory.backend.fail_zone("zone-2");
        let coordinator = NetworkCoordinator::new(Arc::new(directory));

        let outcome = coordinator.purge_all_tenants().await.expect("fan-out");

        assert!(outcome.all_failed());
        assert!(outcome.partial_failures().is_empty());
        assert_eq!(outcome.summary(), "Purge failed on all 2 sites");
    }

    #[tokio::test]
    async fn queued_tenants_succeed_with_a_note() {
        let directory = network(&[config("zone-1", false), config("zone-2", true)]);
        let coordinator = NetworkCoordinator::new(Arc::new(directory));

        let outcome = coordinator.purge_all_tenants().await.expect("fan-out");

        assert!(outcome.all_succeeded());
        assert_eq!(outcome.queued_count(), 1);
        assert!(outcome.summary().contains("next scheduled run"));
    }

    #[tokio::test]
    async fn unavailable_and_unreachable_tenants_fail_with_reasons() {
        let mut directory = network(&[
            config("zone-1", false),
            TenantCacheConfig::default(),
            config("zone-3", false),
        ]);
        directory.unreachable.insert(TenantId(3));
        let coordinator = NetworkCoordinator::new(Arc::new(directory));

        let outcome = coordinator.purge_all_tenants().await.expect("fan-out");

        let failures = outcome.partial_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0].reason.as_deref(),
            Some("cache purge is disabled for this site")
        );
        assert_eq!(failures[1].tenant, TenantId(3));
        assert_eq!(failures[1].reason, None);
    }

    #[tokio::test]
    async fn empty_network_is_an_error() {
        let coordinator = NetworkCoordinator::new(Arc::new(network(&[])));
        assert!(matches!(
            coordinator.purge_all_tenants().await,
            Err(FanoutError::NoTenants)
        ));
    }

    #[test]
    fn aggregation_matches_failure_counts() {
        let tenant = |id, success| DispatchOutcome {
            tenant: TenantId(id),
            success,
            reason: None,
            queued: false,
        };
        for pattern in [
            vec![true, true, true],
            vec![false, true, true],
            vec![false, false, true],
            vec![false, false, false],
        ] {
            let outcome = NetworkOutcome {
                outcomes: pattern
                    .iter()
                    .enumerate()
                    .map(|(index, success)| tenant(index as u64, *success))
                    .collect(),
            };
            let failed = pattern.iter().filter(|success| !**success).count();
            assert_eq!(outcome.all_failed(), failed == pattern.len());
            assert_eq!(
                !outcome.partial_failures().is_empty(),
                failed > 0 && failed < pattern.len()
            );
        }
    }
}
