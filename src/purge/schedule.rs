//! Scheduled queue drains.
//!
//! The dispatcher does not know how it is invoked; this module wires `drain`
//! into an apalis cron worker and offers the same pass for one-shot use.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;
use tracing::{debug, info, warn};

use super::dispatcher::PurgeReceipt;
use super::fanout::TenantDirectory;
use super::options::{StoreError, TenantId};

/// Every minute, at second zero.
pub const DEFAULT_DRAIN_CRON: &str = "0 * * * * *";

/// Marker for the cron-triggered drain job.
#[derive(Default, Debug, Clone)]
pub struct DrainJob;

impl From<chrono::DateTime<chrono::Utc>> for DrainJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Worker data for [`process_drain_job`].
#[derive(Clone)]
pub struct DrainContext {
    pub directory: Arc<dyn TenantDirectory>,
}

/// Per-pass counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: usize,
    pub idle: usize,
    pub failed: Vec<(TenantId, String)>,
}

impl DrainReport {
    /// Every visited site failed and none was drained or idle.
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.drained == 0 && self.idle == 0
    }
}

/// Drain every tenant's queue once, sequentially.
///
/// A failing tenant keeps its queue and is retried on the next pass. Only a
/// failure to list the sites fails the pass as a whole.
pub async fn drain_all_tenants(
    directory: &dyn TenantDirectory,
) -> Result<DrainReport, StoreError> {
    let mut report = DrainReport::default();
    let tenants = directory.tenants()?;

    for tenant in tenants {
        let context = match directory.switch_to(tenant) {
            Ok(context) => context,
            Err(err) => {
                report.failed.push((tenant, err.to_string()));
                continue;
            }
        };
        match context.dispatcher.drain().await {
            Ok(PurgeReceipt::NothingToDo) => report.idle += 1,
            Ok(receipt) => {
                debug!(tenant = %tenant, receipt = ?receipt, "Site queue drained");
                report.drained += 1;
            }
            Err(err) => report.failed.push((tenant, err.to_string())),
        }
    }
    Ok(report)
}

pub async fn process_drain_job(
    _job: DrainJob,
    ctx: Data<DrainContext>,
) -> Result<(), apalis::prelude::Error> {
    let report = match drain_all_tenants(ctx.directory.as_ref()).await {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "Could not list sites for drain");
            return Ok(());
        }
    };
    if report.drained > 0 || !report.failed.is_empty() {
        info!(
            drained = report.drained,
            idle = report.idle,
            failed = report.failed.len(),
            "Scheduled drain finished"
        );
    }
    for (tenant, reason) in &report.failed {
        warn!(tenant = %tenant, reason = %reason, "Scheduled drain left queue in place");
    }
    Ok(())
}

/// Parse a six-field cron expression (seconds first).
pub fn drain_schedule(expression: &str) -> Result<Schedule, String> {
    Schedule::from_str(expression).map_err(|err| format!("invalid cron `{expression}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::MemoryOptionStore;
    use crate::infra::tenants::StoreTenantDirectory;
    use crate::purge::backend::fake::RecordingBackend;
    use crate::purge::config::{Credentials, TenantCacheConfig};
    use crate::purge::item::PurgeItem;
    use crate::purge::options::{OptionStore, OptionStoreExt};
    use crate::purge::resolver::tests::FakeGraph;

    #[test]
    fn default_schedule_fires_every_minute() {
        let schedule = drain_schedule(DEFAULT_DRAIN_CRON).expect("valid");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(2).collect();
        assert_eq!(upcoming.len(), 2);
        assert_eq!((upcoming[1] - upcoming[0]).num_seconds(), 60);
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(drain_schedule("every minute").is_err());
    }

    #[tokio::test]
    async fn drain_pass_counts_each_tenant() {
        let store: Arc<dyn OptionStore> = Arc::new(MemoryOptionStore::new());
        let ready = TenantCacheConfig {
            purge_enabled: true,
            queue_mode: true,
            credentials: Some(Credentials::ApiToken {
                token: "tok".to_string(),
            }),
            zone_id: Some("zone-1".to_string()),
            ..Default::default()
        };
        store.save_config(TenantId(1), &ready).unwrap();
        store.save_config(TenantId(2), &ready).unwrap();
        store
            .save_queue(TenantId(1), &[PurgeItem::url("https://x/a")])
            .unwrap();

        let backend = Arc::new(RecordingBackend::default());
        let directory = StoreTenantDirectory::new(store.clone(), Arc::new(FakeGraph::default()), backend.clone());

        let report = drain_all_tenants(&directory).await.expect("sites listed");

        assert_eq!(report.drained, 1);
        assert_eq!(report.idle, 1);
        assert!(report.failed.is_empty());
        assert_eq!(backend.calls().len(), 1);
        assert!(store.load_queue(TenantId(1)).unwrap().is_empty());
    }
}
