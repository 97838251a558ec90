//! Tenant directory over the option store.

use std::sync::Arc;

use tracing::debug;

use crate::purge::backend::PurgeBackend;
use crate::purge::dispatcher::Dispatcher;
use crate::purge::fanout::{TenantContext, TenantDirectory};
use crate::purge::graph::ContentGraph;
use crate::purge::options::{OptionStore, OptionStoreExt, StoreError, TenantId};

use super::content::SnapshotLibrary;

#[derive(Clone)]
enum Graphs {
    Shared(Arc<dyn ContentGraph>),
    Snapshots(SnapshotLibrary),
}

/// Every tenant with options in the store is a site of the network.
#[derive(Clone)]
pub struct StoreTenantDirectory {
    store: Arc<dyn OptionStore>,
    graphs: Graphs,
    backend: Arc<dyn PurgeBackend>,
}

impl StoreTenantDirectory {
    /// All tenants share one content graph.
    pub fn new(
        store: Arc<dyn OptionStore>,
        graph: Arc<dyn ContentGraph>,
        backend: Arc<dyn PurgeBackend>,
    ) -> Self {
        Self {
            store,
            graphs: Graphs::Shared(graph),
            backend,
        }
    }

    /// Each tenant reads its own content snapshot on every switch.
    pub fn with_snapshots(
        store: Arc<dyn OptionStore>,
        library: SnapshotLibrary,
        backend: Arc<dyn PurgeBackend>,
    ) -> Self {
        Self {
            store,
            graphs: Graphs::Snapshots(library),
            backend,
        }
    }

    pub fn store(&self) -> Arc<dyn OptionStore> {
        self.store.clone()
    }

    pub fn backend(&self) -> Arc<dyn PurgeBackend> {
        self.backend.clone()
    }

    /// Dispatcher for a known tenant.
    pub fn dispatcher(&self, tenant: TenantId) -> Result<Dispatcher, StoreError> {
        self.switch_to(tenant).map(|context| context.dispatcher)
    }

    fn graph_for(&self, tenant: TenantId) -> Result<Arc<dyn ContentGraph>, StoreError> {
        match &self.graphs {
            Graphs::Shared(graph) => Ok(graph.clone()),
            Graphs::Snapshots(library) => {
                let graph = library
                    .graph_for(tenant)
                    .map_err(StoreError::unavailable)?;
                Ok(Arc::new(graph))
            }
        }
    }
}

impl TenantDirectory for StoreTenantDirectory {
    fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        self.store.tenants()
    }

    fn switch_to(&self, tenant: TenantId) -> Result<TenantContext, StoreError> {
        if !self.store.tenants()?.contains(&tenant) {
            return Err(StoreError::UnknownTenant(tenant));
        }
        debug!(tenant = %tenant, "Switched to site");
        let config = self.store.load_config(tenant)?;
        let graph = self.graph_for(tenant)?;
        Ok(TenantContext {
            tenant,
            config,
            dispatcher: Dispatcher::new(tenant, self.store.clone(), graph, self.backend.clone()),
        })
    }
}
