//! Option store boundary.
//!
//! Tenants persist their purge configuration and queue in a host-provided
//! key-value store. The store offers last-write-wins semantics only; callers
//! doing read-modify-write accept that concurrent writers may lose updates.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use super::config::TenantCacheConfig;
use super::item::PurgeItem;

/// Option key holding a tenant's `TenantCacheConfig`.
pub const CONFIG_OPTION: &str = "edge_cache_config";
/// Option key holding a tenant's serialized purge queue.
pub const QUEUE_OPTION: &str = "edge_cache_purge_queue";

/// Identifies one site in the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("option store unavailable: {0}")]
    Unavailable(String),
    #[error("option `{key}` for site {tenant} is corrupt: {message}")]
    Corrupt {
        tenant: TenantId,
        key: String,
        message: String,
    },
    #[error("site {0} does not exist")]
    UnknownTenant(TenantId),
}

impl StoreError {
    pub fn unavailable(err: impl fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Raw key-value persistence, scoped by tenant.
pub trait OptionStore: Send + Sync {
    fn get(&self, tenant: TenantId, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, tenant: TenantId, key: &str, value: Value) -> Result<(), StoreError>;
    fn delete(&self, tenant: TenantId, key: &str) -> Result<(), StoreError>;
    /// Every tenant known to the store, ascending.
    fn tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

/// Typed reads and writes on top of an `OptionStore`.
pub trait OptionStoreExt: OptionStore {
    fn get_typed<T: DeserializeOwned>(
        &self,
        tenant: TenantId,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.get(tenant, key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|err| StoreError::Corrupt {
                    tenant,
                    key: key.to_string(),
                    message: err.to_string(),
                })
            })
            .transpose()
    }

    fn set_typed<T: Serialize>(
        &self,
        tenant: TenantId,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|err| StoreError::Corrupt {
            tenant,
            key: key.to_string(),
            message: err.to_string(),
        })?;
        self.set(tenant, key, value)
    }

    /// Load the tenant's purge configuration; absent configuration yields defaults.
    fn load_config(&self, tenant: TenantId) -> Result<TenantCacheConfig, StoreError> {
        Ok(self.get_typed(tenant, CONFIG_OPTION)?.unwrap_or_default())
    }

    fn save_config(&self, tenant: TenantId, config: &TenantCacheConfig) -> Result<(), StoreError> {
        self.set_typed(tenant, CONFIG_OPTION, config)
    }

    fn load_queue(&self, tenant: TenantId) -> Result<Vec<PurgeItem>, StoreError> {
        Ok(self.get_typed(tenant, QUEUE_OPTION)?.unwrap_or_default())
    }

    fn save_queue(&self, tenant: TenantId, items: &[PurgeItem]) -> Result<(), StoreError> {
        if items.is_empty() {
            return self.delete(tenant, QUEUE_OPTION);
        }
        self.set_typed(tenant, QUEUE_OPTION, &items)
    }
}

impl<S: OptionStore + ?Sized> OptionStoreExt for S {}
