//! Option store implementations.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tracing::debug;

use crate::purge::lock::mutex_lock;
use crate::purge::options::{OptionStore, StoreError, TenantId};

const SOURCE: &str = "infra::store";

/// Process-local store, used by tests and embedding hosts.
#[derive(Default)]
pub struct MemoryOptionStore {
    options: DashMap<(TenantId, String), Value>,
    /// A tenant stays registered even with no options left.
    tenants: DashSet<TenantId>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, tenant: TenantId, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .options
            .get(&(tenant, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn set(&self, tenant: TenantId, key: &str, value: Value) -> Result<(), StoreError> {
        self.tenants.insert(tenant);
        self.options.insert((tenant, key.to_string()), value);
        Ok(())
    }

    fn delete(&self, tenant: TenantId, key: &str) -> Result<(), StoreError> {
        self.options.remove(&(tenant, key.to_string()));
        Ok(())
    }

    fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let mut tenants: Vec<TenantId> = self.tenants.iter().map(|entry| *entry.key()).collect();
        tenants.sort();
        Ok(tenants)
    }
}

type StateFile = BTreeMap<u64, BTreeMap<String, Value>>;

/// JSON file shared by every process of an installation.
///
/// Each operation re-reads the file, so the CLI and a running server see each
/// other's writes. Writes replace the file atomically; concurrent writers are
/// last-write-wins.
pub struct FileOptionStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileOptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StoreError::unavailable)?;
        }
        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StateFile, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::new()),
            Err(err) => return Err(StoreError::unavailable(err)),
        };
        if bytes.is_empty() {
            return Ok(StateFile::new());
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            StoreError::unavailable(format!("{} is not valid JSON: {err}", self.path.display()))
        })
    }

    fn write(&self, state: &StateFile) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let body = serde_json::to_vec_pretty(state).map_err(StoreError::unavailable)?;
        let mut file = tempfile::Builder::new()
            .prefix(".edgepurge-state")
            .tempfile_in(dir)
            .map_err(StoreError::unavailable)?;
        file.write_all(&body).map_err(StoreError::unavailable)?;
        file.persist(&self.path)
            .map_err(|err| StoreError::unavailable(err.error))?;
        debug!(path = %self.path.display(), bytes = body.len(), "Option store written");
        Ok(())
    }

    fn update<F>(&self, op: &'static str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StateFile),
    {
        let _guard = mutex_lock(&self.guard, SOURCE, op);
        let mut state = self.read()?;
        mutate(&mut state);
        self.write(&state)
    }
}

impl OptionStore for FileOptionStore {
    fn get(&self, tenant: TenantId, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = mutex_lock(&self.guard, SOURCE, "get");
        Ok(self
            .read()?
            .get(&tenant.0)
            .and_then(|options| options.get(key))
            .cloned())
    }

    fn set(&self, tenant: TenantId, key: &str, value: Value) -> Result<(), StoreError> {
        self.update("set", |state| {
            state
                .entry(tenant.0)
                .or_default()
                .insert(key.to_string(), value);
        })
    }

    fn delete(&self, tenant: TenantId, key: &str) -> Result<(), StoreError> {
        self.update("delete", |state| {
            // The tenant stays registered even with no options left.
            if let Some(options) = state.get_mut(&tenant.0) {
                options.remove(key);
            }
        })
    }

    fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let _guard = mutex_lock(&self.guard, SOURCE, "tenants");
        Ok(self.read()?.keys().copied().map(TenantId).collect())
    }
}
