//! Per-tenant purge queue.
//!
//! The queue is an ordered, duplicate-free list of `PurgeItem`s persisted in the
//! tenant's option store. Every mutation is a read-modify-write of the stored
//! list, so the queue itself holds no state between calls.

use std::sync::Arc;

use metrics::gauge;
use tracing::{debug, info};

use super::item::PurgeItem;
use super::options::{OptionStore, OptionStoreExt, StoreError, TenantId};

const METRIC_QUEUE_LEN: &str = "edgepurge_queue_len";

/// Items to remove from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSelection {
    /// The literal "all" sentinel; equivalent to `clear`.
    All,
    /// Operator-supplied identifiers (see `PurgeItem::from_key`).
    Keys(Vec<String>),
}

impl QueueSelection {
    /// Interpret raw operator input; only a lone `"all"` selects everything.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if matches!(keys.as_slice(), [only] if only.trim() == "all") {
            QueueSelection::All
        } else {
            QueueSelection::Keys(keys)
        }
    }
}

/// A bounded view of the queue for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub items: Vec<PurgeItem>,
    pub total: usize,
    pub contains_purge_all: bool,
    /// Set when `total` exceeds the tenant's display threshold.
    pub over_threshold: bool,
}

/// Store-backed purge queue for one tenant.
#[derive(Clone)]
pub struct PurgeQueue {
    tenant: TenantId,
    store: Arc<dyn OptionStore>,
    max_display_items: usize,
}

impl PurgeQueue {
    pub fn new(tenant: TenantId, store: Arc<dyn OptionStore>, max_display_items: usize) -> Self {
        Self {
            tenant,
            store,
            max_display_items,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Append `item` unless an equal item is already queued.
    ///
    /// Returns true when the queue changed.
    pub fn add(&self, item: PurgeItem) -> Result<bool, StoreError> {
        self.extend(std::iter::once(item)).map(|added| added > 0)
    }

    /// Append each item not already queued, preserving order. Returns the count added.
    pub fn extend<I>(&self, items: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = PurgeItem>,
    {
        let mut queued = self.store.load_queue(self.tenant)?;
        let before = queued.len();
        for item in items {
            if !queued.contains(&item) {
                debug!(tenant = %self.tenant, item = %item, "Purge item enqueued");
                queued.push(item);
            }
        }
        let added = queued.len() - before;
        if added > 0 {
            self.persist(&queued)?;
        }
        Ok(added)
    }

    /// Remove the selected items; unknown identifiers are ignored.
    ///
    /// Returns true when the queue changed.
    pub fn remove(&self, selection: &QueueSelection) -> Result<bool, StoreError> {
        let keys = match selection {
            QueueSelection::All => return self.clear(),
            QueueSelection::Keys(keys) => keys,
        };
        let targets: Vec<PurgeItem> = keys
            .iter()
            .filter_map(|key| PurgeItem::from_key(key))
            .collect();
        self.remove_items(&targets)
    }

    /// Remove exactly these items, if present.
    pub fn remove_items(&self, targets: &[PurgeItem]) -> Result<bool, StoreError> {
        if targets.is_empty() {
            return Ok(false);
        }
        let mut queued = self.store.load_queue(self.tenant)?;
        let before = queued.len();
        queued.retain(|item| !targets.contains(item));
        if queued.len() == before {
            return Ok(false);
        }
        self.persist(&queued)?;
        info!(
            tenant = %self.tenant,
            removed = before - queued.len(),
            remaining = queued.len(),
            "Purge items removed"
        );
        Ok(true)
    }

    /// Empty the queue. Returns true when something was removed.
    pub fn clear(&self) -> Result<bool, StoreError> {
        let count = self.count()?;
        if count == 0 {
            return Ok(false);
        }
        self.persist(&[])?;
        info!(tenant = %self.tenant, removed = count, "Purge queue cleared");
        Ok(true)
    }

    /// Every queued item, oldest first.
    pub fn all(&self) -> Result<Vec<PurgeItem>, StoreError> {
        self.store.load_queue(self.tenant)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.count()? == 0)
    }

    pub fn contains_purge_all(&self) -> Result<bool, StoreError> {
        Ok(self.all()?.iter().any(PurgeItem::is_purge_all))
    }

    /// The first `limit` items plus totals for display.
    pub fn snapshot(&self, limit: usize) -> Result<QueueSnapshot, StoreError> {
        let all = self.all()?;
        let total = all.len();
        let contains_purge_all = all.iter().any(PurgeItem::is_purge_all);
        Ok(QueueSnapshot {
            items: all.into_iter().take(limit).collect(),
            total,
            contains_purge_all,
            over_threshold: total > self.max_display_items,
        })
    }

    fn persist(&self, items: &[PurgeItem]) -> Result<(), StoreError> {
        self.store.save_queue(self.tenant, items)?;
        gauge!(METRIC_QUEUE_LEN, "tenant" => self.tenant.to_string()).set(items.len() as f64);
        Ok(())
    }
}
