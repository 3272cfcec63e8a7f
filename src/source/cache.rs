//! Local order store
//!
//! Keeps the user's own orders on disk as a JSON array. The backend drops
//! cancelled orders from its book, so this file is the only place a
//! cancellation survives a restart. It is also the first fallback when the
//! order book cannot be fetched.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::{DisplayOrder, OrderId, OrderStatus};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Disk-backed map of the user's orders and their local status
pub struct LocalOrderStore {
    path: PathBuf,
    orders: RwLock<BTreeMap<OrderId, DisplayOrder>>,
}

impl LocalOrderStore {
    /// Open the store, starting empty when the file is missing or unreadable
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let orders = match load_from_file(&path) {
            Ok(list) => list.into_iter().map(|o| (o.id.clone(), o)).collect(),
            Err(e) => {
                if path.exists() {
                    warn!("Ignoring unreadable order cache {:?}: {}", path, e);
                } else {
                    debug!("No order cache at {:?}, starting empty", path);
                }
                BTreeMap::new()
            }
        };

        Self {
            path,
            orders: RwLock::new(orders),
        }
    }

    /// Local status override for an order
    pub fn status_of(&self, id: &OrderId) -> Option<OrderStatus> {
        self.read().get(id).map(|o| o.status)
    }

    /// Cached copy of an order, as it was when last written
    pub fn get(&self, id: &OrderId) -> Option<DisplayOrder> {
        self.read().get(id).cloned()
    }

    /// Cached orders of one committee
    pub fn orders_for(&self, committee: u64) -> Vec<DisplayOrder> {
        self.read()
            .values()
            .filter(|o| o.committee == committee)
            .cloned()
            .collect()
    }

    /// Cancelled orders of one committee
    pub fn cancelled_for(&self, committee: u64) -> Vec<DisplayOrder> {
        self.read()
            .values()
            .filter(|o| o.committee == committee && o.status == OrderStatus::Cancelled)
            .cloned()
            .collect()
    }

    /// Refresh cached copies of the user's own orders, keeping local statuses
    pub fn upsert_owned(&self, owned: &[DisplayOrder]) -> CoordinatorResult<()> {
        if owned.is_empty() {
            return Ok(());
        }
        let mut orders = self.write();
        for order in owned {
            let status = orders.get(&order.id).map(|o| o.status).unwrap_or(order.status);
            let mut copy = order.clone();
            copy.status = status;
            orders.insert(copy.id.clone(), copy);
        }
        self.persist(&orders)
    }

    /// Record a local status change and write it out
    pub fn set_status(&self, order: &DisplayOrder, status: OrderStatus) -> CoordinatorResult<()> {
        let mut orders = self.write();
        let mut copy = order.clone();
        copy.status = status;
        orders.insert(copy.id.clone(), copy);
        self.persist(&orders)
    }

    /// Drop entries; returns how many were present
    pub fn remove(&self, ids: &[OrderId]) -> CoordinatorResult<usize> {
        let mut orders = self.write();
        let removed = ids.iter().filter(|id| orders.remove(*id).is_some()).count();
        if removed > 0 {
            self.persist(&orders)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<OrderId, DisplayOrder>> {
        self.orders.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<OrderId, DisplayOrder>> {
        self.orders.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, orders: &BTreeMap<OrderId, DisplayOrder>) -> CoordinatorResult<()> {
        let list: Vec<&DisplayOrder> = orders.values().collect();
        save_to_file(&list, &self.path)?;
        debug!("Persisted {} orders to {:?}", list.len(), self.path);
        Ok(())
    }
}

/// Write via a temporary sibling file so a crash never leaves half a cache
fn save_to_file(orders: &[&DisplayOrder], path: &Path) -> CoordinatorResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoordinatorError::Cache(format!("create {:?}: {}", parent, e)))?;
        }
    }

    let tmp = path.with_extension("tmp");
    let file = File::create(&tmp)
        .map_err(|e| CoordinatorError::Cache(format!("create {:?}: {}", tmp, e)))?;
    serde_json::to_writer_pretty(BufWriter::new(file), orders)
        .map_err(|e| CoordinatorError::Cache(format!("write {:?}: {}", tmp, e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| CoordinatorError::Cache(format!("rename {:?}: {}", tmp, e)))?;
    Ok(())
}

fn load_from_file(path: &Path) -> CoordinatorResult<Vec<DisplayOrder>> {
    let file = File::open(path)
        .map_err(|e| CoordinatorError::Cache(format!("open {:?}: {}", path, e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CoordinatorError::Cache(format!("parse {:?}: {}", path, e)))
}
