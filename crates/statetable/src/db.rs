//! Shared host database state
//!
//! One lock holds every table instance, every singleton slot and the
//! per-account billing ledger. `Table` and `Singleton` handles clone the
//! `Database` and address their slice of it by `(namespace, scope)`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::table::RowHandle;

/// Fixed per-row overhead billed on top of the payload bytes
pub const ROW_OVERHEAD_BYTES: u64 = 112;

/// Account billed for storage costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one table or singleton instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StoreId {
    pub(crate) namespace: AccountId,
    pub(crate) scope: u64,
}

/// One stored row: key, owning account, serialized payload
pub(crate) struct RowRecord {
    pub(crate) key: u64,
    pub(crate) owner: AccountId,
    pub(crate) bytes: Vec<u8>,
}

/// Rows of one table instance, indexed by key order and by handle
#[derive(Default)]
pub(crate) struct TableData {
    pub(crate) by_key: BTreeMap<u64, RowHandle>,
    pub(crate) rows: HashMap<RowHandle, RowRecord, RandomState>,
}

/// One singleton slot: owning account and serialized payload
pub(crate) struct ValueSlot {
    pub(crate) owner: AccountId,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct DbInner {
    pub(crate) tables: HashMap<StoreId, TableData, RandomState>,
    pub(crate) singletons: HashMap<StoreId, ValueSlot, RandomState>,
    pub(crate) billing: HashMap<AccountId, u64, RandomState>,
    next_handle: u64,
}

impl DbInner {
    /// Handles are never reused, so a stale handle can't alias a new row
    pub(crate) fn alloc_handle(&mut self) -> RowHandle {
        self.next_handle += 1;
        RowHandle::new(self.next_handle)
    }

    pub(crate) fn charge(&mut self, account: AccountId, bytes: u64) {
        *self.billing.entry(account).or_insert(0) += bytes;
    }

    pub(crate) fn refund(&mut self, account: AccountId, bytes: u64) {
        if let Some(total) = self.billing.get_mut(&account) {
            *total = total.saturating_sub(bytes);
        }
    }
}

/// Billable cost of one stored payload
pub(crate) fn row_cost(bytes: &[u8]) -> u64 {
    bytes.len() as u64 + ROW_OVERHEAD_BYTES
}

/// Handle to the shared in-memory host state
#[derive(Clone, Default)]
pub struct Database {
    inner: Arc<RwLock<DbInner>>,
}

impl Database {
    /// Create an empty host database
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently billed to the given account
    pub fn usage_of(&self, account: AccountId) -> u64 {
        self.inner.read().billing.get(&account).copied().unwrap_or(0)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, DbInner> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, DbInner> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_refund() {
        let db = Database::new();
        let alice = AccountId(1);

        {
            let mut inner = db.write();
            inner.charge(alice, 100);
            inner.charge(alice, 50);
        }
        assert_eq!(db.usage_of(alice), 150);

        {
            let mut inner = db.write();
            inner.refund(alice, 60);
        }
        assert_eq!(db.usage_of(alice), 90);
    }

    #[test]
    fn test_refund_saturates_at_zero() {
        let db = Database::new();
        let bob = AccountId(2);

        {
            let mut inner = db.write();
            inner.charge(bob, 10);
            inner.refund(bob, 100);
        }
        assert_eq!(db.usage_of(bob), 0);
    }

    #[test]
    fn test_usage_of_unknown_account() {
        let db = Database::new();
        assert_eq!(db.usage_of(AccountId(42)), 0);
    }

    #[test]
    fn test_handles_are_unique() {
        let db = Database::new();
        let mut inner = db.write();
        let a = inner.alloc_handle();
        let b = inner.alloc_handle();
        assert_ne!(a, b);
    }
}
