//! Ordered keyed table view over the host database
//!
//! A `Table` is a typed view of one `(namespace, scope)` instance. Rows are
//! stored serialized and addressed two ways: by primary key through an
//! ordered index, and by an opaque `RowHandle` that stays valid for the
//! lifetime of the row. Every write names the account billed for it.

use std::marker::PhantomData;
use std::ops::Bound;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{row_cost, AccountId, Database, RowRecord, StoreId};
use crate::error::{Error, Result};

/// Opaque reference to one stored row; valid only while the row exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle(u64);

impl RowHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A storable row: serde-codable, with a unique unsigned primary key
pub trait Row: Default + Clone + Serialize + DeserializeOwned {
    /// Primary key identifying this row within its table
    fn primary_key(&self) -> u64;
}

/// Typed view over one table instance
pub struct Table<T: Row> {
    db: Database,
    id: StoreId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Row> Table<T> {
    /// Bind a table view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            db: db.clone(),
            id: StoreId { namespace, scope },
            _marker: PhantomData,
        }
    }

    /// Handle of the row with the given primary key
    pub fn find(&self, primary: u64) -> Option<RowHandle> {
        let inner = self.db.read();
        inner.tables.get(&self.id)?.by_key.get(&primary).copied()
    }

    /// Handle of the first row with key >= `primary`
    pub fn lower_bound(&self, primary: u64) -> Option<RowHandle> {
        let inner = self.db.read();
        let table = inner.tables.get(&self.id)?;
        table.by_key.range(primary..).next().map(|(_, handle)| *handle)
    }

    /// Handle of the first row with key > `primary`
    pub fn upper_bound(&self, primary: u64) -> Option<RowHandle> {
        let inner = self.db.read();
        let table = inner.tables.get(&self.id)?;
        table
            .by_key
            .range((Bound::Excluded(primary), Bound::Unbounded))
            .next()
            .map(|(_, handle)| *handle)
    }

    /// Snapshot of every row in ascending primary-key order
    pub fn scan(&self) -> Result<Vec<(RowHandle, T)>> {
        let inner = self.db.read();
        let table = match inner.tables.get(&self.id) {
            Some(table) => table,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(table.by_key.len());
        for handle in table.by_key.values() {
            let record = table.rows.get(handle).ok_or(Error::InvalidHandle)?;
            out.push((*handle, serde_json::from_slice(&record.bytes)?));
        }
        Ok(out)
    }

    /// Decode the row behind a handle
    pub fn get(&self, handle: RowHandle) -> Result<T> {
        let inner = self.db.read();
        let record = inner
            .tables
            .get(&self.id)
            .and_then(|table| table.rows.get(&handle))
            .ok_or(Error::InvalidHandle)?;
        Ok(serde_json::from_slice(&record.bytes)?)
    }

    /// Insert a new row, billed to `payer`
    ///
    /// The constructor initializes the row in place; its primary key must
    /// not collide with an existing row.
    pub fn emplace(&self, payer: AccountId, constructor: impl FnOnce(&mut T)) -> Result<RowHandle> {
        let mut row = T::default();
        constructor(&mut row);
        let key = row.primary_key();
        let bytes = serde_json::to_vec(&row)?;
        let cost = row_cost(&bytes);

        let mut inner = self.db.write();
        let handle = inner.alloc_handle();
        let table = inner.tables.entry(self.id).or_default();
        if table.by_key.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        table.by_key.insert(key, handle);
        table.rows.insert(
            handle,
            RowRecord {
                key,
                owner: payer,
                bytes,
            },
        );
        inner.charge(payer, cost);
        Ok(handle)
    }

    /// Update a row in place, re-billing it to `payer`
    ///
    /// The previous owner is refunded in full; the updater must leave the
    /// primary key untouched.
    pub fn modify(
        &self,
        handle: RowHandle,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        let mut inner = self.db.write();
        let table = inner.tables.get_mut(&self.id).ok_or(Error::InvalidHandle)?;
        let record = table.rows.get_mut(&handle).ok_or(Error::InvalidHandle)?;

        let mut row: T = serde_json::from_slice(&record.bytes)?;
        updater(&mut row);
        if row.primary_key() != record.key {
            return Err(Error::PrimaryKeyChanged);
        }

        let bytes = serde_json::to_vec(&row)?;
        let old_owner = record.owner;
        let old_cost = row_cost(&record.bytes);
        let new_cost = row_cost(&bytes);
        record.owner = payer;
        record.bytes = bytes;

        inner.refund(old_owner, old_cost);
        inner.charge(payer, new_cost);
        Ok(())
    }

    /// Delete a row and refund its owner
    pub fn erase(&self, handle: RowHandle) -> Result<()> {
        let mut inner = self.db.write();
        let table = inner.tables.get_mut(&self.id).ok_or(Error::InvalidHandle)?;
        let record = table.rows.remove(&handle).ok_or(Error::InvalidHandle)?;
        table.by_key.remove(&record.key);
        inner.refund(record.owner, row_cost(&record.bytes));
        Ok(())
    }

    /// Number of rows in this table instance
    pub fn len(&self) -> usize {
        let inner = self.db.read();
        inner
            .tables
            .get(&self.id)
            .map(|table| table.by_key.len())
            .unwrap_or(0)
    }

    /// Check if this table instance has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
