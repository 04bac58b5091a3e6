//! Write-back cache over one table instance
//!
//! Reads are served from an in-memory mirror populated on first access;
//! in-place modifications stay in the mirror, tagged with the account to
//! bill, until `flush` writes them back in one pass. Inserts and deletes
//! go through to the host table immediately. Dropping the cache flushes
//! it, so a scope exit never loses deferred writes.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use statetable::{AccountId, Database, Error, Result, Row, Table};
use tracing::{debug, warn};

use crate::seq::{CacheEntry, CacheSeq};

struct CacheState<T> {
    seq: CacheSeq<T>,
    filled: bool,
}

/// Caching layer mirroring one `(namespace, scope)` table instance
///
/// Logically read-only operations still populate the mirror on first use;
/// that lazy initialization is interior to the lock and invisible to
/// callers.
pub struct CacheTable<T: Row> {
    table: Table<T>,
    state: RwLock<CacheState<T>>,
}

impl<T: Row> CacheTable<T> {
    /// Bind a cached view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            table: Table::new(db, namespace, scope),
            state: RwLock::new(CacheState {
                seq: CacheSeq::new(),
                filled: false,
            }),
        }
    }

    /// Load every row of the table into the mirror, ascending by key
    ///
    /// Returns the number of rows loaded, or `None` if already filled.
    pub fn fill(&self) -> Result<Option<usize>> {
        let mut state = self.state.write();
        self.fill_locked(&mut state)
    }

    fn fill_locked(&self, state: &mut CacheState<T>) -> Result<Option<usize>> {
        if state.filled {
            return Ok(None);
        }

        let rows = self.table.scan()?;
        let count = rows.len();
        for (handle, value) in rows {
            state.seq.push_back(CacheEntry {
                handle,
                payer: None,
                value,
            });
        }
        state.filled = true;
        debug!(rows = count, "cache filled");
        Ok(Some(count))
    }

    fn fill_if_needed(&self, state: &mut CacheState<T>) -> Result<()> {
        if !state.filled {
            self.fill_locked(state)?;
        }
        Ok(())
    }

    /// Write every dirty entry back to the table and reset the mirror
    ///
    /// Entries are written in sequence order, each billed to its recorded
    /// payer. Returns the number written, or `None` if the cache was never
    /// filled. After a flush the cache is empty and unfilled, so the next
    /// access starts a fresh cycle.
    pub fn flush(&self) -> Result<Option<usize>> {
        let mut state = self.state.write();
        if !state.filled {
            return Ok(None);
        }

        let mut written = 0;
        for entry in state.seq.entries() {
            if let Some(payer) = entry.payer {
                let value = entry.value.clone();
                self.table.modify(entry.handle, payer, |row| *row = value)?;
                written += 1;
            }
        }
        state.seq.clear();
        state.filled = false;
        debug!(rows = written, "cache flushed");
        Ok(Some(written))
    }

    /// Cursor at the first entry of the mirror
    pub fn begin(&self) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        Ok(Cursor {
            cache: self,
            pos: state.seq.head(),
        })
    }

    /// The end sentinel; compares equal to any not-found result
    pub fn end(&self) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        Ok(Cursor {
            cache: self,
            pos: None,
        })
    }

    /// Cursor at the last entry of the mirror; walk it with `prev`
    pub fn rbegin(&self) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        Ok(Cursor {
            cache: self,
            pos: state.seq.tail(),
        })
    }

    /// The sentinel reached by walking `prev` past the first entry
    pub fn rend(&self) -> Result<Cursor<'_, T>> {
        self.end()
    }

    /// Iterate cached values in sequence order
    ///
    /// The iterator holds a read lock on the mirror; release it before
    /// calling any mutating operation.
    pub fn iter(&self) -> Result<Iter<'_, T>> {
        {
            let mut state = self.state.write();
            self.fill_if_needed(&mut state)?;
        }
        let guard = self.state.read();
        let front = guard.seq.head();
        let back = guard.seq.tail();
        Ok(Iter {
            exhausted: front.is_none(),
            guard,
            front,
            back,
        })
    }

    /// Cursor at the first entry with key >= `primary`
    pub fn lower_bound(&self, primary: u64) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let pos = self
            .table
            .lower_bound(primary)
            .and_then(|handle| state.seq.position_of(handle));
        Ok(Cursor { cache: self, pos })
    }

    /// Cursor at the first entry with key > `primary`
    pub fn upper_bound(&self, primary: u64) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let pos = self
            .table
            .upper_bound(primary)
            .and_then(|handle| state.seq.position_of(handle));
        Ok(Cursor { cache: self, pos })
    }

    /// Cursor at the entry with the given primary key, or `end`
    pub fn find(&self, primary: u64) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let pos = self
            .table
            .find(primary)
            .and_then(|handle| state.seq.position_of(handle));
        Ok(Cursor { cache: self, pos })
    }

    /// Cached value for the given primary key; `NotFound` if absent
    pub fn get(&self, primary: u64) -> Result<T> {
        self.get_msg(primary, "unable to find key")
    }

    /// `get` with a caller-supplied failure message
    pub fn get_msg(&self, primary: u64, error_msg: &str) -> Result<T> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        self.table
            .find(primary)
            .and_then(|handle| state.seq.position_of(handle))
            .and_then(|pos| state.seq.get(pos))
            .map(|entry| entry.value.clone())
            .ok_or_else(|| Error::NotFound(error_msg.to_string()))
    }

    /// Like `find`, but absence is an error instead of the end cursor
    pub fn require_find(&self, primary: u64) -> Result<Cursor<'_, T>> {
        self.require_find_msg(primary, "unable to find key")
    }

    /// `require_find` with a caller-supplied failure message
    pub fn require_find_msg(&self, primary: u64, error_msg: &str) -> Result<Cursor<'_, T>> {
        let cursor = self.find(primary)?;
        if cursor.is_end() {
            return Err(Error::NotFound(error_msg.to_string()));
        }
        Ok(cursor)
    }

    /// Cursor for a value already read from this table, or `end`
    pub fn iterator_to(&self, value: &T) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let pos = self
            .table
            .find(value.primary_key())
            .and_then(|handle| state.seq.position_of(handle));
        Ok(Cursor { cache: self, pos })
    }

    /// Insert a new row, billed to `payer`, and mirror it at the tail
    ///
    /// The write reaches the host table immediately; only in-place
    /// modifications are deferred. The new entry is appended at the tail of
    /// the mirror regardless of where its key would sort.
    pub fn emplace(
        &self,
        payer: AccountId,
        constructor: impl FnOnce(&mut T),
    ) -> Result<Cursor<'_, T>> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let handle = self.table.emplace(payer, constructor)?;
        let value = self.table.get(handle)?;
        let pos = state.seq.push_back(CacheEntry {
            handle,
            payer: None,
            value,
        });
        Ok(Cursor {
            cache: self,
            pos: Some(pos),
        })
    }

    /// Update the cached value in place and mark it dirty
    ///
    /// Nothing reaches the host table until `flush`; subsequent reads
    /// through this cache observe the new value immediately.
    pub fn modify(
        &self,
        cursor: &Cursor<'_, T>,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        let pos = cursor
            .pos
            .ok_or(Error::InvalidCursor("cannot pass end cursor to modify"))?;
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let entry = state
            .seq
            .get_mut(pos)
            .ok_or(Error::InvalidCursor("cursor no longer refers to a cached row"))?;
        updater(&mut entry.value);
        entry.payer = Some(payer);
        Ok(())
    }

    /// `modify` addressed by value instead of cursor
    pub fn modify_value(
        &self,
        value: &T,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        let cursor = self.iterator_to(value)?;
        if cursor.is_end() {
            return Err(Error::NotFound(
                "object passed to modify was not found".to_string(),
            ));
        }
        self.modify(&cursor, payer, updater)
    }

    /// Delete the row from the host table and the mirror
    ///
    /// Returns a cursor to the entry that followed the erased one.
    pub fn erase(&self, cursor: Cursor<'_, T>) -> Result<Cursor<'_, T>> {
        let pos = cursor
            .pos
            .ok_or(Error::InvalidCursor("cannot pass end cursor to erase"))?;
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        let handle = state
            .seq
            .get(pos)
            .ok_or(Error::InvalidCursor("cursor no longer refers to a cached row"))?
            .handle;
        self.table.erase(handle)?;
        let next = state.seq.remove(pos);
        Ok(Cursor {
            cache: self,
            pos: next,
        })
    }

    /// `erase` addressed by value instead of cursor
    pub fn erase_value(&self, value: &T) -> Result<()> {
        let cursor = self.iterator_to(value)?;
        if cursor.is_end() {
            return Err(Error::NotFound(
                "object passed to erase was not found".to_string(),
            ));
        }
        self.erase(cursor)?;
        Ok(())
    }

    /// Secondary indexes cannot be kept consistent with the mirror
    pub fn get_index(&self, _name: &str) -> Result<std::convert::Infallible> {
        Err(Error::Unsupported("secondary indexes are not supported"))
    }

    /// Number of mirrored entries
    pub fn len(&self) -> Result<usize> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        Ok(state.seq.len())
    }

    /// Check whether the mirror holds no entries
    pub fn is_empty(&self) -> Result<bool> {
        let mut state = self.state.write();
        self.fill_if_needed(&mut state)?;
        Ok(state.seq.is_empty())
    }
}

impl<T: Row> Drop for CacheTable<T> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(error = %err, "write-back on drop failed");
        }
    }
}

/// Position in the cache mirror; the end cursor is the not-found sentinel
pub struct Cursor<'a, T: Row> {
    cache: &'a CacheTable<T>,
    pos: Option<usize>,
}

impl<'a, T: Row> Cursor<'a, T> {
    /// Check whether this is the end sentinel
    pub fn is_end(&self) -> bool {
        self.pos.is_none()
    }

    /// Read access to the cached value
    ///
    /// The returned guard holds a read lock on the mirror; release it
    /// before calling any mutating operation.
    ///
    /// # Panics
    ///
    /// Panics on the end cursor, or if the entry was erased after this
    /// cursor was obtained.
    pub fn value(&self) -> MappedRwLockReadGuard<'a, T> {
        let pos = self.pos.expect("cannot dereference the end cursor");
        RwLockReadGuard::map(self.cache.state.read(), |state| {
            &state
                .seq
                .get(pos)
                .expect("cursor no longer refers to a cached row")
                .value
        })
    }

    /// Cursor at the following entry; `next` of the end cursor is end
    pub fn next(&self) -> Cursor<'a, T> {
        match self.pos {
            Some(idx) => Cursor {
                cache: self.cache,
                pos: self.cache.state.read().seq.next(idx),
            },
            None => *self,
        }
    }

    /// Cursor at the preceding entry; stepping back from end lands on the
    /// last entry, stepping back from the first yields end
    pub fn prev(&self) -> Cursor<'a, T> {
        let state = self.cache.state.read();
        let pos = match self.pos {
            Some(idx) => state.seq.prev(idx),
            None => state.seq.tail(),
        };
        Cursor {
            cache: self.cache,
            pos,
        }
    }
}

impl<'a, T: Row> Clone for Cursor<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T: Row> Copy for Cursor<'a, T> {}

impl<'a, T: Row> PartialEq for Cursor<'a, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.cache, other.cache) && self.pos == other.pos
    }
}

impl<'a, T: Row> Eq for Cursor<'a, T> {}

/// Double-ended iterator over cached values in sequence order
pub struct Iter<'a, T: Row> {
    guard: RwLockReadGuard<'a, CacheState<T>>,
    front: Option<usize>,
    back: Option<usize>,
    exhausted: bool,
}

impl<'a, T: Row> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.exhausted {
            return None;
        }
        let idx = self.front?;
        let entry = self.guard.seq.get(idx)?;
        if self.front == self.back {
            self.exhausted = true;
        } else {
            self.front = self.guard.seq.next(idx);
        }
        Some(entry.value.clone())
    }
}

impl<'a, T: Row> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<T> {
        if self.exhausted {
            return None;
        }
        let idx = self.back?;
        let entry = self.guard.seq.get(idx)?;
        if self.front == self.back {
            self.exhausted = true;
        } else {
            self.back = self.guard.seq.prev(idx);
        }
        Some(entry.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Balance {
        id: u64,
        amount: i64,
    }

    impl Row for Balance {
        fn primary_key(&self) -> u64 {
            self.id
        }
    }

    const NS: AccountId = AccountId(100);
    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);

    fn raw_table(db: &Database) -> Table<Balance> {
        Table::new(db, NS, 0)
    }

    fn seeded(ids: &[u64]) -> Database {
        let db = Database::new();
        let table = raw_table(&db);
        for id in ids {
            table
                .emplace(ALICE, |row| {
                    row.id = *id;
                    row.amount = (*id as i64) * 10;
                })
                .unwrap();
        }
        db
    }

    fn ids(cache: &CacheTable<Balance>) -> Vec<u64> {
        cache.iter().unwrap().map(|row| row.id).collect()
    }

    #[test]
    fn test_fill_matches_store_order() {
        let db = seeded(&[5, 1, 9, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert_eq!(cache.fill().unwrap(), Some(4));
        assert_eq!(ids(&cache), vec![1, 3, 5, 9]);

        let store_ids: Vec<u64> = raw_table(&db)
            .scan()
            .unwrap()
            .into_iter()
            .map(|(_, row)| row.id)
            .collect();
        assert_eq!(ids(&cache), store_ids);
    }

    #[test]
    fn test_fill_is_idempotent() {
        let db = seeded(&[1, 2]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert_eq!(cache.fill().unwrap(), Some(2));
        assert_eq!(cache.fill().unwrap(), None);
    }

    #[test]
    fn test_empty_store() {
        let db = Database::new();
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert_eq!(cache.fill().unwrap(), Some(0));
        assert!(cache.begin().unwrap() == cache.end().unwrap());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_find_agrees_with_store() {
        let db = seeded(&[1, 2, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
        let table = raw_table(&db);

        for id in [1u64, 2, 3] {
            let cursor = cache.find(id).unwrap();
            assert!(!cursor.is_end());
            let direct = table.get(table.find(id).unwrap()).unwrap();
            assert_eq!(*cursor.value(), direct);
        }
        assert!(cache.find(4).unwrap().is_end());
    }

    #[test]
    fn test_bounds_and_require_find() {
        let db = seeded(&[10, 20, 30]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert_eq!(cache.lower_bound(15).unwrap().value().id, 20);
        assert_eq!(cache.upper_bound(20).unwrap().value().id, 30);
        assert!(cache.lower_bound(31).unwrap().is_end());

        assert!(!cache.require_find(10).unwrap().is_end());
        match cache.require_find_msg(99, "no such balance") {
            Err(Error::NotFound(msg)) => assert_eq!(msg, "no such balance"),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn test_get_messages() {
        let db = seeded(&[1]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert_eq!(cache.get(1).unwrap().amount, 10);
        match cache.get(2) {
            Err(Error::NotFound(msg)) => assert_eq!(msg, "unable to find key"),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn test_read_your_writes() {
        let db = seeded(&[1]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
        let table = raw_table(&db);

        let cursor = cache.find(1).unwrap();
        cache.modify(&cursor, BOB, |row| row.amount = 777).unwrap();

        // Visible through the cache immediately
        assert_eq!(cursor.value().amount, 777);
        assert_eq!(cache.get(1).unwrap().amount, 777);

        // Invisible to the store until flush
        let direct = table.get(table.find(1).unwrap()).unwrap();
        assert_eq!(direct.amount, 10);
    }

    #[test]
    fn test_flush_writes_dirty_entries_once() {
        let db = seeded(&[1, 2, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
        let table = raw_table(&db);

        let c1 = cache.find(1).unwrap();
        let c3 = cache.find(3).unwrap();
        cache.modify(&c1, BOB, |row| row.amount = -1).unwrap();
        cache.modify(&c3, BOB, |row| row.amount = -3).unwrap();
        // Two modifies of the same entry still flush once
        cache.modify(&c3, BOB, |row| row.amount = -33).unwrap();

        assert_eq!(cache.flush().unwrap(), Some(2));

        let amounts: Vec<i64> = table
            .scan()
            .unwrap()
            .into_iter()
            .map(|(_, row)| row.amount)
            .collect();
        assert_eq!(amounts, vec![-1, 20, -33]);

        // Cache is reset to unfilled; flushing again is a no-op
        assert_eq!(cache.flush().unwrap(), None);
        assert_eq!(cache.fill().unwrap(), Some(3));
    }

    #[test]
    fn test_fill_flush_round_trip_writes_nothing() {
        let db = seeded(&[1, 2]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
        let before = raw_table(&db).scan().unwrap();
        let usage_before = db.usage_of(ALICE);

        cache.fill().unwrap();
        assert_eq!(cache.flush().unwrap(), Some(0));

        let after = raw_table(&db).scan().unwrap();
        assert_eq!(before, after);
        assert_eq!(db.usage_of(ALICE), usage_before);
    }

    #[test]
    fn test_modify_flush_refill() {
        let db = seeded(&[1, 2]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let cursor = cache.find(2).unwrap();
        cache.modify(&cursor, BOB, |row| row.amount = 555).unwrap();
        cache.flush().unwrap();

        // Refill reads the written-back value from the store
        assert_eq!(cache.fill().unwrap(), Some(2));
        assert_eq!(cache.get(2).unwrap().amount, 555);
    }

    #[test]
    fn test_emplace_without_fill_keeps_insertion_order() {
        let db = Database::new();
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        for id in [1u64, 2, 3] {
            cache.emplace(ALICE, |row| row.id = id).unwrap();
        }
        assert_eq!(ids(&cache), vec![1, 2, 3]);
    }

    #[test]
    fn test_emplace_after_fill_appends_at_tail() {
        let db = seeded(&[1, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        cache.fill().unwrap();
        let cursor = cache.emplace(ALICE, |row| row.id = 2).unwrap();

        // Insertion order, not key order
        assert_eq!(ids(&cache), vec![1, 3, 2]);
        assert_eq!(cursor.value().id, 2);

        // The store itself stays key-ordered
        let store_ids: Vec<u64> = raw_table(&db)
            .scan()
            .unwrap()
            .into_iter()
            .map(|(_, row)| row.id)
            .collect();
        assert_eq!(store_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_emplace_reaches_store_immediately() {
        let db = Database::new();
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        cache
            .emplace(ALICE, |row| {
                row.id = 1;
                row.amount = 42;
            })
            .unwrap();

        let table = raw_table(&db);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(table.find(1).unwrap()).unwrap().amount, 42);
    }

    #[test]
    fn test_erase_removes_from_both_sides() {
        let db = seeded(&[1, 2, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let cursor = cache.find(2).unwrap();
        let next = cache.erase(cursor).unwrap();
        assert_eq!(next.value().id, 3);

        assert!(cache.find(2).unwrap().is_end());
        assert_eq!(raw_table(&db).find(2), None);
        assert_eq!(ids(&cache), vec![1, 3]);
    }

    #[test]
    fn test_erase_last_returns_end() {
        let db = seeded(&[1]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let cursor = cache.find(1).unwrap();
        let next = cache.erase(cursor).unwrap();
        assert!(next.is_end());
    }

    #[test]
    fn test_end_cursor_rejected_by_modify_and_erase() {
        let db = seeded(&[1]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let end = cache.end().unwrap();
        assert!(matches!(
            cache.modify(&end, ALICE, |_| {}),
            Err(Error::InvalidCursor(_))
        ));
        assert!(matches!(cache.erase(end), Err(Error::InvalidCursor(_))));
    }

    #[test]
    fn test_value_overloads() {
        let db = seeded(&[1, 2]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let row = cache.get(1).unwrap();
        cache.modify_value(&row, BOB, |r| r.amount = 99).unwrap();
        assert_eq!(cache.get(1).unwrap().amount, 99);

        let row = cache.get(2).unwrap();
        cache.erase_value(&row).unwrap();
        assert!(cache.find(2).unwrap().is_end());

        // A value whose key is gone resolves to NotFound
        let stale = Balance { id: 2, amount: 20 };
        assert!(matches!(
            cache.modify_value(&stale, BOB, |_| {}),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(cache.erase_value(&stale), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_iterator_to() {
        let db = seeded(&[1, 2]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let row = cache.get(2).unwrap();
        let cursor = cache.iterator_to(&row).unwrap();
        assert_eq!(cursor.value().id, 2);
    }

    #[test]
    fn test_cursor_walk() {
        let db = seeded(&[1, 2, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let mut cursor = cache.begin().unwrap();
        let mut seen = Vec::new();
        while !cursor.is_end() {
            seen.push(cursor.value().id);
            cursor = cursor.next();
        }
        assert_eq!(seen, vec![1, 2, 3]);

        // Reverse walk from rbegin via prev
        let mut cursor = cache.rbegin().unwrap();
        let mut seen = Vec::new();
        while !cursor.is_end() {
            seen.push(cursor.value().id);
            cursor = cursor.prev();
        }
        assert_eq!(seen, vec![3, 2, 1]);

        // prev of end lands on the last entry
        assert_eq!(cache.end().unwrap().prev().value().id, 3);
    }

    #[test]
    fn test_reverse_iteration() {
        let db = seeded(&[1, 2, 3]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let reversed: Vec<u64> = cache.iter().unwrap().rev().map(|row| row.id).collect();
        assert_eq!(reversed, vec![3, 2, 1]);
    }

    #[test]
    fn test_secondary_index_rejected() {
        let db = Database::new();
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        assert!(matches!(
            cache.get_index("byamount"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_drop_flushes_dirty_entries() {
        let db = seeded(&[1]);
        {
            let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
            let cursor = cache.find(1).unwrap();
            cache.modify(&cursor, BOB, |row| row.amount = 321).unwrap();
            // No explicit flush; the scope exit writes back
        }

        let table = raw_table(&db);
        assert_eq!(table.get(table.find(1).unwrap()).unwrap().amount, 321);
    }

    #[test]
    fn test_explicit_flush_then_drop_writes_once() {
        let db = seeded(&[1]);
        {
            let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);
            let cursor = cache.find(1).unwrap();
            cache.modify(&cursor, BOB, |row| row.amount = 5).unwrap();
            assert_eq!(cache.flush().unwrap(), Some(1));
            // Drop sees an unfilled cache and writes nothing further
        }

        let table = raw_table(&db);
        assert_eq!(table.get(table.find(1).unwrap()).unwrap().amount, 5);
    }

    #[test]
    fn test_flush_bills_recorded_payer() {
        let db = seeded(&[1]);
        let cache: CacheTable<Balance> = CacheTable::new(&db, NS, 0);

        let cursor = cache.find(1).unwrap();
        cache.modify(&cursor, BOB, |row| row.amount = 1).unwrap();
        cache.flush().unwrap();

        // The write-back transferred the row's cost from alice to bob
        assert_eq!(db.usage_of(ALICE), 0);
        assert!(db.usage_of(BOB) > 0);
    }
}
