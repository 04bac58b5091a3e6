//! Operation counters and reporting decorators
//!
//! Composition-based instrumentation: each decorator owns the component it
//! wraps, forwards every call while bumping an atomic counter, and emits a
//! report through `tracing` when it is dropped. The wrapped components
//! carry no instrumentation concerns of their own.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use statetable::{AccountId, Database, Result, Row, RowHandle, Singleton, Table};
use tracing::info;

use crate::cache::{CacheTable, Cursor, Iter};

/// Call counters for a cached table
#[derive(Debug, Default)]
pub struct CacheTableStats {
    fills: AtomicU64,
    filled_rows: AtomicU64,
    flushes: AtomicU64,
    flushed_rows: AtomicU64,
    emplaces: AtomicU64,
    modifies: AtomicU64,
    gets: AtomicU64,
    finds: AtomicU64,
    erases: AtomicU64,
}

impl CacheTableStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Number of `fill` calls
    pub fn fills(&self) -> u64 {
        self.fills.load(Ordering::Relaxed)
    }

    /// Total rows loaded by fills
    pub fn filled_rows(&self) -> u64 {
        self.filled_rows.load(Ordering::Relaxed)
    }

    /// Number of effective `flush` calls
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Total rows written back by flushes
    pub fn flushed_rows(&self) -> u64 {
        self.flushed_rows.load(Ordering::Relaxed)
    }

    /// Number of `emplace` calls
    pub fn emplaces(&self) -> u64 {
        self.emplaces.load(Ordering::Relaxed)
    }

    /// Number of `modify` calls (cursor and value forms)
    pub fn modifies(&self) -> u64 {
        self.modifies.load(Ordering::Relaxed)
    }

    /// Number of `get` calls
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `find` and `require_find` calls
    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::Relaxed)
    }

    /// Number of `erase` calls (cursor and value forms)
    pub fn erases(&self) -> u64 {
        self.erases.load(Ordering::Relaxed)
    }
}

/// Cached table that counts every operation and reports on drop
pub struct StatsCacheTable<T: Row> {
    inner: CacheTable<T>,
    stats: CacheTableStats,
}

impl<T: Row> StatsCacheTable<T> {
    /// Bind an instrumented cached view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            inner: CacheTable::new(db, namespace, scope),
            stats: CacheTableStats::default(),
        }
    }

    /// Counters collected so far
    pub fn stats(&self) -> &CacheTableStats {
        &self.stats
    }

    /// See [`CacheTable::fill`]
    pub fn fill(&self) -> Result<Option<usize>> {
        CacheTableStats::bump(&self.stats.fills);
        let loaded = self.inner.fill()?;
        if let Some(count) = loaded {
            CacheTableStats::add(&self.stats.filled_rows, count as u64);
        }
        Ok(loaded)
    }

    /// See [`CacheTable::flush`]
    pub fn flush(&self) -> Result<Option<usize>> {
        let written = self.inner.flush()?;
        if let Some(count) = written {
            CacheTableStats::bump(&self.stats.flushes);
            CacheTableStats::add(&self.stats.flushed_rows, count as u64);
        }
        Ok(written)
    }

    /// See [`CacheTable::begin`]
    pub fn begin(&self) -> Result<Cursor<'_, T>> {
        self.inner.begin()
    }

    /// See [`CacheTable::end`]
    pub fn end(&self) -> Result<Cursor<'_, T>> {
        self.inner.end()
    }

    /// See [`CacheTable::rbegin`]
    pub fn rbegin(&self) -> Result<Cursor<'_, T>> {
        self.inner.rbegin()
    }

    /// See [`CacheTable::rend`]
    pub fn rend(&self) -> Result<Cursor<'_, T>> {
        self.inner.rend()
    }

    /// See [`CacheTable::iter`]
    pub fn iter(&self) -> Result<Iter<'_, T>> {
        self.inner.iter()
    }

    /// See [`CacheTable::lower_bound`]
    pub fn lower_bound(&self, primary: u64) -> Result<Cursor<'_, T>> {
        self.inner.lower_bound(primary)
    }

    /// See [`CacheTable::upper_bound`]
    pub fn upper_bound(&self, primary: u64) -> Result<Cursor<'_, T>> {
        self.inner.upper_bound(primary)
    }

    /// See [`CacheTable::find`]
    pub fn find(&self, primary: u64) -> Result<Cursor<'_, T>> {
        CacheTableStats::bump(&self.stats.finds);
        self.inner.find(primary)
    }

    /// See [`CacheTable::require_find`]
    pub fn require_find(&self, primary: u64) -> Result<Cursor<'_, T>> {
        CacheTableStats::bump(&self.stats.finds);
        self.inner.require_find(primary)
    }

    /// See [`CacheTable::require_find_msg`]
    pub fn require_find_msg(&self, primary: u64, error_msg: &str) -> Result<Cursor<'_, T>> {
        CacheTableStats::bump(&self.stats.finds);
        self.inner.require_find_msg(primary, error_msg)
    }

    /// See [`CacheTable::get`]
    pub fn get(&self, primary: u64) -> Result<T> {
        CacheTableStats::bump(&self.stats.gets);
        self.inner.get(primary)
    }

    /// See [`CacheTable::get_msg`]
    pub fn get_msg(&self, primary: u64, error_msg: &str) -> Result<T> {
        CacheTableStats::bump(&self.stats.gets);
        self.inner.get_msg(primary, error_msg)
    }

    /// See [`CacheTable::iterator_to`]
    pub fn iterator_to(&self, value: &T) -> Result<Cursor<'_, T>> {
        self.inner.iterator_to(value)
    }

    /// See [`CacheTable::emplace`]
    pub fn emplace(
        &self,
        payer: AccountId,
        constructor: impl FnOnce(&mut T),
    ) -> Result<Cursor<'_, T>> {
        CacheTableStats::bump(&self.stats.emplaces);
        self.inner.emplace(payer, constructor)
    }

    /// See [`CacheTable::modify`]
    pub fn modify(
        &self,
        cursor: &Cursor<'_, T>,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        CacheTableStats::bump(&self.stats.modifies);
        self.inner.modify(cursor, payer, updater)
    }

    /// See [`CacheTable::modify_value`]
    pub fn modify_value(
        &self,
        value: &T,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        CacheTableStats::bump(&self.stats.modifies);
        self.inner.modify_value(value, payer, updater)
    }

    /// See [`CacheTable::erase`]
    pub fn erase(&self, cursor: Cursor<'_, T>) -> Result<Cursor<'_, T>> {
        CacheTableStats::bump(&self.stats.erases);
        self.inner.erase(cursor)
    }

    /// See [`CacheTable::erase_value`]
    pub fn erase_value(&self, value: &T) -> Result<()> {
        CacheTableStats::bump(&self.stats.erases);
        self.inner.erase_value(value)
    }

    /// See [`CacheTable::get_index`]
    pub fn get_index(&self, name: &str) -> Result<std::convert::Infallible> {
        self.inner.get_index(name)
    }
}

impl<T: Row> Drop for StatsCacheTable<T> {
    fn drop(&mut self) {
        // Write back through the counted path, then report; the inner drop
        // sees an unfilled cache and does nothing further
        if let Ok(Some(count)) = self.inner.flush() {
            CacheTableStats::bump(&self.stats.flushes);
            CacheTableStats::add(&self.stats.flushed_rows, count as u64);
        }
        info!(
            fills = self.stats.fills(),
            filled_rows = self.stats.filled_rows(),
            flushes = self.stats.flushes(),
            flushed_rows = self.stats.flushed_rows(),
            emplaces = self.stats.emplaces(),
            modifies = self.stats.modifies(),
            gets = self.stats.gets(),
            finds = self.stats.finds(),
            erases = self.stats.erases(),
            "cached table statistics"
        );
    }
}

/// Call counters for an uncached table
#[derive(Debug, Default)]
pub struct TableStats {
    emplaces: AtomicU64,
    modifies: AtomicU64,
    gets: AtomicU64,
    finds: AtomicU64,
    erases: AtomicU64,
}

impl TableStats {
    /// Number of `emplace` calls
    pub fn emplaces(&self) -> u64 {
        self.emplaces.load(Ordering::Relaxed)
    }

    /// Number of `modify` calls
    pub fn modifies(&self) -> u64 {
        self.modifies.load(Ordering::Relaxed)
    }

    /// Number of `get` calls
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `find`, `lower_bound` and `upper_bound` calls
    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::Relaxed)
    }

    /// Number of `erase` calls
    pub fn erases(&self) -> u64 {
        self.erases.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Uncached table that counts every operation and reports on drop
pub struct StatsTable<T: Row> {
    inner: Table<T>,
    stats: TableStats,
}

impl<T: Row> StatsTable<T> {
    /// Bind an instrumented table view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            inner: Table::new(db, namespace, scope),
            stats: TableStats::default(),
        }
    }

    /// Counters collected so far
    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// See [`Table::find`]
    pub fn find(&self, primary: u64) -> Option<RowHandle> {
        TableStats::bump(&self.stats.finds);
        self.inner.find(primary)
    }

    /// See [`Table::lower_bound`]
    pub fn lower_bound(&self, primary: u64) -> Option<RowHandle> {
        TableStats::bump(&self.stats.finds);
        self.inner.lower_bound(primary)
    }

    /// See [`Table::upper_bound`]
    pub fn upper_bound(&self, primary: u64) -> Option<RowHandle> {
        TableStats::bump(&self.stats.finds);
        self.inner.upper_bound(primary)
    }

    /// See [`Table::scan`]
    pub fn scan(&self) -> Result<Vec<(RowHandle, T)>> {
        self.inner.scan()
    }

    /// See [`Table::get`]
    pub fn get(&self, handle: RowHandle) -> Result<T> {
        TableStats::bump(&self.stats.gets);
        self.inner.get(handle)
    }

    /// See [`Table::emplace`]
    pub fn emplace(&self, payer: AccountId, constructor: impl FnOnce(&mut T)) -> Result<RowHandle> {
        TableStats::bump(&self.stats.emplaces);
        self.inner.emplace(payer, constructor)
    }

    /// See [`Table::modify`]
    pub fn modify(
        &self,
        handle: RowHandle,
        payer: AccountId,
        updater: impl FnOnce(&mut T),
    ) -> Result<()> {
        TableStats::bump(&self.stats.modifies);
        self.inner.modify(handle, payer, updater)
    }

    /// See [`Table::erase`]
    pub fn erase(&self, handle: RowHandle) -> Result<()> {
        TableStats::bump(&self.stats.erases);
        self.inner.erase(handle)
    }

    /// See [`Table::len`]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// See [`Table::is_empty`]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Row> Drop for StatsTable<T> {
    fn drop(&mut self) {
        info!(
            emplaces = self.stats.emplaces(),
            modifies = self.stats.modifies(),
            gets = self.stats.gets(),
            finds = self.stats.finds(),
            erases = self.stats.erases(),
            "table statistics"
        );
    }
}

/// Call counters for a singleton
#[derive(Debug, Default)]
pub struct SingletonStats {
    exists: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    removes: AtomicU64,
}

impl SingletonStats {
    /// Number of `exists` calls
    pub fn exists(&self) -> u64 {
        self.exists.load(Ordering::Relaxed)
    }

    /// Number of `get`, `get_or_default` and `get_or_create` calls
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `set` calls
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// Number of `remove` calls
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Singleton that counts every operation and reports on drop
pub struct StatsSingleton<T> {
    inner: Singleton<T>,
    stats: SingletonStats,
}

impl<T: Clone + Serialize + DeserializeOwned> StatsSingleton<T> {
    /// Bind an instrumented singleton view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            inner: Singleton::new(db, namespace, scope),
            stats: SingletonStats::default(),
        }
    }

    /// Counters collected so far
    pub fn stats(&self) -> &SingletonStats {
        &self.stats
    }

    /// See [`Singleton::exists`]
    pub fn exists(&self) -> bool {
        SingletonStats::bump(&self.stats.exists);
        self.inner.exists()
    }

    /// See [`Singleton::get`]
    pub fn get(&self) -> Result<T> {
        SingletonStats::bump(&self.stats.gets);
        self.inner.get()
    }

    /// See [`Singleton::get_or_default`]
    pub fn get_or_default(&self, default: T) -> Result<T> {
        SingletonStats::bump(&self.stats.gets);
        self.inner.get_or_default(default)
    }

    /// See [`Singleton::get_or_create`]
    pub fn get_or_create(&self, payer: AccountId, default: T) -> Result<T> {
        SingletonStats::bump(&self.stats.gets);
        self.inner.get_or_create(payer, default)
    }

    /// See [`Singleton::set`]
    pub fn set(&self, value: &T, payer: AccountId) -> Result<()> {
        SingletonStats::bump(&self.stats.sets);
        self.inner.set(value, payer)
    }

    /// See [`Singleton::remove`]
    pub fn remove(&self) {
        SingletonStats::bump(&self.stats.removes);
        self.inner.remove()
    }
}

impl<T> Drop for StatsSingleton<T> {
    fn drop(&mut self) {
        info!(
            exists = self.stats.exists(),
            gets = self.stats.gets(),
            sets = self.stats.sets(),
            removes = self.stats.removes(),
            "singleton statistics"
        );
    }
}
