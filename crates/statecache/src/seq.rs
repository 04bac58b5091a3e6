//! Cache sequence: insertion-ordered arena of mirrored rows
//!
//! Slots are index-stable: positions handed out to cursors and recorded in
//! the handle map survive unrelated inserts and removals. Removed slots go
//! on a free list and are reused by later appends.

use std::collections::HashMap;

use ahash::RandomState;
use statetable::{AccountId, RowHandle};

/// One mirrored row
///
/// `payer == None` means the persisted copy is current; `Some(account)`
/// marks the entry dirty, to be written back billed to that account.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<T> {
    pub(crate) handle: RowHandle,
    pub(crate) payer: Option<AccountId>,
    pub(crate) value: T,
}

struct Slot<T> {
    entry: CacheEntry<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Insertion-ordered sequence with O(1) handle correlation
pub(crate) struct CacheSeq<T> {
    slots: Vec<Option<Slot<T>>>,
    by_handle: HashMap<RowHandle, usize, RandomState>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    len: usize,
}

impl<T> CacheSeq<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_handle: HashMap::default(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Append an entry at the tail, returning its slot position
    pub fn push_back(&mut self, entry: CacheEntry<T>) -> usize {
        let idx = self.alloc_slot();
        self.by_handle.insert(entry.handle, idx);
        self.slots[idx] = Some(Slot {
            entry,
            prev: self.tail,
            next: None,
        });

        if let Some(tail_idx) = self.tail {
            if let Some(tail) = &mut self.slots[tail_idx] {
                tail.next = Some(idx);
            }
        }
        self.tail = Some(idx);
        if self.head.is_none() {
            self.head = Some(idx);
        }
        self.len += 1;
        idx
    }

    /// Unlink a slot, returning the position that followed it
    pub fn remove(&mut self, idx: usize) -> Option<usize> {
        let slot = self.slots.get_mut(idx)?.take()?;
        self.by_handle.remove(&slot.entry.handle);

        match slot.prev {
            Some(prev_idx) => {
                if let Some(prev) = &mut self.slots[prev_idx] {
                    prev.next = slot.next;
                }
            }
            None => self.head = slot.next,
        }
        match slot.next {
            Some(next_idx) => {
                if let Some(next) = &mut self.slots[next_idx] {
                    next.prev = slot.prev;
                }
            }
            None => self.tail = slot.prev,
        }

        self.free_list.push(idx);
        self.len -= 1;
        slot.next
    }

    pub fn get(&self, idx: usize) -> Option<&CacheEntry<T>> {
        self.slots.get(idx)?.as_ref().map(|slot| &slot.entry)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut CacheEntry<T>> {
        self.slots.get_mut(idx)?.as_mut().map(|slot| &mut slot.entry)
    }

    /// Slot position of the entry mirroring the given row handle
    pub fn position_of(&self, handle: RowHandle) -> Option<usize> {
        self.by_handle.get(&handle).copied()
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub fn next(&self, idx: usize) -> Option<usize> {
        self.slots.get(idx)?.as_ref()?.next
    }

    pub fn prev(&self, idx: usize) -> Option<usize> {
        self.slots.get(idx)?.as_ref()?.prev
    }

    /// Entries front to back
    pub fn entries(&self) -> Entries<'_, T> {
        Entries {
            seq: self,
            cur: self.head,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_handle.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.slots.len();
            self.slots.push(None);
            idx
        }
    }
}

/// Front-to-back traversal of live entries
pub(crate) struct Entries<'a, T> {
    seq: &'a CacheSeq<T>,
    cur: Option<usize>,
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = &'a CacheEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cur?;
        let entry = self.seq.get(idx)?;
        self.cur = self.seq.next(idx);
        Some(entry)
    }
}
