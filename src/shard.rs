//! One independently locked partition of the map.
//!
//! A shard publishes an open-addressed array of slots through an
//! `EpochPtr`. Readers probe the published array without locking; writers
//! take the shard mutex, which also owns the shard's `Collector`, so every
//! retire happens under the lock.
//!
//! Slots move through `empty -> entry <-> tombstone` and `entry -> entry`.
//! A slot never becomes empty again inside one array, which is what lets a
//! lock-free probe stop at the first empty slot.
//!
//! 映射中一个独立加锁的分区。
//! 读者无锁地探测已发布的数组；写入者获取分片互斥锁，该锁同时持有分片的
//! `Collector`，因此所有退休操作都在锁内进行。

use crate::garbage::Collector;
use crate::ptr::EpochPtr;
use crate::reader::Guard;
use crate::sync::{Arc, AtomicPtr, AtomicUsize, Mutex, Ordering};
use std::boxed::Box;
use std::marker::PhantomData;
use std::ptr;
use std::vec::Vec;

/// Smallest slot array a shard allocates.
pub(crate) const MIN_CAPACITY: usize = 8;

/// Address used to mark a removed slot. `Entry` is at least 8-aligned, so no
/// allocation can live here.
const TOMBSTONE_ADDR: usize = 1;

/// An immutable published mapping.
///
/// Never mutated after it becomes visible; an update publishes a new entry
/// and retires this one.
pub(crate) struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

impl<K, V> Entry<K, V> {
    fn boxed(hash: u64, key: K, value: V) -> *mut Self {
        Box::into_raw(Box::new(Entry { hash, key, value }))
    }
}

#[inline]
fn tombstone<K, V>() -> *mut Entry<K, V> {
    ptr::without_provenance_mut(TOMBSTONE_ADDR)
}

enum Slot<'a, K, V> {
    Empty,
    Tombstone,
    Occupied(&'a Entry<K, V>),
}

/// Open-addressed slot array with linear probing.
///
/// Dropping an array does not free the entries it points to: after a resize
/// the old and new arrays share them, and ownership stays with the current
/// array (or with the collector once an entry is retired).
pub(crate) struct SlotArray<K, V> {
    slots: Box<[AtomicPtr<Entry<K, V>>]>,
    mask: usize,
}

impl<K, V> SlotArray<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let slots: Vec<AtomicPtr<Entry<K, V>>> = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Load and decode one slot. The reference is valid for as long as the
    /// caller is either pinned or holds the shard lock.
    #[inline]
    fn slot<'a>(&'a self, index: usize) -> (Slot<'a, K, V>, *mut Entry<K, V>) {
        let raw = self.slots[index].load(Ordering::Acquire);
        let slot = if raw.is_null() {
            Slot::Empty
        } else if raw == tombstone() {
            Slot::Tombstone
        } else {
            Slot::Occupied(unsafe { &*raw })
        };
        (slot, raw)
    }

    /// Lock-free lookup, bounded by the array capacity.
    fn find(&self, start: usize, hash: u64, key: &K) -> Option<&Entry<K, V>>
    where
        K: Eq,
    {
        let mut index = start & self.mask;
        for _ in 0..self.capacity() {
            match self.slot(index).0 {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied(entry) => {
                    if entry.hash == hash && entry.key == *key {
                        return Some(entry);
                    }
                }
            }
            index = (index + 1) & self.mask;
        }
        None
    }

    /// Writer-side probe: the matching slot, or the slot a new entry for
    /// `key` should go to (first tombstone on the chain, else the empty slot
    /// ending it).
    ///
    /// Terminates because the load policy always leaves an empty slot.
    fn probe(&self, start: usize, hash: u64, key: &K) -> Probe<'_, K, V>
    where
        K: Eq,
    {
        let mut index = start & self.mask;
        let mut first_tombstone = None;
        loop {
            match self.slot(index) {
                (Slot::Empty, _) => {
                    return match first_tombstone {
                        Some(reused) => Probe::Vacant {
                            index: reused,
                            reuses_tombstone: true,
                        },
                        None => Probe::Vacant {
                            index,
                            reuses_tombstone: false,
                        },
                    };
                }
                (Slot::Tombstone, _) => {
                    first_tombstone.get_or_insert(index);
                }
                (Slot::Occupied(entry), raw) => {
                    if entry.hash == hash && entry.key == *key {
                        return Probe::Found { index, entry, raw };
                    }
                }
            }
            index = (index + 1) & self.mask;
        }
    }

    /// Place an entry known to be absent into the first empty slot.
    /// Only used while building an unpublished array.
    fn place(&self, start: usize, raw: *mut Entry<K, V>) {
        let mut index = start & self.mask;
        while !self.slots[index].load(Ordering::Relaxed).is_null() {
            index = (index + 1) & self.mask;
        }
        self.slots[index].store(raw, Ordering::Relaxed);
    }
}

enum Probe<'a, K, V> {
    Found {
        index: usize,
        entry: &'a Entry<K, V>,
        raw: *mut Entry<K, V>,
    },
    Vacant {
        index: usize,
        reuses_tombstone: bool,
    },
}

/// Writer-side state, only reachable through the shard lock.
struct ShardWriter {
    collector: Collector,
    live: usize,
    tombstones: usize,
}

/// An independently lockable partition of the key space.
///
/// 键空间中一个可独立加锁的分区。
pub(crate) struct Shard<K, V> {
    table: EpochPtr<SlotArray<K, V>>,
    writer: Mutex<ShardWriter>,
    len: AtomicUsize,
    shift: u32,
    initial_capacity: usize,
    _marker: PhantomData<Box<Entry<K, V>>>,
}

impl<K, V> Shard<K, V>
where
    K: Eq + Send + 'static,
    V: Send + 'static,
{
    /// `shift` is the number of hash bits consumed by shard selection.
    pub(crate) fn new(collector: Collector, initial_capacity: usize, shift: u32) -> Self {
        let initial_capacity = initial_capacity.max(MIN_CAPACITY).next_power_of_two();
        Self {
            table: EpochPtr::with_shared(
                Arc::clone(&collector.shared),
                SlotArray::with_capacity(initial_capacity),
            ),
            writer: Mutex::new(ShardWriter {
                collector,
                live: 0,
                tombstones: 0,
            }),
            len: AtomicUsize::new(0),
            shift,
            initial_capacity,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn start(&self, hash: u64) -> usize {
        hash.checked_shr(self.shift).unwrap_or(0) as usize
    }

    /// Number of live entries.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Capacity of the currently published slot array.
    pub(crate) fn capacity(&self, guard: &Guard) -> usize {
        self.table.load(guard).capacity()
    }

    /// Retired objects of this shard not yet freed.
    pub(crate) fn pending_garbage(&self) -> usize {
        self.writer.lock().collector.pending()
    }

    /// Lock-free read: the value of the live entry for `key`, if any.
    #[inline]
    pub(crate) fn get<'g>(&'g self, hash: u64, key: &K, guard: &'g Guard) -> Option<&'g V> {
        self.table
            .load(guard)
            .find(self.start(hash), hash, key)
            .map(|entry| &entry.value)
    }

    /// Insert only if absent. Returns whether the entry was inserted.
    pub(crate) fn insert(&self, hash: u64, key: K, value: V) -> bool {
        let mut writer = self.writer.lock();
        let w = &mut *writer;
        match self.probe_for_insert(w, hash, &key) {
            Some((index, reuses_tombstone)) => {
                self.publish_new(w, index, reuses_tombstone, Entry::boxed(hash, key, value));
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite. Returns the previous value, if any.
    pub(crate) fn upsert(&self, hash: u64, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let mut writer = self.writer.lock();
        let w = &mut *writer;
        // SAFETY: shard lock held; the reference is not used past a table swap.
        let table = unsafe { self.table.load_unprotected() };
        match table.probe(self.start(hash), hash, &key) {
            Probe::Found { index, entry, raw } => {
                let previous = entry.value.clone();
                table.slots[index].store(Entry::boxed(hash, key, value), Ordering::Release);
                w.collector.retire(unsafe { Box::from_raw(raw) });
                Some(previous)
            }
            Probe::Vacant { .. } => {
                if let Some((index, reuses_tombstone)) = self.probe_for_insert(w, hash, &key) {
                    self.publish_new(w, index, reuses_tombstone, Entry::boxed(hash, key, value));
                }
                None
            }
        }
    }

    /// Replace the value of `key` if it is present and `accept` approves the
    /// current value. Returns the replaced value.
    pub(crate) fn replace_if<F>(&self, hash: u64, key: K, value: V, accept: F) -> Option<V>
    where
        V: Clone,
        F: FnOnce(&V) -> bool,
    {
        let mut writer = self.writer.lock();
        // SAFETY: shard lock held; no table swap happens in this method.
        let table = unsafe { self.table.load_unprotected() };
        let Probe::Found { index, entry, raw } = table.probe(self.start(hash), hash, &key) else {
            return None;
        };
        if !accept(&entry.value) {
            return None;
        }
        let previous = entry.value.clone();
        table.slots[index].store(Entry::boxed(hash, key, value), Ordering::Release);
        writer.collector.retire(unsafe { Box::from_raw(raw) });
        Some(previous)
    }

    /// Remove `key` if it is present and `accept` approves its value.
    pub(crate) fn remove_if<F>(&self, hash: u64, key: &K, accept: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut writer = self.writer.lock();
        let w = &mut *writer;
        // SAFETY: shard lock held; no table swap happens in this method.
        let table = unsafe { self.table.load_unprotected() };
        let Probe::Found { index, entry, raw } = table.probe(self.start(hash), hash, key) else {
            return false;
        };
        if !accept(&entry.value) {
            return false;
        }
        table.slots[index].store(tombstone(), Ordering::Release);
        w.collector.retire(unsafe { Box::from_raw(raw) });
        w.live -= 1;
        w.tombstones += 1;
        self.len.store(w.live, Ordering::Relaxed);
        true
    }

    /// Remove every entry, shrinking back to the initial capacity.
    pub(crate) fn clear(&self) {
        let mut writer = self.writer.lock();
        let w = &mut *writer;
        if w.live == 0 && w.tombstones == 0 {
            return;
        }

        // SAFETY: shard lock held; the old table is only read until it is
        // retired below.
        let old = unsafe { self.table.load_unprotected() } as *const SlotArray<K, V>;
        let fresh = SlotArray::with_capacity(self.initial_capacity);
        let mut entries = Vec::with_capacity(w.live);
        unsafe {
            for slot in (*old).slots.iter() {
                let raw = slot.load(Ordering::Acquire);
                if !raw.is_null() && raw != tombstone() {
                    entries.push(raw);
                }
            }
        }
        self.table.store(fresh, &mut w.collector);
        for raw in entries {
            w.collector.retire(unsafe { Box::from_raw(raw) });
        }

        w.live = 0;
        w.tombstones = 0;
        self.len.store(0, Ordering::Relaxed);
    }

    /// Run one collection cycle on this shard's collector.
    pub(crate) fn collect(&self) -> usize {
        self.writer.lock().collector.try_reclaim()
    }

    /// Find where a new entry for `key` goes, growing or rebuilding the
    /// array first when the load policy requires it. `None` if present.
    fn probe_for_insert(&self, w: &mut ShardWriter, hash: u64, key: &K) -> Option<(usize, bool)> {
        let start = self.start(hash);
        // SAFETY: shard lock held; the reference is dropped before `rebuild`.
        let (index, reuses_tombstone) = match unsafe { self.table.load_unprotected() }
            .probe(start, hash, key)
        {
            Probe::Found { .. } => return None,
            Probe::Vacant {
                index,
                reuses_tombstone,
            } => (index, reuses_tombstone),
        };

        let capacity = unsafe { self.table.load_unprotected() }.capacity();
        let threshold = capacity / 4 * 3;
        let occupied_after = w.live + w.tombstones + usize::from(!reuses_tombstone);

        if w.live + 1 > threshold {
            self.rebuild(w, capacity * 2);
        } else if occupied_after > threshold {
            self.rebuild(w, capacity);
        } else {
            return Some((index, reuses_tombstone));
        }

        match unsafe { self.table.load_unprotected() }.probe(start, hash, key) {
            Probe::Vacant {
                index,
                reuses_tombstone,
            } => Some((index, reuses_tombstone)),
            Probe::Found { .. } => None,
        }
    }

    fn publish_new(
        &self,
        w: &mut ShardWriter,
        index: usize,
        reuses_tombstone: bool,
        raw: *mut Entry<K, V>,
    ) {
        // SAFETY: shard lock held.
        let table = unsafe { self.table.load_unprotected() };
        table.slots[index].store(raw, Ordering::Release);
        if reuses_tombstone {
            w.tombstones -= 1;
        }
        w.live += 1;
        self.len.store(w.live, Ordering::Relaxed);
    }

    /// Copy live entries into a fresh array of `capacity` slots and publish
    /// it. Readers still probing the old array see a frozen, consistent view;
    /// the old array is retired, the entries are shared and stay alive.
    fn rebuild(&self, w: &mut ShardWriter, capacity: usize) {
        let fresh = SlotArray::with_capacity(capacity);
        {
            // SAFETY: shard lock held; `old` is not used after `publish`.
            let old = unsafe { self.table.load_unprotected() };
            for slot in old.slots.iter() {
                let raw = slot.load(Ordering::Acquire);
                if raw.is_null() || raw == tombstone() {
                    continue;
                }
                let hash = unsafe { (*raw).hash };
                fresh.place(self.start(hash), raw);
            }
            tracing::debug!(
                from = old.capacity(),
                to = capacity,
                live = w.live,
                tombstones = w.tombstones,
                "rebuilding shard table"
            );
        }
        self.table.publish(Box::new(fresh), &mut w.collector);
        w.tombstones = 0;
    }
}

impl<K, V> Drop for Shard<K, V> {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        for slot in table.slots.iter() {
            let raw = slot.load(Ordering::Relaxed);
            if !raw.is_null() && raw != tombstone() {
                unsafe { drop(Box::from_raw(raw)) };
            }
        }
        // No guard can reference this shard any more (`&mut self`).
        self.writer.lock().collector.purge();
    }
}
