use crate::domain::{EpochDomain, EpochDomainBuilder};
use crate::reader::Guard;
use crate::shard::{MIN_CAPACITY, Shard};
use foldhash::fast::RandomState;
use std::boxed::Box;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::vec::Vec;

/// Shard count used by `ConcurrentHashMap::new()`.
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// Per-shard slot array capacity a new map starts with.
pub const DEFAULT_INITIAL_CAPACITY: usize = MIN_CAPACITY;

/// Builder for configuring a `ConcurrentHashMap`.
///
/// # Example
/// ```
/// use epoch_chm::ConcurrentHashMap;
///
/// let map: ConcurrentHashMap<u64, u64> = ConcurrentHashMap::builder()
///     .shard_count(16)
///     .initial_capacity(64)
///     .auto_reclaim_threshold(256)
///     .build();
/// assert_eq!(map.shard_count(), 16);
/// ```
///
/// 用于配置 `ConcurrentHashMap` 的构建器。
pub struct MapBuilder<K, V, S = RandomState> {
    shard_count: usize,
    initial_capacity: usize,
    domain: EpochDomainBuilder,
    hasher: S,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> MapBuilder<K, V> {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    pub fn new() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            domain: EpochDomainBuilder::new(),
            hasher: RandomState::default(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for MapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> MapBuilder<K, V, S> {
    /// Set the number of shards. Rounded up to a power of two; `0` means one.
    ///
    /// Fixed for the lifetime of the map.
    ///
    /// 设置分片数量。向上取整为 2 的幂；`0` 表示一个。
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Set the initial slot array capacity of every shard.
    /// Rounded up to a power of two, at least 8.
    ///
    /// 设置每个分片的初始槽数组容量。
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Pending retired entries per shard that trigger a collection cycle.
    /// `None` disables automatic reclamation; use `ConcurrentHashMap::collect`.
    ///
    /// Default: `Some(64)`
    pub fn auto_reclaim_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.domain = self.domain.auto_reclaim_threshold(threshold);
        self
    }

    /// Collection cycles between sweeps of dead reader slots.
    ///
    /// Default: `16`
    pub fn cleanup_interval(mut self, interval: usize) -> Self {
        self.domain = self.domain.cleanup_interval(interval);
        self
    }

    /// Use a different hasher.
    pub fn hasher<H>(self, hasher: H) -> MapBuilder<K, V, H> {
        MapBuilder {
            shard_count: self.shard_count,
            initial_capacity: self.initial_capacity,
            domain: self.domain,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Build the map.
    /// 构建映射。
    pub fn build(self) -> ConcurrentHashMap<K, V, S>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: BuildHasher,
    {
        let shard_count = self.shard_count.max(1).next_power_of_two();
        let shift = shard_count.trailing_zeros();
        let domain = self.domain.build();

        let shards: Vec<Shard<K, V>> = (0..shard_count)
            .map(|_| Shard::new(domain.collector(), self.initial_capacity, shift))
            .collect();

        tracing::debug!(
            shard_count,
            initial_capacity = self.initial_capacity,
            "built concurrent hash map"
        );

        ConcurrentHashMap {
            shards: shards.into_boxed_slice(),
            shard_mask: (shard_count - 1) as u64,
            hasher: self.hasher,
            domain,
        }
    }
}

impl<K, V, S> std::fmt::Debug for MapBuilder<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapBuilder")
            .field("shard_count", &self.shard_count)
            .field("initial_capacity", &self.initial_capacity)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// A sharded concurrent hash map with lock-free reads.
///
/// - Keys are spread over a fixed, power-of-two number of shards by
///   `hash(key) mod shard_count`. Each shard is an open-addressed table with
///   its own writer lock, so writers to different shards never contend.
/// - Reads take no lock. They pin the calling thread in the map's
///   `EpochDomain` and probe the shard's published slot array.
/// - Removed or replaced entries are retired to the shard's collector and
///   freed only once no pinned reader can still reach them.
///
/// Every operation is linearizable per key. `insert` never overwrites; use
/// `insert_or_assign` for that.
///
/// ```
/// use epoch_chm::ConcurrentHashMap;
///
/// let map = ConcurrentHashMap::new();
/// assert!(map.insert(1u64, 10u64));
/// assert!(!map.insert(1, 11));
/// assert_eq!(map.find(&1), Some(10));
/// assert_eq!(map.insert_or_assign(1, 12), Some(10));
/// assert_eq!(map.erase(&1), 1);
/// assert_eq!(map.erase(&1), 0);
/// ```
///
/// 一个分片的并发哈希映射，读取无锁。
/// - 键按 `hash(key) mod shard_count` 分布到固定数量（2 的幂）的分片中。
///   每个分片是一个带有独立写锁的开放寻址表，写入不同分片的写入者从不竞争。
/// - 读取不加锁。它们将调用线程钉住到映射的 `EpochDomain` 并探测分片已发布的槽数组。
/// - 被删除或替换的条目退休到分片的回收器，只有在没有被钉住的读者能访问它们时才释放。
pub struct ConcurrentHashMap<K, V, S = RandomState> {
    shards: Box<[Shard<K, V>]>,
    shard_mask: u64,
    hasher: S,
    domain: EpochDomain,
}

impl<K, V> ConcurrentHashMap<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a map with `DEFAULT_SHARD_COUNT` shards.
    pub fn new() -> Self {
        MapBuilder::new().build()
    }

    /// Create a map with `shard_count` shards (rounded up to a power of two).
    pub fn with_shards(shard_count: usize) -> Self {
        MapBuilder::new().shard_count(shard_count).build()
    }

    /// Create a builder for configuring the map.
    pub fn builder() -> MapBuilder<K, V> {
        MapBuilder::new()
    }
}

impl<K, V> Default for ConcurrentHashMap<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ConcurrentHashMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher,
{
    /// The shard responsible for `key`, and the key's hash. No locking.
    #[inline]
    fn locate(&self, key: &K) -> (u64, &Shard<K, V>) {
        let hash = self.hasher.hash_one(key);
        (hash, &self.shards[(hash & self.shard_mask) as usize])
    }

    /// Acquire a read guard for the calling thread.
    ///
    /// Needed for `get`; every other operation pins internally.
    ///
    /// 为调用线程获取读取守卫。
    #[inline]
    pub fn pin(&self) -> Guard {
        self.domain.pin()
    }

    /// Insert `key -> value` if `key` is absent.
    ///
    /// Returns `true` if the entry was inserted. If `key` is already present
    /// nothing changes and `false` is returned.
    ///
    /// 如果 `key` 不存在则插入。已存在时不做任何修改并返回 `false`。
    pub fn insert(&self, key: K, value: V) -> bool {
        let (hash, shard) = self.locate(&key);
        shard.insert(hash, key, value)
    }

    /// The value for `key`, borrowed for as long as `guard` lives.
    ///
    /// The entry stays allocated until the guard is dropped, even if another
    /// thread erases or replaces `key` meanwhile.
    ///
    /// # Panics
    /// If `guard` was issued by a different map.
    pub fn get<'g>(&'g self, key: &K, guard: &'g Guard) -> Option<&'g V> {
        assert!(
            self.domain.owns(guard),
            "guard was pinned on a different map"
        );
        let (hash, shard) = self.locate(key);
        shard.get(hash, key, guard)
    }

    /// Run `f` on the value for `key` while it is protected.
    pub fn get_with<R, F>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let guard = self.pin();
        self.get(key, &guard).map(f)
    }

    /// A copy of the value for `key`, or `None`.
    ///
    /// 返回 `key` 对应值的副本，或 `None`。
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_with(key, V::clone)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get_with(key, |_| ()).is_some()
    }

    /// Remove `key`. Returns the number of entries removed (0 or 1).
    ///
    /// Erasing an absent key is a no-op.
    ///
    /// 删除 `key`。返回删除的条目数（0 或 1）。
    pub fn erase(&self, key: &K) -> usize {
        let (hash, shard) = self.locate(key);
        usize::from(shard.remove_if(hash, key, |_| true))
    }

    /// Remove `key` only if its current value equals `expected`.
    pub fn erase_if_equal(&self, key: &K, expected: &V) -> usize
    where
        V: PartialEq,
    {
        let (hash, shard) = self.locate(key);
        usize::from(shard.remove_if(hash, key, |current| current == expected))
    }

    /// Insert or overwrite, returning the previous value.
    ///
    /// The replacement and the read of the old value are one atomic step, so
    /// there is no window between a `find` and an `insert` for another writer
    /// to slip into.
    ///
    /// 插入或覆盖，返回之前的值。替换和读取旧值是一个原子步骤。
    pub fn insert_or_assign(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let (hash, shard) = self.locate(&key);
        shard.upsert(hash, key, value)
    }

    /// Replace the value for `key` only if it is present.
    /// Returns the replaced value; `None` means nothing changed.
    pub fn assign(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let (hash, shard) = self.locate(&key);
        shard.replace_if(hash, key, value, |_| true)
    }

    /// Replace the value for `key` only if it currently equals `expected`.
    pub fn assign_if_equal(&self, key: K, expected: &V, value: V) -> bool
    where
        V: Clone + PartialEq,
    {
        let (hash, shard) = self.locate(&key);
        shard
            .replace_if(hash, key, value, |current| current == expected)
            .is_some()
    }

    /// Number of entries. Not a snapshot: concurrent writers may move it
    /// while the shards are summed.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.len() == 0)
    }

    /// Remove every entry. Shards are cleared one at a time.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
    }

    /// Number of shards, fixed at construction.
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total slot capacity over all shards.
    pub fn capacity(&self) -> usize {
        let guard = self.pin();
        self.shards.iter().map(|shard| shard.capacity(&guard)).sum()
    }

    /// Run one collection cycle on every shard and return the number of
    /// retired objects freed. Useful as a periodic sweep when automatic
    /// reclamation is disabled.
    ///
    /// 在每个分片上运行一个回收周期，返回释放的已退休对象数。
    pub fn collect(&self) -> usize {
        self.shards.iter().map(Shard::collect).sum()
    }

    /// Retired objects not yet freed, over all shards.
    pub fn pending_garbage(&self) -> usize {
        self.shards.iter().map(Shard::pending_garbage).sum()
    }

    /// The reclamation domain of this map.
    pub fn domain(&self) -> &EpochDomain {
        &self.domain
    }
}

impl<K, V, S> Drop for ConcurrentHashMap<K, V, S> {
    fn drop(&mut self) {
        self.domain.close();
    }
}

impl<K, V, S> std::fmt::Debug for ConcurrentHashMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentHashMap")
            .field("len", &self.len())
            .field("shard_count", &self.shard_count())
            .field("domain", &self.domain)
            .finish()
    }
}
