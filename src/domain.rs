use crate::garbage::{Collector, GarbageSet};
use crate::reader::{Guard, LocalEpoch, pin_current};
use crate::state::{AUTO_RECLAIM_THRESHOLD, DEFAULT_CLEANUP_INTERVAL, SharedState};
use crate::sync::Arc;

/// Builder for configuring an `EpochDomain`.
///
/// - `auto_reclaim_threshold`: garbage count that triggers an automatic collection
/// - `cleanup_interval`: how often (in collection cycles) dead reader slots are pruned
///
/// # Example
/// ```
/// use epoch_chm::EpochDomain;
///
/// let domain = EpochDomain::builder()
///     .auto_reclaim_threshold(128)
///     .cleanup_interval(32)
///     .build();
/// let mut collector = domain.collector();
/// collector.retire(Box::new(1u64));
/// ```
///
/// 用于配置 `EpochDomain` 的构建器。
#[derive(Debug, Clone, Copy)]
pub struct EpochDomainBuilder {
    auto_reclaim_threshold: Option<usize>,
    cleanup_interval: usize,
}

impl EpochDomainBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            auto_reclaim_threshold: Some(AUTO_RECLAIM_THRESHOLD),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Set the automatic reclamation threshold.
    ///
    /// When a collector's pending count exceeds this threshold, `try_reclaim()`
    /// runs automatically. Pass `None` to disable automatic reclamation.
    ///
    /// Default: `Some(64)`
    ///
    /// 设置自动回收阈值。传递 `None` 可禁用自动回收。
    #[inline]
    pub fn auto_reclaim_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.auto_reclaim_threshold = threshold.into();
        self
    }

    /// Set the cleanup interval for dead reader slots.
    ///
    /// Set to `0` to disable periodic cleanup.
    ///
    /// Default: `16`
    ///
    /// 设置死读者槽的清理间隔。
    #[inline]
    pub fn cleanup_interval(mut self, interval: usize) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the `EpochDomain` with the configured settings.
    /// 使用配置的设置构建 `EpochDomain`。
    #[inline]
    pub fn build(self) -> EpochDomain {
        EpochDomain {
            shared: Arc::new(SharedState::new()),
            config: self,
        }
    }
}

impl Default for EpochDomainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An epoch-based reclamation domain.
///
/// One domain backs one map. It owns the global epoch and the registry of
/// reader slots, hands out `Guard`s to readers and `Collector`s to writers.
/// Unlike a single-writer scheme, any number of collectors may share a
/// domain; each is owned by the shard whose lock serializes its use.
///
/// `EpochDomain` is `Clone` and can be shared across threads.
///
/// **Typical Usage**:
/// ```
/// use epoch_chm::{EpochDomain, EpochPtr};
///
/// let domain = EpochDomain::new();
/// let mut collector = domain.collector();
/// let shared = EpochPtr::new(&domain, 42i32);
///
/// // Reader: pin and load
/// let guard = domain.pin();
/// assert_eq!(*shared.load(&guard), 42);
/// drop(guard);
///
/// // Writer: publish and retire the old value
/// shared.store(100i32, &mut collector);
/// collector.try_reclaim();
/// ```
///
/// 基于纪元的回收域。
/// 一个域支撑一个映射。它持有全局纪元和读者槽注册表，
/// 向读者发放 `Guard`，向写入者发放 `Collector`。
/// 与单写入者方案不同，任意数量的回收器可以共享一个域；
/// 每个回收器由其分片持有，并由分片锁串行化使用。
#[derive(Clone)]
pub struct EpochDomain {
    pub(crate) shared: Arc<SharedState>,
    config: EpochDomainBuilder,
}

impl EpochDomain {
    /// Create a new domain with the default configuration.
    /// 使用默认配置创建一个新域。
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the domain.
    /// 创建一个用于配置域的构建器。
    #[inline]
    pub fn builder() -> EpochDomainBuilder {
        EpochDomainBuilder::new()
    }

    /// Create a collector that retires into this domain.
    /// 创建一个向此域退休对象的回收器。
    pub fn collector(&self) -> Collector {
        Collector {
            shared: Arc::clone(&self.shared),
            garbage: GarbageSet::new(),
            auto_reclaim_threshold: self.config.auto_reclaim_threshold,
            collection_counter: 0,
            cleanup_interval: self.config.cleanup_interval,
        }
    }

    /// Register an explicit reader for the current thread.
    ///
    /// The returned `LocalEpoch` is `!Send`; keep one per thread and pin it
    /// for each read. Threads that do not hold one can use `pin()` instead.
    ///
    /// 为当前线程注册一个显式读者。
    #[inline]
    pub fn register_reader(&self) -> LocalEpoch {
        LocalEpoch::new(Arc::clone(&self.shared))
    }

    /// Acquire a guard for the calling thread (begin a protected read).
    ///
    /// The first call on a thread registers a reader for it; later calls reuse
    /// it. No shard lock is taken.
    ///
    /// 为调用线程获取一个守卫（开始受保护的读取）。
    /// 线程上的第一次调用会为其注册一个读者；之后的调用会复用它。
    #[inline]
    pub fn pin(&self) -> Guard {
        pin_current(&self.shared)
    }

    /// Current value of the global epoch.
    #[inline]
    pub fn epoch(&self) -> usize {
        self.shared
            .global_epoch
            .load(crate::sync::Ordering::Acquire)
    }

    /// Number of reader slots in the registry, including dead ones not yet pruned.
    #[inline]
    pub fn reader_count(&self) -> usize {
        self.shared.reader_count()
    }

    /// Whether `guard` was issued by this domain.
    #[inline]
    pub(crate) fn owns(&self, guard: &Guard) -> bool {
        guard.is_from(&self.shared)
    }

    /// Mark the domain closed so per-thread reader caches let go of it.
    pub(crate) fn close(&self) {
        self.shared.close();
    }
}

impl Default for EpochDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EpochDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochDomain")
            .field("epoch", &self.epoch())
            .field("config", &self.config)
            .finish()
    }
}
