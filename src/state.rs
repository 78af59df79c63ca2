use crate::garbage::GarbageSet;
use crate::sync::{Arc, AtomicBool, AtomicUsize, Mutex, Ordering};
use std::vec::Vec;

/// Default threshold for automatic garbage reclamation (count of retired nodes).
/// 自动垃圾回收的默认阈值（已退休节点的数量）。
pub(crate) const AUTO_RECLAIM_THRESHOLD: usize = 64;

/// Default interval for cleaning up dead reader slots (in collection cycles).
/// 清理死读者槽的默认间隔（以回收周期为单位）。
pub(crate) const DEFAULT_CLEANUP_INTERVAL: usize = 16;

/// Represents a reader that is not currently pinned to any epoch.
/// 表示当前未被钉住到任何纪元的读者。
pub(crate) const INACTIVE_EPOCH: usize = usize::MAX;

/// A slot allocated for a reader thread to record its active epoch.
///
/// Cache-aligned to prevent false sharing between readers.
///
/// 为读者线程分配的槽，用于记录其活跃纪元。
/// 缓存对齐以防止读者之间的伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct ReaderSlot {
    /// The epoch currently being accessed by the reader, or INACTIVE_EPOCH.
    /// 读者当前访问的纪元，或 INACTIVE_EPOCH。
    pub(crate) active_epoch: AtomicUsize,
}

/// Map-wide shared state of one reclamation domain.
///
/// Holds the global epoch and the registry of reader slots. Any number of
/// collectors (one per shard) advance the same epoch and scan the same
/// registry.
///
/// 一个回收域的映射级共享状态。
/// 包含全局纪元和读者槽注册表。任意数量的回收器（每个分片一个）
/// 推进同一个纪元并扫描同一个注册表。
#[repr(align(64))]
pub(crate) struct SharedState {
    /// The global monotonic epoch counter.
    /// 全局单调纪元计数器。
    pub(crate) global_epoch: AtomicUsize,
    /// Set once the owning map is dropped; per-thread reader caches prune
    /// entries whose domain is closed.
    /// 所属映射被 drop 时置位；线程本地读者缓存会清理已关闭域的条目。
    pub(crate) closed: AtomicBool,
    /// List of all registered reader slots. Protected by a Mutex.
    /// 所有注册读者槽的列表。由 Mutex 保护。
    pub(crate) readers: Mutex<Vec<Arc<ReaderSlot>>>,
    /// Garbage left behind by collectors dropped while readers were pinned.
    /// Freed together with this state, after the last guard is gone.
    /// 回收器在读者仍被钉住时被 drop 所遗留的垃圾。
    /// 与此状态一起释放，即最后一个守卫消失之后。
    pub(crate) orphans: Mutex<Vec<GarbageSet>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            global_epoch: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            readers: Mutex::new(Vec::new()),
            orphans: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Number of reader slots currently registered.
    pub(crate) fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }
}
