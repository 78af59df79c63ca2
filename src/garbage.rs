use crate::state::{INACTIVE_EPOCH, SharedState};
use crate::sync::{Arc, Ordering, fence};
use std::boxed::Box;
use std::collections::VecDeque;
use std::vec::Vec;

/// An object that has been retired (removed from shared view) but not yet deleted.
/// It stores the raw pointer and a destructor function to safely drop the concrete type.
///
/// 一个已被退休（从共享视图中移除）但尚未删除的对象。
/// 它存储原始指针和析构函数，以安全地 drop 具体类型。
struct RetiredObject {
    ptr: *mut (),
    dtor: unsafe fn(*mut ()),
}

// SAFETY: only values that are `Send` are turned into a `RetiredObject`
// (see `Collector::retire`).
unsafe impl Send for RetiredObject {}

/// Converts the raw pointer back to Box<T> and drops it.
/// 将原始指针转换回 Box<T> 并将其 drop。
#[inline(always)]
unsafe fn drop_value<T>(ptr: *mut ()) {
    let ptr = ptr as *mut T;
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

impl RetiredObject {
    #[inline(always)]
    fn new<T: Send + 'static>(value: Box<T>) -> Self {
        let ptr = Box::into_raw(value) as *mut ();
        RetiredObject {
            ptr,
            dtor: drop_value::<T>,
        }
    }
}

impl Drop for RetiredObject {
    #[inline(always)]
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                (self.dtor)(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Retired objects grouped in bags by retirement epoch.
///
/// 按退休纪元分组存放在袋子中的已退休对象。
pub(crate) struct GarbageSet {
    /// Queue of garbage bags, ordered by epoch.
    /// Each element is (epoch, bag_of_nodes).
    queue: VecDeque<(usize, Vec<RetiredObject>)>,
    /// Pool of empty vectors to reduce allocation.
    pool: Vec<Vec<RetiredObject>>,
    /// Total number of retired nodes in the queue.
    count: usize,
}

impl GarbageSet {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            pool: Vec::new(),
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[inline]
    fn add(&mut self, node: RetiredObject, current_epoch: usize) {
        match self.queue.back_mut() {
            Some((last_epoch, bag)) if *last_epoch == current_epoch => bag.push(node),
            _ => {
                let mut bag = self.pool.pop().unwrap_or_else(|| Vec::with_capacity(16));
                bag.push(node);
                self.queue.push_back((current_epoch, bag));
            }
        }

        self.count += 1;
    }

    /// Free every bag retired at least two epochs before `min_active_epoch`.
    ///
    /// A reader pinned at epoch `e` may still reach objects retired at `e - 1`
    /// (it read the epoch before the writer unlinked them), so only bags with
    /// `epoch + 2 <= min_active_epoch` go. `None` means no reader is pinned and
    /// everything goes.
    ///
    /// 释放所有比 `min_active_epoch` 至少早两个纪元退休的袋子。
    /// `None` 表示没有读者被钉住，全部释放。
    /// 返回释放的对象数。
    pub(crate) fn collect(&mut self, min_active_epoch: Option<usize>) -> usize {
        fn recycle_bag(mut bag: Vec<RetiredObject>, pool: &mut Vec<Vec<RetiredObject>>) -> usize {
            let freed = bag.len();
            bag.clear(); // Drops all retired objects inside
            pool.push(bag);
            freed
        }

        let mut freed = 0;
        match min_active_epoch {
            None => {
                for (_, bag) in self.queue.drain(..) {
                    freed += recycle_bag(bag, &mut self.pool);
                }
            }
            Some(min_active_epoch) => {
                while let Some((epoch, _)) = self.queue.front() {
                    if epoch.saturating_add(2) > min_active_epoch {
                        break;
                    }
                    if let Some((_, bag)) = self.queue.pop_front() {
                        freed += recycle_bag(bag, &mut self.pool);
                    }
                }
            }
        }

        self.count -= freed;
        freed
    }
}

/// The write-side half of the reclamation layer.
///
/// A map owns one `Collector` per shard, stored next to the shard's table
/// behind the shard lock, so retiring an entry is only possible while
/// holding that lock. All collectors of a map share one `EpochDomain`.
///
/// It is responsible for:
/// - Receiving retired objects (`retire`).
/// - Advancing the global epoch during collection cycles.
/// - Scanning active readers and reclaiming garbage from old epochs (`try_reclaim`).
///
/// 回收层的写入端。
/// 映射为每个分片持有一个 `Collector`，与分片的表一起存放在分片锁之后，
/// 因此只有持有该锁时才能退休条目。一个映射的所有回收器共享同一个 `EpochDomain`。
pub struct Collector {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) garbage: GarbageSet,
    pub(crate) auto_reclaim_threshold: Option<usize>,
    pub(crate) collection_counter: usize,
    pub(crate) cleanup_interval: usize,
}

impl Collector {
    /// Number of retired objects not yet freed.
    /// 尚未释放的已退休对象数量。
    #[inline]
    pub fn pending(&self) -> usize {
        self.garbage.len()
    }

    /// Retire (defer deletion) of a value.
    ///
    /// The value is stored in a garbage bag tagged with the current epoch and
    /// freed once every reader that could have observed it has unpinned.
    /// Never fails. If automatic reclamation is enabled and the pending count
    /// exceeds the threshold, `try_reclaim` runs before returning.
    ///
    /// 退休（延迟删除）一个值。
    /// 该值被存放在标记为当前纪元的垃圾袋中，一旦所有可能观察到它的读者都已
    /// 解除钉住就会被释放。永不失败。
    #[inline]
    pub fn retire<T: Send + 'static>(&mut self, data: Box<T>) {
        // Other collectors advance the epoch too. The unlink that preceded
        // this call must be ordered before the epoch read, or the bag can be
        // tagged older than a reader that still loads the unlinked object.
        fence(Ordering::SeqCst);
        let current_epoch = self.shared.global_epoch.load(Ordering::SeqCst);

        self.garbage.add(RetiredObject::new(data), current_epoch);

        if let Some(threshold) = self.auto_reclaim_threshold {
            if self.pending() > threshold {
                self.try_reclaim();
            }
        }
    }

    /// Perform a collection cycle and return how many objects were freed.
    ///
    /// 1. Advances the global epoch.
    /// 2. Scans the registry for the minimum epoch among pinned readers.
    /// 3. Frees garbage no pinned reader can still reach.
    ///
    /// Best effort: freeing nothing because readers are still pinned is
    /// the expected outcome under load, not an error.
    ///
    /// 执行一个回收周期并返回释放的对象数。
    /// 尽力而为：因为读者仍被钉住而什么都没释放是负载下的正常结果，不是错误。
    pub fn try_reclaim(&mut self) -> usize {
        let new_epoch = self.shared.global_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        fence(Ordering::SeqCst);

        self.collection_counter += 1;
        let should_cleanup =
            self.cleanup_interval > 0 && self.collection_counter % self.cleanup_interval == 0;

        let mut min_active_epoch: Option<usize> = None;
        let mut shared_readers = self.shared.readers.lock();
        let mut dead_count = 0;

        for arc_slot in shared_readers.iter() {
            let epoch = arc_slot.active_epoch.load(Ordering::Acquire);
            if epoch != INACTIVE_EPOCH {
                min_active_epoch = Some(min_active_epoch.map_or(epoch, |min| min.min(epoch)));
            } else if should_cleanup && Arc::strong_count(arc_slot) == 1 {
                // Only this Vec holds a reference, the LocalEpoch was dropped
                dead_count += 1;
            }
        }

        if should_cleanup && dead_count > 0 {
            shared_readers.retain(|arc_slot| Arc::strong_count(arc_slot) > 1);
        }

        drop(shared_readers);

        let freed = self.garbage.collect(min_active_epoch);
        tracing::trace!(
            epoch = new_epoch,
            min_active_epoch = ?min_active_epoch,
            freed,
            pending = self.garbage.len(),
            dead_readers = dead_count,
            "collection cycle"
        );
        freed
    }
}

impl Collector {
    /// Free all pending garbage without consulting the registry.
    ///
    /// Only sound when no reader can hold a reference into this collector's
    /// garbage, e.g. when the owning map is dropped through `&mut self`.
    pub(crate) fn purge(&mut self) -> usize {
        self.garbage.collect(None)
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if self.garbage.len() > 0 {
            self.try_reclaim();
        }
        if self.garbage.len() > 0 {
            let garbage = std::mem::replace(&mut self.garbage, GarbageSet::new());
            self.shared.orphans.lock().push(garbage);
        }
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("pending", &self.garbage.len())
            .field("auto_reclaim_threshold", &self.auto_reclaim_threshold)
            .field("collection_counter", &self.collection_counter)
            .finish()
    }
}
