use crate::state::{INACTIVE_EPOCH, ReaderSlot, SharedState};
use crate::sync::{Arc, AtomicUsize, Cell, Ordering, fence, thread_local};
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

struct LocalInner {
    slot: Arc<ReaderSlot>,
    shared: Arc<SharedState>,
    pin_count: Cell<usize>,
}

/// A reader thread's local epoch state.
///
/// Created by `EpochDomain::register_reader()`, or lazily by
/// `EpochDomain::pin()` through a per-thread cache. It is `!Send` and
/// `!Sync` and belongs to the thread that created it.
///
/// When the last `LocalEpoch` handle and every `Guard` it produced are
/// dropped, the slot is only referenced by the registry and a later
/// collection cycle removes it.
///
/// 读者线程的本地纪元状态。
/// 由 `EpochDomain::register_reader()` 创建，或由 `EpochDomain::pin()`
/// 通过线程本地缓存惰性创建。它是 `!Send` 和 `!Sync` 的，属于创建它的线程。
pub struct LocalEpoch {
    inner: Rc<LocalInner>,
}

impl LocalEpoch {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        let slot = Arc::new(ReaderSlot {
            active_epoch: AtomicUsize::new(INACTIVE_EPOCH),
        });

        // Register the reader immediately in the shared readers list
        shared.readers.lock().push(Arc::clone(&slot));

        LocalEpoch {
            inner: Rc::new(LocalInner {
                slot,
                shared,
                pin_count: Cell::new(0),
            }),
        }
    }

    /// Pin this thread to the current epoch.
    ///
    /// **Reentrancy**: nested calls are allowed. The thread stays pinned until
    /// every returned guard (and every clone of one) is dropped.
    ///
    /// While pinned, no collector frees an object that was retired while this
    /// thread could still reach it.
    ///
    /// 将此线程钉住到当前纪元。
    /// **可重入性**：允许嵌套调用。线程在所有返回的守卫（及其克隆）被 drop 之前保持被钉住。
    #[inline]
    pub fn pin(&self) -> Guard {
        let inner = &self.inner;
        let pin_count = inner.pin_count.get();

        if pin_count == 0 {
            let current_epoch = inner.shared.global_epoch.load(Ordering::SeqCst);
            inner
                .slot
                .active_epoch
                .store(current_epoch, Ordering::Relaxed);
            // Pairs with the fence in `Collector::try_reclaim`: either the
            // collector sees this slot, or every load after this point sees
            // the unlinks that preceded its scan.
            fence(Ordering::SeqCst);
        }

        inner.pin_count.set(pin_count + 1);

        Guard {
            local: Rc::clone(inner),
        }
    }

    #[inline]
    fn belongs_to(&self, shared: &Arc<SharedState>) -> bool {
        Arc::ptr_eq(&self.inner.shared, shared)
    }
}

/// A guard that keeps the current thread pinned to an epoch.
///
/// This is the read-side protection of the map: every reference handed out
/// by `ConcurrentHashMap::get` borrows a `Guard`, and the entry behind it is
/// not freed until the guard is gone, even if another thread erases the key
/// meanwhile.
///
/// Cloning increments the pin count (nested pinning).
///
/// 一个保持当前线程被钉住到一个纪元的守卫。
/// `ConcurrentHashMap::get` 返回的每个引用都借用一个 `Guard`，即使其他线程
/// 同时删除了该键，条目也不会在守卫消失前被释放。
#[must_use]
pub struct Guard {
    local: Rc<LocalInner>,
}

impl Guard {
    /// Whether this guard was issued by the given domain state.
    #[inline]
    pub(crate) fn is_from(&self, shared: &Arc<SharedState>) -> bool {
        Arc::ptr_eq(&self.local.shared, shared)
    }
}

impl Clone for Guard {
    #[inline]
    fn clone(&self) -> Self {
        let pin_count = self.local.pin_count.get();

        assert!(
            pin_count > 0,
            "BUG: Cloning a Guard in an unpinned state (pin_count = 0)."
        );

        self.local.pin_count.set(pin_count + 1);

        Guard {
            local: Rc::clone(&self.local),
        }
    }
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        let pin_count = self.local.pin_count.get();

        assert!(
            pin_count > 0,
            "BUG: Dropping a Guard in an unpinned state (pin_count = 0)."
        );

        if pin_count == 1 {
            self.local
                .slot
                .active_epoch
                .store(INACTIVE_EPOCH, Ordering::Release);
        }

        self.local.pin_count.set(pin_count - 1);
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("pin_count", &self.local.pin_count.get())
            .finish()
    }
}

thread_local! {
    /// Readers this thread registered implicitly, one per live domain.
    /// 此线程隐式注册的读者，每个存活域一个。
    static LOCAL_EPOCHS: RefCell<Vec<LocalEpoch>> = RefCell::new(Vec::new());
}

/// Pin the calling thread in `shared`, registering a reader for this thread
/// on first use.
///
/// During thread teardown the cache may already be gone; the guard then uses
/// a reader registered just for it.
pub(crate) fn pin_current(shared: &Arc<SharedState>) -> Guard {
    LOCAL_EPOCHS
        .try_with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some(local) = cache.iter().find(|local| local.belongs_to(shared)) {
                return local.pin();
            }

            cache.retain(|local| !local.inner.shared.is_closed());

            let local = LocalEpoch::new(Arc::clone(shared));
            let guard = local.pin();
            cache.push(local);
            guard
        })
        .unwrap_or_else(|_| LocalEpoch::new(Arc::clone(shared)).pin())
}
