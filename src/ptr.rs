use crate::domain::EpochDomain;
use crate::garbage::Collector;
use crate::reader::Guard;
use crate::state::SharedState;
use crate::sync::{Arc, AtomicPtr, Ordering};
use std::boxed::Box;

/// An epoch-protected shared pointer for safe concurrent access.
///
/// `EpochPtr<T>` is never null. Readers `load()` it under a `Guard`; the
/// writer `store()`s a replacement and hands the old value to a `Collector`.
/// Shards use it to publish their slot array, so a resize swaps the whole
/// array in one atomic step.
///
/// A pointer belongs to the domain it was created in:
/// `load` only accepts guards and `store` only accepts collectors of that
/// domain, and panics otherwise. A guard from another domain would not keep
/// the value alive.
///
/// **Safety Contract**:
/// - Stores must be serialized (one writer at a time); the shard lock does
///   this for the map.
/// - The lifetime of the returned reference from `load()` is bound to the `Guard`.
///
/// 一个受 epoch 保护的共享指针，永不为空。
/// 读者在 `Guard` 下 `load()`；写入者 `store()` 替换值并把旧值交给 `Collector`。
/// 分片用它发布槽数组，因此一次扩容在一个原子步骤内替换整个数组。
/// 指针属于创建它的域，只接受该域的守卫和回收器。
pub struct EpochPtr<T> {
    ptr: AtomicPtr<T>,
    shared: Arc<SharedState>,
}

impl<T: Send + 'static> EpochPtr<T> {
    /// Create a new epoch-protected pointer in `domain`, initialized with the
    /// given value.
    /// 在 `domain` 中创建一个新的受 epoch 保护的指针，初始化为给定的值。
    #[inline]
    pub fn new(domain: &EpochDomain, data: T) -> Self {
        Self::with_shared(Arc::clone(&domain.shared), data)
    }

    #[inline]
    pub(crate) fn with_shared(shared: Arc<SharedState>, data: T) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(data))),
            shared,
        }
    }

    /// Reader load: read the current value.
    ///
    /// The reference cannot outlive `guard`, and the value stays allocated for
    /// as long as the guard lives even if a writer replaces it meanwhile.
    ///
    /// # Panics
    /// If `guard` was pinned in a different domain.
    ///
    /// 读取者 load：读取当前值。引用不能比 `guard` 活得更久。
    #[inline]
    pub fn load<'guard>(&'guard self, guard: &'guard Guard) -> &'guard T {
        assert!(
            guard.is_from(&self.shared),
            "guard was pinned in a different domain"
        );
        let ptr = self.ptr.load(Ordering::Acquire);
        unsafe { &*ptr }
    }

    /// Writer-side load without a guard.
    ///
    /// # Safety
    /// The caller must be the only writer of this pointer (e.g. hold the shard
    /// lock) and must stop using the reference before it calls `store` or
    /// `publish` on this pointer.
    #[inline]
    pub(crate) unsafe fn load_unprotected(&self) -> &T {
        let ptr = self.ptr.load(Ordering::Acquire);
        unsafe { &*ptr }
    }

    /// Writer store: publish a new value and retire the old one.
    ///
    /// May trigger automatic reclamation in `collector`.
    ///
    /// # Panics
    /// If `collector` belongs to a different domain.
    ///
    /// 写入者 store：发布新值并退休旧值。
    #[inline]
    pub fn store(&self, data: T, collector: &mut Collector) {
        self.publish(Box::new(data), collector);
    }

    /// Like `store`, for a value that is already boxed.
    #[inline]
    pub fn publish(&self, data: Box<T>, collector: &mut Collector) {
        assert!(
            Arc::ptr_eq(&collector.shared, &self.shared),
            "collector belongs to a different domain"
        );
        let new_ptr = Box::into_raw(data);
        let old_ptr = self.ptr.swap(new_ptr, Ordering::AcqRel);

        if !old_ptr.is_null() {
            unsafe {
                collector.retire(Box::from_raw(old_ptr));
            }
        }
    }
}

impl<T> EpochPtr<T> {
    /// Exclusive access to the current value.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.ptr.load(Ordering::Relaxed) }
    }
}

impl<T> std::fmt::Debug for EpochPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ptr = self.ptr.load(Ordering::Relaxed);
        f.debug_tuple("EpochPtr").field(&ptr).finish()
    }
}

impl<T> Drop for EpochPtr<T> {
    /// At drop time no other thread can access the pointer, so the final
    /// value is dropped immediately.
    /// 在 drop 时没有其他线程能访问该指针，因此最终值被立即 drop。
    #[inline]
    fn drop(&mut self) {
        let ptr = self.ptr.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}
