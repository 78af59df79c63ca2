//! C boundary for driving one `ConcurrentHashMap<u64, u64>` from a foreign
//! owner.
//!
//! The caller owns an opaque `ChmMap*` obtained from `chm_map_new` and
//! releases it exactly once with `chm_map_destroy`. The handle may be shared
//! between threads; every call other than destroy takes it by shared
//! pointer.
//!
//! # Preconditions (undefined behavior if violated)
//! - A handle is never used after `chm_map_destroy`, and destroy does not
//!   run while another call on the same handle is in flight.
//! - Handles are only those returned by `chm_map_new` / `chm_map_with_shards`.
//!
//! # Absence and the sentinel
//! `chm_map_find` returns `CHM_NOT_FOUND` (`UINT64_MAX`) for a missing key.
//! To keep that unambiguous the value `UINT64_MAX` cannot be stored:
//! `chm_map_insert` rejects it with `false` and `chm_map_insert_or_assign`
//! leaves the map unchanged. `chm_map_find_checked` returns presence
//! separately for callers that prefer an explicit flag.
//!
//! # Unwinding
//! No panic crosses the boundary. A panic inside a call, or a null handle
//! where one is required, aborts the process.
//!
//! C 边界：由外部所有者驱动一个 `ConcurrentHashMap<u64, u64>`。
//! 调用者持有从 `chm_map_new` 获得的不透明 `ChmMap*`，并且恰好用
//! `chm_map_destroy` 释放一次。任何 panic 都不会越过边界，而是中止进程。

use crate::map::{ConcurrentHashMap, DEFAULT_SHARD_COUNT};
use std::panic::{self, AssertUnwindSafe};

/// Returned by `chm_map_find` when the key is absent. Never a stored value.
pub const CHM_NOT_FOUND: u64 = u64::MAX;

/// Opaque map instance owned by the foreign caller.
///
/// 由外部调用者持有的不透明映射实例。
pub struct ChmMap {
    map: ConcurrentHashMap<u64, u64>,
}

impl ChmMap {
    fn with_shards(shards: usize) -> Self {
        Self {
            map: ConcurrentHashMap::with_shards(shards),
        }
    }
}

/// Run `f` and abort instead of unwinding into the caller.
#[inline]
fn boundary<R>(call: &'static str, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(call, "panic at the map boundary, aborting");
            std::process::abort()
        }
    }
}

/// Borrow the map behind a handle, aborting on null.
///
/// # Safety
/// `handle` is null or a live handle from `chm_map_new`.
#[inline]
unsafe fn map_ref<'a>(call: &'static str, handle: *const ChmMap) -> &'a ConcurrentHashMap<u64, u64> {
    match unsafe { handle.as_ref() } {
        Some(handle) => &handle.map,
        None => {
            tracing::error!(call, "null map handle, aborting");
            std::process::abort()
        }
    }
}

/// Allocate a map with the default shard count. The caller owns the result
/// and must release it with `chm_map_destroy`.
#[unsafe(no_mangle)]
pub extern "C" fn chm_map_new() -> *mut ChmMap {
    boundary("chm_map_new", || {
        Box::into_raw(Box::new(ChmMap::with_shards(DEFAULT_SHARD_COUNT)))
    })
}

/// Allocate a map with `shards` shards (rounded up to a power of two).
#[unsafe(no_mangle)]
pub extern "C" fn chm_map_with_shards(shards: usize) -> *mut ChmMap {
    boundary("chm_map_with_shards", || {
        Box::into_raw(Box::new(ChmMap::with_shards(shards)))
    })
}

/// Insert if absent. Returns `false` if the key exists or `value` is the
/// reserved `CHM_NOT_FOUND`.
///
/// # Safety
/// `handle` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_insert(handle: *const ChmMap, key: u64, value: u64) -> bool {
    boundary("chm_map_insert", || {
        let map = unsafe { map_ref("chm_map_insert", handle) };
        if value == CHM_NOT_FOUND {
            tracing::warn!(key, "rejected insert of the reserved not-found value");
            return false;
        }
        map.insert(key, value)
    })
}

/// The value for `key`, or `CHM_NOT_FOUND`.
///
/// # Safety
/// `handle` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_find(handle: *const ChmMap, key: u64) -> u64 {
    boundary("chm_map_find", || {
        let map = unsafe { map_ref("chm_map_find", handle) };
        map.find(&key).unwrap_or(CHM_NOT_FOUND)
    })
}

/// Look up `key`, writing the value to `out` when found.
///
/// # Safety
/// `handle` must be a live handle; `out` must be null or valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_find_checked(
    handle: *const ChmMap,
    key: u64,
    out: *mut u64,
) -> bool {
    boundary("chm_map_find_checked", || {
        let map = unsafe { map_ref("chm_map_find_checked", handle) };
        match map.find(&key) {
            Some(value) => {
                if let Some(out) = unsafe { out.as_mut() } {
                    *out = value;
                }
                true
            }
            None => false,
        }
    })
}

/// Remove `key`. Returns the number of entries removed (0 or 1).
///
/// # Safety
/// `handle` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_erase(handle: *const ChmMap, key: u64) -> usize {
    boundary("chm_map_erase", || {
        let map = unsafe { map_ref("chm_map_erase", handle) };
        map.erase(&key)
    })
}

/// Insert or overwrite, returning the previous value or `CHM_NOT_FOUND`.
/// Storing `CHM_NOT_FOUND` is rejected and leaves the map unchanged.
///
/// # Safety
/// `handle` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_insert_or_assign(
    handle: *const ChmMap,
    key: u64,
    value: u64,
) -> u64 {
    boundary("chm_map_insert_or_assign", || {
        let map = unsafe { map_ref("chm_map_insert_or_assign", handle) };
        if value == CHM_NOT_FOUND {
            tracing::warn!(key, "rejected upsert of the reserved not-found value");
            return CHM_NOT_FOUND;
        }
        map.insert_or_assign(key, value).unwrap_or(CHM_NOT_FOUND)
    })
}

/// Number of entries.
///
/// # Safety
/// `handle` must be a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_len(handle: *const ChmMap) -> usize {
    boundary("chm_map_len", || {
        let map = unsafe { map_ref("chm_map_len", handle) };
        map.len()
    })
}

/// Release a handle. Null is ignored.
///
/// # Safety
/// `handle` must be null or a live handle that no other thread is using, and
/// it must not be used again afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn chm_map_destroy(handle: *mut ChmMap) {
    boundary("chm_map_destroy", || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle) });
        }
    })
}
