//! # epoch-chm
//!
//! A sharded concurrent hash map with lock-free reads and epoch-based
//! memory reclamation, plus a C boundary that lets a foreign owner create,
//! use and destroy one map through an opaque handle.
//!
//! ## Layers
//!
//! - **Reclamation** (`EpochDomain`, `Guard`, `Collector`, `EpochPtr`):
//!   readers pin the current epoch; writers retire removed objects into
//!   epoch-tagged bags that are freed once every pinned reader has moved on.
//! - **Shards**: each shard is an open-addressed table published through an
//!   `EpochPtr` and guarded by its own mutex. The mutex also owns the shard's
//!   collector, so only the lock holder can retire entries.
//! - **Map** (`ConcurrentHashMap`): picks the shard from the key hash and
//!   exposes insert / find / erase / insert_or_assign and friends.
//! - **Boundary** (`ffi`): `extern "C"` functions over an opaque `ChmMap`
//!   for `u64 -> u64`, signalling absence with `CHM_NOT_FOUND`.
//!
//! ## Example
//! ```
//! use epoch_chm::ConcurrentHashMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentHashMap::<u64, u64>::new());
//! let writers: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 map.insert(t * 1000 + i, i);
//!             }
//!         })
//!     })
//!     .collect();
//! for w in writers {
//!     w.join().unwrap();
//! }
//! assert_eq!(map.len(), 400);
//! assert_eq!(map.find(&3042), Some(42));
//! ```
//!
//! 一个分片的并发哈希映射，读取无锁，使用基于纪元的内存回收，
//! 并提供一个 C 边界，让外部所有者通过不透明句柄创建、使用和销毁映射。

mod domain;
pub mod ffi;
mod garbage;
mod map;
mod ptr;
mod reader;
mod shard;
mod state;
mod sync;

pub use domain::{EpochDomain, EpochDomainBuilder};
pub use ffi::{CHM_NOT_FOUND, ChmMap};
pub use garbage::Collector;
pub use map::{ConcurrentHashMap, DEFAULT_INITIAL_CAPACITY, DEFAULT_SHARD_COUNT, MapBuilder};
pub use ptr::EpochPtr;
pub use reader::{Guard, LocalEpoch};

#[cfg(all(test, not(feature = "loom")))]
mod tests;
