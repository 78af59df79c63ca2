#[cfg(feature = "loom")]
pub(crate) use loom::cell::Cell;
#[cfg(not(feature = "loom"))]
pub(crate) use std::cell::Cell;

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub(crate) use loom::sync::Arc;
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::Arc;

#[cfg(feature = "loom")]
pub(crate) use loom::thread_local;
#[cfg(not(feature = "loom"))]
pub(crate) use std::thread_local;

#[cfg(not(feature = "loom"))]
pub(crate) use antidote::Mutex;

#[cfg(feature = "loom")]
use loom::sync::MutexGuard;

#[cfg(feature = "loom")]
pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub(crate) fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }
}
