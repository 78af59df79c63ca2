mod basic_tests;
mod ffi_tests;
mod map_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const CHECK_MAGIC: u64 = 0x5a5a_a5a5_dead_beef;

/// 测试用的值类型：统计存活实例数，并带有校验字段以发现被释放后读取。
/// Value that counts live instances and carries a check word so a read of
/// freed memory shows up as a mismatch.
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) id: u64,
    check: u64,
    alive: Arc<AtomicUsize>,
}

impl Tracked {
    pub(crate) fn new(id: u64, alive: &Arc<AtomicUsize>) -> Self {
        alive.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            check: id ^ CHECK_MAGIC,
            alive: Arc::clone(alive),
        }
    }

    pub(crate) fn is_intact(&self) -> bool {
        self.check == self.id ^ CHECK_MAGIC
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Tracked::new(self.id, &self.alive)
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        assert!(self.is_intact(), "dropping a corrupted value");
        self.check = 0;
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}
