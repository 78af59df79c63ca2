/// 基础测试模块
/// 测试回收层的核心功能：守卫、退休与回收
use crate::{EpochDomain, EpochPtr};

/// 测试1: 创建域和回收器
#[test]
fn test_create_domain_and_collector() {
    let domain = EpochDomain::new();
    let collector = domain.collector();

    assert_eq!(collector.pending(), 0);
    assert_eq!(domain.epoch(), 0);
    assert_eq!(domain.reader_count(), 0);
}

/// 测试2: 注册读者并 pin/unpin
#[test]
fn test_register_reader_pin_unpin_cycle() {
    let domain = EpochDomain::new();
    let local_epoch = domain.register_reader();
    assert_eq!(domain.reader_count(), 1);

    {
        let _guard = local_epoch.pin();
    }
    {
        let _guard = local_epoch.pin();
    }
}

/// 测试3: 隐式 pin 只为每个线程注册一次读者
#[test]
fn test_implicit_pin_registers_once_per_thread() {
    let domain = EpochDomain::new();

    for _ in 0..10 {
        let _guard = domain.pin();
    }

    assert_eq!(domain.reader_count(), 1);
}

/// 测试4: 创建 EpochPtr 并读取
#[test]
fn test_epoch_ptr_create_and_load() {
    let domain = EpochDomain::new();
    let ptr = EpochPtr::new(&domain, 42i32);

    let guard = domain.pin();
    assert_eq!(*ptr.load(&guard), 42);
}

/// 测试5: 写入者 store 新值并退休旧值
#[test]
fn test_store_retires_old_value() {
    let domain = EpochDomain::new();
    let mut collector = domain.collector();
    let ptr = EpochPtr::new(&domain, 10i32);

    ptr.store(20, &mut collector);
    assert_eq!(collector.pending(), 1);

    let guard = domain.pin();
    assert_eq!(*ptr.load(&guard), 20);
}

/// 测试6: 没有活跃读者时回收全部垃圾
#[test]
fn test_try_reclaim_without_readers_frees_everything() {
    let domain = EpochDomain::new();
    let mut collector = domain.collector();

    collector.retire(Box::new(100i32));
    collector.retire(Box::new(200i32));
    assert_eq!(collector.pending(), 2);

    assert_eq!(collector.try_reclaim(), 2);
    assert_eq!(collector.pending(), 0);
}

/// 测试7: 每次回收推进全局纪元
#[test]
fn test_try_reclaim_advances_epoch() {
    let domain = EpochDomain::new();
    let mut collector = domain.collector();

    collector.try_reclaim();
    collector.try_reclaim();
    assert_eq!(domain.epoch(), 2);
}

/// 测试8: 多个回收器共享同一个纪元
#[test]
fn test_collectors_share_domain_epoch() {
    let domain = EpochDomain::new();
    let mut first = domain.collector();
    let mut second = domain.collector();

    first.try_reclaim();
    second.try_reclaim();
    assert_eq!(domain.epoch(), 2);
}

/// 测试9: 结构体类型的 EpochPtr
#[test]
fn test_epoch_ptr_with_struct() {
    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    let domain = EpochDomain::new();
    let ptr = EpochPtr::new(&domain, Point { x: 10, y: 20 });

    let guard = domain.pin();
    let value = ptr.load(&guard);
    assert_eq!(*value, Point { x: 10, y: 20 });
}

/// 测试10: get_mut 独占访问
#[test]
fn test_epoch_ptr_get_mut() {
    let domain = EpochDomain::new();
    let mut ptr = EpochPtr::new(&domain, String::from("hello"));
    ptr.get_mut().push_str(", world");

    let guard = domain.pin();
    assert_eq!(ptr.load(&guard), "hello, world");
}

/// 测试11: 来自其他域的守卫不能读取 EpochPtr
#[test]
#[should_panic(expected = "guard was pinned in a different domain")]
fn test_epoch_ptr_rejects_foreign_guard() {
    let owner = EpochDomain::new();
    let other = EpochDomain::new();
    let ptr = EpochPtr::new(&owner, 1u32);

    let guard = other.pin();
    let _ = ptr.load(&guard);
}

/// 测试12: 来自其他域的回收器不能替换 EpochPtr 的值
#[test]
#[should_panic(expected = "collector belongs to a different domain")]
fn test_epoch_ptr_rejects_foreign_collector() {
    let owner = EpochDomain::new();
    let other = EpochDomain::new();
    let ptr = EpochPtr::new(&owner, 1u32);

    let mut collector = other.collector();
    ptr.store(2, &mut collector);
}
