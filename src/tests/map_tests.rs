/// 映射门面测试模块
/// 测试插入、查找、删除与条件更新的单线程语义
use super::Tracked;
use crate::ConcurrentHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试1: 插入后可以查找到
#[test]
fn test_insert_then_find() {
    let map = ConcurrentHashMap::new();

    assert!(map.insert(7u64, 70u64));
    assert_eq!(map.find(&7), Some(70));
    assert_eq!(map.find(&8), None);
    assert_eq!(map.len(), 1);
}

/// 测试2: insert 不会覆盖已有值
#[test]
fn test_insert_does_not_overwrite() {
    let map = ConcurrentHashMap::new();

    assert!(map.insert(1u64, 10u64));
    assert!(!map.insert(1, 11));
    assert_eq!(map.find(&1), Some(10));
    assert_eq!(map.len(), 1);
}

/// 测试3: 删除是幂等的
#[test]
fn test_erase_is_idempotent() {
    let map = ConcurrentHashMap::new();
    map.insert(3u64, 30u64);

    assert_eq!(map.erase(&3), 1);
    assert_eq!(map.erase(&3), 0);
    assert_eq!(map.erase(&99), 0);
    assert_eq!(map.find(&3), None);
    assert!(map.is_empty());
}

/// 测试4: 删除后可以重新插入
#[test]
fn test_reinsert_after_erase() {
    let map = ConcurrentHashMap::new();

    assert!(map.insert(5u64, 1u64));
    assert_eq!(map.erase(&5), 1);
    assert!(map.insert(5, 2));
    assert_eq!(map.find(&5), Some(2));
}

/// 测试5: insert_or_assign 返回旧值
#[test]
fn test_insert_or_assign_returns_previous() {
    let map = ConcurrentHashMap::new();

    assert_eq!(map.insert_or_assign(1u64, 100u64), None);
    assert_eq!(map.insert_or_assign(1, 200), Some(100));
    assert_eq!(map.find(&1), Some(200));
    assert_eq!(map.len(), 1);
}

/// 测试6: assign 只替换已存在的键
#[test]
fn test_assign_requires_presence() {
    let map = ConcurrentHashMap::new();

    assert_eq!(map.assign(1u64, 10u64), None);
    assert_eq!(map.find(&1), None);

    map.insert(1, 10);
    assert_eq!(map.assign(1, 20), Some(10));
    assert_eq!(map.find(&1), Some(20));
}

/// 测试7: 条件替换与条件删除
#[test]
fn test_conditional_updates() {
    let map = ConcurrentHashMap::new();
    map.insert("k".to_string(), 1u32);

    assert!(!map.assign_if_equal("k".to_string(), &2, 3));
    assert_eq!(map.find(&"k".to_string()), Some(1));
    assert!(map.assign_if_equal("k".to_string(), &1, 3));
    assert_eq!(map.find(&"k".to_string()), Some(3));

    assert_eq!(map.erase_if_equal(&"k".to_string(), &1), 0);
    assert_eq!(map.erase_if_equal(&"k".to_string(), &3), 1);
    assert!(!map.contains_key(&"k".to_string()));
}

/// 测试8: get 借用守卫，get_with 在保护下运行闭包
#[test]
fn test_get_and_get_with() {
    let map = ConcurrentHashMap::new();
    map.insert(1u64, String::from("one"));

    let guard = map.pin();
    assert_eq!(map.get(&1, &guard).map(String::as_str), Some("one"));
    assert_eq!(map.get(&2, &guard), None);
    drop(guard);

    assert_eq!(map.get_with(&1, |value| value.len()), Some(3));
    assert_eq!(map.get_with(&2, |value| value.len()), None);
}

/// 测试9: 被替换的值稍后被释放
#[test]
fn test_replaced_values_are_dropped() {
    let alive = Arc::new(AtomicUsize::new(0));
    let map = ConcurrentHashMap::builder()
        .shard_count(1)
        .auto_reclaim_threshold(None)
        .build();

    map.insert(1u64, Tracked::new(1, &alive));
    let previous = map.insert_or_assign(1, Tracked::new(2, &alive));
    assert_eq!(previous.map(|value| value.id), Some(1));

    // 旧条目已退休但尚未释放
    assert_eq!(map.pending_garbage(), 1);
    assert_eq!(alive.load(Ordering::SeqCst), 2);

    assert_eq!(map.collect(), 1);
    assert_eq!(alive.load(Ordering::SeqCst), 1);
    assert_eq!(map.find(&1).map(|value| value.id), Some(2));
}

/// 测试10: clear 删除所有条目
#[test]
fn test_clear_removes_everything() {
    let map = ConcurrentHashMap::with_shards(4);
    for key in 0..100u64 {
        map.insert(key, key);
    }
    assert_eq!(map.len(), 100);

    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    for key in 0..100u64 {
        assert!(!map.contains_key(&key));
    }

    assert!(map.insert(1, 2));
    assert_eq!(map.find(&1), Some(2));
}

/// 测试11: clear 后容量回到初始值
#[test]
fn test_clear_shrinks_to_initial_capacity() {
    let map: ConcurrentHashMap<u64, u64> = ConcurrentHashMap::builder()
        .shard_count(1)
        .initial_capacity(8)
        .build();
    for key in 0..100u64 {
        map.insert(key, key);
    }
    assert!(map.capacity() > 8);

    map.clear();
    assert_eq!(map.capacity(), 8);
}

/// 测试12: 许多键分布在所有分片上
#[test]
fn test_many_keys_across_shards() {
    let map = ConcurrentHashMap::with_shards(8);
    for key in 0..10_000u64 {
        assert!(map.insert(key, !key));
    }
    assert_eq!(map.len(), 10_000);

    for key in (0..10_000u64).filter(|key| key % 2 == 0) {
        assert_eq!(map.erase(&key), 1);
    }
    assert_eq!(map.len(), 5_000);

    for key in 0..10_000u64 {
        let expected = if key % 2 == 0 { None } else { Some(!key) };
        assert_eq!(map.find(&key), expected);
    }
}

/// 测试13: 自定义哈希器
#[test]
fn test_custom_hasher() {
    use std::collections::hash_map::RandomState;

    let map = ConcurrentHashMap::builder()
        .shard_count(2)
        .hasher(RandomState::new())
        .build();
    assert!(map.insert(1u64, 1u64));
    assert_eq!(map.find(&1), Some(1));
}

/// 测试14: 来自另一个映射的守卫会被拒绝
#[test]
#[should_panic(expected = "guard was pinned on a different map")]
fn test_guard_from_another_map_panics() {
    let first: ConcurrentHashMap<u64, u64> = ConcurrentHashMap::new();
    let second: ConcurrentHashMap<u64, u64> = ConcurrentHashMap::new();

    let guard = first.pin();
    let _ = second.get(&1, &guard);
}

/// 测试15: Debug 输出包含长度
#[test]
fn test_debug_output() {
    let map = ConcurrentHashMap::with_shards(2);
    map.insert(1u64, 1u64);

    let output = format!("{:?}", map);
    assert!(output.contains("ConcurrentHashMap"));
    assert!(output.contains("len: 1"));
}
