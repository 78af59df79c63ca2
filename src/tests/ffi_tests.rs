/// C 边界测试模块
/// 通过 extern "C" 函数驱动映射，验证哨兵值语义与句柄生命周期
use crate::ffi::{
    chm_map_destroy, chm_map_erase, chm_map_find, chm_map_find_checked, chm_map_insert,
    chm_map_insert_or_assign, chm_map_len, chm_map_new, chm_map_with_shards,
};
use crate::CHM_NOT_FOUND;
use std::thread;

/// 测试1: 创建、插入、查找、删除、销毁
#[test]
fn test_handle_round_trip() {
    let handle = chm_map_new();
    assert!(!handle.is_null());

    unsafe {
        assert!(chm_map_insert(handle, 1, 100));
        assert_eq!(chm_map_find(handle, 1), 100);
        assert_eq!(chm_map_len(handle), 1);

        assert_eq!(chm_map_erase(handle, 1), 1);
        assert_eq!(chm_map_erase(handle, 1), 0);
        assert_eq!(chm_map_find(handle, 1), CHM_NOT_FOUND);
        assert_eq!(chm_map_len(handle), 0);

        chm_map_destroy(handle);
    }
}

/// 测试2: 缺失的键返回哨兵值
#[test]
fn test_find_missing_returns_sentinel() {
    let handle = chm_map_new();
    unsafe {
        assert_eq!(chm_map_find(handle, 42), CHM_NOT_FOUND);
        assert_eq!(chm_map_find(handle, u64::MAX), u64::MAX);
        chm_map_destroy(handle);
    }
}

/// 测试3: 重复插入不覆盖
#[test]
fn test_insert_existing_key_is_rejected() {
    let handle = chm_map_new();
    unsafe {
        assert!(chm_map_insert(handle, 5, 50));
        assert!(!chm_map_insert(handle, 5, 51));
        assert_eq!(chm_map_find(handle, 5), 50);
        chm_map_destroy(handle);
    }
}

/// 测试4: 不能存储保留的哨兵值
#[test]
fn test_sentinel_value_cannot_be_stored() {
    let handle = chm_map_new();
    unsafe {
        assert!(!chm_map_insert(handle, 1, CHM_NOT_FOUND));
        assert_eq!(chm_map_len(handle), 0);

        assert!(chm_map_insert(handle, 2, 20));
        assert_eq!(chm_map_insert_or_assign(handle, 2, CHM_NOT_FOUND), CHM_NOT_FOUND);
        assert_eq!(chm_map_find(handle, 2), 20);

        chm_map_destroy(handle);
    }
}

/// 测试5: insert_or_assign 返回旧值或哨兵
#[test]
fn test_insert_or_assign_through_handle() {
    let handle = chm_map_with_shards(4);
    unsafe {
        assert_eq!(chm_map_insert_or_assign(handle, 9, 1), CHM_NOT_FOUND);
        assert_eq!(chm_map_insert_or_assign(handle, 9, 2), 1);
        assert_eq!(chm_map_find(handle, 9), 2);
        chm_map_destroy(handle);
    }
}

/// 测试6: find_checked 单独返回是否存在
#[test]
fn test_find_checked() {
    let handle = chm_map_new();
    let mut out = 0u64;
    unsafe {
        assert!(!chm_map_find_checked(handle, 3, &mut out));
        assert_eq!(out, 0);

        chm_map_insert(handle, 3, 0);
        assert!(chm_map_find_checked(handle, 3, &mut out));
        assert_eq!(out, 0);

        chm_map_insert_or_assign(handle, 3, 33);
        assert!(chm_map_find_checked(handle, 3, &mut out));
        assert_eq!(out, 33);

        // 空输出指针只报告是否存在
        assert!(chm_map_find_checked(handle, 3, std::ptr::null_mut()));

        chm_map_destroy(handle);
    }
}

/// 测试7: 销毁空句柄是无操作
#[test]
fn test_destroy_null_is_noop() {
    unsafe { chm_map_destroy(std::ptr::null_mut()) };
}

/// 测试8: 分片数为 0 时仍然可用
#[test]
fn test_zero_shards_handle() {
    let handle = chm_map_with_shards(0);
    unsafe {
        assert!(chm_map_insert(handle, 1, 1));
        assert_eq!(chm_map_find(handle, 1), 1);
        chm_map_destroy(handle);
    }
}

/// 测试9: 多个线程共享一个句柄
#[test]
fn test_handle_shared_between_threads() {
    let handle = chm_map_new();
    // 裸指针不是 Send，按地址传递
    let address = handle as usize;

    let workers: Vec<_> = (0..4u64)
        .map(|t| {
            thread::spawn(move || {
                let handle = address as *const crate::ChmMap;
                for i in 0..1_000u64 {
                    let key = t * 1_000 + i;
                    unsafe {
                        assert!(chm_map_insert(handle, key, i));
                        assert_eq!(chm_map_find(handle, key), i);
                        if i % 2 == 0 {
                            assert_eq!(chm_map_erase(handle, key), 1);
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    unsafe {
        assert_eq!(chm_map_len(handle), 2_000);
        assert_eq!(chm_map_find(handle, 1), 1);
        assert_eq!(chm_map_find(handle, 2), CHM_NOT_FOUND);
        chm_map_destroy(handle);
    }
}
