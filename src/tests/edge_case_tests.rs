/// 边界情况测试模块
/// 测试快照比较、块扩张上限和极端参数

use crate::{AdvanceOn, EpochDomain, EpochSnapshot, SlabAllocator};

fn snap(versions: &[u64]) -> EpochSnapshot {
    EpochSnapshot {
        versions: versions.to_vec(),
    }
}

/// 测试1: 严格更新关系是逐项严格大于
#[test]
fn test_strictly_newer_pointwise() {
    assert!(snap(&[5, 3]).is_strictly_newer(&snap(&[4, 2])));
    // 任何一项相等都不行
    assert!(!snap(&[5, 2]).is_strictly_newer(&snap(&[4, 2])));
    assert!(!snap(&[4, 3]).is_strictly_newer(&snap(&[4, 2])));
    // 自反比较不成立
    assert!(!snap(&[4, 2]).is_strictly_newer(&snap(&[4, 2])));
}

/// 测试2: 较旧快照缺失的条目按 0 补齐
#[test]
fn test_strictly_newer_padding() {
    // 新加入的线程推进过：关系成立
    assert!(snap(&[5, 1]).is_strictly_newer(&snap(&[4])));
    // 新加入的线程还没推进过：保守地不成立
    assert!(!snap(&[5, 0]).is_strictly_newer(&snap(&[4])));
    // 新快照不可能比旧快照短
    assert!(!snap(&[5]).is_strictly_newer(&snap(&[4, 2])));
}

/// 测试3: 空注册表的快照
#[test]
fn test_empty_registry_snapshot() {
    let domain = EpochDomain::new();
    let s = domain.snapshot();
    assert!(s.is_empty());
    assert_eq!(s.len(), 0);
    // 空对空平凡成立：没有任何线程需要取得进展
    assert!(s.is_strictly_newer(&domain.snapshot()));
}

/// 测试4: 块按倍增序列扩张并在上限处封顶
#[test]
fn test_chunk_growth_doubles_to_cap() {
    let domain = EpochDomain::new();
    let mut alloc = SlabAllocator::builder()
        .obj_size(64)
        .chunk_size(4096)
        .max_chunk_size(65536)
        .advance_on(AdvanceOn::Never)
        .build(&domain);

    let mut total = alloc.stats().total_bytes;
    let mut chunks = alloc.stats().chunks;
    let mut growth = Vec::new();
    while growth.len() < 6 {
        alloc.alloc(64);
        let stats = alloc.stats();
        if stats.chunks > chunks {
            growth.push(stats.total_bytes - total);
            chunks = stats.chunks;
            total = stats.total_bytes;
        }
    }

    // 4096 的块依次扩张为 8K, 16K, 32K, 64K，然后停在上限
    assert_eq!(growth, vec![8192, 16384, 32768, 65536, 65536, 65536]);
}

/// 测试5: 超过块上限的请求是致命的
#[test]
#[should_panic(expected = "exceeds")]
fn test_oversize_request_panics() {
    let domain = EpochDomain::new();
    let mut alloc = SlabAllocator::builder()
        .obj_size(64)
        .chunk_size(4096)
        .max_chunk_size(65536)
        .build(&domain);

    alloc.alloc(131072);
}

/// 测试6: 大于当前块的请求扩张到足以容纳的最小倍增大小
#[test]
fn test_large_request_grows_to_fit() {
    let domain = EpochDomain::new();
    let mut alloc = SlabAllocator::builder()
        .obj_size(64)
        .chunk_size(4096)
        .max_chunk_size(1 << 20)
        .build(&domain);

    alloc.alloc(64);
    let obj = alloc.alloc(40000);
    assert!(alloc.owns(obj.as_ptr()));
    // 4096 → 8192 不够，继续翻倍到 65536
    assert_eq!(alloc.stats().total_bytes, 4096 + 65536);
}

/// 测试7: 容量为 1 的释放集每两次 free 封存一次
#[test]
fn test_free_set_capacity_one() {
    let domain = EpochDomain::new();
    let mut alloc = SlabAllocator::builder()
        .obj_size(64)
        .free_set_size(1)
        .chunk_size(4096)
        .advance_on(AdvanceOn::Free)
        .build(&domain);

    let objs: Vec<_> = (0..4).map(|_| alloc.alloc(64)).collect();
    unsafe { alloc.free(objs[0]) };
    assert_eq!(alloc.stats().free_sets, 1);
    unsafe { alloc.free(objs[1]) };
    assert_eq!(alloc.stats().free_sets, 2);
    unsafe { alloc.free(objs[2]) };
    // 第三次 free 封存第二个集，第一个集被回收
    assert_eq!(alloc.stats().collected_sets, 1);
    assert_eq!(alloc.alloc(64).as_ptr(), objs[0].as_ptr());
}

/// 测试8: 从不推进纪元时永远不回收
#[test]
fn test_never_advance_never_collects() {
    let domain = EpochDomain::new();
    let mut alloc = SlabAllocator::builder()
        .obj_size(64)
        .free_set_size(2)
        .chunk_size(4096)
        .advance_on(AdvanceOn::Never)
        .build(&domain);

    let objs: Vec<_> = (0..10).map(|_| alloc.alloc(64)).collect();
    for obj in objs {
        unsafe { alloc.free(obj) };
    }

    // 所有快照都相等，严格大于永远不成立
    assert_eq!(alloc.stats().collected_sets, 0);
    assert_eq!(domain.snapshot().versions()[0], 0);
    assert_eq!(alloc.stats().free_sets, 5);
}

/// 测试9: 注册表增长后的快照不会与旧快照误判
#[test]
fn test_snapshot_growth_is_conservative() {
    let domain = EpochDomain::new();
    domain.advance_epoch();
    let old = domain.snapshot();
    assert_eq!(old.len(), 1);

    // 第二个线程加入但不推进
    let peer = domain.clone();
    std::thread::spawn(move || {
        peer.register_thread();
    })
    .join()
    .unwrap();

    domain.advance_epoch();
    let new = domain.snapshot();
    assert_eq!(new.len(), 2);
    // 新线程还没做任何事，不能声称所有线程都前进了
    assert!(!new.is_strictly_newer(&old));
}
