use crate::sync::{AtomicPtr, AtomicU32, AtomicU64, Ordering};
use thread_local::ThreadLocal;

/// Cache-line size assumed for slot and chunk alignment.
/// 槽位和内存块对齐所假设的缓存行大小。
pub const CACHE_LINE_SIZE: usize = 64;

/// Default size of the first memory chunk carved by an allocator.
/// 分配器开辟的第一个内存块的默认大小。
pub const DEFAULT_MEM_SIZE: usize = 32 * 1024 * 1024;

/// Hard cap on the size of a single memory chunk.
/// 单个内存块大小的硬上限。
pub const MAX_CHUNK_SIZE: usize = 4 << 30;

/// Default capacity of one free set (pipeline granularity).
/// 单个释放集的默认容量（流水线粒度）。
pub const GC_FREE_SET_SIZE: usize = 507;

/// Default number of released regions that triggers a reclaim pass.
/// 触发回收的已让渡内存区域的默认数量。
pub const GC_RLSE_SET_SIZE: usize = 18;

/// One thread's entry in the epoch registry.
///
/// The owning thread is the only writer of `version`; any thread may read
/// it while taking a snapshot. Slots are allocated on join, published by a
/// CAS on the registry head, and stay in place until the registry itself
/// is torn down, so a raw pointer to a slot never dangles while any
/// [`EpochDomain`](crate::EpochDomain) clone is alive.
///
/// 纪元注册表中一个线程的条目。
/// `version` 只由所属线程写入；任何线程都可以在拍摄快照时读取它。
/// 槽位在加入时分配，通过对注册表头指针的 CAS 发布，并一直保留到
/// 注册表本身被销毁，因此只要任何 `EpochDomain` 克隆还存活，
/// 指向槽位的裸指针就不会悬垂。
#[repr(align(64))]
pub(crate) struct EpochSlot {
    /// Dense index assigned on join.
    /// 加入时分配的稠密索引。
    pub(crate) id: u32,
    /// Monotonic per-thread epoch counter.
    /// 单调递增的线程本地纪元计数器。
    pub(crate) version: AtomicU64,
    /// Next slot in the registry list. Written once before publication.
    /// 注册表链表中的下一个槽位。发布前写入一次，此后不变。
    pub(crate) next: *const EpochSlot,
}

impl EpochSlot {
    /// Advance this slot's epoch. Owner thread only.
    /// 推进此槽位的纪元。仅限所属线程调用。
    #[inline]
    pub(crate) fn bump(&self) {
        let v = self.version.load(Ordering::Relaxed);
        self.version.store(v + 1, Ordering::Release);
    }
}

/// Thread-local cache of the calling thread's slot pointer.
/// 调用线程槽位指针的线程本地缓存。
pub(crate) struct LocalSlot(pub(crate) *const EpochSlot);

// The pointee is never freed while the registry lives, and all access to
// it goes through atomics.
unsafe impl Send for LocalSlot {}

/// Shared state of one epoch registry.
///
/// The slot list is append-only: joins prepend with a CAS loop, and `len`
/// is bumped with a fetch-and-add afterwards, so `len` may lag the list
/// but never exceeds it.
///
/// 一个纪元注册表的共享状态。
/// 槽位链表是只追加的：加入操作通过 CAS 循环前插，之后用 fetch-and-add
/// 递增 `len`，因此 `len` 可能落后于链表，但绝不会超过它。
pub(crate) struct RegistryState {
    /// Head of the slot list, newest first.
    /// 槽位链表的头指针，最新的在前。
    pub(crate) head: AtomicPtr<EpochSlot>,
    /// Number of fully published slots.
    /// 已完整发布的槽位数量。
    pub(crate) len: AtomicU32,
    /// Source of dense slot ids.
    /// 稠密槽位 id 的来源。
    pub(crate) next_id: AtomicU32,
    /// Per-thread cache of the joined slot.
    /// 每线程已加入槽位的缓存。
    pub(crate) local: ThreadLocal<LocalSlot>,
}
