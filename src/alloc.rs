use std::ptr::NonNull;

use crate::chunk::Slab;
use crate::free_set::FreePipeline;
use crate::region::{HeapRegion, RegionProvider};
use crate::registry::EpochDomain;
use crate::released::ReleasedList;
use crate::state::{
    EpochSlot, DEFAULT_MEM_SIZE, GC_FREE_SET_SIZE, GC_RLSE_SET_SIZE, MAX_CHUNK_SIZE,
};
use crate::sync::Arc;

/// When the allocator advances the owning thread's epoch on its own.
/// 分配器何时自动推进所属线程的纪元。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOn {
    /// After every `alloc`.
    Alloc,
    /// After every `free`.
    Free,
    /// After both.
    Both,
    /// Never; the caller drives [`advance_epoch`](SlabAllocator::advance_epoch).
    Never,
}

/// Point-in-time counters of an allocator's pipelines.
/// 分配器各条流水线的瞬时计数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocStats {
    /// Cumulative bytes obtained from the region provider for chunks.
    pub total_bytes: usize,
    /// Chunks owned, past and current.
    pub chunks: usize,
    /// Sets on the free-set list (the active set included).
    pub free_sets: usize,
    /// Quiescent sets whose pointers `alloc` may reuse.
    pub collected_sets: usize,
    /// Drained shells held for reuse.
    pub available_sets: usize,
    /// Regions on the released list.
    pub released: usize,
}

/// Builder for a [`SlabAllocator`], in the usual knob-then-build style.
///
/// ```
/// use epoch_slab::{EpochDomain, SlabAllocator};
///
/// let domain = EpochDomain::new();
/// let mut a = SlabAllocator::builder()
///     .obj_size(64)
///     .free_set_size(4)
///     .chunk_size(4096)
///     .build(&domain);
/// let obj = a.alloc(64);
/// unsafe { a.free(obj) };
/// ```
///
/// `SlabAllocator` 的构建器，常规的先调参后构建风格。
#[derive(Clone, Copy, Debug)]
pub struct SlabAllocatorBuilder {
    obj_size: usize,
    fs_size: usize,
    chunk_size: usize,
    max_chunk_size: usize,
    release_threshold: usize,
    advance_on: AdvanceOn,
    zero_memory: bool,
}

impl SlabAllocatorBuilder {
    #[inline]
    pub fn new() -> Self {
        SlabAllocatorBuilder {
            obj_size: 64,
            fs_size: GC_FREE_SET_SIZE,
            chunk_size: DEFAULT_MEM_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            release_threshold: GC_RLSE_SET_SIZE,
            advance_on: AdvanceOn::Free,
            zero_memory: false,
        }
    }

    /// Size in bytes of the objects this allocator serves.
    /// 此分配器服务的对象的字节大小。
    #[inline]
    pub fn obj_size(mut self, obj_size: usize) -> Self {
        self.obj_size = obj_size;
        self
    }

    /// Capacity of each free set — the granularity of the reclamation
    /// pipeline.
    /// 每个释放集的容量 —— 回收流水线的粒度。
    #[inline]
    pub fn free_set_size(mut self, fs_size: usize) -> Self {
        self.fs_size = fs_size;
        self
    }

    /// Size of the first chunk; later chunks double up to the cap.
    /// 第一个内存块的大小；之后的块翻倍增长直至上限。
    #[inline]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Hard cap on the size of a single chunk.
    /// 单个内存块大小的硬上限。
    #[inline]
    pub fn max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Released-list length that triggers a reclaim pass.
    /// 触发回收的已让渡链表长度。
    #[inline]
    pub fn release_threshold(mut self, threshold: usize) -> Self {
        self.release_threshold = threshold;
        self
    }

    /// Epoch-advance policy. Default: advance on `free`.
    /// 纪元推进策略。默认在 `free` 时推进。
    #[inline]
    pub fn advance_on(mut self, advance_on: AdvanceOn) -> Self {
        self.advance_on = advance_on;
        self
    }

    /// Zero fresh chunks before use. Forced on by providers that require
    /// it (the mapped pool does).
    /// 使用前将新块清零。要求清零的提供者（如映射池）会强制开启。
    #[inline]
    pub fn zero_memory(mut self, zero: bool) -> Self {
        self.zero_memory = zero;
        self
    }

    /// Build over the ordinary process heap.
    /// 基于普通进程堆构建。
    pub fn build(self, domain: &EpochDomain) -> SlabAllocator<HeapRegion> {
        self.build_with_region(domain, Arc::new(HeapRegion))
    }

    /// Build over an explicit region provider.
    /// 基于显式给定的区域提供者构建。
    pub fn build_with_region<R: RegionProvider>(
        self,
        domain: &EpochDomain,
        region: Arc<R>,
    ) -> SlabAllocator<R> {
        let slab = Slab::new(
            self.chunk_size,
            self.max_chunk_size,
            self.zero_memory,
            &*region,
        );
        let slot = domain.join();
        SlabAllocator {
            region,
            domain: domain.clone(),
            slot,
            slab,
            pipeline: FreePipeline::new(self.fs_size),
            released: ReleasedList::new(),
            advance_on: self.advance_on,
            release_threshold: self.release_threshold,
            obj_size: self.obj_size,
        }
    }
}

impl Default for SlabAllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread object-sized slab allocator with epoch-based reclamation.
///
/// One thread owns one allocator per object class; the type is `!Send`
/// and `!Sync` by construction. Freed objects are buffered in free sets
/// and only become reusable once two successive epoch snapshots prove
/// that every registered thread has made progress — at which point no
/// concurrent reader can still hold them.
///
/// Construction joins the owning thread to the registry of the given
/// [`EpochDomain`]. Dropping the allocator returns every chunk and every
/// retained released region to the region provider; the thread's registry
/// slot stays in place until the registry itself is torn down, so
/// concurrent snapshotters never observe a dangling slot.
///
/// 带纪元回收的线程本地定长对象平板分配器。
/// 每个线程对每个对象类别拥有一个分配器；该类型天然 `!Send`、`!Sync`。
/// 被释放的对象缓存在释放集中，只有当连续两份纪元快照证明每个已注册
/// 线程都取得了进展后才可复用 —— 此时并发读者不可能再持有它们。
/// 构建时会把所属线程加入给定 `EpochDomain` 的注册表。分配器被 drop
/// 时，所有内存块和留存的已让渡区域都归还给区域提供者；线程的注册表
/// 槽位保留到注册表本身销毁为止，因此并发快照者绝不会观察到悬垂槽位。
pub struct SlabAllocator<R: RegionProvider = HeapRegion> {
    region: Arc<R>,
    domain: EpochDomain,
    slot: NonNull<EpochSlot>,
    slab: Slab,
    pipeline: FreePipeline,
    released: ReleasedList,
    advance_on: AdvanceOn,
    release_threshold: usize,
    obj_size: usize,
}

impl SlabAllocator<HeapRegion> {
    /// Heap-backed allocator for `obj_size`-byte objects with default
    /// tuning.
    /// 使用默认参数、基于堆的 `obj_size` 字节对象分配器。
    pub fn new(domain: &EpochDomain, obj_size: usize) -> SlabAllocator<HeapRegion> {
        SlabAllocator::builder().obj_size(obj_size).build(domain)
    }

    #[inline]
    pub fn builder() -> SlabAllocatorBuilder {
        SlabAllocatorBuilder::new()
    }
}

impl<R: RegionProvider> SlabAllocator<R> {
    /// Allocate `size` bytes.
    ///
    /// Collected (quiescence-proven) pointers are reused first, most
    /// recently freed first; only when none are available does the slab
    /// carve a fresh object off the current chunk, growing it on demand.
    /// Never fails: region exhaustion aborts the process.
    ///
    /// 分配 `size` 字节。优先复用已回收（静止性已证明）的指针，最近
    /// 释放的在先；没有可复用指针时才从当前内存块中切出新对象，必要时
    /// 扩张。永不失败：区域耗尽会中止进程。
    #[inline]
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let m = match self.pipeline.take_reusable() {
            Some(m) => m,
            None => self.slab.bump(size, &*self.region),
        };
        if matches!(self.advance_on, AdvanceOn::Alloc | AdvanceOn::Both) {
            self.advance_epoch();
        }
        m
    }

    /// Return an object to the reclamation pipeline.
    ///
    /// The pointer lands in the active free set. When the active set is
    /// already full, it is first sealed with a fresh snapshot, a reclaim
    /// pass runs, and a new active set is rotated in (reusing a drained
    /// shell when possible).
    ///
    /// # Safety
    /// `obj` must have been returned by [`alloc`](Self::alloc) on this
    /// allocator and must not be freed again or used after this call.
    /// Double frees and cross-thread frees are not policed.
    ///
    /// 将对象归还回收流水线。指针进入活跃释放集；若活跃集已满，会先用
    /// 新快照封存它、执行一次回收，然后换上新的活跃集（尽量复用已排空
    /// 的外壳）。
    #[inline]
    pub unsafe fn free(&mut self, obj: NonNull<u8>) {
        if self.pipeline.active_full() {
            self.pipeline.seal_active(self.domain.state());
            self.mem_reclaim();
            self.pipeline.rotate_active();
        }
        self.pipeline.push(obj);
        if matches!(self.advance_on, AdvanceOn::Free | AdvanceOn::Both) {
            self.advance_epoch();
        }
    }

    /// Retire a whole region outside the bounded free-set pool.
    ///
    /// Meant for rare, large retirements (typically entire chunks). The
    /// region is pushed on the released list with a fresh snapshot and
    /// physically freed once a later release proves quiescence, or at
    /// teardown.
    ///
    /// # Safety
    /// `mem` must be a cache-line aligned region of exactly `size` bytes
    /// obtained from this allocator's region provider, no longer
    /// reachable by the owning thread once every concurrent reader has
    /// moved on.
    ///
    /// 在有界释放集池之外让渡一整块区域。用于罕见的大块退役（通常是
    /// 整个内存块）。区域连同新快照压入已让渡链表，待之后的让渡证明
    /// 静止性后（或在销毁时）真正释放。
    pub unsafe fn release(&mut self, mem: NonNull<u8>, size: usize) {
        let snapshot = self.domain.snapshot();
        let num = self.released.push(mem, size, snapshot);
        if num >= self.release_threshold {
            self.mem_reclaim();
        }
    }

    /// Advance the owning thread's epoch by one.
    /// 将所属线程的纪元推进一格。
    #[inline]
    pub fn advance_epoch(&self) {
        unsafe { self.slot.as_ref() }.bump();
    }

    /// Opportunistic reclaim: sweep the released list, then move the
    /// sealed free-set suffix to the collected list if quiescence holds.
    /// Returns the number of free sets collected.
    fn mem_reclaim(&mut self) -> usize {
        self.released.sweep(&*self.region);
        self.pipeline.collect_quiescent()
    }

    /// The registry this allocator participates in.
    /// 此分配器参与的注册表。
    pub fn domain(&self) -> &EpochDomain {
        &self.domain
    }

    /// Configured object size.
    /// 配置的对象大小。
    pub fn obj_size(&self) -> usize {
        self.obj_size
    }

    /// Whether `addr` lies inside one of this allocator's chunks.
    /// `addr` 是否位于此分配器的某个内存块之内。
    pub fn owns(&self, addr: *const u8) -> bool {
        self.slab.contains(addr)
    }

    /// Current pipeline counters.
    /// 当前的流水线计数。
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            total_bytes: self.slab.total_bytes(),
            chunks: self.slab.chunk_count(),
            free_sets: self.pipeline.free_sets(),
            collected_sets: self.pipeline.collected_sets(),
            available_sets: self.pipeline.available_sets(),
            released: self.released.len(),
        }
    }
}

impl<R: RegionProvider> Drop for SlabAllocator<R> {
    fn drop(&mut self) {
        // Pointers in the pipelines all point into the chunks; only the
        // chunks and the retained released regions go back to the region
        // provider. The registry slot stays until registry teardown.
        self.released.drain(&*self.region);
        self.slab.free_chunks(&*self.region);
    }
}

impl<R: RegionProvider> std::fmt::Debug for SlabAllocator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("obj_size", &self.obj_size)
            .field("stats", &self.stats())
            .finish()
    }
}
