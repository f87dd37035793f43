use std::ptr::{self, NonNull};

use crate::region::RegionProvider;
use crate::state::CACHE_LINE_SIZE;
use crate::sync::{fence, Ordering};

/// One raw byte region owned by a slab. Kept for teardown.
/// 平板所拥有的一块原始字节区域。保留以便销毁时归还。
pub(crate) struct Chunk {
    pub(crate) base: NonNull<u8>,
    pub(crate) size: usize,
}

/// Bump arena over a list of chunks obtained from a region provider.
///
/// Fresh objects are carved off the current chunk by advancing `curr`.
/// When a chunk is exhausted the next one is allocated at double the
/// size, capped at `max`; a request larger than the current chunk size
/// keeps doubling until it fits or hits the cap, which is fatal. Past
/// chunks stay on the `chunks` list (newest last) until teardown.
///
/// 基于从区域提供者获得的块链表的递增指针竞技场。
/// 新对象通过推进 `curr` 从当前块中切出。块耗尽时，下一个块以双倍大小
/// 分配，上限为 `max`；大于当前块大小的请求会持续翻倍直到放得下或触及
/// 上限（后者是致命错误）。旧块保留在 `chunks` 列表中（最新的在末尾）
/// 直到销毁。
pub(crate) struct Slab {
    /// Base of the current chunk.
    mem: NonNull<u8>,
    /// Bump offset into the current chunk, in bytes.
    curr: usize,
    /// Size of the current chunk.
    size: usize,
    /// Cumulative bytes ever obtained from the region provider.
    tot: usize,
    /// Every chunk ever owned, newest last.
    chunks: Vec<Chunk>,
    max: usize,
    zero: bool,
}

impl Slab {
    pub(crate) fn new<R: RegionProvider>(
        initial_size: usize,
        max: usize,
        zero: bool,
        region: &R,
    ) -> Slab {
        assert!(
            initial_size.is_power_of_two() && initial_size <= max,
            "initial chunk size {} must be a power of two within the {} byte cap",
            initial_size,
            max,
        );
        let zero = zero || region.requires_zero();
        let mem = Self::obtain(initial_size, zero, region);
        Slab {
            mem,
            curr: 0,
            size: initial_size,
            tot: initial_size,
            chunks: vec![Chunk {
                base: mem,
                size: initial_size,
            }],
            max,
            zero,
        }
    }

    /// Carve `size` bytes, growing to a new chunk when the current one is
    /// exhausted.
    pub(crate) fn bump<R: RegionProvider>(&mut self, size: usize, region: &R) -> NonNull<u8> {
        if self.curr + size > self.size {
            self.grow(size, region);
        }
        let m = unsafe { NonNull::new_unchecked(self.mem.as_ptr().add(self.curr)) };
        self.curr += size;
        m
    }

    fn grow<R: RegionProvider>(&mut self, size: usize, region: &R) {
        self.size = (self.size << 1).min(self.max);
        if size > self.size {
            // Oversize request: keep doubling until it fits.
            while self.size < size {
                assert!(
                    self.size < self.max,
                    "requested {} byte object exceeds the {} byte chunk cap",
                    size,
                    self.max,
                );
                self.size <<= 1;
            }
        }
        let mem = Self::obtain(self.size, self.zero, region);
        self.chunks.push(Chunk {
            base: mem,
            size: self.size,
        });
        self.mem = mem;
        self.curr = 0;
        self.tot += self.size;
    }

    fn obtain<R: RegionProvider>(size: usize, zero: bool, region: &R) -> NonNull<u8> {
        let mem = region.alloc_aligned(size, CACHE_LINE_SIZE);
        if zero {
            unsafe { ptr::write_bytes(mem.as_ptr(), 0, size) };
            region.persist(mem.as_ptr(), size);
        }
        // Chunk contents must be visible before the chunk is reachable.
        fence(Ordering::Release);
        mem
    }

    /// Whether `addr` falls inside one of the owned chunks.
    pub(crate) fn contains(&self, addr: *const u8) -> bool {
        let addr = addr as usize;
        self.chunks.iter().any(|c| {
            let base = c.base.as_ptr() as usize;
            addr >= base && addr < base + c.size
        })
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) fn total_bytes(&self) -> usize {
        self.tot
    }

    /// Return every chunk to the region provider. Called on teardown.
    pub(crate) fn free_chunks<R: RegionProvider>(&mut self, region: &R) {
        for chunk in self.chunks.drain(..) {
            unsafe { region.free(chunk.base, chunk.size, CACHE_LINE_SIZE) };
        }
    }
}
