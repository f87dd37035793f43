use std::alloc::{handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Source of the raw byte regions an allocator carves objects from.
///
/// Implementations hand out aligned regions and take them back; the
/// allocator never touches the page source directly. Exhaustion is fatal
/// (the provider aborts), so `alloc_aligned` always returns a valid
/// pointer — a lock-free caller has no way to unwind a failed allocation.
///
/// 分配器从中开辟对象的原始字节区域的来源。
/// 实现负责分发和回收对齐的区域；分配器从不直接接触页面来源。资源耗尽
/// 是致命的（由提供者中止进程），因此 `alloc_aligned` 总是返回有效指针
/// —— 无锁的调用方没有办法回退一次失败的分配。
pub trait RegionProvider {
    /// Allocate `size` bytes at the given alignment. Aborts on exhaustion.
    /// 以给定对齐分配 `size` 字节。耗尽时中止进程。
    fn alloc_aligned(&self, size: usize, align: usize) -> NonNull<u8>;

    /// Return a region obtained from [`alloc_aligned`](Self::alloc_aligned).
    ///
    /// # Safety
    /// `mem` must come from this provider with exactly this `size` and
    /// `align`, and must not be used afterwards.
    ///
    /// 归还通过 `alloc_aligned` 获得的区域。
    unsafe fn free(&self, mem: NonNull<u8>, size: usize, align: usize);

    /// Make `len` bytes at `mem` durable before they are published.
    /// 在发布之前使 `mem` 处的 `len` 字节持久化。
    fn persist(&self, _mem: *const u8, _len: usize) {}

    /// Whether fresh regions must be zeroed before use.
    /// 新区域在使用前是否必须清零。
    fn requires_zero(&self) -> bool {
        false
    }
}

/// Volatile region provider backed by the ordinary process heap.
/// 由普通进程堆支撑的易失性区域提供者。
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapRegion;

impl RegionProvider for HeapRegion {
    fn alloc_aligned(&self, size: usize, align: usize) -> NonNull<u8> {
        let layout = match Layout::from_size_align(size, align) {
            Ok(l) => l,
            Err(_) => panic!("invalid region layout: {} bytes @ {}", size, align),
        };
        let ptr = unsafe { std::alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        }
    }

    unsafe fn free(&self, mem: NonNull<u8>, size: usize, align: usize) {
        let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
        unsafe { std::alloc::dealloc(mem.as_ptr(), layout) };
    }
}

#[cfg(unix)]
pub use self::pool::MappedPool;

#[cfg(unix)]
mod pool {
    use super::*;
    use crate::sync::Mutex;
    use std::collections::HashMap;
    use std::fs::OpenOptions;
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::ptr;

    /// Persistent-memory-style region provider over a file-backed mapping.
    ///
    /// The pool maps one named file at creation and carves cache-line
    /// aligned regions out of it with a bump cursor; freed regions are
    /// kept on per-size free lists and reused for requests of the same
    /// size. `persist` flushes the written cache lines so chunk contents
    /// are durable before the allocator links the chunk. Regions handed
    /// out by the pool are zeroed by the allocator unconditionally — a
    /// recovering process must never observe stale bytes in a fresh
    /// chunk.
    ///
    /// The handle may be shared between threads; carve/free bookkeeping
    /// is mutex-guarded.
    ///
    /// 基于文件映射的持久内存风格区域提供者。
    /// 池在创建时映射一个命名文件，用一个递增游标从中开辟缓存行对齐的
    /// 区域；被归还的区域保存在按大小划分的空闲链表中，供相同大小的
    /// 请求复用。`persist` 刷写已写入的缓存行，使块内容在分配器链入该
    /// 块之前就已持久。池分发的区域一律由分配器清零 —— 恢复中的进程
    /// 绝不能在新块中观察到陈旧字节。
    /// 句柄可以在线程间共享；开辟/归还的簿记由互斥锁保护。
    pub struct MappedPool {
        base: NonNull<u8>,
        capacity: usize,
        state: Mutex<PoolState>,
    }

    struct PoolState {
        cursor: usize,
        free: HashMap<usize, Vec<usize>>,
    }

    unsafe impl Send for MappedPool {}
    unsafe impl Sync for MappedPool {}

    impl MappedPool {
        /// Map `capacity` bytes of the file at `path`, creating it if needed.
        /// 映射 `path` 处文件的 `capacity` 字节，必要时创建该文件。
        pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<MappedPool> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            file.set_len(capacity as u64)?;
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    capacity,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let base = NonNull::new(ptr as *mut u8)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
            Ok(MappedPool {
                base,
                capacity,
                state: Mutex::new(PoolState {
                    cursor: 0,
                    free: HashMap::new(),
                }),
            })
        }

        /// Total bytes the pool can hand out.
        /// 池能分发的总字节数。
        pub fn capacity(&self) -> usize {
            self.capacity
        }
    }

    impl RegionProvider for MappedPool {
        fn alloc_aligned(&self, size: usize, align: usize) -> NonNull<u8> {
            debug_assert!(align.is_power_of_two());
            let mut st = self.state.lock();
            if let Some(list) = st.free.get_mut(&size) {
                if let Some(addr) = list.pop() {
                    // Free-listed regions were carved at >= this alignment.
                    return unsafe { NonNull::new_unchecked(addr as *mut u8) };
                }
            }
            let aligned = (st.cursor + align - 1) & !(align - 1);
            let end = match aligned.checked_add(size) {
                Some(end) if end <= self.capacity => end,
                _ => {
                    let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
                    handle_alloc_error(layout)
                }
            };
            st.cursor = end;
            unsafe { NonNull::new_unchecked(self.base.as_ptr().add(aligned)) }
        }

        unsafe fn free(&self, mem: NonNull<u8>, size: usize, _align: usize) {
            let mut st = self.state.lock();
            st.free
                .entry(size)
                .or_insert_with(Vec::new)
                .push(mem.as_ptr() as usize);
        }

        fn persist(&self, mem: *const u8, len: usize) {
            #[cfg(target_arch = "x86_64")]
            unsafe {
                use crate::state::CACHE_LINE_SIZE;

                let start = (mem as usize) & !(CACHE_LINE_SIZE - 1);
                let end = (mem as usize).saturating_add(len);
                let mut line = start;
                while line < end {
                    core::arch::x86_64::_mm_clflush(line as *const u8);
                    line += CACHE_LINE_SIZE;
                }
                core::arch::x86_64::_mm_sfence();
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                let _ = (mem, len);
                crate::sync::fence(crate::sync::Ordering::SeqCst);
            }
        }

        fn requires_zero(&self) -> bool {
            true
        }
    }

    impl Drop for MappedPool {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.capacity);
            }
        }
    }
}
