use std::ptr::{self, NonNull};

use crate::state::{EpochSlot, LocalSlot, RegistryState};
use crate::sync::{Arc, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use thread_local::ThreadLocal;

/// Handle to a process-scope epoch registry.
///
/// The registry is the only state shared between allocator threads. Every
/// participating thread — whether it allocates or merely reads the client
/// data structure — joins it lazily and afterwards advances its own epoch
/// counter around operations. Reclamation compares snapshots of all
/// counters: when every thread has moved forward between two snapshots,
/// memory freed before the first snapshot can no longer be observed.
///
/// `EpochDomain` is `Clone` and can be shared across threads; typically
/// the process creates one at startup and hands a clone to every thread
/// that touches the shared structure. Dropping the last clone (after all
/// allocators built from it) tears the registry down and frees the slots.
///
/// 进程级纪元注册表的句柄。
/// 注册表是分配器线程之间唯一共享的状态。每个参与线程——无论它分配内存
/// 还是只读取客户数据结构——都会惰性加入，并在操作前后推进自己的纪元
/// 计数器。回收时比较所有计数器的快照：当每个线程都在两次快照之间前进
/// 过，第一次快照之前释放的内存就不可能再被观察到。
/// `EpochDomain` 是 `Clone` 的，可以跨线程共享；通常进程在启动时创建
/// 一个，并把克隆交给每个接触共享结构的线程。最后一个克隆（以及由它
/// 构建的所有分配器）被 drop 后，注册表被销毁并释放槽位。
///
/// ```
/// use epoch_slab::EpochDomain;
///
/// let domain = EpochDomain::new();
/// domain.register_thread();
/// domain.advance_epoch();
/// assert_eq!(domain.threads(), 1);
/// ```
#[derive(Clone)]
pub struct EpochDomain {
    shared: Arc<RegistryState>,
}

impl EpochDomain {
    /// Create a fresh registry with no participating threads.
    /// 创建一个没有任何参与线程的新注册表。
    pub fn new() -> Self {
        EpochDomain {
            shared: Arc::new(RegistryState {
                head: AtomicPtr::new(ptr::null_mut()),
                len: AtomicU32::new(0),
                next_id: AtomicU32::new(0),
                local: ThreadLocal::new(),
            }),
        }
    }

    /// Join the calling thread to the registry if it has not joined yet.
    ///
    /// Threads that only read the client structure (and therefore never
    /// allocate) still must register: a thread unknown to the registry is
    /// invisible to the quiescence check.
    ///
    /// 如果调用线程尚未加入注册表，则将其加入。
    /// 只读取客户结构（因此从不分配）的线程也必须注册：注册表不知道的
    /// 线程对静止性检查是不可见的。
    pub fn register_thread(&self) {
        self.shared.join();
    }

    /// Advance the calling thread's epoch, joining it first if needed.
    /// 推进调用线程的纪元，必要时先将其加入注册表。
    pub fn advance_epoch(&self) {
        let slot = self.shared.join();
        unsafe { slot.as_ref() }.bump();
    }

    /// Number of threads that have joined the registry.
    /// 已加入注册表的线程数量。
    pub fn threads(&self) -> usize {
        self.shared.len.load(Ordering::Acquire) as usize
    }

    /// Capture the current epoch of every registered thread.
    /// 捕获每个已注册线程当前的纪元。
    pub fn snapshot(&self) -> EpochSnapshot {
        let mut snap = EpochSnapshot::default();
        self.shared.snapshot_into(&mut snap);
        snap
    }

    pub(crate) fn state(&self) -> &RegistryState {
        &self.shared
    }

    pub(crate) fn join(&self) -> NonNull<EpochSlot> {
        self.shared.join()
    }
}

impl Default for EpochDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EpochDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochDomain")
            .field("threads", &self.threads())
            .finish()
    }
}

impl RegistryState {
    /// Attach the calling thread, or return its cached slot.
    ///
    /// The new slot is fully initialized before the CAS publishes it, so
    /// list walkers that acquire the head always see complete slots. `len`
    /// is incremented only after publication; a walker that observed the
    /// new `len` therefore also observes the slot.
    pub(crate) fn join(&self) -> NonNull<EpochSlot> {
        let cached = self.local.get_or(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let slot = Box::into_raw(Box::new(EpochSlot {
                id,
                version: AtomicU64::new(0),
                next: ptr::null(),
            }));
            loop {
                let head = self.head.load(Ordering::Acquire);
                // Not yet published: plain write is fine.
                unsafe { (*slot).next = head };
                if self
                    .head
                    .compare_exchange(head, slot, Ordering::Release, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
            self.len.fetch_add(1, Ordering::AcqRel);
            LocalSlot(slot)
        });
        // Slots outlive every allocator and domain clone; see state.rs.
        unsafe { NonNull::new_unchecked(cached.0 as *mut EpochSlot) }
    }

    /// Fill `snap` with the version of every published slot.
    ///
    /// The buffer is resized to the observed length and zero-filled first;
    /// slots whose id is not yet covered by `len` (a join racing with this
    /// walk) are skipped, which pads them as 0 — conservative for the
    /// strictly-newer comparison.
    pub(crate) fn snapshot_into(&self, snap: &mut EpochSnapshot) {
        let len = self.len.load(Ordering::Acquire) as usize;
        snap.versions.clear();
        snap.versions.resize(len, 0);
        let mut cur = self.head.load(Ordering::Acquire) as *const EpochSlot;
        while !cur.is_null() {
            let slot = unsafe { &*cur };
            if (slot.id as usize) < len {
                snap.versions[slot.id as usize] = slot.version.load(Ordering::Acquire);
            }
            cur = slot.next;
        }
    }
}

impl Drop for RegistryState {
    fn drop(&mut self) {
        // No domain clone and no allocator remain; nobody can hold a slot
        // pointer anymore.
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            let next = unsafe { (*cur).next } as *mut EpochSlot;
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
    }
}

/// A dense vector of per-thread epochs observed at one moment.
///
/// Entry `i` holds the version of the slot with id `i` at the time the
/// snapshot was taken. Snapshots taken by the same thread are comparable
/// with [`is_strictly_newer`](EpochSnapshot::is_strictly_newer); the
/// relation holding between two of them proves that every registered
/// thread made progress in between.
///
/// 某一时刻观察到的各线程纪元的稠密向量。
/// 第 `i` 项保存快照拍摄时 id 为 `i` 的槽位的版本。同一线程拍摄的快照
/// 可以用 `is_strictly_newer` 比较；该关系成立即证明每个已注册线程在
/// 两次快照之间都取得了进展。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochSnapshot {
    pub(crate) versions: Vec<u64>,
}

impl EpochSnapshot {
    /// Number of thread entries captured.
    /// 捕获的线程条目数量。
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True when no thread was registered at capture time.
    /// 捕获时没有任何线程注册则为真。
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The captured versions, indexed by slot id.
    /// 捕获到的版本，按槽位 id 索引。
    pub fn versions(&self) -> &[u64] {
        &self.versions
    }

    /// Pointwise strictly-greater comparison against an older snapshot.
    ///
    /// Entries the older snapshot is missing (threads that joined after it
    /// was taken) are padded with 0, so a freshly joined thread blocks the
    /// relation until it advances at least once.
    ///
    /// 与较旧快照的逐项严格大于比较。较旧快照缺失的条目（在其拍摄之后
    /// 才加入的线程）按 0 补齐，因此新加入的线程在至少推进一次之前会
    /// 阻止该关系成立。
    pub fn is_strictly_newer(&self, older: &EpochSnapshot) -> bool {
        if self.versions.len() < older.versions.len() {
            return false;
        }
        self.versions
            .iter()
            .enumerate()
            .all(|(i, &v)| v > older.versions.get(i).copied().unwrap_or(0))
    }
}
