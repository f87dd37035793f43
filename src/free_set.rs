use std::ptr::NonNull;

use crate::registry::EpochSnapshot;
use crate::state::RegistryState;

/// Fixed-capacity bucket of freed object pointers.
///
/// A set moves through four states: *active* (being filled, no snapshot),
/// *sealed* (full, epoch snapshot attached), *collected* (quiescence
/// proven, contents reusable), and *available* (drained shell kept for
/// reuse). The state is carried by which chain the set sits on; the
/// snapshot is attached exactly when the set is sealed.
///
/// 已释放对象指针的固定容量桶。
/// 一个集合会经历四种状态：*活跃*（填充中，无快照）、*已封存*（已满，
/// 附带纪元快照）、*已回收*（静止性已证明，内容可复用）、*可用*（已排
/// 空的外壳，保留以便复用）。状态由集合所在的链表体现；快照恰好在封存
/// 时附加。
pub(crate) struct FreeSet {
    /// Freed pointers; `slots[..curr]` are valid.
    slots: Box<[NonNull<u8>]>,
    curr: usize,
    /// `Some` once sealed. Drained shells keep the allocation as a spare
    /// buffer for the next seal.
    snapshot: Option<EpochSnapshot>,
    next: Option<Box<FreeSet>>,
}

impl FreeSet {
    fn new(capacity: usize) -> FreeSet {
        FreeSet {
            slots: vec![NonNull::dangling(); capacity].into_boxed_slice(),
            curr: 0,
            snapshot: None,
            next: None,
        }
    }
}

/// The three-stage queue that turns `free` calls into reusable pointers.
///
/// ```text
///    active (head of the free-set list)   ← frees land here
///        │  sealed with a snapshot when full
///        ▼
///    sealed suffix (newest first)
///        │  newest two snapshots strictly ordered ⇒ whole suffix quiescent
///        ▼
///    collected list                       ← alloc reuses from the head
///        │  drained
///        ▼
///    available shells                     ← recycled as fresh active sets
/// ```
///
/// 将 `free` 调用转化为可复用指针的三级队列。活跃集合满时以一份快照封
/// 存；当最新两份快照逐项严格递增时，整个封存后缀都已静止，被搬到回收
/// 链表尾部；`alloc` 从回收链表头部取用，排空的外壳进入可用链表等待
/// 复用。
pub(crate) struct FreePipeline {
    /// Active set; `next` is the sealed suffix, newest first.
    active: Box<FreeSet>,
    /// Sets on the free-set list (active + sealed).
    free_sets: usize,
    /// Quiescent sets; popped from the head, batches appended at the tail.
    collected: Option<Box<FreeSet>>,
    collected_sets: usize,
    /// Drained shells, LIFO.
    available: Option<Box<FreeSet>>,
    /// Spare snapshot buffer recycled between seals.
    spare: Option<EpochSnapshot>,
    capacity: usize,
}

impl FreePipeline {
    pub(crate) fn new(capacity: usize) -> FreePipeline {
        assert!(capacity > 0, "free set capacity must be non-zero");
        FreePipeline {
            active: Box::new(FreeSet::new(capacity)),
            free_sets: 1,
            collected: None,
            collected_sets: 0,
            available: None,
            spare: None,
            capacity,
        }
    }

    #[inline]
    pub(crate) fn active_full(&self) -> bool {
        self.active.curr == self.capacity
    }

    /// Append a freed pointer to the active set.
    #[inline]
    pub(crate) fn push(&mut self, obj: NonNull<u8>) {
        debug_assert!(!self.active_full());
        self.active.slots[self.active.curr] = obj;
        self.active.curr += 1;
    }

    /// Stamp the full active set with a fresh snapshot.
    pub(crate) fn seal_active(&mut self, registry: &RegistryState) {
        debug_assert!(self.active_full());
        let mut snap = self.spare.take().unwrap_or_default();
        registry.snapshot_into(&mut snap);
        self.active.snapshot = Some(snap);
    }

    /// Install a fresh active set in front of the sealed suffix, reusing
    /// an available shell when one exists.
    pub(crate) fn rotate_active(&mut self) {
        let fresh = match self.available.take() {
            Some(mut shell) => {
                self.available = shell.next.take();
                shell.curr = 0;
                if let Some(buf) = shell.snapshot.take() {
                    self.spare = Some(buf);
                }
                shell
            }
            None => Box::new(FreeSet::new(self.capacity)),
        };
        let sealed = std::mem::replace(&mut self.active, fresh);
        self.active.next = Some(sealed);
        self.free_sets += 1;
    }

    /// Move the sealed suffix to the collected list if the newest two
    /// snapshots prove quiescence. Returns the number of sets collected.
    ///
    /// Two consecutive snapshots in strictly-greater relation sandwich
    /// every operation that was in flight at the older one; all sets from
    /// the second-newest onward can no longer be observed by any thread.
    pub(crate) fn collect_quiescent(&mut self) -> usize {
        let cur_snap = match &self.active.snapshot {
            Some(s) => s,
            None => return 0,
        };
        let nxt = match &self.active.next {
            Some(n) => n,
            None => return 0,
        };
        let nxt_snap = match &nxt.snapshot {
            Some(s) => s,
            None => return 0,
        };
        if !cur_snap.is_strictly_newer(nxt_snap) {
            return 0;
        }
        let detached = self.active.next.take().expect("sealed suffix checked above");
        let moved = self.free_sets - 1;
        self.free_sets = 1;
        self.append_collected(detached);
        self.collected_sets += moved;
        moved
    }

    /// Pop the most recently freed reusable pointer, recycling the shell
    /// of a drained collected set.
    #[inline]
    pub(crate) fn take_reusable(&mut self) -> Option<NonNull<u8>> {
        let cs = self.collected.as_mut()?;
        debug_assert!(cs.curr > 0, "collected sets are sealed full");
        cs.curr -= 1;
        let m = cs.slots[cs.curr];
        if cs.curr == 0 {
            let mut drained = self.collected.take().expect("head checked above");
            self.collected = drained.next.take();
            self.collected_sets -= 1;
            self.make_available(drained);
        }
        Some(m)
    }

    fn append_collected(&mut self, chain: Box<FreeSet>) {
        let mut tail = &mut self.collected;
        while let Some(node) = tail {
            tail = &mut node.next;
        }
        *tail = Some(chain);
    }

    fn make_available(&mut self, mut shell: Box<FreeSet>) {
        shell.curr = 0;
        shell.next = self.available.take();
        self.available = Some(shell);
    }

    pub(crate) fn free_sets(&self) -> usize {
        self.free_sets
    }

    pub(crate) fn collected_sets(&self) -> usize {
        self.collected_sets
    }

    pub(crate) fn available_sets(&self) -> usize {
        let mut n = 0;
        let mut cur = &self.available;
        while let Some(node) = cur {
            n += 1;
            cur = &node.next;
        }
        n
    }
}

impl Drop for FreePipeline {
    fn drop(&mut self) {
        // Unlink iteratively; a deep recursive drop of the chains could
        // exhaust the stack.
        let mut cur = self.active.next.take();
        while let Some(mut set) = cur {
            cur = set.next.take();
        }
        let mut cur = self.collected.take();
        while let Some(mut set) = cur {
            cur = set.next.take();
        }
        let mut cur = self.available.take();
        while let Some(mut set) = cur {
            cur = set.next.take();
        }
    }
}
