use std::ptr::NonNull;

use crate::region::RegionProvider;
use crate::registry::EpochSnapshot;
use crate::state::CACHE_LINE_SIZE;

/// A whole region retired outside the bounded free-set pool, stamped with
/// the epoch snapshot taken at release time.
/// 在有界释放集池之外让渡的整块区域，附带让渡时拍摄的纪元快照。
pub(crate) struct ReleasedNode {
    mem: NonNull<u8>,
    size: usize,
    snapshot: EpochSnapshot,
    next: Option<Box<ReleasedNode>>,
}

/// LIFO of released regions awaiting quiescence.
///
/// Reclamation only ever compares the two newest entries: when the head's
/// snapshot is strictly newer than its successor's, every older entry is
/// freed and the head stays behind as the anchor for the next comparison.
/// This is deliberately conservative — the head itself is only returned at
/// teardown.
///
/// 等待静止的已让渡区域的后进先出链表。
/// 回收只比较最新的两个条目：当头结点的快照严格新于其后继的快照时，
/// 所有更旧的条目都被释放，头结点则留下来作为下一次比较的锚点。这是
/// 有意保守的 —— 头结点本身只在销毁时归还。
pub(crate) struct ReleasedList {
    head: Option<Box<ReleasedNode>>,
    num: usize,
}

impl ReleasedList {
    pub(crate) fn new() -> ReleasedList {
        ReleasedList { head: None, num: 0 }
    }

    /// Push a region with its snapshot; returns the new entry count.
    pub(crate) fn push(&mut self, mem: NonNull<u8>, size: usize, snapshot: EpochSnapshot) -> usize {
        self.head = Some(Box::new(ReleasedNode {
            mem,
            size,
            snapshot,
            next: self.head.take(),
        }));
        self.num += 1;
        self.num
    }

    /// Free every entry behind the head once the two newest snapshots are
    /// strictly ordered.
    pub(crate) fn sweep<R: RegionProvider>(&mut self, region: &R) {
        let head = match self.head.as_mut() {
            Some(h) => h,
            None => return,
        };
        let quiescent = match head.next.as_ref() {
            Some(next) => head.snapshot.is_strictly_newer(&next.snapshot),
            None => false,
        };
        if !quiescent {
            return;
        }
        let mut cur = head.next.take();
        self.num = 1;
        while let Some(mut node) = cur {
            cur = node.next.take();
            unsafe { region.free(node.mem, node.size, CACHE_LINE_SIZE) };
        }
    }

    /// Teardown: return every retained region, the anchor included.
    pub(crate) fn drain<R: RegionProvider>(&mut self, region: &R) {
        let mut cur = self.head.take();
        self.num = 0;
        while let Some(mut node) = cur {
            cur = node.next.take();
            unsafe { region.free(node.mem, node.size, CACHE_LINE_SIZE) };
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.num
    }
}

impl Drop for ReleasedList {
    fn drop(&mut self) {
        // Regions must be drained through the region provider first; what
        // is left here are only the list nodes. Unlink iteratively.
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}
