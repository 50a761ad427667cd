//! The sweep: destructor pass and free-list rebuild.

use super::{BlockRef, HEAP_ALIGN, Heap};

/// What a sweep did, for diagnostics.
pub (super) struct SweepOutcome
{
    pub (super) destroyed: usize,
    pub (super) free_blocks: usize,
}

impl Heap
{
    /// Walk the heap once, destroying every unmarked object and rebuilding
    /// the free list.
    ///
    /// Marked blocks survive with their MARK bit cleared. Every maximal
    /// run of dead objects and old free blocks becomes a single free
    /// block, pushed onto the head of the list as the walk goes, so the
    /// rebuilt list holds the free blocks in reverse address order. Each
    /// dead object's destructor runs exactly once, before its storage is
    /// absorbed into the run.
    ///
    /// # Safety
    ///
    /// The heap tiling must be intact, and every object that is still
    /// referenced from a root or a live object must be marked.
    pub (super) unsafe fn rebuild_free_list(&mut self) -> SweepOutcome
    {
        let mut outcome = SweepOutcome{destroyed: 0, free_blocks: 0};
        let mut free_list: Option<BlockRef> = None;

        let end = self.heap_end().as_ptr() as usize;
        let mut cur = BlockRef::from_data(self.heap_start());
        while cur.addr() < end {
            if cur.is_marked() {
                // Live object: unmark and move on.
                let mut header = cur.header();
                header.set_mark(false);
                cur.set_header(header);

                cur = cur.following();
                continue;
            }

            // Extend the free block over the run of garbage and old free
            // blocks, destroying garbage objects as we go.
            let run_start = cur;
            loop {
                if cur.is_used() {
                    cur.type_desc().destroy(cur.data());
                    outcome.destroyed += 1;
                }
                cur = cur.following();
                if cur.addr() >= end || cur.is_marked() {
                    break;
                }
            }

            run_start.make_free(
                cur.addr() - run_start.addr() - HEAP_ALIGN,
                free_list,
            );
            free_list = Some(run_start);
            outcome.free_blocks += 1;
        }

        self.free_list = free_list;
        outcome
    }
}
