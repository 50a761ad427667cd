//! Heap statistics and the human-readable dump.

use {
    super::{BlockRef, HEAP_ALIGN, Heap, align_size},
    std::io,
};

/// Snapshot of heap occupancy.
///
/// Produced by [`Heap::collect_stats`]. Sizes that account for whole
/// blocks (`used_size`, `free_size`) include the per-block header
/// footprint; `object_size` and `free_block_size` count payload bytes
/// only, which is why the former pair sums to the heap capacity and the
/// latter does not.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeapStats
{
    /// Total storage in bytes, every block header included.
    ///
    /// This exceeds [`Heap::heap_size`] by one header: the first block's
    /// header lives in the reserved bytes before the first boundary.
    pub heap_size: usize,

    /// Bytes consumed by used blocks, headers included.
    pub used_size: usize,

    /// Bytes consumed by free blocks, headers included.
    pub free_size: usize,

    /// Number of free blocks.
    pub num_free_blocks: usize,

    /// Sum of free block payload sizes.
    pub free_block_size: usize,

    /// Number of objects (live or not).
    pub num_objects: usize,

    /// Sum of object sizes as declared by their descriptors.
    pub object_size: usize,

    /// Number of objects reachable from the roots.
    /// Zero unless live counting was requested.
    pub num_live_objects: usize,

    /// Sum of reachable objects' declared sizes.
    /// Zero unless live counting was requested.
    pub live_object_size: usize,
}

impl Heap
{
    /// Collect occupancy statistics in one pass over the heap.
    ///
    /// With `count_live`, the roots are marked first and the walk counts
    /// reachable objects separately, clearing each MARK bit as it goes;
    /// MARK is zero everywhere again on return either way.
    pub fn collect_stats(&mut self, count_live: bool) -> HeapStats
    {
        let mut stats = HeapStats{
            heap_size: HEAP_ALIGN + self.heap_size(),
            ..HeapStats::default()
        };

        if count_live {
            for i in 0 .. self.roots.len() {
                let root = self.roots[i];
                // SAFETY: Roots are data addresses of live objects.
                unsafe { self.mark(root); }
            }
        }

        let end = self.heap_end().as_ptr() as usize;
        let mut cur = BlockRef::from_data(self.heap_start());
        // SAFETY: The walk visits exactly the blocks tiling the heap.
        unsafe {
            while cur.addr() < end {
                if cur.is_free() {
                    let size = cur.free_size();
                    stats.num_free_blocks += 1;
                    stats.free_block_size += size;
                    stats.free_size += HEAP_ALIGN + align_size(size);
                } else {
                    if cur.is_marked() {
                        let mut header = cur.header();
                        header.set_mark(false);
                        cur.set_header(header);

                        stats.num_live_objects += 1;
                        stats.live_object_size += cur.type_desc().size();
                    }
                    let size = cur.type_desc().size();
                    stats.num_objects += 1;
                    stats.object_size += size;
                    stats.used_size += HEAP_ALIGN + align_size(size);
                }
                cur = cur.following();
            }
        }

        debug_assert_eq!(stats.used_size + stats.free_size, stats.heap_size);
        stats
    }

    /// Write a human-readable report of the heap to the given sink.
    ///
    /// The report lists overall statistics, the free blocks, and every
    /// object reachable from the roots with its leading payload bytes and
    /// pointer fields. MARK is zero everywhere on return.
    pub fn dump(&mut self, out: &mut dyn io::Write) -> io::Result<()>
    {
        let stats = self.collect_stats(true);

        writeln!(
            out,
            "==== Statistics for heap at {:#x} ====",
            self.heap_start().as_ptr() as usize,
        )?;
        writeln!(out, "Heap size:  {} bytes", stats.heap_size)?;
        writeln!(out, "Used space: {} bytes", stats.used_size)?;
        writeln!(out, "Free space: {} bytes", stats.free_size)?;
        writeln!(out)?;
        writeln!(
            out,
            "Object count:    {} ({} live)",
            stats.num_objects, stats.num_live_objects,
        )?;
        writeln!(
            out,
            "Object size:     {} bytes ({} in live objects)",
            stats.object_size, stats.live_object_size,
        )?;
        writeln!(
            out,
            "Available space: {} bytes in {} blocks",
            stats.free_block_size, stats.num_free_blocks,
        )?;
        writeln!(out)?;

        writeln!(out, "= Free Blocks =")?;
        writeln!(out, "Address            Size(net)")?;
        let mut cur = self.free_list;
        while let Some(blk) = cur {
            // SAFETY: The free list visits only free blocks.
            unsafe {
                writeln!(out, "{:#018x} {}", blk.addr(), blk.free_size())?;
                cur = blk.next_free();
            }
        }
        writeln!(out)?;

        writeln!(out, "= Live Objects =")?;
        self.dump_live_objects(out)
    }

    /// Mark from the roots and print every live object, unmarking as the
    /// walk goes.
    fn dump_live_objects(&mut self, out: &mut dyn io::Write) -> io::Result<()>
    {
        const NUM_DATA_BYTES: usize = 4;

        for i in 0 .. self.roots.len() {
            let root = self.roots[i];
            // SAFETY: Roots are data addresses of live objects.
            unsafe { self.mark(root); }
        }

        let end = self.heap_end().as_ptr() as usize;
        let mut cur = BlockRef::from_data(self.heap_start());
        // SAFETY: The walk visits exactly the blocks tiling the heap;
        //         live objects are initialized per the allocate contract.
        unsafe {
            while cur.addr() < end {
                if !cur.is_marked() {
                    cur = cur.following();
                    continue;
                }

                let mut header = cur.header();
                header.set_mark(false);
                cur.set_header(header);

                let ty = cur.type_desc();
                writeln!(out, "{:#x} {}", cur.addr(), ty.name())?;

                write!(out, "  Data:")?;
                let data = cur.data().as_ptr();
                for i in 0 .. ty.size().min(NUM_DATA_BYTES) {
                    write!(out, " {:02x}", *data.add(i))?;
                }
                if ty.size() > NUM_DATA_BYTES {
                    write!(out, " ...")?;
                }
                writeln!(out)?;

                if ty.has_pointers() {
                    writeln!(out, "  Pointers:")?;
                    for &offset in ty.offsets() {
                        let field = *(data.add(offset as usize)
                            as *const *const u8);
                        writeln!(out, "    {:#x}", field as usize)?;
                    }
                } else {
                    writeln!(out, "  Pointers: none")?;
                }

                cur = cur.following();
            }
        }

        Ok(())
    }
}
