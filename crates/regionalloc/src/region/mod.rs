//! Process-wide region arena.
//!
//! A layer between raw OS virtual memory and segment allocation: regions of
//! `REGION_SIZE` virtually-contiguous bytes are carved into `BLOCK_SIZE`
//! blocks tracked by one atomic bitmap word each. Claiming blocks is
//! lock-free (snapshot scan + CAS), OS reservation is lazy and published
//! with a one-shot pointer CAS, and released blocks are decommitted (or
//! reset) but keep their virtual range for reuse.

pub mod bitmap;
pub mod id;

use crate::config;
use crate::platform;
use crate::stats::MemStats;
use crate::util::align_up;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

pub use bitmap::{BITS, MAP_FULL};
pub use id::ID_DIRECT;

/// The block granule. Segments are allocated in multiples of this, and the
/// backing memory of every region is aligned to it.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Bytes owned by one region: one block per map bit.
pub const REGION_SIZE: usize = BLOCK_SIZE * BITS;

/// Largest request served from the region table. Anything bigger goes to
/// the OS directly.
pub const REGION_MAX_ALLOC: usize = (BITS / 4) * BLOCK_SIZE;

/// Ceiling on aggregate region virtual address space.
#[cfg(target_pointer_width = "64")]
pub const HEAP_MAX: usize = 256 * (1 << 30);
#[cfg(target_pointer_width = "32")]
pub const HEAP_MAX: usize = 3 * (1 << 30);

/// Length of the region descriptor table.
pub const REGION_MAX: usize = HEAP_MAX / REGION_SIZE;

/// One region: a bitmap word with one in-use bit per block, and the start
/// of the backing virtual memory. `start` is installed at most once and is
/// never cleared afterwards.
struct MemRegion {
    map: AtomicUsize,
    start: AtomicPtr<u8>,
}

impl MemRegion {
    const fn new() -> Self {
        MemRegion {
            map: AtomicUsize::new(0),
            start: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

/// Outcome of one allocation attempt against a single region.
enum RegionAlloc {
    /// Blocks claimed and backed; pointer and id ready for the caller.
    Claimed(*mut u8, usize),
    /// No free run wide enough. Not an error; the scan moves on.
    NoRoom,
    /// The OS refused to reserve backing memory. The claim was rolled back.
    Oom,
}

/// The region table plus its scan state. All coordination is atomic; no
/// operation takes a lock or blocks outside the OS calls themselves.
pub struct RegionArena {
    regions: [MemRegion; REGION_MAX],
    /// Regions that have backing memory installed. Monotonic.
    count: AtomicUsize,
    /// Advisory hint for where the next scan should start.
    next_idx: AtomicUsize,
}

impl RegionArena {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        const EMPTY: MemRegion = MemRegion::new();
        RegionArena {
            regions: [EMPTY; REGION_MAX],
            count: AtomicUsize::new(0),
            next_idx: AtomicUsize::new(0),
        }
    }

    /// Allocate `size` bytes, block-aligned. See [`RegionArena::alloc_aligned`].
    pub fn alloc(&self, size: usize, commit: bool, stats: &MemStats) -> (*mut u8, usize) {
        self.alloc_aligned(size, 0, commit, stats)
    }

    /// Allocate `size` bytes aligned to `alignment`.
    ///
    /// Returns the pointer (null when the OS is out of memory) and the
    /// allocation id to pass back to [`RegionArena::free`]. Requests larger
    /// than [`REGION_MAX_ALLOC`] or aligned beyond [`BLOCK_SIZE`] bypass
    /// the table and carry the [`ID_DIRECT`] id. Pointers served from the
    /// table are always at least [`BLOCK_SIZE`]-aligned.
    pub fn alloc_aligned(
        &self,
        size: usize,
        alignment: usize,
        commit: bool,
        stats: &MemStats,
    ) -> (*mut u8, usize) {
        if size == 0 {
            return (ptr::null_mut(), ID_DIRECT);
        }

        // oversized or over-aligned requests go straight to the OS
        if size > REGION_MAX_ALLOC || alignment > BLOCK_SIZE {
            let p =
                unsafe { platform::alloc_aligned(good_commit_size(size), alignment, true, stats) };
            return (p, ID_DIRECT);
        }

        // round to the OS page size so commit/decommit cover whole pages
        let size = align_up(size, platform::page_size());
        let blocks = block_count(size);
        debug_assert!(blocks >= 1 && blocks <= BITS / 4);

        // first pass: regions known to have backing memory, from the hint
        let count = self.count.load(Ordering::Acquire);
        let mut idx = self.next_idx.load(Ordering::Relaxed);
        for _ in 0..count {
            match self.try_alloc_blocks(idx % count, blocks, size, commit, stats) {
                RegionAlloc::Claimed(p, id) => return (p, id),
                RegionAlloc::Oom => return (ptr::null_mut(), ID_DIRECT),
                RegionAlloc::NoRoom => idx += 1,
            }
        }

        // second pass: extend into descriptors beyond the populated range
        for idx in count..REGION_MAX {
            match self.try_alloc_blocks(idx, blocks, size, commit, stats) {
                RegionAlloc::Claimed(p, id) => return (p, id),
                RegionAlloc::Oom => return (ptr::null_mut(), ID_DIRECT),
                RegionAlloc::NoRoom => {}
            }
        }

        // table exhausted: hand the request to the OS with the caller's alignment
        let p = unsafe { platform::alloc_aligned(size, alignment, commit, stats) };
        (p, ID_DIRECT)
    }

    /// Release memory previously returned by `alloc`/`alloc_aligned`.
    ///
    /// `size` must be the size passed at allocation. The physical pages are
    /// handed back (decommit, or reset under eager commit) and the blocks
    /// unclaimed; the region's virtual range stays reserved. Invalid ids or
    /// mismatched pointers make this a no-op.
    ///
    /// # Safety
    /// `p` must have come from this arena with exactly this `size` and `id`,
    /// and must not be used after the call.
    pub unsafe fn free(&self, p: *mut u8, size: usize, id: usize, stats: &MemStats) {
        if p.is_null() || size == 0 {
            return;
        }
        if id::is_direct(id) {
            // direct OS allocation, pass through
            platform::free(p, size, stats);
            return;
        }

        if size > REGION_MAX_ALLOC {
            return;
        }
        // align the size as the allocation did, so the whole range is covered
        let size = align_up(size, platform::page_size());
        let (idx, bitidx) = id::decode(id);
        if idx >= REGION_MAX {
            return;
        }
        let region = &self.regions[idx];
        let blocks = block_count(size);
        if bitidx + blocks > BITS {
            return;
        }
        let mask = bitmap::block_mask(blocks, bitidx);
        debug_assert_eq!(region.map.load(Ordering::Relaxed) & mask, mask);

        let start = region.start.load(Ordering::Acquire);
        debug_assert!(!start.is_null());
        if start.is_null() {
            return;
        }
        let block_ptr = start.add(bitidx * BLOCK_SIZE);
        if block_ptr != p {
            return;
        }

        // shrink the working set before handing the blocks back
        if config::eager_region_commit() {
            platform::reset(p, size, stats);
        } else {
            platform::decommit(p, size, stats);
        }

        // unclaim; start stays installed so the region can be reused
        region.map.fetch_and(!mask, Ordering::Release);
    }

    /// Quick full-map check before attempting a claim on `regions[idx]`.
    fn try_alloc_blocks(
        &self,
        idx: usize,
        blocks: usize,
        size: usize,
        commit: bool,
        stats: &MemStats,
    ) -> RegionAlloc {
        debug_assert!(idx < REGION_MAX);
        if self.regions[idx].map.load(Ordering::Relaxed) == MAP_FULL {
            return RegionAlloc::NoRoom;
        }
        self.alloc_blocks(idx, blocks, size, commit, stats)
    }

    /// Claim a run of `blocks` in `regions[idx]`, then back it with memory.
    fn alloc_blocks(
        &self,
        idx: usize,
        blocks: usize,
        size: usize,
        commit: bool,
        stats: &MemStats,
    ) -> RegionAlloc {
        debug_assert!(blocks > 0 && blocks < BITS);
        let region = &self.regions[idx];

        // find a free run in the current snapshot and CAS-claim it; every
        // conflicting claim only narrows the free set, so retry on the
        // fresh snapshot
        let mut map = region.map.load(Ordering::Relaxed);
        let bitidx = loop {
            let bitidx = match bitmap::find_free_run(map, blocks) {
                Some(bitidx) => bitidx,
                None => return RegionAlloc::NoRoom,
            };
            let mask = bitmap::block_mask(blocks, bitidx);
            debug_assert_eq!(map & mask, 0);
            match region.map.compare_exchange_weak(
                map,
                map | mask,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break bitidx,
                Err(current) => map = current,
            }
        };

        // the blocks are ours; backing them can still fail
        self.commit_blocks(idx, bitidx, blocks, size, commit, stats)
    }

    /// Ensure `regions[idx]` has backing memory and the claimed run at
    /// `bitidx` is committed as requested.
    fn commit_blocks(
        &self,
        idx: usize,
        bitidx: usize,
        blocks: usize,
        size: usize,
        commit: bool,
        stats: &MemStats,
    ) -> RegionAlloc {
        let region = &self.regions[idx];
        let mask = bitmap::block_mask(blocks, bitidx);
        debug_assert_eq!(region.map.load(Ordering::Relaxed) & mask, mask);

        // reserve the region on first use
        let mut start = region.start.load(Ordering::Acquire);
        if start.is_null() {
            let eager = config::eager_region_commit();
            let new = unsafe { platform::alloc_aligned(REGION_SIZE, BLOCK_SIZE, eager, stats) };
            if new.is_null() {
                // reservation failed: unclaim the blocks and report OOM
                region.map.fetch_and(!mask, Ordering::Release);
                return RegionAlloc::Oom;
            }
            match region.start.compare_exchange(
                ptr::null_mut(),
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.count.fetch_add(1, Ordering::AcqRel);
                    start = new;
                }
                Err(published) => {
                    // another thread reserved just before us; drop ours and
                    // adopt the published range
                    unsafe { platform::free(new, REGION_SIZE, stats) };
                    start = published;
                }
            }
        }
        debug_assert!(!start.is_null());

        let block_ptr = unsafe { start.add(bitidx * BLOCK_SIZE) };
        if commit && !config::eager_region_commit() {
            // commit only the needed size, rounded so large OS pages stay
            // intact; a failure here is not rolled back and the run stays
            // claimed
            unsafe { platform::commit(block_ptr, good_commit_size(size), stats) };
        }

        // next search from here
        self.next_idx.store(idx, Ordering::Relaxed);
        RegionAlloc::Claimed(block_ptr, id::encode(idx, bitidx))
    }

    /// Number of regions with backing memory installed.
    pub fn regions_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Advisory hint for where the next allocation scan starts.
    pub fn next_index_hint(&self) -> usize {
        self.next_idx.load(Ordering::Relaxed)
    }

    /// Snapshot of the claim map of `regions[idx]`.
    pub fn region_map(&self, idx: usize) -> usize {
        assert!(idx < REGION_MAX);
        self.regions[idx].map.load(Ordering::Acquire)
    }

    /// Backing pointer of `regions[idx]`, null while never reserved.
    pub fn region_start(&self, idx: usize) -> *mut u8 {
        assert!(idx < REGION_MAX);
        self.regions[idx].start.load(Ordering::Acquire)
    }
}

/// Blocks needed to cover `size` bytes.
fn block_count(size: usize) -> usize {
    debug_assert!(size > 0 && size <= REGION_MAX_ALLOC);
    size.div_ceil(BLOCK_SIZE)
}

/// Round a commit/reset size up to the large OS page multiple so large
/// pages are not fragmented into small ones. Saturates near `usize::MAX`.
pub fn good_commit_size(size: usize) -> usize {
    let large = platform::large_page_size();
    if size > usize::MAX - large {
        return size;
    }
    align_up(size, large)
}

/// The process-global arena. Lives in zero-initialized static storage, so
/// it is usable without any init ordering concerns.
static ARENA: RegionArena = RegionArena::new();

/// The process-global arena instance.
pub fn arena() -> &'static RegionArena {
    &ARENA
}

/// Allocate `size` bytes from the global arena. See [`RegionArena::alloc`].
pub fn alloc(size: usize, commit: bool, stats: &MemStats) -> (*mut u8, usize) {
    ARENA.alloc(size, commit, stats)
}

/// Allocate from the global arena with an alignment request.
/// See [`RegionArena::alloc_aligned`].
pub fn alloc_aligned(
    size: usize,
    alignment: usize,
    commit: bool,
    stats: &MemStats,
) -> (*mut u8, usize) {
    ARENA.alloc_aligned(size, alignment, commit, stats)
}

/// Release memory to the global arena. See [`RegionArena::free`].
///
/// # Safety
/// Same contract as [`RegionArena::free`].
pub unsafe fn free(p: *mut u8, size: usize, id: usize, stats: &MemStats) {
    ARENA.free(p, size, id, stats)
}

/// Commit an arbitrary range. Forwarded to the OS; arena state is not
/// consulted.
///
/// # Safety
/// The range must lie inside a reservation and be page-aligned.
pub unsafe fn commit(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    platform::commit(p, size, stats)
}

/// Decommit an arbitrary range. Forwarded to the OS.
///
/// # Safety
/// The range must lie inside a reservation and be page-aligned.
pub unsafe fn decommit(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    platform::decommit(p, size, stats)
}

/// Reset an arbitrary range. Forwarded to the OS.
///
/// # Safety
/// The range must be committed memory and page-aligned.
pub unsafe fn reset(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    platform::reset(p, size, stats)
}

/// Undo a reset. Forwarded to the OS.
///
/// # Safety
/// The range must previously have been reset.
pub unsafe fn unreset(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    platform::unreset(p, size, stats)
}

/// Protect an arbitrary range. Forwarded to the OS.
///
/// # Safety
/// The range must be a valid mapping and page-aligned.
pub unsafe fn protect(p: *mut u8, size: usize) -> bool {
    platform::protect(p, size)
}

/// Unprotect an arbitrary range. Forwarded to the OS.
///
/// # Safety
/// The range must be a valid mapping and page-aligned.
pub unsafe fn unprotect(p: *mut u8, size: usize) -> bool {
    platform::unprotect(p, size)
}
