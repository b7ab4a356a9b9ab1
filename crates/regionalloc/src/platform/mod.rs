#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub use macos as sys;

#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(target_os = "windows")]
pub use windows as sys;

use crate::stats::MemStats;
use crate::util::align_up;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Large OS page granule used to round commit sizes (2 MiB on the platforms
/// we target). Committing multiples of this keeps huge pages intact.
const LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Get the OS page size. Queried once and cached.
#[inline]
pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let size = sys::query_page_size();
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Get the large OS page size.
#[inline]
pub fn large_page_size() -> usize {
    LARGE_PAGE_SIZE
}

/// Reserve `size` bytes of virtual memory aligned to `align`, optionally
/// committed. Returns null on failure. `align` values below the page size
/// (including 0) are treated as page alignment.
///
/// # Safety
/// `size` must be non-zero. The returned range must eventually be released
/// with `free` using the same size.
pub unsafe fn alloc_aligned(size: usize, align: usize, commit: bool, stats: &MemStats) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }
    let size = align_up(size, page_size());
    let align = if align <= page_size() {
        page_size()
    } else {
        align
    };
    debug_assert!(align.is_power_of_two());

    let p = sys::map_aligned(size, align, commit);
    if !p.is_null() {
        stats.reserve_add(size);
        if commit {
            stats.commit_add(size);
        }
    }
    p
}

/// Release a virtual memory reservation.
///
/// # Safety
/// `p` must have been returned by `alloc_aligned` and `size` must match the
/// size passed there.
pub unsafe fn free(p: *mut u8, size: usize, stats: &MemStats) {
    if p.is_null() || size == 0 {
        return;
    }
    let size = align_up(size, page_size());
    sys::unmap(p, size);
    stats.reserve_sub(size);
}

/// Back `[p, p+size)` with physical memory. Returns false on failure.
///
/// # Safety
/// The range must lie inside a reservation obtained from `alloc_aligned`
/// and be page-aligned.
pub unsafe fn commit(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    let ok = sys::commit(p, size);
    if ok {
        stats.commit_add(size);
    }
    ok
}

/// Return the physical memory behind `[p, p+size)` to the OS while keeping
/// the virtual reservation. The next access requires a fresh commit.
///
/// # Safety
/// The range must lie inside a reservation obtained from `alloc_aligned`
/// and be page-aligned.
pub unsafe fn decommit(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    let ok = sys::decommit(p, size);
    if ok {
        stats.commit_sub(size);
    }
    ok
}

/// Hint that the contents of `[p, p+size)` may be discarded. The mapping
/// stays readable and writable; pages repopulate (zeroed) on next touch.
///
/// # Safety
/// The range must be committed memory inside a reservation and page-aligned.
pub unsafe fn reset(p: *mut u8, size: usize, stats: &MemStats) -> bool {
    let ok = sys::reset(p, size);
    if ok {
        stats.reset_add(size);
    }
    ok
}

/// Undo a `reset`.
///
/// # Safety
/// The range must previously have been passed to `reset`.
pub unsafe fn unreset(p: *mut u8, size: usize, _stats: &MemStats) -> bool {
    sys::unreset(p, size)
}

/// Make `[p, p+size)` inaccessible.
///
/// # Safety
/// The range must be a valid mapped region and page-aligned.
pub unsafe fn protect(p: *mut u8, size: usize) -> bool {
    sys::protect_none(p, size)
}

/// Restore read-write access to `[p, p+size)`.
///
/// # Safety
/// The range must be a valid mapped region and page-aligned.
pub unsafe fn unprotect(p: *mut u8, size: usize) -> bool {
    sys::protect_read_write(p, size)
}
