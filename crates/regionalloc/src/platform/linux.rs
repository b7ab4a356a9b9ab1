use crate::util::{align_up, is_aligned};
use core::ptr;

/// Map anonymous memory at any address. Uncommitted mappings are `PROT_NONE`
/// with `MAP_NORESERVE` so the kernel charges no swap for them.
unsafe fn map(size: usize, commit: bool) -> *mut u8 {
    let prot = if commit {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_NONE
    };
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    if !commit {
        flags |= libc::MAP_NORESERVE;
    }
    let result = libc::mmap(ptr::null_mut(), size, prot, flags, -1, 0);
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

/// Map `size` bytes aligned to `align`.
///
/// A plain mmap is usually aligned well enough; when it is not, remap with
/// `align` slack bytes and trim the head and tail back to the kernel.
///
/// # Safety
/// `size` must be page-aligned and non-zero; `align` a power of two and at
/// least the page size.
pub unsafe fn map_aligned(size: usize, align: usize, commit: bool) -> *mut u8 {
    let p = map(size, commit);
    if p.is_null() || is_aligned(p as usize, align) {
        return p;
    }
    unmap(p, size);

    let over = match size.checked_add(align) {
        Some(over) => over,
        None => return ptr::null_mut(),
    };
    let p = map(over, commit);
    if p.is_null() {
        return ptr::null_mut();
    }
    let aligned = align_up(p as usize, align) as *mut u8;
    let pre = aligned as usize - p as usize;
    if pre > 0 {
        unmap(p, pre);
    }
    let post = over - pre - size;
    if post > 0 {
        unmap(aligned.add(size), post);
    }
    aligned
}

/// Unmap memory.
///
/// # Safety
/// `[ptr, ptr+size)` must be a mapped range obtained from `map_aligned`.
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// Back pages with physical memory by restoring read-write access.
///
/// # Safety
/// Region must be valid and page-aligned.
pub unsafe fn commit(ptr: *mut u8, size: usize) -> bool {
    libc::mprotect(
        ptr as *mut libc::c_void,
        size,
        libc::PROT_READ | libc::PROT_WRITE,
    ) == 0
}

/// Return physical pages to the kernel and revoke access, keeping the
/// virtual range reserved. MADV_DONTNEED guarantees zero-filled pages on
/// the next commit+touch.
///
/// # Safety
/// Region must be valid and page-aligned.
pub unsafe fn decommit(ptr: *mut u8, size: usize) -> bool {
    let ret = libc::madvise(ptr as *mut libc::c_void, size, libc::MADV_DONTNEED);
    debug_assert!(ret == 0, "madvise(MADV_DONTNEED) failed");
    libc::mprotect(ptr as *mut libc::c_void, size, libc::PROT_NONE) == 0 && ret == 0
}

/// Discard page contents while keeping the mapping readable and writable.
///
/// # Safety
/// Region must be valid, committed, and page-aligned.
pub unsafe fn reset(ptr: *mut u8, size: usize) -> bool {
    libc::madvise(ptr as *mut libc::c_void, size, libc::MADV_DONTNEED) == 0
}

/// Undo a `reset`. Pages repopulate on touch, so there is nothing to do.
///
/// # Safety
/// Region must be valid and page-aligned.
pub unsafe fn unreset(_ptr: *mut u8, _size: usize) -> bool {
    true
}

/// Mark memory as inaccessible.
///
/// # Safety
/// Region must be valid and page-aligned.
pub unsafe fn protect_none(ptr: *mut u8, size: usize) -> bool {
    libc::mprotect(ptr as *mut libc::c_void, size, libc::PROT_NONE) == 0
}

/// Mark memory as read-write.
///
/// # Safety
/// Region must be valid and page-aligned.
pub unsafe fn protect_read_write(ptr: *mut u8, size: usize) -> bool {
    libc::mprotect(
        ptr as *mut libc::c_void,
        size,
        libc::PROT_READ | libc::PROT_WRITE,
    ) == 0
}

/// Query the OS page size.
pub fn query_page_size() -> usize {
    unsafe {
        let n = libc::sysconf(libc::_SC_PAGESIZE);
        if n < 1 {
            4096
        } else {
            n as usize
        }
    }
}
