use core::ptr;

// Windows stubs - the VirtualAlloc family maps 1:1 onto this surface
// (reserve/commit are first-class there). Wired up when a Windows target
// is actually needed.

pub unsafe fn map_aligned(_size: usize, _align: usize, _commit: bool) -> *mut u8 {
    ptr::null_mut() // TODO: VirtualAlloc MEM_RESERVE (+ MEM_COMMIT)
}

pub unsafe fn unmap(_ptr: *mut u8, _size: usize) {
    // TODO: VirtualFree MEM_RELEASE
}

pub unsafe fn commit(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualAlloc MEM_COMMIT
}

pub unsafe fn decommit(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualFree MEM_DECOMMIT
}

pub unsafe fn reset(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualAlloc MEM_RESET
}

pub unsafe fn unreset(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualAlloc MEM_RESET_UNDO
}

pub unsafe fn protect_none(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualProtect PAGE_NOACCESS
}

pub unsafe fn protect_read_write(_ptr: *mut u8, _size: usize) -> bool {
    false // TODO: VirtualProtect PAGE_READWRITE
}

pub fn query_page_size() -> usize {
    4096 // TODO: GetSystemInfo
}
