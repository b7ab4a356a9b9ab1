use core::sync::atomic::{AtomicU8, Ordering};

const UNSET: u8 = 0;
const ENABLED: u8 = 1;
const DISABLED: u8 = 2;

/// Cached option value, resolved from the environment on first read.
static EAGER_REGION_COMMIT: AtomicU8 = AtomicU8::new(UNSET);

/// Whether regions are committed in full at reservation time.
///
/// When enabled, release uses `reset` (mapping stays committed); when
/// disabled (the default), sub-ranges are committed on demand and release
/// uses `decommit`. Controlled by `REGIONALLOC_EAGER_COMMIT=1`.
pub fn eager_region_commit() -> bool {
    match EAGER_REGION_COMMIT.load(Ordering::Relaxed) {
        ENABLED => true,
        DISABLED => false,
        _ => {
            // Racing first reads all parse the same environment, so the
            // store is idempotent.
            let enabled = unsafe {
                matches!(getenv_usize(b"REGIONALLOC_EAGER_COMMIT\0"), Some(v) if v != 0)
            };
            let state = if enabled { ENABLED } else { DISABLED };
            EAGER_REGION_COMMIT.store(state, Ordering::Relaxed);
            enabled
        }
    }
}

/// Override the eager-commit option, bypassing the environment. Takes
/// effect for operations that start after the call; flipping it while
/// allocations from the other mode are live mismatches their release path.
pub fn set_eager_region_commit(enabled: bool) {
    let state = if enabled { ENABLED } else { DISABLED };
    EAGER_REGION_COMMIT.store(state, Ordering::Relaxed);
}

/// Parse an environment variable as a usize.
///
/// # Safety
/// Calls libc::getenv.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let val = libc::getenv(key.as_ptr() as *const libc::c_char);
    if val.is_null() {
        return None;
    }

    // Parse manually (no std allocation)
    let mut result: usize = 0;
    let mut ptr = val as *const u8;
    loop {
        let byte = *ptr;
        if byte == 0 {
            break;
        }
        if !byte.is_ascii_digit() {
            return None; // Invalid
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
        ptr = ptr.add(1);
    }
    Some(result)
}
