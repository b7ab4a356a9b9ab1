#![no_main]

use libfuzzer_sys::fuzz_target;

use regionalloc::region::{RegionArena, BLOCK_SIZE, ID_DIRECT, REGION_MAX_ALLOC};
use regionalloc::stats::MemStats;

/// Fuzz target that interprets a byte slice as a sequence of arena operations.
///
/// Each operation is encoded as:
///   byte 0: opcode (0=alloc, 1=free, 2=alloc_aligned)
///   byte 1-2: size in pages (little-endian u16)
///   byte 3: slot index (which tracked allocation to operate on)
///
/// We track up to 32 live allocations and release them all at the end of
/// every run, so the long-lived arena stays quiescent between runs.
const MAX_SLOTS: usize = 32;

const PAGE: usize = 4096;

/// Sizes reach past REGION_MAX_ALLOC so the direct-OS bypass is exercised.
const MAX_PAGES: usize = (REGION_MAX_ALLOC + REGION_MAX_ALLOC / 2) / PAGE;

static ARENA: RegionArena = RegionArena::new();
static STATS: MemStats = MemStats::new();

fuzz_target!(|data: &[u8]| {
    let mut slots: [(*mut u8, usize, usize); MAX_SLOTS] =
        [(std::ptr::null_mut(), 0, ID_DIRECT); MAX_SLOTS];

    let mut i = 0;
    while i + 4 <= data.len() {
        let opcode = data[i] % 3;
        let pages = u16::from_le_bytes([data[i + 1], data[i + 2]]) as usize;
        let slot = (data[i + 3] as usize) % MAX_SLOTS;
        i += 4;

        let size = (pages % MAX_PAGES + 1) * PAGE;
        let commit = pages % 2 == 0;

        match opcode {
            0 => {
                // alloc into a slot, releasing its previous occupant
                let (old_p, old_size, old_id) = slots[slot];
                if !old_p.is_null() {
                    unsafe { ARENA.free(old_p, old_size, old_id, &STATS) };
                }
                let (p, id) = ARENA.alloc(size, commit, &STATS);
                slots[slot] = (p, size, id);
                if !p.is_null() && (commit || id == ID_DIRECT) {
                    unsafe {
                        std::ptr::write_bytes(p, 0xAA, std::cmp::min(size, 256));
                    }
                }
            }
            1 => {
                // free the slot
                let (p, sz, id) = slots[slot];
                if !p.is_null() {
                    unsafe { ARENA.free(p, sz, id, &STATS) };
                    slots[slot] = (std::ptr::null_mut(), 0, ID_DIRECT);
                }
            }
            _ => {
                // aligned alloc; alignments above BLOCK_SIZE bypass the table
                let shift = (pages % 4) as u32;
                let align = (BLOCK_SIZE / 4) << shift;
                let (old_p, old_size, old_id) = slots[slot];
                if !old_p.is_null() {
                    unsafe { ARENA.free(old_p, old_size, old_id, &STATS) };
                }
                let (p, id) = ARENA.alloc_aligned(size, align, commit, &STATS);
                if !p.is_null() {
                    assert_eq!(p as usize % align, 0, "under-aligned pointer");
                }
                slots[slot] = (p, size, id);
            }
        }
    }

    // release everything still live
    for &(p, sz, id) in slots.iter() {
        if !p.is_null() {
            unsafe { ARENA.free(p, sz, id, &STATS) };
        }
    }
});
