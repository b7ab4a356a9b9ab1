//! Allocation ids.
//!
//! An id packs the `(region index, bit index)` pair a block run was claimed
//! at, so release can find its bits without any lookup structure. The
//! all-ones sentinel marks memory that bypassed the region table and must
//! be handed back to the OS directly.

use super::bitmap::BITS;

/// Sentinel id for memory obtained straight from the OS.
pub const ID_DIRECT: usize = usize::MAX;

/// Pack a region index and bit index into an id.
#[inline]
pub fn encode(idx: usize, bitidx: usize) -> usize {
    debug_assert!(bitidx < BITS);
    idx * BITS + bitidx
}

/// Split an id back into `(region index, bit index)`.
#[inline]
pub fn decode(id: usize) -> (usize, usize) {
    (id / BITS, id % BITS)
}

/// Whether `id` marks a direct OS allocation.
#[inline]
pub fn is_direct(id: usize) -> bool {
    id == ID_DIRECT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::REGION_MAX;

    #[test]
    fn round_trip() {
        for idx in [0usize, 1, 7, REGION_MAX - 1] {
            for bitidx in [0usize, 1, BITS / 2, BITS - 1] {
                assert_eq!(decode(encode(idx, bitidx)), (idx, bitidx));
            }
        }
    }

    #[test]
    fn first_block_of_first_region_is_id_zero() {
        assert_eq!(encode(0, 0), 0);
        assert_eq!(decode(0), (0, 0));
    }

    #[test]
    fn direct_sentinel() {
        assert!(is_direct(ID_DIRECT));
        assert!(!is_direct(0));
        assert!(!is_direct(encode(REGION_MAX - 1, BITS - 1)));
    }
}
