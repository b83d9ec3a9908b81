//! Slot allocation.
//!
//! New codes go into the highest free slot: the search runs from the
//! capacity down to 1, leaving the low slots for codes programmed by hand.

use std::collections::HashSet;

/// Default number of code slots on a lock.
pub const DEFAULT_CAPACITY: u16 = 250;

/// Returned when every position in `1..=capacity` is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("all {capacity} slots are occupied")]
pub struct CapacityExhausted {
    pub capacity: u16,
}

/// Return the highest position in `1..=capacity` not present in `occupied`.
///
/// Positions outside the range are ignored.
pub fn allocate(occupied: &HashSet<u16>, capacity: u16) -> Result<u16, CapacityExhausted> {
    (1..=capacity)
        .rev()
        .find(|position| !occupied.contains(position))
        .ok_or(CapacityExhausted { capacity })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(positions: &[u16]) -> HashSet<u16> {
        positions.iter().copied().collect()
    }

    #[test]
    fn empty_device_gets_capacity() {
        assert_eq!(allocate(&set(&[]), 250), Ok(250));
        assert_eq!(allocate(&set(&[]), 4), Ok(4));
    }

    #[test]
    fn prefers_highest_free_slot() {
        assert_eq!(allocate(&set(&[1, 2, 4]), 4), Ok(3));
    }

    #[test]
    fn skips_occupied_top_slots() {
        assert_eq!(allocate(&set(&[250, 249, 248]), 250), Ok(247));
    }

    #[test]
    fn finds_the_last_hole_at_the_bottom() {
        let occupied: HashSet<u16> = (2..=10).collect();
        assert_eq!(allocate(&occupied, 10), Ok(1));
    }

    #[test]
    fn full_device_is_exhausted() {
        let occupied: HashSet<u16> = (1..=4).collect();
        assert_eq!(allocate(&occupied, 4), Err(CapacityExhausted { capacity: 4 }));
    }

    #[test]
    fn zero_capacity_is_exhausted() {
        assert_eq!(allocate(&set(&[]), 0), Err(CapacityExhausted { capacity: 0 }));
    }

    #[test]
    fn out_of_range_positions_do_not_count() {
        assert_eq!(allocate(&set(&[0, 5, 300]), 4), Ok(4));
    }

    #[test]
    fn never_returns_an_occupied_position() {
        for capacity in 1..=16u16 {
            for mask in 0u32..(1 << capacity.min(10)) {
                let occupied: HashSet<u16> = (1..=capacity)
                    .filter(|p| u32::from(*p) <= 10 && mask & (1 << (p - 1)) != 0)
                    .collect();
                match allocate(&occupied, capacity) {
                    Ok(position) => {
                        assert!(!occupied.contains(&position));
                        assert!((1..=capacity).contains(&position));
                    }
                    Err(_) => assert_eq!(occupied.len(), usize::from(capacity)),
                }
            }
        }
    }
}
