//! Debug assertion macros for ring and channel invariants.
//!
//! Active only under `debug_assertions`; release builds pay nothing.

// =============================================================================
// Bounded occupancy: 0 ≤ published_write − published_read ≤ capacity
// =============================================================================

/// Assert that a ring's byte occupancy never exceeds its data area.
///
/// Checked after each publication, on the publishing side.
macro_rules! debug_assert_occupancy {
    ($read:expr, $write:expr, $capacity:expr) => {
        debug_assert!(
            $write.wrapping_sub($read) <= $capacity,
            "ring occupancy {} exceeds capacity {}",
            $write.wrapping_sub($read),
            $capacity
        )
    };
}

// =============================================================================
// Slot-granular progress: indices advance in whole slots
// =============================================================================

/// Assert that an index is a whole number of slots.
///
/// Holds for both local counters and published words because every
/// commit advances by exactly `slot_size`.
macro_rules! debug_assert_slot_aligned {
    ($index:expr, $slot:expr) => {
        debug_assert!(
            $index % $slot == 0,
            "index {} is not aligned to slot size {}",
            $index,
            $slot
        )
    };
}

pub(crate) use debug_assert_occupancy;
pub(crate) use debug_assert_slot_aligned;
