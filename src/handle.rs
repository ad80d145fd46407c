//! Opaque identifiers handed out to callers.
//!
//! A [`TrackHandle`] packs the slot index into the low [`SLOT_BITS`] bits and
//! an allocation generation into the remaining high bits. When a slot is
//! reused for a new playback its generation changes, so handles to the old
//! playback stop matching.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bits reserved for the slot index.
pub const SLOT_BITS: u32 = 16;

/// Largest pool a handle can address.
pub const MAX_TRACKS: usize = 1 << SLOT_BITS;

const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const GENERATION_MASK: u64 = u64::MAX >> SLOT_BITS;

/// Process-wide allocation counter. Never reset.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Draws a fresh generation. Wraps silently after 2^48 allocations; a
/// wrapped value of 0 is skipped so packed handles are never zero.
pub(crate) fn next_generation() -> u64 {
    loop {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed) & GENERATION_MASK;
        if generation != 0 {
            return generation;
        }
    }
}

/// Lightweight handle to one playback instance on one track slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackHandle(u64);

impl TrackHandle {
    pub fn pack(generation: u64, slot: usize) -> Self {
        debug_assert!(slot < MAX_TRACKS, "slot {} exceeds handle range", slot);
        Self(((generation & GENERATION_MASK) << SLOT_BITS) | (slot as u64 & SLOT_MASK))
    }

    pub fn slot(&self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    pub fn generation(&self) -> u64 {
        self.0 >> SLOT_BITS
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Track({}#{})", self.slot(), self.generation())
    }
}

/// Identifier of a sample held by the mixer. Ids start at 1 and are never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId(pub(crate) u64);

impl SampleId {
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SampleId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let handle = TrackHandle::pack(42, 7);
        assert_eq!(handle.slot(), 7);
        assert_eq!(handle.generation(), 42);
        assert_eq!(TrackHandle::from_raw(handle.as_raw()), handle);
    }

    #[test]
    fn test_extreme_values() {
        let handle = TrackHandle::pack(GENERATION_MASK, MAX_TRACKS - 1);
        assert_eq!(handle.slot(), MAX_TRACKS - 1);
        assert_eq!(handle.generation(), GENERATION_MASK);
    }

    #[test]
    fn test_generation_wraps_within_mask() {
        let handle = TrackHandle::pack(GENERATION_MASK + 5, 3);
        assert_eq!(handle.generation(), 4);
        assert_eq!(handle.slot(), 3);
    }

    #[test]
    fn test_generations_are_fresh() {
        let a = next_generation();
        let b = next_generation();
        assert_ne!(a, 0);
        assert!(b > a);
    }
}
