use std::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::invariants::{debug_assert_occupancy, debug_assert_slot_aligned};
use crate::region::REGION_HEADER;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// One ring carries fixed-size slots from a single producer endpoint to a
// single consumer endpoint. The only shared locations are the two
// published index words at the front of the region; everything else is
// owned by exactly one side at any moment.
//
// ## Free-running byte counters
//
// Both indices count bytes monotonically and wrap through usize
// arithmetic; the slot offset is `index & mask`. Because the data area
// is a power of two and a whole number of slots, a slot never straddles
// the end of the ring.
//
// ## Producer (prepare/send path)
//
// 1. `cw` is the producer's own counter (no atomics; single writer).
// 2. Free space uses the cached read limit `cr`; when insufficient, `cr`
//    is refreshed to `published_read (Acquire) + capacity`.
// 3. Payload bytes are written into the slot at `cw & mask`.
// 4. Commit: `cw += slot`, release fence, then a store to the published
//    write word. The fence orders the payload stores before the index
//    store (StoreStore).
//
// ## Consumer (receive/return path)
//
// 1. `cr` is the consumer's own counter.
// 2. Used space uses the cached `cw`; when insufficient, `cw` is
//    refreshed from `published_write (Acquire)`, which pairs with the
//    producer's release fence and makes the payload bytes visible.
// 3. Payload bytes are read from the slot at `cr & mask`.
// 4. Commit: `cr += slot`, acquire fence, then a store to the published
//    read word. The fence orders the payload loads before the index
//    store (LoadStore), so the slot is never recycled under a read.
//
// ## Single-writer invariants
//
// - `cw` and the published write word: written only by the producer.
// - `cr` and the published read word: written only by the consumer.
// - Slot bytes: owned by the producer between prepare and send, by the
//   consumer between receive and return; the fences transfer ownership.
//
// The owning side loads its own published word with Relaxed ordering;
// only the peer's word needs Acquire.
//
// =============================================================================

/// One direction of a channel: an SPSC queue of fixed-size slots over a
/// caller-provided region.
///
/// Owns no storage; the region must stay mapped and stable for the
/// ring's lifetime. A `Ring` is used by exactly one endpoint, either as
/// its producer side or as its consumer side.
#[derive(Debug)]
pub(crate) struct Ring {
    /// Published read index word (written by the consumer endpoint).
    read: *const AtomicUsize,
    /// Published write index word (written by the producer endpoint).
    write: *const AtomicUsize,
    /// Consumer side: the local read counter. Producer side: the cached
    /// write limit, `published_read + capacity` after a refresh.
    cr: usize,
    /// Producer side: the local write counter. Consumer side: the cached
    /// view of the published write index.
    cw: usize,
    /// Start of the slot data area (just past the index words).
    data: *mut u8,
    /// Data area length; a power of two.
    len: usize,
    /// Fixed slot size; divides `len`.
    slot: usize,
    /// `len - 1`, for index wrapping.
    mask: usize,
}

// SAFETY: a Ring is confined to its owning endpoint (methods take &mut);
// the raw pointers target a region the endpoint's channel keeps alive,
// and cross-endpoint traffic goes through the atomic index words only.
unsafe impl Send for Ring {}

impl Ring {
    /// Validates a total region length against the sizing rules and
    /// returns the data-area length: the region must hold the two index
    /// words plus a power-of-two data area that is a whole number of
    /// slots.
    pub(crate) fn data_len_for_region(region_len: usize, slot: usize) -> Option<usize> {
        let data_len = region_len.checked_sub(REGION_HEADER)?;
        if !data_len.is_power_of_two() || data_len % slot != 0 {
            return None;
        }
        Some(data_len)
    }

    /// Attaches to a region, initializing both local counters from the
    /// published words so that attaching to a ring with traffic already
    /// in flight works.
    ///
    /// # Safety
    ///
    /// `base` must point to `REGION_HEADER + data_len` bytes, word
    /// aligned, valid and stable for the ring's lifetime, with
    /// `data_len` validated by [`Self::data_len_for_region`]. At most
    /// one producer and one consumer endpoint may operate on the region
    /// at a time.
    pub(crate) unsafe fn attach(base: *mut u8, data_len: usize, slot: usize) -> Self {
        let read = base.cast::<AtomicUsize>().cast_const();
        // SAFETY: the region holds two index words at its front, and the
        // caller guarantees alignment and liveness.
        let write = unsafe { base.cast::<AtomicUsize>().add(1).cast_const() };
        let data = unsafe { base.add(REGION_HEADER) };
        let cr = unsafe { (*read).load(Ordering::Relaxed) };
        let cw = unsafe { (*write).load(Ordering::Relaxed) };

        debug_assert_slot_aligned!(cr, slot);
        debug_assert_slot_aligned!(cw, slot);

        Self {
            read,
            write,
            cr,
            cw,
            data,
            len: data_len,
            slot,
            mask: data_len - 1,
        }
    }

    #[inline]
    pub(crate) fn slot_size(&self) -> usize {
        self.slot
    }

    /// Free bytes from the producer's perspective, for a caller that
    /// wants at least `wanted`. The cached limit is refreshed from the
    /// published read index only when it is insufficient.
    pub(crate) fn free_bytes(&mut self, wanted: usize) -> usize {
        let mut free = self.cr.wrapping_sub(self.cw);
        if free < wanted {
            // Pairs with the consumer's acquire fence before its index
            // store: once the new read index is visible here, the
            // consumer has finished loading from the freed slots.
            // SAFETY: `read` targets a live index word per the attach
            // contract.
            let published = unsafe { (*self.read).load(Ordering::Acquire) };
            self.cr = published.wrapping_add(self.len);
            free = self.cr.wrapping_sub(self.cw);
        }
        free
    }

    /// Used bytes from the consumer's perspective, for a caller that
    /// wants at least `wanted`.
    pub(crate) fn used_bytes(&mut self, wanted: usize) -> usize {
        let mut used = self.cw.wrapping_sub(self.cr);
        if used < wanted {
            // Pairs with the producer's release fence: payload bytes
            // stored before the index store are visible after this load.
            // SAFETY: `write` targets a live index word per the attach
            // contract.
            let published = unsafe { (*self.write).load(Ordering::Acquire) };
            self.cw = published;
            used = self.cw.wrapping_sub(self.cr);
        }
        used
    }

    /// Address of the next slot to produce into.
    #[inline]
    pub(crate) fn produce_slot(&self) -> *mut u8 {
        // SAFETY: `cw & mask` is in bounds and slot-aligned, so the slot
        // lies wholly inside the data area.
        unsafe { self.data.add(self.cw & self.mask) }
    }

    /// Address of the next slot to consume from.
    #[inline]
    pub(crate) fn consume_slot(&self) -> *mut u8 {
        // SAFETY: as `produce_slot`, with `cr`.
        unsafe { self.data.add(self.cr & self.mask) }
    }

    /// Publishes the slot at `cw` to the consumer.
    pub(crate) fn commit_produce(&mut self) {
        self.cw = self.cw.wrapping_add(self.slot);
        // Payload stores must be visible before the index store.
        fence(Ordering::Release);
        // SAFETY: `write` targets a live index word; this endpoint is
        // its only writer, so the load-then-store is not a race.
        let write = unsafe { &*self.write };
        let published = write.load(Ordering::Relaxed).wrapping_add(self.slot);
        write.store(published, Ordering::Relaxed);

        debug_assert_slot_aligned!(self.cw, self.slot);
    }

    /// Returns the slot at `cr` to the producer.
    pub(crate) fn commit_consume(&mut self) {
        self.cr = self.cr.wrapping_add(self.slot);
        // Payload loads must complete before the slot is republished.
        fence(Ordering::Acquire);
        // SAFETY: `read` targets a live index word; this endpoint is its
        // only writer.
        let read = unsafe { &*self.read };
        let published = read.load(Ordering::Relaxed).wrapping_add(self.slot);
        read.store(published, Ordering::Relaxed);

        debug_assert_slot_aligned!(self.cr, self.slot);
        // SAFETY: `write` targets a live index word. Coherence keeps this
        // load at or past the value `used_bytes` already observed, so it
        // can never trail the read index just published.
        debug_assert_occupancy!(
            published,
            unsafe { (*self.write).load(Ordering::Relaxed) },
            self.len
        );
    }

    #[cfg(test)]
    pub(crate) fn shadow_read(&self) -> usize {
        self.cr
    }

    #[cfg(test)]
    pub(crate) fn shadow_write(&self) -> usize {
        self.cw
    }

    #[cfg(test)]
    pub(crate) fn published_read(&self) -> usize {
        // SAFETY: test-only inspection of a live index word.
        unsafe { (*self.read).load(Ordering::Relaxed) }
    }

    #[cfg(test)]
    pub(crate) fn published_write(&self) -> usize {
        // SAFETY: test-only inspection of a live index word.
        unsafe { (*self.write).load(Ordering::Relaxed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn attach_pair(region: &Region, slot: usize) -> (Ring, Ring) {
        let data_len = Ring::data_len_for_region(region.len(), slot).unwrap();
        // SAFETY: the region outlives both rings; one is used strictly
        // as producer and one strictly as consumer.
        unsafe {
            (
                Ring::attach(region.as_mut_ptr(), data_len, slot),
                Ring::attach(region.as_mut_ptr(), data_len, slot),
            )
        }
    }

    #[test]
    fn test_region_sizing_rules() {
        assert_eq!(
            Ring::data_len_for_region(REGION_HEADER + 4096, 64),
            Some(4096)
        );
        assert_eq!(
            Ring::data_len_for_region(REGION_HEADER + 128, 64),
            Some(128)
        );

        // Too short for the header, empty, non-power-of-two, or not a
        // whole number of slots.
        assert_eq!(Ring::data_len_for_region(REGION_HEADER - 1, 64), None);
        assert_eq!(Ring::data_len_for_region(REGION_HEADER, 64), None);
        assert_eq!(Ring::data_len_for_region(REGION_HEADER + 100, 4), None);
        assert_eq!(Ring::data_len_for_region(REGION_HEADER + 32, 64), None);
    }

    #[test]
    fn test_free_and_used_accounting() {
        let region = Region::for_slots(64, 4);
        let (mut producer, mut consumer) = attach_pair(&region, 64);

        // Fresh ring: the first free query refreshes the write limit.
        assert_eq!(producer.free_bytes(64), 256);
        assert_eq!(producer.shadow_read(), 256);
        assert_eq!(consumer.used_bytes(64), 0);

        producer.commit_produce();
        assert_eq!(producer.published_write(), 64);
        assert_eq!(consumer.used_bytes(64), 64);

        consumer.commit_consume();
        assert_eq!(consumer.published_read(), 64);
        assert_eq!(consumer.used_bytes(64), 0);

        // The freed slot becomes reusable after a refresh.
        for _ in 0..3 {
            producer.commit_produce();
        }
        assert_eq!(producer.free_bytes(64), 64);
        assert_eq!(producer.shadow_read(), 64 + 256);
    }

    #[test]
    fn test_slot_addresses_cycle() {
        let region = Region::for_slots(64, 4);
        let (mut producer, mut consumer) = attach_pair(&region, 64);

        let base = producer.produce_slot();
        for i in 0..8usize {
            assert!(producer.free_bytes(64) >= 64);
            // SAFETY: both pointers lie inside the same data area.
            let offset = unsafe { producer.produce_slot().offset_from(base) } as usize;
            assert_eq!(offset, (i % 4) * 64);
            producer.commit_produce();

            assert!(consumer.used_bytes(64) >= 64);
            // SAFETY: as above.
            let offset = unsafe { consumer.consume_slot().offset_from(base) } as usize;
            assert_eq!(offset, (i % 4) * 64);
            consumer.commit_consume();
        }
    }

    #[test]
    fn test_attach_inherits_published_indices() {
        let region = Region::for_slots(64, 4);
        {
            let (mut producer, _) = attach_pair(&region, 64);
            producer.free_bytes(64);
            producer.commit_produce();
            producer.commit_produce();
        }

        // A late consumer sees the traffic already in flight.
        let (_, mut consumer) = attach_pair(&region, 64);
        assert_eq!(consumer.shadow_write(), 128);
        assert_eq!(consumer.used_bytes(64), 128);
    }
}
