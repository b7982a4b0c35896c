use std::marker::PhantomData;
use std::ptr;

use crate::error::ChannelError;
use crate::message::Message;
use crate::region::Region;
use crate::ring::Ring;

/// A lock-free, full-duplex message exchange between two endpoints over
/// caller-provided memory.
///
/// A channel owns up to two SPSC slot rings: an **egress** ring it
/// produces into and an **ingress** ring it consumes from. The peer
/// endpoint attaches to the same regions with the roles swapped. Rather
/// than copying messages in and out, the channel hands the caller a
/// [`Message`] cursor bound directly to ring memory:
///
/// - [`prepare`](Self::prepare) binds a cursor to the next writable
///   egress slot; after composing the payload, [`send`](Self::send)
///   publishes that slot to the peer.
/// - [`receive`](Self::receive) binds a cursor to the next readable
///   ingress slot; after decoding, [`release`](Self::release) returns
///   the slot to the peer.
///
/// Between `prepare`/`receive` and the matching `send`/`release` the
/// caller must not issue another `prepare`/`receive` on the same
/// direction; `send` and `release` enforce this by validating the
/// cursor against the expected slot.
///
/// All operations are wait-free: a few loads, a compare, and one fenced
/// store. `Full` and `Empty` are transient; callers poll, and may
/// yield or back off between attempts.
///
/// # Example
///
/// ```
/// use ringxchg::{Channel, Region};
///
/// let upstream = Region::for_slots(64, 64);
/// let downstream = Region::for_slots(64, 64);
///
/// let mut client = Channel::new(64, Some(&downstream), Some(&upstream))?;
/// let mut server = Channel::new(64, Some(&upstream), Some(&downstream))?;
///
/// let mut request = client.prepare()?;
/// request.write_u32(42)?;
/// client.send(&request)?;
///
/// let mut received = server.receive()?;
/// assert_eq!(received.read_u32()?, 42);
/// server.release(&received)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Channel<'buf> {
    ingress: Option<Ring>,
    egress: Option<Ring>,
    error: Option<ChannelError>,
    _region: PhantomData<&'buf [u8]>,
}

// SAFETY: an endpoint may migrate between threads; it cannot be shared
// (fallible operations take &mut self), and the regions it points into
// are kept alive for 'buf by the construction contract.
unsafe impl Send for Channel<'_> {}

impl<'buf> Channel<'buf> {
    /// Attaches an endpoint to its ring regions.
    ///
    /// `slot_size` must be a power of two. Each provided region must
    /// hold the two index words plus a power-of-two data area that is a
    /// whole number of slots; at least one region must be provided. The
    /// same `slot_size` and regions (with ingress/egress swapped) must
    /// be used by the peer endpoint.
    ///
    /// Shadow indices initialize from the published words, so attaching
    /// to a ring that already has traffic in flight is supported. Slots
    /// are handed out as-is; `prepare` does not zero stale bytes.
    ///
    /// # Errors
    ///
    /// [`ChannelError::MissingRegion`], [`ChannelError::InvalidSlotSize`],
    /// [`ChannelError::InvalidIngressSize`], or
    /// [`ChannelError::InvalidEgressSize`]. Nothing is modified on error.
    pub fn new(
        slot_size: usize,
        ingress: Option<&'buf Region>,
        egress: Option<&'buf Region>,
    ) -> Result<Self, ChannelError> {
        // SAFETY: a Region is word-aligned interior-mutable storage and
        // the borrows pin both regions for 'buf.
        unsafe {
            Self::from_raw(
                slot_size,
                ingress.map_or(ptr::null_mut(), Region::as_mut_ptr),
                ingress.map_or(0, Region::len),
                egress.map_or(ptr::null_mut(), Region::as_mut_ptr),
                egress.map_or(0, Region::len),
            )
        }
    }

    /// Attaches an endpoint to caller-mapped ring regions, e.g. shared
    /// memory mappings. A null pointer means the direction is absent.
    ///
    /// # Safety
    ///
    /// Each non-null region must be word aligned, valid for reads and
    /// writes of the given length, and stay mapped and stable for
    /// `'buf`. Across all processes, at most one endpoint may use a
    /// region as its egress and at most one as its ingress at a time.
    ///
    /// # Errors
    ///
    /// As [`Channel::new`].
    pub unsafe fn from_raw(
        slot_size: usize,
        ingress: *mut u8,
        sz_ingress: usize,
        egress: *mut u8,
        sz_egress: usize,
    ) -> Result<Self, ChannelError> {
        if ingress.is_null() && egress.is_null() {
            return Err(ChannelError::MissingRegion);
        }
        if !slot_size.is_power_of_two() {
            return Err(ChannelError::InvalidSlotSize);
        }

        let ingress_ring = if ingress.is_null() {
            None
        } else {
            let data_len = Ring::data_len_for_region(sz_ingress, slot_size)
                .ok_or(ChannelError::InvalidIngressSize)?;
            // SAFETY: forwarded from this function's contract.
            Some(unsafe { Ring::attach(ingress, data_len, slot_size) })
        };

        let egress_ring = if egress.is_null() {
            None
        } else {
            let data_len = Ring::data_len_for_region(sz_egress, slot_size)
                .ok_or(ChannelError::InvalidEgressSize)?;
            // SAFETY: forwarded from this function's contract.
            Some(unsafe { Ring::attach(egress, data_len, slot_size) })
        };

        Ok(Self {
            ingress: ingress_ring,
            egress: egress_ring,
            error: None,
            _region: PhantomData,
        })
    }

    /// Records `err` as the channel's last error and hands it back.
    #[inline]
    fn fail(&mut self, err: ChannelError) -> ChannelError {
        self.error = Some(err);
        err
    }

    /// Binds a cursor to the next writable egress slot.
    ///
    /// The slot's previous contents are not zeroed; the producer must
    /// overwrite every byte it wants the peer to read.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NoEgress`] on a receive-only channel;
    /// [`ChannelError::Full`] (transient) while every slot is
    /// outstanding.
    pub fn prepare(&mut self) -> Result<Message<'buf>, ChannelError> {
        let Some(ring) = self.egress.as_mut() else {
            return Err(self.fail(ChannelError::NoEgress));
        };

        let slot_size = ring.slot_size();
        if ring.free_bytes(slot_size) < slot_size {
            return Err(self.fail(ChannelError::Full));
        }

        let slot = ring.produce_slot();
        self.error = None;
        // SAFETY: the slot is owned by this producer until `send`
        // publishes it, and the backing region outlives 'buf.
        Ok(unsafe { Message::from_raw_parts(slot, slot_size) })
    }

    /// Publishes a prepared message to the peer.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidMessage`] when `message` is not bound to
    /// the next egress slot (a foreign or stale cursor); the ring is
    /// untouched. [`ChannelError::NoEgress`] on a receive-only channel.
    pub fn send(&mut self, message: &Message<'buf>) -> Result<(), ChannelError> {
        let Some(ring) = self.egress.as_mut() else {
            return Err(self.fail(ChannelError::NoEgress));
        };

        if message.capacity() != ring.slot_size() || message.as_ptr() != ring.produce_slot() {
            return Err(self.fail(ChannelError::InvalidMessage));
        }

        ring.commit_produce();
        self.error = None;
        Ok(())
    }

    /// Binds a cursor to the next readable ingress slot.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NoIngress`] on a send-only channel;
    /// [`ChannelError::Empty`] (transient) while no slot is published.
    pub fn receive(&mut self) -> Result<Message<'buf>, ChannelError> {
        let Some(ring) = self.ingress.as_mut() else {
            return Err(self.fail(ChannelError::NoIngress));
        };

        let slot_size = ring.slot_size();
        if ring.used_bytes(slot_size) < slot_size {
            return Err(self.fail(ChannelError::Empty));
        }

        let slot = ring.consume_slot();
        self.error = None;
        // SAFETY: the slot was published by the peer's release fence and
        // is owned by this consumer until `release` returns it.
        Ok(unsafe { Message::from_raw_parts(slot, slot_size) })
    }

    /// Returns a received message's slot to the peer.
    ///
    /// Borrowed payloads obtained from the message (list views) must be
    /// dropped first; the borrow checker enforces this for cursors, and
    /// the slot must be treated as gone once released.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidMessage`] when `message` is not bound to
    /// the next ingress slot. [`ChannelError::NoIngress`] on a send-only
    /// channel.
    pub fn release(&mut self, message: &Message<'buf>) -> Result<(), ChannelError> {
        let Some(ring) = self.ingress.as_mut() else {
            return Err(self.fail(ChannelError::NoIngress));
        };

        if message.capacity() != ring.slot_size() || message.as_ptr() != ring.consume_slot() {
            return Err(self.fail(ChannelError::InvalidMessage));
        }

        ring.commit_consume();
        self.error = None;
        Ok(())
    }

    /// The error recorded by the last failing operation, if any.
    #[inline]
    pub fn last_error(&self) -> Option<ChannelError> {
        self.error
    }

    #[cfg(test)]
    pub(crate) fn egress_ring(&self) -> &Ring {
        self.egress.as_ref().unwrap()
    }

    #[cfg(test)]
    pub(crate) fn ingress_ring(&self) -> &Ring {
        self.ingress.as_ref().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MessageError;
    use crate::region::REGION_HEADER;

    const PAYLOAD: &[u8] = b"alex forster";

    #[test]
    fn test_init_rejects_bad_sizes() {
        let slab = Region::new(REGION_HEADER + 4096);

        for len in 0..64 {
            let short = Region::new(len);
            assert_eq!(
                Channel::new(64, Some(&short), None).unwrap_err(),
                ChannelError::InvalidIngressSize
            );
            assert_eq!(
                Channel::new(64, None, Some(&short)).unwrap_err(),
                ChannelError::InvalidEgressSize
            );
        }

        assert_eq!(
            Channel::new(63, Some(&slab), None).unwrap_err(),
            ChannelError::InvalidSlotSize
        );
        assert_eq!(
            Channel::new(0, Some(&slab), None).unwrap_err(),
            ChannelError::InvalidSlotSize
        );
        assert_eq!(
            Channel::new(64, None, None).unwrap_err(),
            ChannelError::MissingRegion
        );
    }

    #[test]
    fn test_init_state() {
        let slab_a = Region::new(REGION_HEADER + 4096);
        let slab_b = Region::new(REGION_HEADER + 4096);

        let channel = Channel::new(64, Some(&slab_a), Some(&slab_b)).unwrap();
        assert_eq!(channel.last_error(), None);

        let ingress = channel.ingress_ring();
        assert_eq!(ingress.published_read(), 0);
        assert_eq!(ingress.published_write(), 0);
        assert_eq!(ingress.shadow_read(), 0);
        assert_eq!(ingress.shadow_write(), 0);

        let egress = channel.egress_ring();
        assert_eq!(egress.published_read(), 0);
        assert_eq!(egress.published_write(), 0);
        assert_eq!(egress.shadow_read(), 0);
        assert_eq!(egress.shadow_write(), 0);
    }

    #[test]
    fn test_direction_not_configured() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        assert_eq!(sender.receive().unwrap_err(), ChannelError::NoIngress);
        assert_eq!(sender.last_error(), Some(ChannelError::NoIngress));

        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();
        assert_eq!(receiver.prepare().unwrap_err(), ChannelError::NoEgress);
        assert_eq!(receiver.last_error(), Some(ChannelError::NoEgress));
    }

    #[test]
    fn test_receive_empty() {
        let slab = Region::new(REGION_HEADER + 4096);

        let _sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        assert_eq!(receiver.receive().unwrap_err(), ChannelError::Empty);
        assert_eq!(receiver.last_error(), Some(ChannelError::Empty));

        let ingress = receiver.ingress_ring();
        assert_eq!(ingress.shadow_read(), 0);
        assert_eq!(ingress.published_read(), 0);
        assert_eq!(ingress.shadow_write(), 0);
        assert_eq!(ingress.published_write(), 0);
    }

    #[test]
    fn test_fills_after_two_slots() {
        // 128 data bytes at 64 bytes per slot: two messages outstanding.
        let slab = Region::new(REGION_HEADER + 128);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        for _ in 0..2 {
            let mut message = sender.prepare().unwrap();
            message.write_u8_list(PAYLOAD).unwrap();
            sender.send(&message).unwrap();
        }

        assert_eq!(sender.prepare().unwrap_err(), ChannelError::Full);
        assert_eq!(sender.last_error(), Some(ChannelError::Full));

        // Draining one slot unblocks exactly one prepare.
        let message = receiver.receive().unwrap();
        receiver.release(&message).unwrap();
        let mut message = sender.prepare().unwrap();
        message.write_u8_list(PAYLOAD).unwrap();
        sender.send(&message).unwrap();
        assert_eq!(sender.prepare().unwrap_err(), ChannelError::Full);
    }

    #[test]
    fn test_send_accounting() {
        let slab = Region::new(REGION_HEADER + 128);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let _receiver = Channel::new(64, Some(&slab), None).unwrap();

        let mut message = sender.prepare().unwrap();
        message.write_u8_list(PAYLOAD).unwrap();
        sender.send(&message).unwrap();
        {
            let egress = sender.egress_ring();
            assert_eq!(egress.shadow_read(), 128);
            assert_eq!(egress.published_read(), 0);
            assert_eq!(egress.shadow_write(), 64);
            assert_eq!(egress.published_write(), 64);
        }

        let mut message = sender.prepare().unwrap();
        message.write_u8_list(PAYLOAD).unwrap();
        sender.send(&message).unwrap();
        {
            let egress = sender.egress_ring();
            assert_eq!(egress.shadow_read(), 128);
            assert_eq!(egress.published_read(), 0);
            assert_eq!(egress.shadow_write(), 128);
            assert_eq!(egress.published_write(), 128);
        }

        assert_eq!(sender.prepare().unwrap_err(), ChannelError::Full);
    }

    #[test]
    fn test_send_rejects_foreign_cursor() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();

        let mut foreign_buf = [0u8; 64];
        let foreign = Message::new(&mut foreign_buf).unwrap();
        assert_eq!(sender.send(&foreign).unwrap_err(), ChannelError::InvalidMessage);
        assert_eq!(sender.last_error(), Some(ChannelError::InvalidMessage));

        // A wrong-length cursor over the right address is also refused.
        let message = sender.prepare().unwrap();
        // SAFETY: shrinking the view of a slot this endpoint owns.
        let short = unsafe { Message::from_raw_parts(message.as_ptr(), 32) };
        assert_eq!(sender.send(&short).unwrap_err(), ChannelError::InvalidMessage);

        // The genuine cursor still goes through.
        sender.send(&message).unwrap();

        // A stale cursor from the previous slot does not.
        assert_eq!(sender.send(&message).unwrap_err(), ChannelError::InvalidMessage);
    }

    #[test]
    fn test_release_rejects_foreign_cursor() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        let mut message = sender.prepare().unwrap();
        message.write_bool(true).unwrap();
        sender.send(&message).unwrap();

        let mut foreign_buf = [0u8; 64];
        let foreign = Message::new(&mut foreign_buf).unwrap();
        assert_eq!(
            receiver.release(&foreign).unwrap_err(),
            ChannelError::InvalidMessage
        );

        let received = receiver.receive().unwrap();
        receiver.release(&received).unwrap();
        assert_eq!(
            receiver.release(&received).unwrap_err(),
            ChannelError::InvalidMessage
        );
    }

    #[test]
    fn test_round_trip_payload() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        let mut message = sender.prepare().unwrap();
        message.write_u8_list(PAYLOAD).unwrap();
        message.write_i32(-40).unwrap();
        sender.send(&message).unwrap();

        let mut received = receiver.receive().unwrap();
        {
            let view = received.read_u8_list().unwrap();
            assert_eq!(view.as_bytes(), PAYLOAD);
        }
        assert_eq!(received.read_i32().unwrap(), -40);
        assert_eq!(received.peek().unwrap_err(), MessageError::InvalidType);
        receiver.release(&received).unwrap();
    }

    #[test]
    fn test_wraparound_index_accounting() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        for _ in 0..96 {
            let mut message = sender.prepare().unwrap();
            message.write_u8_list(PAYLOAD).unwrap();
            sender.send(&message).unwrap();

            let mut received = receiver.receive().unwrap();
            {
                let view = received.read_u8_list().unwrap();
                assert_eq!(view.as_bytes(), PAYLOAD);
            }
            receiver.release(&received).unwrap();
        }

        // 96 slots of 64 bytes moved both indices past one full wrap of
        // the 4096-byte data area.
        let egress = sender.egress_ring();
        assert_eq!(egress.shadow_read(), 8192);
        assert_eq!(egress.published_read(), 6144);
        assert_eq!(egress.shadow_write(), 6144);
        assert_eq!(egress.published_write(), 6144);

        let ingress = receiver.ingress_ring();
        assert_eq!(ingress.shadow_read(), 6144);
        assert_eq!(ingress.published_read(), 6144);
        assert_eq!(ingress.shadow_write(), 6144);
        assert_eq!(ingress.published_write(), 6144);
    }

    #[test]
    fn test_capacity_exact_slot_count() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();

        for i in 0..64u32 {
            let mut message = sender.prepare().unwrap();
            message.write_u32(i).unwrap();
            sender.send(&message).unwrap();
        }
        assert_eq!(sender.prepare().unwrap_err(), ChannelError::Full);

        let mut received = receiver.receive().unwrap();
        assert_eq!(received.read_u32().unwrap(), 0);
        receiver.release(&received).unwrap();

        let mut message = sender.prepare().unwrap();
        message.write_u32(64).unwrap();
        sender.send(&message).unwrap();
        assert_eq!(sender.prepare().unwrap_err(), ChannelError::Full);
    }

    #[test]
    fn test_attach_to_ring_in_flight() {
        let slab = Region::new(REGION_HEADER + 4096);

        let mut sender = Channel::new(64, None, Some(&slab)).unwrap();
        for i in 0..3i64 {
            let mut message = sender.prepare().unwrap();
            message.write_i64(i).unwrap();
            sender.send(&message).unwrap();
        }

        // A consumer attaching late inherits the published indices.
        let mut receiver = Channel::new(64, Some(&slab), None).unwrap();
        for i in 0..3i64 {
            let mut received = receiver.receive().unwrap();
            assert_eq!(received.read_i64().unwrap(), i);
            receiver.release(&received).unwrap();
        }
        assert_eq!(receiver.receive().unwrap_err(), ChannelError::Empty);
    }
}
