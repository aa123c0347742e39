//! RX path (C7): worker-side frame reassembly off the RX BD ring.

use crate::ring::RxRing;
use gem_err::GemError;

/// The capabilities the RX path needs from the network stack above it:
/// a packet allocator, a hand-off, and link-state notifications (the
/// latter two live here rather than on a narrower trait because the link
/// controller, C8, drives them through the same object).
pub trait UpperStack {
    type Packet: Packet;
    fn allocate_rx_packet(&mut self, len: usize) -> Option<Self::Packet>;
    fn submit_rx_packet(&mut self, packet: Self::Packet) -> Result<(), ()>;
    fn carrier_on(&mut self, speed: zynq_gem_phy::LinkSpeed);
    fn carrier_off(&mut self);
}

/// A fragmentable destination buffer. `fragment_mut` is called repeatedly
/// with increasing `offset` until the whole frame has been copied in;
/// implementations may back this with one contiguous buffer (a single
/// fragment covering the whole length) or a real scatter list.
pub trait Packet {
    fn fragment_mut(&mut self, offset: usize) -> Option<&mut [u8]>;
}

/// What happened to one dequeued frame, returned for logging/counting by
/// the caller (the device ties this into its trace ring and, for
/// `Dropped`/`Malformed`, its error counters).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RxEvent {
    Delivered { length: usize },
    DroppedLinkDown { length: usize },
    DroppedAllocFailed { length: usize },
    DroppedSubmitFailed,
    Malformed,
    Desync,
}

/// Copies the payload of BDs `sof..=eof` (wrapping) into `packet`,
/// splitting each BD's bytes across successive fragments as tailroom
/// requires.
fn copy_frame<const BUFSZ: usize, P: Packet>(
    ring: &RxRing<BUFSZ>,
    sof: usize,
    eof: usize,
    packet: &mut P,
) -> Result<(), GemError> {
    let mut dest_offset = 0;
    let mut i = sof;
    loop {
        let payload = ring.payload(i);
        let mut src_offset = 0;
        while src_offset < payload.len() {
            let frag = packet
                .fragment_mut(dest_offset)
                .ok_or(GemError::Internal)?;
            if frag.is_empty() {
                return Err(GemError::Internal);
            }
            let take = (payload.len() - src_offset).min(frag.len());
            frag[..take]
                .copy_from_slice(&payload[src_offset..src_offset + take]);
            src_offset += take;
            dest_offset += take;
        }
        if i == eof {
            return Ok(());
        }
        i = (i + 1) % ring.count();
    }
}

/// Processes every complete frame currently sitting at the head of the RX
/// ring, handing each off to `stack` (or dropping it, per `link_up`) and
/// returning ownership of its BDs to the MAC. Calls `on_event` once per
/// frame (or per malformed/desync condition) so the caller can log and
/// count without this function owning a trace ring itself.
pub fn process_rx_done<const BUFSZ: usize, U: UpperStack>(
    ring: &RxRing<BUFSZ>,
    stack: &mut U,
    link_up: bool,
    mut on_event: impl FnMut(RxEvent),
) {
    loop {
        let sof_idx = ring.next_to_process();
        if !ring.is_used(sof_idx) {
            break;
        }
        let sof_info = ring.info(sof_idx);
        if !sof_info.sof {
            on_event(RxEvent::Malformed);
            break;
        }

        let mut eof_idx = sof_idx;
        let mut total_len = sof_info.length;
        let mut found_eof = sof_info.eof;
        let mut steps = 0;
        while !found_eof {
            steps += 1;
            if steps >= ring.count() {
                on_event(RxEvent::Desync);
                return;
            }
            let next = (eof_idx + 1) % ring.count();
            if !ring.is_used(next) {
                // DMA hasn't finished writing the rest of this frame yet;
                // stop and retry on the next RX-done event.
                return;
            }
            let info = ring.info(next);
            total_len += info.length;
            eof_idx = next;
            found_eof = info.eof;
        }

        if link_up {
            match stack.allocate_rx_packet(total_len) {
                Some(mut packet) => {
                    if copy_frame(ring, sof_idx, eof_idx, &mut packet).is_ok() {
                        if stack.submit_rx_packet(packet).is_err() {
                            on_event(RxEvent::DroppedSubmitFailed);
                        } else {
                            on_event(RxEvent::Delivered { length: total_len });
                        }
                    } else {
                        on_event(RxEvent::DroppedSubmitFailed);
                    }
                }
                None => on_event(RxEvent::DroppedAllocFailed { length: total_len }),
            }
        } else {
            on_event(RxEvent::DroppedLinkDown { length: total_len });
        }

        let mut i = sof_idx;
        loop {
            ring.release(i);
            if i == eof_idx {
                break;
            }
            i = (i + 1) % ring.count();
        }
        ring.set_next_to_process((eof_idx + 1) % ring.count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Buffer;

    const BUFSZ: usize = 8;

    fn leak_ring(count: usize) -> &'static RxRing<BUFSZ> {
        use crate::ring::RxBd;
        let storage: Vec<RxBd> = (0..count).map(|_| RxBd::new()).collect();
        let buffers: Vec<Buffer<BUFSZ>> =
            (0..count).map(|_| Buffer::new()).collect();
        let ring = RxRing::new(
            Box::leak(storage.into_boxed_slice()),
            Box::leak(buffers.into_boxed_slice()),
        );
        Box::leak(Box::new(ring))
    }

    /// Writes `data` into BD `i`'s buffer and marks it used with the given
    /// SOF/EOF flags, simulating a completed DMA write.
    fn complete_bd(ring: &RxRing<BUFSZ>, i: usize, data: &[u8], sof: bool, eof: bool) {
        let buf = unsafe { ring.buffer_mut_for_test(i) };
        buf[..data.len()].copy_from_slice(data);
        ring.mark_used_for_test(i, data.len(), sof, eof);
    }

    struct TestPacket {
        buf: std::vec::Vec<u8>,
    }

    impl Packet for TestPacket {
        fn fragment_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
            if offset >= self.buf.len() {
                None
            } else {
                Some(&mut self.buf[offset..])
            }
        }
    }

    struct TestStack {
        delivered: std::vec::Vec<std::vec::Vec<u8>>,
        allocate_fails: bool,
    }

    impl UpperStack for TestStack {
        type Packet = TestPacket;
        fn allocate_rx_packet(&mut self, len: usize) -> Option<TestPacket> {
            if self.allocate_fails {
                None
            } else {
                Some(TestPacket {
                    buf: std::vec![0u8; len],
                })
            }
        }
        fn submit_rx_packet(&mut self, packet: TestPacket) -> Result<(), ()> {
            self.delivered.push(packet.buf);
            Ok(())
        }
        fn carrier_on(&mut self, _speed: zynq_gem_phy::LinkSpeed) {}
        fn carrier_off(&mut self) {}
    }

    #[test]
    fn single_bd_frame_is_delivered_whole() {
        let ring = leak_ring(4);
        complete_bd(ring, 0, b"hello!!!", true, true);
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: false,
        };
        let mut events = std::vec::Vec::new();
        process_rx_done(ring, &mut stack, true, |e| events.push(e));

        assert_eq!(stack.delivered, [b"hello!!!".to_vec()]);
        assert_eq!(events, [RxEvent::Delivered { length: 8 }]);
        assert!(!ring.is_used(0));
        assert_eq!(ring.next_to_process(), 1);
    }

    #[test]
    fn frame_spanning_three_bds_is_reassembled_in_order() {
        let ring = leak_ring(4);
        complete_bd(ring, 0, &[1, 2, 3, 4], true, false);
        complete_bd(ring, 1, &[5, 6, 7, 8], false, false);
        complete_bd(ring, 2, &[9, 10], false, true);
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: false,
        };
        process_rx_done(ring, &mut stack, true, |_| {});

        assert_eq!(stack.delivered, [std::vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]]);
        for i in 0..3 {
            assert!(!ring.is_used(i));
        }
        assert_eq!(ring.next_to_process(), 3);
    }

    #[test]
    fn link_down_drops_without_allocating() {
        let ring = leak_ring(4);
        complete_bd(ring, 0, b"data", true, true);
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: false,
        };
        let mut events = std::vec::Vec::new();
        process_rx_done(ring, &mut stack, false, |e| events.push(e));

        assert!(stack.delivered.is_empty());
        assert_eq!(events, [RxEvent::DroppedLinkDown { length: 4 }]);
        assert!(!ring.is_used(0));
    }

    #[test]
    fn allocation_failure_is_reported_and_bd_still_released() {
        let ring = leak_ring(4);
        complete_bd(ring, 0, b"data", true, true);
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: true,
        };
        let mut events = std::vec::Vec::new();
        process_rx_done(ring, &mut stack, true, |e| events.push(e));

        assert_eq!(events, [RxEvent::DroppedAllocFailed { length: 4 }]);
        assert!(!ring.is_used(0));
    }

    #[test]
    fn missing_sof_is_reported_as_malformed() {
        let ring = leak_ring(4);
        // Mark used without SOF: simulates desync.
        ring.mark_used_for_test(0, 4, false, true);
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: false,
        };
        let mut events = std::vec::Vec::new();
        process_rx_done(ring, &mut stack, true, |e| events.push(e));

        assert_eq!(events, [RxEvent::Malformed]);
        // Desync: ring is left alone rather than torn down.
        assert_eq!(ring.next_to_process(), 0);
    }

    #[test]
    fn incomplete_frame_stops_without_consuming_the_sof_bd() {
        let ring = leak_ring(4);
        complete_bd(ring, 0, &[1, 2, 3, 4], true, false);
        // BD 1 never arrives (DMA still in flight).
        let mut stack = TestStack {
            delivered: std::vec::Vec::new(),
            allocate_fails: false,
        };
        process_rx_done(ring, &mut stack, true, |_| {});

        assert!(stack.delivered.is_empty());
        assert!(ring.is_used(0));
        assert_eq!(ring.next_to_process(), 0);
    }
}
