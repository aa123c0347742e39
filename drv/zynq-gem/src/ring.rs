//! BD ring manager (C5): RX/TX buffer descriptor rings and their
//! producer/consumer protocol against the MAC.
//!
//! The *technique* here -- descriptors as arrays of `AtomicU32` words with
//! explicit `Ordering`, paired one-to-one with statically reserved buffers,
//! a WRAP bit fixed at the terminal index that never moves -- is carried
//! over from the reference stack's own ring manager. The BD word layout
//! itself is not: the GEM lays SOF/EOF/USED/WRAP/LAST out differently than
//! the Synopsys GMAC descriptors the reference stack targets, so the bit
//! positions below are this crate's own (documented) convention rather than
//! inherited ones.

#![allow(clippy::len_without_is_empty)]

use core::cell::{RefCell, UnsafeCell};
use core::sync::atomic::{AtomicU32, Ordering};
use critical_section::Mutex;
use gem_err::GemError;

#[allow(clippy::declare_interior_mutable_const)]
const ATOMIC_ZERO: AtomicU32 = AtomicU32::new(0);

/// A statically-reserved packet buffer shared with the GEM's DMA engine.
/// Must live in non-cacheable, non-bufferable memory (spec.md's invariant
/// 7); this module has no way to enforce that itself, only the linker
/// script placing the enclosing statics does.
pub struct Buffer<const N: usize>(UnsafeCell<[u8; N]>);

unsafe impl<const N: usize> Sync for Buffer<N> {}

impl<const N: usize> Buffer<N> {
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; N]))
    }
}

/// RX BD word 0 (`addr`): buffer address in bits [31:2], `WRAP` in bit 1,
/// `USED` in bit 0.
mod rx_addr {
    pub const USED: u32 = 1 << 0;
    pub const WRAP: u32 = 1 << 1;
    pub const ADDR_MASK: u32 = !0b11;
}

/// RX BD word 1 (`ctrl`): classification flags, `EOF`/`SOF`, and a 13-bit
/// length field.
mod rx_ctrl {
    pub const LENGTH_MASK: u32 = (1 << 13) - 1;
    pub const SOF: u32 = 1 << 13;
    pub const EOF: u32 = 1 << 14;
}

/// TX BD word 1 (`ctrl`): `USED`/`WRAP` live here (unlike RX, where they're
/// in `addr`), plus a 14-bit length field, `LAST`, and sticky error bits.
mod tx_ctrl {
    pub const LENGTH_MASK: u32 = (1 << 14) - 1;
    pub const LAST: u32 = 1 << 15;
    pub const RETRY_LIMIT_EXCEEDED: u32 = 1 << 26;
    pub const BUFFERS_EXHAUSTED: u32 = 1 << 27;
    pub const UNDERRUN: u32 = 1 << 28;
    pub const LATE_COLLISION: u32 = 1 << 29;
    pub const WRAP: u32 = 1 << 30;
    pub const USED: u32 = 1 << 31;
}

pub use tx_ctrl::{
    BUFFERS_EXHAUSTED, LATE_COLLISION, RETRY_LIMIT_EXCEEDED, UNDERRUN,
};

#[repr(transparent)]
pub struct RxBd {
    words: [AtomicU32; 2],
}

impl RxBd {
    pub const fn new() -> Self {
        Self {
            words: [ATOMIC_ZERO; 2],
        }
    }
}

#[repr(transparent)]
pub struct TxBd {
    words: [AtomicU32; 2],
}

impl TxBd {
    pub const fn new() -> Self {
        Self {
            words: [ATOMIC_ZERO; 2],
        }
    }
}

/// Classification summary handed up from a completed RX BD's `ctrl` word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RxBdInfo {
    pub sof: bool,
    pub eof: bool,
    pub length: usize,
}

pub struct RxRing<const BUFSZ: usize> {
    storage: &'static [RxBd],
    buffers: &'static [Buffer<BUFSZ>],
    next_to_process: core::cell::Cell<usize>,
}

impl<const BUFSZ: usize> RxRing<BUFSZ> {
    /// # Panics
    /// If `storage` and `buffers` differ in length.
    pub fn new(
        storage: &'static mut [RxBd],
        buffers: &'static mut [Buffer<BUFSZ>],
    ) -> Self {
        assert_eq!(storage.len(), buffers.len());
        let (storage, buffers) = (&*storage, &*buffers);
        let last = storage.len() - 1;
        for (i, (bd, buf)) in storage.iter().zip(buffers).enumerate() {
            let addr = buf.0.get() as u32;
            let wrap = if i == last { rx_addr::WRAP } else { 0 };
            bd.words[1].store(0, Ordering::Relaxed);
            bd.words[0].store(addr | wrap, Ordering::Release);
        }
        Self {
            storage,
            buffers,
            next_to_process: core::cell::Cell::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.storage.len()
    }

    pub fn base_ptr(&self) -> *const RxBd {
        self.storage.as_ptr()
    }

    pub fn next_to_process(&self) -> usize {
        self.next_to_process.get()
    }

    pub fn set_next_to_process(&self, idx: usize) {
        self.next_to_process.set(idx % self.storage.len());
    }

    /// `true` if BD `i` is currently owned by software (a completed frame
    /// waiting to be read out).
    pub fn is_used(&self, i: usize) -> bool {
        self.storage[i].words[0].load(Ordering::Acquire) & rx_addr::USED != 0
    }

    pub fn info(&self, i: usize) -> RxBdInfo {
        let ctrl = self.storage[i].words[1].load(Ordering::Acquire);
        RxBdInfo {
            sof: ctrl & rx_ctrl::SOF != 0,
            eof: ctrl & rx_ctrl::EOF != 0,
            length: (ctrl & rx_ctrl::LENGTH_MASK) as usize,
        }
    }

    /// Borrows the payload bytes of BD `i`. Caller must have already
    /// confirmed `is_used(i)` and must not retain the slice past returning
    /// the BD to the MAC with [`Self::release`].
    pub fn payload(&self, i: usize) -> &[u8] {
        let len = self.info(i).length;
        let buf = unsafe { &*self.buffers[i].0.get() };
        &buf[..len.min(BUFSZ)]
    }

    /// Clears `USED`, preserving `WRAP` and the buffer address, returning
    /// ownership of BD `i` to the MAC.
    pub fn release(&self, i: usize) {
        let addr = self.storage[i].words[0].load(Ordering::Relaxed);
        self.storage[i].words[1].store(0, Ordering::Relaxed);
        self.storage[i].words[0]
            .store(addr & !rx_addr::USED, Ordering::Release);
    }

    /// Direct access to BD `i`'s buffer, for tests that simulate a DMA write
    /// landing before the BD is marked used.
    ///
    /// # Safety
    /// Caller must not alias this with another live reference to the same
    /// buffer.
    #[cfg(test)]
    pub(crate) unsafe fn buffer_mut_for_test(&self, i: usize) -> &mut [u8] {
        &mut *self.buffers[i].0.get()
    }

    /// Marks BD `i` used with the given length/SOF/EOF flags, simulating a
    /// completed DMA write, without going through real hardware.
    #[cfg(test)]
    pub(crate) fn mark_used_for_test(
        &self,
        i: usize,
        length: usize,
        sof: bool,
        eof: bool,
    ) {
        let addr = self.storage[i].words[0].load(Ordering::Relaxed);
        let mut ctrl = length as u32 & rx_ctrl::LENGTH_MASK;
        if sof {
            ctrl |= rx_ctrl::SOF;
        }
        if eof {
            ctrl |= rx_ctrl::EOF;
        }
        self.storage[i].words[1].store(ctrl, Ordering::Relaxed);
        self.storage[i].words[0]
            .store(addr | rx_addr::USED, Ordering::Release);
    }
}

struct TxBookkeeping {
    next_to_use: usize,
    next_to_process: usize,
    free_count: usize,
}

pub struct TxRing<const BUFSZ: usize> {
    storage: &'static [TxBd],
    buffers: &'static [Buffer<BUFSZ>],
    book: Mutex<RefCell<TxBookkeeping>>,
}

impl<const BUFSZ: usize> TxRing<BUFSZ> {
    /// # Panics
    /// If `storage` and `buffers` differ in length.
    pub fn new(
        storage: &'static mut [TxBd],
        buffers: &'static mut [Buffer<BUFSZ>],
    ) -> Self {
        assert_eq!(storage.len(), buffers.len());
        let (storage, buffers) = (&*storage, &*buffers);
        let last = storage.len() - 1;
        for (i, bd) in storage.iter().enumerate() {
            let wrap = if i == last { tx_ctrl::WRAP } else { 0 };
            bd.words[0].store(0, Ordering::Relaxed);
            bd.words[1].store(tx_ctrl::USED | wrap, Ordering::Release);
        }
        Self {
            storage,
            buffers,
            book: Mutex::new(RefCell::new(TxBookkeeping {
                next_to_use: 0,
                next_to_process: 0,
                free_count: storage.len(),
            })),
        }
    }

    pub fn count(&self) -> usize {
        self.storage.len()
    }

    pub fn base_ptr(&self) -> *const TxBd {
        self.storage.as_ptr()
    }

    pub fn free_count(&self) -> usize {
        critical_section::with(|cs| self.book.borrow(cs).borrow().free_count)
    }

    /// Reserves the next `n` BDs for the caller under the ring mutex,
    /// returning their starting index. Fails with `NoBufferSpace` if fewer
    /// than `n` are currently free.
    pub fn take(&self, n: usize) -> Result<usize, GemError> {
        critical_section::with(|cs| {
            let mut book = self.book.borrow(cs).borrow_mut();
            if book.free_count < n {
                return Err(GemError::NoBufferSpace);
            }
            let start = book.next_to_use;
            book.next_to_use = (start + n) % self.storage.len();
            book.free_count -= n;
            Ok(start)
        })
    }

    pub fn index(&self, i: usize) -> usize {
        i % self.storage.len()
    }

    /// Mutable access to BD `i`'s buffer. Caller must hold exclusive
    /// responsibility for that BD (just returned by `take`, and not yet
    /// handed to the MAC).
    ///
    /// # Safety
    /// Caller must not alias this with another live reference to the same
    /// buffer.
    pub unsafe fn buffer_mut(&self, i: usize) -> &mut [u8] {
        &mut *self.buffers[i].0.get()
    }

    /// Writes BD `i`'s `ctrl` word with `length` bytes and `last` set if
    /// this is the final fragment, preserving WRAP and clearing USED --
    /// handing the buffer to the MAC. Sets `addr` first, `ctrl` second,
    /// with a release store on `ctrl` so the DMA engine never observes the
    /// ownership flip before the buffer contents are visible to it.
    pub fn fill(&self, i: usize, length: usize, last: bool) {
        let wrap = self.storage[i].words[1].load(Ordering::Relaxed)
            & tx_ctrl::WRAP;
        let addr = self.buffers[i].0.get() as u32;
        self.storage[i].words[0].store(addr, Ordering::Relaxed);
        let mut ctrl = wrap | (length as u32 & tx_ctrl::LENGTH_MASK);
        if last {
            ctrl |= tx_ctrl::LAST;
        }
        self.storage[i].words[1].store(ctrl, Ordering::Release);
    }

    pub(crate) fn raw_ctrl(&self, i: usize) -> u32 {
        self.storage[i].words[1].load(Ordering::Acquire)
    }

    /// Walks BDs from `next_to_process` up to and including the first BD
    /// carrying `LAST`, returning ownership of each to software and
    /// bulk-updating the bookkeeping. `on_bd` is called with each BD's
    /// index and its `ctrl` word as observed just before the ownership
    /// flip, so a caller can pull sticky error bits out of it. Returns the
    /// number of BDs reclaimed, or `None` if the chain is not yet complete
    /// (no `LAST` BD found before running into a MAC-owned BD).
    pub fn reclaim_done(&self, mut on_bd: impl FnMut(usize, u32)) -> Option<usize> {
        critical_section::with(|cs| {
            let mut book = self.book.borrow(cs).borrow_mut();
            let mut i = book.next_to_process;
            let mut reclaimed = 0;
            loop {
                let ctrl = self.raw_ctrl(i);
                if ctrl & tx_ctrl::USED != 0 {
                    // Already software-owned: nothing left to reclaim this
                    // pass (can happen if the ring was already drained).
                    return if reclaimed > 0 { Some(reclaimed) } else { None };
                }
                on_bd(i, ctrl);
                let wrap = ctrl & tx_ctrl::WRAP;
                let last = ctrl & tx_ctrl::LAST != 0;
                self.storage[i].words[1]
                    .store(wrap | tx_ctrl::USED, Ordering::Release);
                reclaimed += 1;
                i = (i + 1) % self.storage.len();
                if last {
                    book.next_to_process = i;
                    book.free_count += reclaimed;
                    return Some(reclaimed);
                }
            }
        })
    }

    /// Error bits sticky on a just-reclaimed BD's `ctrl` word, if any were
    /// set before `reclaim_done` cleared them. Callers should inspect this
    /// before `reclaim_done`'s release store if they care about which BD
    /// reported it; kept here as a pure decode helper.
    pub fn error_bits(ctrl: u32) -> impl Iterator<Item = gem_err::ControllerErrorBit> {
        use gem_err::ControllerErrorBit::*;
        let mut bits = [
            (tx_ctrl::RETRY_LIMIT_EXCEEDED, Retry),
            (tx_ctrl::UNDERRUN, Underrun),
            (tx_ctrl::BUFFERS_EXHAUSTED, BuffersExhausted),
            (tx_ctrl::LATE_COLLISION, LateCollision),
        ]
        .into_iter();
        core::iter::from_fn(move || {
            for (mask, bit) in bits.by_ref() {
                if ctrl & mask != 0 {
                    return Some(bit);
                }
            }
            None
        })
    }

    /// Forces a BD's raw `ctrl` word, for tests elsewhere in the crate that
    /// need to simulate a MAC-reported error on an otherwise-normal
    /// completion.
    #[cfg(test)]
    pub(crate) fn force_ctrl_for_test(&self, i: usize, value: u32) {
        self.storage[i].words[1].store(value, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFSZ: usize = 64;
    const COUNT: usize = 4;

    fn leak_rx() -> (&'static mut [RxBd], &'static mut [Buffer<BUFSZ>]) {
        let storage: Vec<RxBd> = (0..COUNT).map(|_| RxBd::new()).collect();
        let buffers: Vec<Buffer<BUFSZ>> =
            (0..COUNT).map(|_| Buffer::new()).collect();
        (
            Box::leak(storage.into_boxed_slice()),
            Box::leak(buffers.into_boxed_slice()),
        )
    }

    fn leak_tx() -> (&'static mut [TxBd], &'static mut [Buffer<BUFSZ>]) {
        let storage: Vec<TxBd> = (0..COUNT).map(|_| TxBd::new()).collect();
        let buffers: Vec<Buffer<BUFSZ>> =
            (0..COUNT).map(|_| Buffer::new()).collect();
        (
            Box::leak(storage.into_boxed_slice()),
            Box::leak(buffers.into_boxed_slice()),
        )
    }

    #[test]
    fn exactly_one_wrap_bit_at_the_terminal_index() {
        let (s, b) = leak_rx();
        let ring = RxRing::<BUFSZ>::new(s, b);
        let mut wraps = 0;
        for i in 0..ring.count() {
            let addr = ring.storage[i].words[0].load(Ordering::Relaxed);
            if addr & rx_addr::WRAP != 0 {
                wraps += 1;
                assert_eq!(i, ring.count() - 1);
            }
        }
        assert_eq!(wraps, 1);
    }

    #[test]
    fn fresh_rx_ring_has_nothing_used() {
        let (s, b) = leak_rx();
        let ring = RxRing::<BUFSZ>::new(s, b);
        for i in 0..ring.count() {
            assert!(!ring.is_used(i));
        }
    }

    #[test]
    fn fresh_tx_ring_is_entirely_free() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        assert_eq!(ring.free_count(), COUNT);
    }

    #[test]
    fn take_reduces_free_count_and_advances_next_to_use() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        let start = ring.take(2).unwrap();
        assert_eq!(start, 0);
        assert_eq!(ring.free_count(), COUNT - 2);
        let start2 = ring.take(1).unwrap();
        assert_eq!(start2, 2);
    }

    #[test]
    fn take_fails_when_insufficient_free_bds() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        assert_eq!(ring.take(COUNT + 1), Err(GemError::NoBufferSpace));
        assert_eq!(ring.free_count(), COUNT);
    }

    #[test]
    fn fill_then_reclaim_round_trips_ownership() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        let start = ring.take(1).unwrap();
        ring.fill(start, 42, true);
        assert_eq!(ring.raw_ctrl(start) & tx_ctrl::USED, 0);
        let reclaimed = ring.reclaim_done(|_, _| {}).unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(ring.free_count(), COUNT);
        assert_ne!(ring.raw_ctrl(start) & tx_ctrl::USED, 0);
    }

    #[test]
    fn reclaim_stops_at_first_last_bit_spanning_two_bds() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        let start = ring.take(2).unwrap();
        ring.fill(start, BUFSZ, false);
        ring.fill(ring.index(start + 1), 1, true);
        let reclaimed = ring.reclaim_done(|_, _| {}).unwrap();
        assert_eq!(reclaimed, 2);
        assert_eq!(ring.free_count(), COUNT);
    }

    #[test]
    fn reclaim_returns_none_when_mac_still_owns_the_head() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        let start = ring.take(1).unwrap();
        ring.fill(start, 10, true);
        // Reclaim once, then try again with nothing new queued: the head
        // BD is software-owned (USED set), so there is nothing to do.
        ring.reclaim_done(|_, _| {}).unwrap();
        assert_eq!(ring.reclaim_done(|_, _| {}), None);
    }

    #[test]
    fn reclaim_callback_observes_sticky_error_bits_before_clearing() {
        let (s, b) = leak_tx();
        let ring = TxRing::<BUFSZ>::new(s, b);
        let start = ring.take(1).unwrap();
        ring.fill(start, 10, true);
        // Simulate the MAC reporting a late collision on the completed BD.
        let ctrl = ring.raw_ctrl(start);
        ring.storage[start].words[1]
            .store(ctrl | tx_ctrl::LATE_COLLISION, Ordering::Relaxed);

        let mut saw_index = None;
        let mut saw_late_collision = false;
        ring.reclaim_done(|i, ctrl| {
            saw_index = Some(i);
            saw_late_collision = TxRing::<BUFSZ>::error_bits(ctrl)
                .any(|b| b == gem_err::ControllerErrorBit::LateCollision);
        });
        assert_eq!(saw_index, Some(start));
        assert!(saw_late_collision);
    }
}
