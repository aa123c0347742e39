//! ISR / worker bridge (C9): translates MAC interrupts into deferred worker
//! events without doing ring, PHY, or allocation work in interrupt context.

use crate::regs::{isr as isr_bits, rsr, tsr, GemRegs};
use crate::trace::{self, Trace};
use core::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    pub struct WorkerEvents: u32 {
        const POLL_PHY = 1 << 0;
        const RX_DONE  = 1 << 1;
        const TX_DONE  = 1 << 2;
    }
}

/// Non-blocking mailbox the ISR and the 1 Hz timer post into, drained by the
/// worker. Posting is a saturating OR rather than a bounded queue: spec.md
/// section 7 observes that `TX_DONE`/`RX_DONE` are level-derived from ring
/// state the worker itself clears, so coalescing two posts before the worker
/// wakes loses nothing -- the next drain still finds the ring non-empty and
/// processes every queued frame in one pass. This also gives "a full inbox
/// discards" for free, since an OR into an already-set bit can never fail or
/// overflow.
pub struct WorkerInbox(AtomicU32);

impl WorkerInbox {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn post(&self, events: WorkerEvents) {
        self.0.fetch_or(events.bits(), Ordering::Release);
    }

    /// Atomically takes and clears the currently pending set.
    pub fn take(&self) -> WorkerEvents {
        WorkerEvents::from_bits_truncate(self.0.swap(0, Ordering::Acquire))
    }
}

impl Default for WorkerInbox {
    fn default() -> Self {
        Self::new()
    }
}

/// ISR prologue (spec.md section 4.9). Reads `intr_status`, classifies it
/// into a `WorkerEvents` bitmask, traces any bits in the "error, log only"
/// bucket, write-1-clears the status register, and posts the bitmask to
/// `inbox`. Deliberately does nothing else: no BD access, no allocation, no
/// ring mutex, no PHY calls -- all of that happens later, in worker context.
pub fn handle_interrupt(regs: &GemRegs, inbox: &WorkerInbox) {
    let status = regs.intr_status.get();

    let mut events = WorkerEvents::empty();
    if status & isr_bits::FRAME_TX_COMPLETE != 0 {
        events |= WorkerEvents::TX_DONE;
    }
    if status & isr_bits::FRAME_RX != 0 {
        events |= WorkerEvents::RX_DONE;
    }

    let errors = status & isr_bits::ERROR_MASK;
    if errors != 0 {
        trace::TRACE.record(Trace::IsrErrorBits { bits: errors });
    }

    // Write-1-to-clear happens here, in the ISR, before return. tx_status
    // and rx_status are a separate pair of registers: the worker reads and
    // clears those itself, via drain_tx_status/drain_rx_status below, never
    // here.
    regs.intr_status.set(status);

    if !events.is_empty() {
        inbox.post(events);
    }
}

/// Worker-side companion to [`handle_interrupt`] for the TX_DONE branch
/// (spec.md section 5): reads `tx_status`, then clears it with a
/// write-1-to-clear. Returns the bits observed before the clear so the
/// caller can trace/count them; a non-fatal bit here is logged and ignored.
pub fn drain_tx_status(regs: &GemRegs) -> u32 {
    let status = regs.tx_status.get();
    regs.tx_status.set(status & tsr::CLEAR_MASK);
    status
}

/// Worker-side companion to [`handle_interrupt`] for the RX_DONE branch
/// (spec.md section 4.7 step 1): reads `rx_status`, then clears it with a
/// write-1-to-clear.
pub fn drain_rx_status(regs: &GemRegs) -> u32 {
    let status = regs.rx_status.get();
    regs.rx_status.set(status & rsr::CLEAR_MASK);
    status
}
