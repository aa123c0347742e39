#![no_std]

//! Error taxonomy shared by `zynq-gem` and `zynq-gem-phy`.
//!
//! Both crates return `GemError` so that a PHY-layer failure surfacing
//! through the link controller and a ring/MMIO failure surfacing through the
//! TX/RX fast paths share one vocabulary, the same way the reference driver
//! stack's MAC and PHY crates share a single error enum.

/// A capability for bounding busy-waits and blocking the caller of `send`.
///
/// Both the MDIO transport (C1) and the PHY reset/autoneg polling (C2) need
/// to bound a `while !idle { poll }` loop by wall-clock time rather than by a
/// fixed iteration count, since the iteration-to-time ratio depends on core
/// clock and is not something this crate should hardcode. This is the
/// "capability interface" the design notes call for in place of a hidden
/// global timer: callers supply whatever wall-clock source their boot glue
/// already has (a generic-timer read, a tick counter fed by a periodic IRQ,
/// or -- in host-side tests -- a fake clock).
pub trait TimeSource {
    /// Milliseconds since an arbitrary epoch. Must be monotonic.
    fn now_ms(&self) -> u32;
    /// Busy-waits for approximately `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

/// The specific sticky error bit a TX descriptor reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerErrorBit {
    Retry,
    Underrun,
    BuffersExhausted,
    LateCollision,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GemError {
    /// `send` was called with a zero-length buffer chain.
    InvalidArgument,
    /// `send` was called while the link is not up.
    LinkDown,
    /// Not enough free TX BDs for the requested fragment chain.
    NoBufferSpace,
    /// The fragment chain is larger than the ring could ever hold, even
    /// fully drained. Distinct from `NoBufferSpace`, which may clear on its
    /// own once in-flight frames complete.
    BufferTooLarge,
    /// MDIO idle-wait exceeded its bound.
    MdioTimeout,
    /// PHY soft-reset bit failed to self-clear within the retry bound.
    PhyResetTimeout,
    /// `send`'s TX-done wait exceeded its bound.
    TxTimeout,
    /// An RX BD marked used did not carry SOF where one was expected.
    MalformedRxFrame,
    /// The MAC reported a steady-state TX error on a completed descriptor.
    ControllerError(ControllerErrorBit),
    /// No PHY answered ID-register probing at any of addresses 1..=31.
    PhyNotPresent,
    /// A configuration record failed `Config::validate`.
    InvalidConfig(&'static str),
    /// An invariant the implementation believes unreachable was violated.
    Internal,
}
