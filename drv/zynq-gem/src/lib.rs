#![cfg_attr(not(test), no_std)]

//! Core networking data-path driver for the Zynq-7000 Gigabit Ethernet MAC
//! (GEM) and its MDIO-attached PHY.
//!
//! This crate is the hardware-facing half of the workspace: the BD ring
//! manager, TX/RX segmentation and reassembly, the MDIO transport, the clock
//! selector, and the link controller are all pure or near-pure modules that
//! are unit-tested on the host (see their own `#[cfg(test)]` blocks). This
//! file is the thin [`Device`] that wires them together against real MMIO
//! and is, by design, not itself unit-testable -- see SPEC_FULL.md section
//! 1.4.

pub mod clock;
pub mod config;
pub mod isr;
pub mod link;
pub mod mac;
pub mod mdio;
pub mod regs;
pub mod ring;
pub mod rx;
pub mod trace;
pub mod tx;

use core::sync::atomic::{AtomicBool, Ordering};

use gem_err::{ControllerErrorBit, GemError, TimeSource};
use zynq_gem_phy::{marvell, ti, Advertise, Phy, PhyFamily, PhyIntStatus, PhyRw};

pub use config::Config;
pub use link::LinkState;
pub use rx::{Packet, RxEvent, UpperStack};
pub use tx::TxWaiter;

use regs::GemRegs;
use trace::Trace;

/// Interrupts this driver ever asks the MAC to raise: frame-RX and
/// frame-TX-complete (spec.md section 4.9). Error bits in
/// [`regs::isr::ERROR_MASK`] are never individually enabled/disabled -- they
/// ride along in `intr_status` whenever the MAC reports them regardless of
/// mask, and the ISR just observes and traces them.
const ENABLED_INTERRUPTS: u32 = regs::isr::FRAME_TX_COMPLETE | regs::isr::FRAME_RX;

/// Recommended bound on `send`'s TX-done wait (spec.md section 5).
const TX_TIMEOUT_MS: u32 = 1000;

/// Per-bit counters for steady-state TX controller errors (spec.md section
/// 9's resolved Open Question #2: expose per-bit statistics, leave
/// escalation policy to the caller).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorStats {
    pub retry: u32,
    pub underrun: u32,
    pub buffers_exhausted: u32,
    pub late_collision: u32,
}

impl ErrorStats {
    fn record(&mut self, bit: ControllerErrorBit) {
        match bit {
            ControllerErrorBit::Retry => self.retry += 1,
            ControllerErrorBit::Underrun => self.underrun += 1,
            ControllerErrorBit::BuffersExhausted => self.buffers_exhausted += 1,
            ControllerErrorBit::LateCollision => self.late_collision += 1,
        }
    }
}

/// Tagged variant over the two supported PHY vendor families (design-note
/// section 9: "subclass per vendor -> tagged variant of PHY family"). Adding
/// a third vendor means adding a variant and a match arm here, not a new
/// call site anywhere else in this crate.
pub enum PhyVariant {
    Alaska(marvell::Alaska),
    Dp83822(ti::Dp83822),
}

impl<P: PhyRw> PhyFamily<P> for PhyVariant {
    fn static_config(
        &self,
        phy: &Phy<'_, P>,
        clock: &impl TimeSource,
    ) -> Result<(), GemError> {
        match self {
            PhyVariant::Alaska(a) => a.static_config(phy, clock),
            PhyVariant::Dp83822(t) => t.static_config(phy, clock),
        }
    }

    fn supports_gigabit(&self) -> bool {
        match self {
            PhyVariant::Alaska(a) => a.supports_gigabit(),
            PhyVariant::Dp83822(t) => t.supports_gigabit(),
        }
    }

    fn read_int_status(&self, phy: &Phy<'_, P>) -> Result<PhyIntStatus, GemError> {
        match self {
            PhyVariant::Alaska(a) => a.read_int_status(phy),
            PhyVariant::Dp83822(t) => t.read_int_status(phy),
        }
    }

    fn get_link(&self, phy: &Phy<'_, P>) -> Result<zynq_gem_phy::LinkStatus, GemError> {
        match self {
            PhyVariant::Alaska(a) => a.get_link(phy),
            PhyVariant::Dp83822(t) => t.get_link(phy),
        }
    }
}

/// Picks a vendor family from a probed 32-bit PHY ID. Both supported
/// families are Marvell-or-not: the Alaska 88E1xxx family's OUI puts
/// `0x0141` in the top 16 bits of the ID; anything else probed by this
/// driver is assumed to be the TI DP83822, the only other family it knows
/// how to configure.
fn select_variant(id: u32) -> PhyVariant {
    if (id >> 16) == 0x0141 {
        PhyVariant::Alaska(marvell::Alaska { id })
    } else {
        PhyVariant::Dp83822(ti::Dp83822)
    }
}

/// Blocking binary signal backing [`TxWaiter`], bounded by wall-clock time
/// via a [`TimeSource`] rather than the unbounded wait spec.md's source
/// implies (spec.md section 4.6's resolved Open Question).
struct TxDoneSignal<'a, T> {
    done: AtomicBool,
    clock: &'a T,
}

impl<'a, T: TimeSource> TxDoneSignal<'a, T> {
    fn new(clock: &'a T) -> Self {
        Self {
            done: AtomicBool::new(false),
            clock,
        }
    }
}

impl<'a, T: TimeSource> TxWaiter for TxDoneSignal<'a, T> {
    fn wait(&self, timeout_ms: u32) -> bool {
        let start = self.clock.now_ms();
        loop {
            if self.done.swap(false, Ordering::AcqRel) {
                return true;
            }
            if self.clock.now_ms().wrapping_sub(start) >= timeout_ms {
                return false;
            }
            self.clock.delay_ms(1);
        }
    }

    fn signal(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Adapts a `Device`'s register/ring/clock handles to [`link::MacControl`]
/// without borrowing the whole device, so `worker_step` can hold a mutable
/// borrow of `link_state` and `upper` at the same time (spec.md's link
/// controller, C8, needs all of these at once on a transition).
struct MacCtl<'a, const TXBUF: usize> {
    regs: &'a GemRegs,
    tx_ring: &'a ring::TxRing<TXBUF>,
    tx_done: &'a dyn TxWaiter,
    slcr: &'a clock::Slcr,
    config: &'a Config,
}

impl<'a, const TXBUF: usize> link::MacControl for MacCtl<'a, TXBUF> {
    fn stop(&mut self) {
        mac::Mac::new(self.regs).stop();
    }

    fn start(&mut self) {
        mac::Mac::new(self.regs).start(ENABLED_INTERRUPTS);
    }

    fn reconfigure_clock(&mut self, speed: zynq_gem_phy::LinkSpeed) {
        let target = clock::target_hz(speed);
        let (div0, div1) = if self.config.static_div0 != 0 || self.config.static_div1 != 0
        {
            (self.config.static_div0, self.config.static_div1)
        } else {
            clock::select_divisors(self.config.pll_ref_clock_multiplier, target)
                .unwrap_or((1, 1))
        };
        self.slcr
            .configure(self.config.ref_pll, div0, div1, self.config.clock_source_mio);
        let mac = mac::Mac::new(self.regs);
        mac.program_nwcfg(self.config, speed);
        mac.program_dmacr(self.config);
    }

    fn drain_tx(&mut self) {
        tx::on_tx_done(self.tx_ring, self.tx_done, |_| {});
    }
}

/// One GEM instance: MMIO registers, RX/TX BD rings, and (if `init_phy` is
/// set) the detected PHY, tied together per spec.md section 3. `RXBUF` and
/// `TXBUF` are the per-descriptor buffer sizes in bytes (the configuration
/// record's `rx_buffer_size`/`tx_buffer_size`, fixed at compile time since
/// the buffers are statically reserved).
pub struct Device<'a, T, U, const RXBUF: usize, const TXBUF: usize>
where
    T: TimeSource,
    U: UpperStack,
{
    regs: &'a GemRegs,
    clock: &'a T,
    slcr: clock::Slcr,
    config: Config,
    mdio: mdio::Mdio<'a, T>,
    rx_ring: ring::RxRing<RXBUF>,
    tx_ring: ring::TxRing<TXBUF>,
    tx_done: TxDoneSignal<'a, T>,
    phy: Option<(u8, PhyVariant)>,
    link_state: LinkState,
    inbox: isr::WorkerInbox,
    error_stats: ErrorStats,
    upper: U,
}

impl<'a, T, U, const RXBUF: usize, const TXBUF: usize> Device<'a, T, U, RXBUF, TXBUF>
where
    T: TimeSource,
    U: UpperStack,
{
    /// Constructs one device: validates `config`, resets the MAC, builds
    /// both BD rings, programs the MAC address and ring bases, and -- if
    /// `config.init_phy` is set -- probes for a PHY and runs its reset,
    /// static configuration, and autonegotiation kickoff. A PHY that never
    /// answers is not an error: `phy` is left `None` and the instance stays
    /// in forced `max_link_speed` mode (spec.md's benign-no-PHY scenario).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        regs: &'a GemRegs,
        clock: &'a T,
        slcr: clock::Slcr,
        config: Config,
        rx_storage: &'static mut [ring::RxBd],
        rx_buffers: &'static mut [ring::Buffer<RXBUF>],
        tx_storage: &'static mut [ring::TxBd],
        tx_buffers: &'static mut [ring::Buffer<TXBUF>],
        upper: U,
    ) -> Result<Self, GemError> {
        config.validate()?;

        let mac = mac::Mac::new(regs);
        mac.reset();

        let rx_ring = ring::RxRing::new(rx_storage, rx_buffers);
        let tx_ring = ring::TxRing::new(tx_storage, tx_buffers);
        mac.set_ring_bases(rx_ring.base_ptr() as u32, tx_ring.base_ptr() as u32);
        mac.program_address(config.mac_address);
        // Forced-speed mode until (if ever) a PHY completes autonegotiation
        // and the link controller reprograms this for real.
        mac.program_nwcfg(&config, config.max_link_speed);
        mac.program_dmacr(&config);

        let mdio = mdio::Mdio::new(regs, clock);

        let phy = if config.init_phy {
            match zynq_gem_phy::common::detect(&mdio) {
                Ok((addr, id)) => {
                    let variant = select_variant(id);
                    let handle = Phy::new(addr, &mdio);
                    variant.static_config(&handle, clock)?;
                    let adv = Advertise::new(config.max_link_speed, config.advertise_lower);
                    zynq_gem_phy::common::advertise_and_restart(
                        &handle,
                        adv,
                        variant.supports_gigabit(),
                    )?;
                    Some((addr, variant))
                }
                // Not an error (spec.md section 7): stays in forced
                // max_link_speed mode with no PHY to poll.
                Err(GemError::PhyNotPresent) => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(Self {
            regs,
            clock,
            slcr,
            config,
            mdio,
            rx_ring,
            tx_ring,
            tx_done: TxDoneSignal::new(clock),
            phy,
            link_state: LinkState::Down,
            inbox: isr::WorkerInbox::new(),
            error_stats: ErrorStats::default(),
            upper,
        })
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn phy_present(&self) -> bool {
        self.phy.is_some()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.error_stats
    }

    /// Enables RX+TX and the handled interrupt set. Calling this twice
    /// without an intervening `stop()` is a no-op in observable register
    /// state (spec.md section 8).
    pub fn start(&self) {
        mac::Mac::new(self.regs).start(ENABLED_INTERRUPTS);
    }

    /// Disables RX+TX and clears/disables all interrupts.
    pub fn stop(&self) {
        mac::Mac::new(self.regs).stop();
    }

    /// Queues `fragments` for transmission and blocks until the worker
    /// reports TX-done, bounded by [`TX_TIMEOUT_MS`] (spec.md section 4.6).
    pub fn send(&self, fragments: &[&[u8]]) -> Result<(), GemError> {
        let tx = tx::Tx::new(&self.tx_ring, mac::Mac::new(self.regs), TX_TIMEOUT_MS);
        tx.send(fragments, self.link_state.is_up(), &self.tx_done)
    }

    /// ISR prologue (C9). Must be called from the MAC's interrupt handler;
    /// does no ring or PHY work itself, only classifies and posts.
    pub fn handle_interrupt(&self) {
        isr::handle_interrupt(self.regs, &self.inbox);
    }

    /// Called from the 1 Hz timer IRQ. Non-suspending, non-blocking.
    pub fn handle_timer_tick(&self) {
        self.inbox.post(isr::WorkerEvents::POLL_PHY);
    }

    /// The worker's main body: drains whatever events are pending and acts
    /// on each (spec.md sections 4.7, 4.8, 4.9). Intended to be called from
    /// a worker task blocked on the same signal that wakes `handle_interrupt`
    /// and `handle_timer_tick`'s callers; this function itself never blocks.
    pub fn worker_step(&mut self) {
        let events = self.inbox.take();
        if events.is_empty() {
            return;
        }
        let link_up = self.link_state.is_up();

        if events.contains(isr::WorkerEvents::RX_DONE) {
            let status = isr::drain_rx_status(self.regs);
            if status != 0 {
                trace::TRACE.record(Trace::RxStatusBits { bits: status as u8 });
            }
            let rx_ring = &self.rx_ring;
            let upper = &mut self.upper;
            rx::process_rx_done(rx_ring, upper, link_up, |ev| record_rx_event(ev));
        }

        if events.contains(isr::WorkerEvents::TX_DONE) {
            let status = isr::drain_tx_status(self.regs);
            if status != 0 {
                trace::TRACE.record(Trace::TxStatusBits { bits: status as u8 });
            }
            let tx_ring = &self.tx_ring;
            let tx_done = &self.tx_done;
            let error_stats = &mut self.error_stats;
            tx::on_tx_done(tx_ring, tx_done, |bit| {
                error_stats.record(bit);
                trace::TRACE.record(Trace::TxError(bit));
            });
        }

        if events.contains(isr::WorkerEvents::POLL_PHY) {
            if let Some((addr, variant)) = &self.phy {
                let phy = Phy::new(*addr, &self.mdio);
                let mut mac_ctl = MacCtl {
                    regs: self.regs,
                    tx_ring: &self.tx_ring,
                    tx_done: &self.tx_done,
                    slcr: &self.slcr,
                    config: &self.config,
                };
                let upper = &mut self.upper;
                // Slow-path errors (MDIO timeout, PHY reset timeout) degrade
                // to "try again on the next poll" rather than propagating,
                // per spec.md section 7.
                let _ = link::handle_poll_phy(
                    &phy,
                    variant,
                    &mut self.link_state,
                    &mut mac_ctl,
                    upper,
                );
            }
        }
    }
}

fn record_rx_event(ev: RxEvent) {
    match ev {
        RxEvent::Delivered { .. } => {}
        RxEvent::DroppedLinkDown { length } => {
            trace::TRACE.record(Trace::RxDroppedLinkDown {
                length: length as u16,
            });
        }
        RxEvent::DroppedAllocFailed { length } => {
            trace::TRACE.record(Trace::RxAllocFailed {
                length: length as u16,
            });
        }
        RxEvent::DroppedSubmitFailed => trace::TRACE.record(Trace::RxSubmitFailed),
        RxEvent::Malformed => trace::TRACE.record(Trace::RxMalformed),
        RxEvent::Desync => trace::TRACE.record(Trace::RxDesync),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_variant_recognizes_marvell_oui_prefix() {
        match select_variant(0x0141_0DD0) {
            PhyVariant::Alaska(a) => assert_eq!(a.id, 0x0141_0DD0),
            PhyVariant::Dp83822(_) => panic!("expected Alaska"),
        }
    }

    #[test]
    fn select_variant_falls_back_to_ti_for_non_marvell_ids() {
        match select_variant(0x2000_A240) {
            PhyVariant::Dp83822(_) => {}
            PhyVariant::Alaska(_) => panic!("expected Dp83822"),
        }
    }

    #[test]
    fn error_stats_tally_by_bit() {
        let mut stats = ErrorStats::default();
        stats.record(ControllerErrorBit::Retry);
        stats.record(ControllerErrorBit::Retry);
        stats.record(ControllerErrorBit::LateCollision);
        assert_eq!(stats.retry, 2);
        assert_eq!(stats.late_collision, 1);
        assert_eq!(stats.underrun, 0);
    }
}
