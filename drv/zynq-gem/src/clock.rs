//! Clock selector (C3): picks SLCR divisors so the GEM's TX clock matches the
//! negotiated link speed.

use crate::config::RefPll;
use vcell::VolatileCell;
use zynq_gem_phy::LinkSpeed;

pub fn target_hz(speed: LinkSpeed) -> u32 {
    match speed {
        LinkSpeed::Speed10M => 2_500_000,
        LinkSpeed::Speed100M => 25_000_000,
        LinkSpeed::Speed1G => 125_000_000,
    }
}

/// Searches `div0, div1 ∈ [1, 63]` for the first pair bringing `input_hz`
/// within 2 Hz of `output_hz` once divided, preferring smaller `div0` first
/// (matching a straightforward nested-loop search over the divisor space, as
/// the reference design's equivalent search does over its own divider pair).
pub fn select_divisors(input_hz: u32, output_hz: u32) -> Option<(u8, u8)> {
    for div0 in 1u32..=63 {
        for div1 in 1u32..=63 {
            let actual = input_hz / (div0 * div1);
            if actual.abs_diff(output_hz) <= 2 {
                return Some((div0 as u8, div1 as u8));
            }
        }
    }
    None
}

/// SLCR register block fields this module touches. Laid out as a bare
/// offset table rather than a `#[repr(C)]` struct, since the registers this
/// crate cares about are scattered non-contiguously across the SLCR's
/// address space and most of it belongs to unrelated peripherals.
pub struct Slcr {
    unlock: &'static VolatileCell<u32>,
    lock: &'static VolatileCell<u32>,
    amba_clk_ctrl: &'static VolatileCell<u32>,
    gem_clk_ctrl: &'static VolatileCell<u32>,
    gem_rclk_ctrl: &'static VolatileCell<u32>,
    amba_enable_bit: u32,
}

const SLCR_UNLOCK_KEY: u32 = 0xDF0D;
const SLCR_LOCK_KEY: u32 = 0x767B;

mod clk_ctrl {
    pub const ENABLE: u32 = 1 << 0;
    pub const REF_PLL_SHIFT: u32 = 4;
    pub const DIV0_SHIFT: u32 = 8;
    pub const DIV1_SHIFT: u32 = 20;
}

mod rclk_ctrl {
    pub const ENABLE: u32 = 1 << 0;
    pub const SOURCE_EMIO: u32 = 1 << 4;
}

impl Slcr {
    /// # Safety
    /// The four addresses given must be the real SLCR unlock/lock/AMBA/
    /// per-instance clock-control registers, mapped device-strongly-ordered.
    pub unsafe fn new(
        unlock: usize,
        lock: usize,
        amba_clk_ctrl: usize,
        gem_clk_ctrl: usize,
        gem_rclk_ctrl: usize,
        amba_enable_bit: u32,
    ) -> Self {
        Self {
            unlock: &*(unlock as *const VolatileCell<u32>),
            lock: &*(lock as *const VolatileCell<u32>),
            amba_clk_ctrl: &*(amba_clk_ctrl as *const VolatileCell<u32>),
            gem_clk_ctrl: &*(gem_clk_ctrl as *const VolatileCell<u32>),
            gem_rclk_ctrl: &*(gem_rclk_ctrl as *const VolatileCell<u32>),
            amba_enable_bit,
        }
    }

    fn with_unlocked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.unlock.set(SLCR_UNLOCK_KEY);
        let r = f();
        self.lock.set(SLCR_LOCK_KEY);
        r
    }

    /// Programs `div0`/`div1` and the reference PLL selector, gates the AMBA
    /// peripheral clock on, and enables the receive-clock source (MIO by
    /// default; EMIO when `clock_source_mio` is false).
    pub fn configure(
        &self,
        ref_pll: RefPll,
        div0: u8,
        div1: u8,
        clock_source_mio: bool,
    ) {
        let pll_sel = match ref_pll {
            RefPll::Io => 0u32,
            RefPll::Arm => 2,
            RefPll::Ddr => 3,
        };
        self.with_unlocked(|| {
            self.amba_clk_ctrl.set(
                self.amba_clk_ctrl.get() | (1 << self.amba_enable_bit),
            );
            self.gem_clk_ctrl.set(
                clk_ctrl::ENABLE
                    | (pll_sel << clk_ctrl::REF_PLL_SHIFT)
                    | (u32::from(div0) << clk_ctrl::DIV0_SHIFT)
                    | (u32::from(div1) << clk_ctrl::DIV1_SHIFT),
            );
            let rclk = rclk_ctrl::ENABLE
                | if clock_source_mio {
                    0
                } else {
                    rclk_ctrl::SOURCE_EMIO
                };
            self.gem_rclk_ctrl.set(rclk);
        });
    }
}
