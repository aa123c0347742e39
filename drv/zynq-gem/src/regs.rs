//! Hand-written GEM register block.
//!
//! There is no generated PAC for the Zynq-7000 GEM in this workspace (unlike
//! the reference stack's `stm32h7` crate, which gets its register block from
//! `svd2rust`), so this follows the same *pattern* -- a `#[repr(C)]` struct of
//! volatile cells at fixed offsets -- using `vcell::VolatileCell` directly
//! rather than generating one.

use vcell::VolatileCell;

#[repr(C)]
pub struct GemRegs {
    pub net_ctrl: VolatileCell<u32>,      // 0x00
    pub net_cfg: VolatileCell<u32>,       // 0x04
    pub net_status: VolatileCell<u32>,    // 0x08
    _reserved0: [u32; 1],                 // 0x0C
    pub dma_cfg: VolatileCell<u32>,       // 0x10
    pub tx_status: VolatileCell<u32>,     // 0x14
    pub rx_qbase: VolatileCell<u32>,      // 0x18
    pub tx_qbase: VolatileCell<u32>,      // 0x1C
    pub rx_status: VolatileCell<u32>,     // 0x20
    pub intr_status: VolatileCell<u32>,   // 0x24
    pub intr_enable: VolatileCell<u32>,   // 0x28
    pub intr_disable: VolatileCell<u32>,  // 0x2C
    pub intr_mask: VolatileCell<u32>,     // 0x30
    pub phy_maint: VolatileCell<u32>,     // 0x34
    _reserved1: [u32; (0x88 - 0x38) / 4], // 0x38..0x88
    pub spec_addr1_bot: VolatileCell<u32>, // 0x88
    pub spec_addr1_top: VolatileCell<u32>, // 0x8C
}

impl GemRegs {
    /// # Safety
    /// `base` must be the MMIO base address of a GEM instance, mapped
    /// device/strongly-ordered, for the lifetime of the returned reference.
    pub unsafe fn from_base(base: usize) -> &'static GemRegs {
        &*(base as *const GemRegs)
    }
}

/// `net_ctrl` (NCR) bit assignments.
pub mod ncr {
    pub const LOOPBACK: u32 = 1 << 0;
    pub const LOOPBACK_LOCAL: u32 = 1 << 1;
    pub const RXEN: u32 = 1 << 2;
    pub const TXEN: u32 = 1 << 3;
    pub const MGMT_PORT_EN: u32 = 1 << 4;
    pub const CLEAR_STAT_REGS: u32 = 1 << 5;
    pub const START_TX: u32 = 1 << 9;
}

/// `net_status` (NSR) bit assignments.
pub mod nsr {
    pub const PHY_MGMT_IDLE: u32 = 1 << 2;
}

/// `intr_status` / `intr_enable` / `intr_disable` / `intr_mask` shared bit
/// assignments.
pub mod isr {
    pub const FRAME_TX_COMPLETE: u32 = 1 << 7;
    pub const FRAME_RX: u32 = 1 << 1;
    /// Mask matching spec.md's "error, log only" bucket: RX overrun, RX used
    /// read, AMBA error, retry-limit-exceeded, TX underrun, TX corrupt.
    pub const ERROR_MASK: u32 = 0x0000_0C60;
}

/// `tx_status` (TXSR) write-1-to-clear mask: all 8 defined bits.
pub mod tsr {
    pub const CLEAR_MASK: u32 = 0x0000_00FF;
}

/// `rx_status` (RXSR) write-1-to-clear mask: all 4 defined bits.
pub mod rsr {
    pub const CLEAR_MASK: u32 = 0x0000_000F;
}

/// `dma_cfg` (DMACR) bit assignments.
pub mod dmacr {
    pub const DISCNOAHB_BIT: u32 = 1 << 24;
    pub const RX_BUF_MASK: u32 = 0x0000_00FF;
    pub const RX_BUF_SHIFT: u32 = 16;
    pub const TCP_CHKSUM_BIT: u32 = 1 << 11;
    pub const TX_SIZE_BIT: u32 = 1 << 10;
    pub const RX_SIZE_MASK: u32 = 0x0000_0300;
    pub const RX_SIZE_SHIFT: u32 = 8;
    pub const ENDIAN_BIT: u32 = 1 << 7;
    pub const DESCR_ENDIAN_BIT: u32 = 1 << 6;
    pub const AHB_BURST_LENGTH_MASK: u32 = 0x0000_001F;
}
