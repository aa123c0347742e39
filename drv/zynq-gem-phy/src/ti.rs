//! TI DP83822 (spec.md §4.2, TI configuration).
//!
//! The DP83822 is a 10/100 part only -- it has no page-18 trick and no
//! 1000BASE-T control register, so `supports_gigabit` is always false.

use crate::{
    ctl_bits, trace, Duplex, GemError, LinkSpeed, LinkStatus, Phy, PhyFamily,
    PhyIntStatus, PhyReg, PhyRw, Trace,
};
use gem_err::TimeSource;

/// Control Register 1 (register 0x09): Robust Auto-MDIX lives here.
const REG_CR1: u8 = 0x09;
const CR1_ROBUST_AUTO_MDIX: u16 = 1 << 5;

/// PHY Control Register (register 0x19): Auto-MDIX enable and the bit that
/// would otherwise force a fixed MDI/MDIX polarity.
const REG_PHYCR: u8 = 0x19;
const PHYCR_AUTO_MDIX_EN: u16 = 1 << 15;
const PHYCR_FORCE_MDIX_DISABLE: u16 = 1 << 14;

/// LED Configuration Register 1 (register 0x18).
const REG_LEDCR1: u8 = 0x18;
/// Blink-rate field, bits [10:9]. `2` selects 5 Hz.
const LEDCR1_BLINK_5HZ: u16 = 2 << 9;
const LEDCR1_BLINK_MASK: u16 = 0b11 << 9;

/// PHY Status Register (register 0x10): link/speed/duplex.
const REG_PHYSTS: u8 = 0x10;
const PHYSTS_LINK_UP: u16 = 1 << 0;
const PHYSTS_SPEED_10: u16 = 1 << 1;
const PHYSTS_DUPLEX_FULL: u16 = 1 << 2;

/// MII Interrupt Status Register 2 (register 0x13).
const REG_MISR2: u8 = 0x13;
const MISR2_SPEED_CHANGED: u16 = 1 << 4;
const MISR2_DUPLEX_CHANGED: u16 = 1 << 3;
const MISR2_AUTONEG_COMPLETE: u16 = 1 << 2;
const MISR2_LINK_STATUS_CHANGED: u16 = 1 << 5;

pub struct Dp83822;

impl<P: PhyRw> PhyFamily<P> for Dp83822 {
    fn static_config(
        &self,
        phy: &Phy<'_, P>,
        clock: &impl TimeSource,
    ) -> Result<(), GemError> {
        phy.modify(PhyReg::std(0), |v| v | ctl_bits::AUTONEG_ENABLE)?;
        phy.modify(PhyReg::std(REG_CR1), |v| v | CR1_ROBUST_AUTO_MDIX)?;
        phy.modify(PhyReg::std(REG_PHYCR), |v| {
            (v | PHYCR_AUTO_MDIX_EN) & !PHYCR_FORCE_MDIX_DISABLE
        })?;
        phy.modify(PhyReg::std(REG_LEDCR1), |v| {
            (v & !LEDCR1_BLINK_MASK) | LEDCR1_BLINK_5HZ
        })?;
        crate::common::reset(phy, 10, clock)
    }

    fn supports_gigabit(&self) -> bool {
        false
    }

    fn read_int_status(
        &self,
        phy: &Phy<'_, P>,
    ) -> Result<PhyIntStatus, GemError> {
        let v = phy.read(PhyReg::std(REG_MISR2))?;
        let status = PhyIntStatus {
            speed_changed: v & MISR2_SPEED_CHANGED != 0,
            duplex_changed: v & MISR2_DUPLEX_CHANGED != 0,
            autoneg_completed: v & MISR2_AUTONEG_COMPLETE != 0,
            link_status_changed: v & MISR2_LINK_STATUS_CHANGED != 0,
        };
        trace!(Trace::IntStatus {
            addr: phy.addr,
            any: status.any()
        });
        Ok(status)
    }

    fn get_link(&self, phy: &Phy<'_, P>) -> Result<LinkStatus, GemError> {
        let v = phy.read(PhyReg::std(REG_PHYSTS))?;
        let up = v & PHYSTS_LINK_UP != 0;
        let speed = if v & PHYSTS_SPEED_10 != 0 {
            LinkSpeed::Speed10M
        } else {
            LinkSpeed::Speed100M
        };
        let duplex = if v & PHYSTS_DUPLEX_FULL != 0 {
            Duplex::Full
        } else {
            Duplex::Half
        };
        if up {
            trace!(Trace::LinkUp { addr: phy.addr });
        } else {
            trace!(Trace::LinkDown { addr: phy.addr });
        }
        Ok(LinkStatus { up, speed, duplex })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dp83822_never_advertises_gigabit() {
        assert!(!<Dp83822 as PhyFamily<FakeRw>>::supports_gigabit(
            &Dp83822
        ));
    }

    struct FakeRw;
    impl PhyRw for FakeRw {
        fn mdio_read(&self, _: u8, _: u8) -> Result<u16, GemError> {
            Ok(0)
        }
        fn mdio_write(&self, _: u8, _: u8, _: u16) -> Result<(), GemError> {
            Ok(())
        }
    }
}
