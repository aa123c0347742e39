//! Marvell Alaska 88E1xxx family (spec.md §4.2, Marvell configuration).
//!
//! Covers the common Alaska copper-page MDIX/reset sequence, plus the
//! 88E151x-specific page-18 "RGMII to copper" system-mode switch.

use crate::{
    common, trace, Duplex, GemError, LinkSpeed, LinkStatus, Phy, PhyFamily,
    PhyIntStatus, PhyReg, PhyRw, Trace,
};
use gem_err::TimeSource;

/// Page 0 is the copper register set; pages are selected via register 22.
const PAGE_COPPER: u8 = 0;
const PAGE_GENERAL_1: u8 = 18;

/// Copper Control 1 (vendor-specific register 16, page 0).
const REG_COPPER_CTRL1: u8 = 16;
/// MDIX mode field, bits [6:5]. `11` = auto-crossover.
const COPPER_CTRL1_MDIX_AUTO: u16 = 0b11 << 5;

/// General Control Register 1 (register 20, page 18).
const REG_GENERAL_CTRL1: u8 = 20;
/// System-mode select field, bits [2:0]. Clearing it selects "RGMII to
/// copper" on the 88E151x variants.
const GENERAL_CTRL1_MODE_MASK: u16 = 0b111;
/// Software reset bit within General Control Register 1.
const GENERAL_CTRL1_SW_RESET: u16 = 1 << 15;

/// Copper Specific Interrupt Status (register 19, page 0).
const REG_COPPER_INT_STATUS: u8 = 19;
const INT_SPEED_CHANGED: u16 = 1 << 14;
const INT_DUPLEX_CHANGED: u16 = 1 << 13;
const INT_AUTONEG_COMPLETED: u16 = 1 << 11;
const INT_LINK_STATUS_CHANGED: u16 = 1 << 10;

/// Copper Specific Status Register 1 (register 17, page 0).
const REG_COPPER_STATUS1: u8 = 17;
const STATUS1_LINK_UP: u16 = 1 << 10;
const STATUS1_DUPLEX: u16 = 1 << 13;
const STATUS1_SPEED_SHIFT: u16 = 14;
const STATUS1_SPEED_MASK: u16 = 0b11;

/// Matches the ID mask for the 88E151x sub-family (the models with the
/// page-18 RGMII-to-copper system-mode register). Other Alaska members skip
/// this step and go straight into the common MDIX/reset sequence.
fn is_88e151x(id: u32) -> bool {
    // Marvell OUI 0x005043, model field bits [9:4] of the low ID word
    // identify 88E151x as 0b010100x.
    let model = (id >> 4) & 0x3F;
    (id & 0xFFFF_FC00) == 0x0141_0C00 && (0x28..=0x29).contains(&model)
}

pub struct Alaska {
    pub id: u32,
}

impl<P: PhyRw> PhyFamily<P> for Alaska {
    fn static_config(
        &self,
        phy: &Phy<'_, P>,
        clock: &impl TimeSource,
    ) -> Result<(), GemError> {
        if is_88e151x(self.id) {
            phy.write(PhyReg::paged(PAGE_COPPER, 22), PAGE_GENERAL_1 as u16)?;
            phy.modify(PhyReg::paged(PAGE_GENERAL_1, REG_GENERAL_CTRL1), |v| {
                (v & !GENERAL_CTRL1_MODE_MASK) | GENERAL_CTRL1_SW_RESET
            })?;
            phy.wait_until(
                PhyReg::paged(PAGE_GENERAL_1, REG_GENERAL_CTRL1),
                10,
                clock,
                |v| v & GENERAL_CTRL1_SW_RESET == 0,
                GemError::PhyResetTimeout,
            )?;
            phy.write(PhyReg::paged(PAGE_GENERAL_1, 22), PAGE_COPPER as u16)?;
        }

        phy.modify(
            PhyReg::paged(PAGE_COPPER, REG_COPPER_CTRL1),
            |v| (v & !(0b11 << 5)) | COPPER_CTRL1_MDIX_AUTO,
        )?;
        common::reset(phy, 10, clock)
    }

    fn supports_gigabit(&self) -> bool {
        true
    }

    fn read_int_status(
        &self,
        phy: &Phy<'_, P>,
    ) -> Result<PhyIntStatus, GemError> {
        let v = phy.read(PhyReg::paged(PAGE_COPPER, REG_COPPER_INT_STATUS))?;
        let status = PhyIntStatus {
            speed_changed: v & INT_SPEED_CHANGED != 0,
            duplex_changed: v & INT_DUPLEX_CHANGED != 0,
            autoneg_completed: v & INT_AUTONEG_COMPLETED != 0,
            link_status_changed: v & INT_LINK_STATUS_CHANGED != 0,
        };
        trace!(Trace::IntStatus {
            addr: phy.addr,
            any: status.any()
        });
        Ok(status)
    }

    fn get_link(&self, phy: &Phy<'_, P>) -> Result<LinkStatus, GemError> {
        let v = phy.read(PhyReg::paged(PAGE_COPPER, REG_COPPER_STATUS1))?;
        let up = v & STATUS1_LINK_UP != 0;
        let speed = match (v >> STATUS1_SPEED_SHIFT) & STATUS1_SPEED_MASK {
            0b00 => LinkSpeed::Speed10M,
            0b01 => LinkSpeed::Speed100M,
            _ => LinkSpeed::Speed1G,
        };
        let duplex = if v & STATUS1_DUPLEX != 0 {
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
    fn recognizes_88e151x_model_range() {
        assert!(is_88e151x(0x0141_0DD0)); // 88E1510/1512/1514
        assert!(!is_88e151x(0x0141_0CC0)); // not in the 0x28/0x29 model range
    }

    #[test]
    fn link_status_decodes_speed_and_duplex_bits() {
        // up, full duplex, 1G
        let raw: u16 = STATUS1_LINK_UP
            | STATUS1_DUPLEX
            | (0b10 << STATUS1_SPEED_SHIFT);
        let up = raw & STATUS1_LINK_UP != 0;
        let speed = match (raw >> STATUS1_SPEED_SHIFT) & STATUS1_SPEED_MASK {
            0b00 => LinkSpeed::Speed10M,
            0b01 => LinkSpeed::Speed100M,
            _ => LinkSpeed::Speed1G,
        };
        assert!(up);
        assert_eq!(speed, LinkSpeed::Speed1G);
    }
}
