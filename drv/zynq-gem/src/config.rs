//! The immutable configuration record (frozen at `Device::new` time).

use gem_err::GemError;
use zynq_gem_phy::LinkSpeed;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AmbaBusWidth {
    Bits32,
    Bits64,
    Bits128,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AhbBurstLength {
    Single,
    Incr4,
    Incr8,
    Incr16,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RxFifoSize {
    Kb1,
    Kb2,
    Kb4,
    Kb8,
}

/// Selects which on-chip PLL feeds the GEM reference clock divider chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RefPll {
    Io,
    Arm,
    Ddr,
}

/// Feature bits that fold directly into `net_cfg` (NWCFG). See
/// [`crate::mac::NwcfgFlags`] for the bit assignments; this struct is the
/// user-facing, named form of the same set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FeatureFlags {
    pub ignore_ipg_rx_error: bool,
    pub bad_preamble_accept: bool,
    pub ipg_stretch: bool,
    pub sgmii: bool,
    pub fcs_accept: bool,
    pub half_duplex_rx_during_tx: bool,
    pub rx_checksum_offload: bool,
    pub tx_checksum_offload: bool,
    pub pause_copy: bool,
    pub pause_enable: bool,
    pub discard_fcs_errors: bool,
    pub discard_length_errors: bool,
    pub tbi: bool,
    pub ext_addr_match: bool,
    pub frame_1536: bool,
    pub unicast_hash: bool,
    pub multicast_hash: bool,
    pub broadcast_reject: bool,
    pub promiscuous: bool,
    pub vlan_only: bool,
    pub discard_non_vlan: bool,
    pub full_duplex: bool,
    pub discard_on_ahb_busy: bool,
    pub full_tx_buffer: bool,
    pub ahb_packet_endian_swap: bool,
    pub ahb_descriptor_endian_swap: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub max_link_speed: LinkSpeed,
    pub advertise_lower: bool,
    pub init_phy: bool,

    pub amba_bus_width: AmbaBusWidth,
    pub ahb_burst: AhbBurstLength,

    pub hw_rx_fifo_size: RxFifoSize,
    pub hw_rx_offset: u8,
    pub ahb_rx_buffer_size_units: u8,

    pub ref_pll: RefPll,
    pub pll_ref_clock_multiplier: u32,
    pub clock_source_mio: bool,
    /// Static divisors; `(0, 0)` means "search for a pair at each link
    /// speed change" (§C3).
    pub static_div0: u8,
    pub static_div1: u8,

    pub rxbd_count: u16,
    pub txbd_count: u16,
    pub rx_buffer_size: u16,
    pub tx_buffer_size: u16,

    pub features: FeatureFlags,

    pub mac_address: [u8; 6],
}

impl Config {
    /// Rejects configuration records that are individually sensible but
    /// jointly contradictory. Only one overlap is currently known:
    /// `vlan_only` and `discard_non_vlan` both ask NWCFG to gate on VLAN
    /// presence, and the hardware does not define which one wins.
    pub fn validate(&self) -> Result<(), GemError> {
        if self.features.vlan_only && self.features.discard_non_vlan {
            return Err(GemError::InvalidConfig(
                "vlan_only and discard_non_vlan cannot both be set",
            ));
        }
        if self.rxbd_count == 0 || self.txbd_count == 0 {
            return Err(GemError::InvalidConfig(
                "rxbd_count and txbd_count must be nonzero",
            ));
        }
        if self.rx_buffer_size % 4 != 0 || self.tx_buffer_size % 4 != 0 {
            return Err(GemError::InvalidConfig(
                "buffer sizes must be 4-byte aligned",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            max_link_speed: LinkSpeed::Speed1G,
            advertise_lower: true,
            init_phy: true,
            amba_bus_width: AmbaBusWidth::Bits32,
            ahb_burst: AhbBurstLength::Incr16,
            hw_rx_fifo_size: RxFifoSize::Kb4,
            hw_rx_offset: 0,
            ahb_rx_buffer_size_units: 2,
            ref_pll: RefPll::Io,
            pll_ref_clock_multiplier: 1000,
            clock_source_mio: true,
            static_div0: 0,
            static_div1: 0,
            rxbd_count: 16,
            txbd_count: 16,
            rx_buffer_size: 1536,
            tx_buffer_size: 1536,
            features: FeatureFlags::default(),
            mac_address: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
        }
    }

    #[test]
    fn rejects_vlan_only_with_discard_non_vlan() {
        let mut c = base_config();
        c.features.vlan_only = true;
        c.features.discard_non_vlan = true;
        assert_eq!(
            c.validate(),
            Err(GemError::InvalidConfig(
                "vlan_only and discard_non_vlan cannot both be set"
            ))
        );
    }

    #[test]
    fn accepts_vlan_only_alone() {
        let mut c = base_config();
        c.features.vlan_only = true;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn rejects_unaligned_buffer_size() {
        let mut c = base_config();
        c.rx_buffer_size = 1535;
        assert!(c.validate().is_err());
    }
}
