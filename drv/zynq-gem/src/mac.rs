//! MAC register layer (C4): reset sequence, NWCFG assembly, MDC divisor
//! selection, MAC-address programming, start/stop.

use crate::config::{AhbBurstLength, AmbaBusWidth, Config, FeatureFlags, RxFifoSize};
use crate::regs::{dmacr, ncr, GemRegs};
use zynq_gem_phy::LinkSpeed;

bitflags::bitflags! {
    /// Feature bits assembled into `net_cfg` (NWCFG). Bit positions are this
    /// crate's own convention (there is no generated PAC to draw them from);
    /// bits 0 and 10, which jointly encode link speed, are assembled
    /// separately by [`speed_bits`] and never appear here.
    pub struct NwcfgFlags: u32 {
        const IGNORE_IPG_RX_ERROR      = 1 << 1;
        const BAD_PREAMBLE_ACCEPT      = 1 << 2;
        const IPG_STRETCH              = 1 << 3;
        const SGMII                    = 1 << 4;
        const FCS_ACCEPT               = 1 << 5;
        const HALF_DUPLEX_RX_DURING_TX = 1 << 6;
        const RX_CHECKSUM_OFFLOAD      = 1 << 7;
        const TX_CHECKSUM_OFFLOAD      = 1 << 8;
        const PAUSE_COPY               = 1 << 9;
        const PAUSE_ENABLE             = 1 << 11;
        const DISCARD_FCS_ERRORS       = 1 << 12;
        const DISCARD_LENGTH_ERRORS    = 1 << 13;
        const TBI                      = 1 << 14;
        const EXT_ADDR_MATCH           = 1 << 15;
        const FRAME_1536               = 1 << 16;
        const UNICAST_HASH             = 1 << 17;
        const MULTICAST_HASH           = 1 << 18;
        const BROADCAST_REJECT         = 1 << 19;
        const PROMISCUOUS              = 1 << 20;
        const VLAN_ONLY                = 1 << 21;
        const FULL_DUPLEX              = 1 << 22;
        const DISCARD_ON_AHB_BUSY      = 1 << 23;
        const FULL_TX_BUFFER           = 1 << 24;
        const AHB_PACKET_ENDIAN_SWAP   = 1 << 25;
        const AHB_DESCRIPTOR_ENDIAN_SWAP = 1 << 26;
        const DISCARD_NON_VLAN         = 1 << 27;
    }
}

impl From<FeatureFlags> for NwcfgFlags {
    fn from(f: FeatureFlags) -> Self {
        let mut v = NwcfgFlags::empty();
        v.set(NwcfgFlags::IGNORE_IPG_RX_ERROR, f.ignore_ipg_rx_error);
        v.set(NwcfgFlags::BAD_PREAMBLE_ACCEPT, f.bad_preamble_accept);
        v.set(NwcfgFlags::IPG_STRETCH, f.ipg_stretch);
        v.set(NwcfgFlags::SGMII, f.sgmii);
        v.set(NwcfgFlags::FCS_ACCEPT, f.fcs_accept);
        v.set(
            NwcfgFlags::HALF_DUPLEX_RX_DURING_TX,
            f.half_duplex_rx_during_tx,
        );
        v.set(NwcfgFlags::RX_CHECKSUM_OFFLOAD, f.rx_checksum_offload);
        v.set(NwcfgFlags::TX_CHECKSUM_OFFLOAD, f.tx_checksum_offload);
        v.set(NwcfgFlags::PAUSE_COPY, f.pause_copy);
        v.set(NwcfgFlags::PAUSE_ENABLE, f.pause_enable);
        v.set(NwcfgFlags::DISCARD_FCS_ERRORS, f.discard_fcs_errors);
        v.set(NwcfgFlags::DISCARD_LENGTH_ERRORS, f.discard_length_errors);
        v.set(NwcfgFlags::TBI, f.tbi);
        v.set(NwcfgFlags::EXT_ADDR_MATCH, f.ext_addr_match);
        v.set(NwcfgFlags::FRAME_1536, f.frame_1536);
        v.set(NwcfgFlags::UNICAST_HASH, f.unicast_hash);
        v.set(NwcfgFlags::MULTICAST_HASH, f.multicast_hash);
        v.set(NwcfgFlags::BROADCAST_REJECT, f.broadcast_reject);
        v.set(NwcfgFlags::PROMISCUOUS, f.promiscuous);
        v.set(NwcfgFlags::VLAN_ONLY, f.vlan_only);
        v.set(NwcfgFlags::DISCARD_NON_VLAN, f.discard_non_vlan);
        v.set(NwcfgFlags::FULL_DUPLEX, f.full_duplex);
        v.set(NwcfgFlags::DISCARD_ON_AHB_BUSY, f.discard_on_ahb_busy);
        v.set(NwcfgFlags::FULL_TX_BUFFER, f.full_tx_buffer);
        v.set(
            NwcfgFlags::AHB_PACKET_ENDIAN_SWAP,
            f.ahb_packet_endian_swap,
        );
        v.set(
            NwcfgFlags::AHB_DESCRIPTOR_ENDIAN_SWAP,
            f.ahb_descriptor_endian_swap,
        );
        v
    }
}

/// Bits 0 and 10 of `net_cfg`, which jointly encode link speed: `(0,0)` =
/// 10M, `(0,1)` = 100M, `(1,0)` = 1G.
pub fn speed_bits(speed: LinkSpeed) -> u32 {
    match speed {
        LinkSpeed::Speed10M => 0,
        LinkSpeed::Speed100M => 1 << 0,
        LinkSpeed::Speed1G => 1 << 10,
    }
}

/// Bits [22:21] of `net_cfg`: AMBA AHB data bus width. Values match the
/// original driver's `eth_xlnx_amba_dbus_width` enum (0/1/2 for 32/64/128
/// bits), not a bit-count encoding.
const NWCFG_DBUSW_MASK: u32 = 0x3;
const NWCFG_DBUSW_SHIFT: u32 = 21;

/// Bits [15:14] of `net_cfg`: RX buffer offset, in bytes, reserved at the
/// front of each RX buffer ahead of the frame payload.
const NWCFG_RXOFFS_MASK: u32 = 0x3;
const NWCFG_RXOFFS_SHIFT: u32 = 14;

fn dbusw_code(width: AmbaBusWidth) -> u32 {
    match width {
        AmbaBusWidth::Bits32 => 0,
        AmbaBusWidth::Bits64 => 1,
        AmbaBusWidth::Bits128 => 2,
    }
}

pub fn assemble_nwcfg(
    features: FeatureFlags,
    speed: LinkSpeed,
    bus_width: AmbaBusWidth,
    rx_offset: u8,
) -> u32 {
    NwcfgFlags::from(features).bits()
        | speed_bits(speed)
        | ((dbusw_code(bus_width) & NWCFG_DBUSW_MASK) << NWCFG_DBUSW_SHIFT)
        | ((u32::from(rx_offset) & NWCFG_RXOFFS_MASK) << NWCFG_RXOFFS_SHIFT)
}

/// AHB burst length is programmed as a literal beat count, not a sequential
/// code (the original driver's `AHB_BURST_*` constants are 1/4/8/16).
fn ahb_burst_code(burst: AhbBurstLength) -> u32 {
    match burst {
        AhbBurstLength::Single => 1,
        AhbBurstLength::Incr4 => 4,
        AhbBurstLength::Incr8 => 8,
        AhbBurstLength::Incr16 => 16,
    }
}

fn rx_fifo_size_code(size: RxFifoSize) -> u32 {
    match size {
        RxFifoSize::Kb1 => 0,
        RxFifoSize::Kb2 => 1,
        RxFifoSize::Kb4 => 2,
        RxFifoSize::Kb8 => 3,
    }
}

/// Assembles `dma_cfg` (DMACR) from the AHB/RX-buffer side of `Config`: AHB
/// burst length, hardware RX FIFO size, and the AHB-side RX buffer size (in
/// `ahb_rx_buffer_size_units`, the same units the original driver's
/// `ahb_rx_buffer_size` field uses). `amba_bus_width` and `hw_rx_offset` are
/// NWCFG fields, not DMACR, and are assembled by [`assemble_nwcfg`] instead.
pub fn assemble_dmacr(config: &Config) -> u32 {
    ((u32::from(config.ahb_rx_buffer_size_units) & dmacr::RX_BUF_MASK) << dmacr::RX_BUF_SHIFT)
        | ((rx_fifo_size_code(config.hw_rx_fifo_size) << dmacr::RX_SIZE_SHIFT)
            & dmacr::RX_SIZE_MASK)
        | (ahb_burst_code(config.ahb_burst) & dmacr::AHB_BURST_LENGTH_MASK)
}

/// MDC divisor lookup table: the divisor is chosen from the CPU-1x clock so
/// that the resulting MDIO clock stays at or below 2.5 MHz.
pub fn mdc_divisor_code(cpu_1x_hz: u32) -> u8 {
    const TABLE: &[(u32, u8)] = &[
        (20_000_000, 0b000),  // divide by 8
        (40_000_000, 0b001),  // divide by 16
        (80_000_000, 0b010),  // divide by 32
        (120_000_000, 0b011), // divide by 48
        (160_000_000, 0b100), // divide by 64
        (240_000_000, 0b101), // divide by 96
        (320_000_000, 0b110), // divide by 128
    ];
    for (threshold, code) in TABLE {
        if cpu_1x_hz < *threshold {
            return *code;
        }
    }
    0b111 // divide by 224, for clocks >= 320 MHz
}

/// Packs a 6-byte MAC address into the `(spec_addr1_bot, spec_addr1_top)`
/// pair. `addr[0]` lands in the low byte of `spec_addr1_bot`, which is what
/// puts it first on the wire (spec.md section 9's resolved byte-order
/// question).
pub fn pack_mac_address(addr: [u8; 6]) -> (u32, u32) {
    let bot = u32::from(addr[0])
        | (u32::from(addr[1]) << 8)
        | (u32::from(addr[2]) << 16)
        | (u32::from(addr[3]) << 24);
    let top = u32::from(addr[4]) | (u32::from(addr[5]) << 8);
    (bot, top)
}

pub struct Mac<'a> {
    regs: &'a GemRegs,
}

impl<'a> Mac<'a> {
    pub fn new(regs: &'a GemRegs) -> Self {
        Self { regs }
    }

    /// Resets MAC-owned state: NCR to 0, statistics cleared, TX/RX status
    /// cleared, all interrupts disabled, ring base registers zeroed, then
    /// the MDIO management port enabled. `MGMT_PORT_EN` must be set before
    /// any MDIO transaction is attempted (the original driver sets it
    /// immediately after this same sequence, before PHY detection), and
    /// `start`/`stop` only ever touch `RXEN`/`TXEN`, so it stays set for the
    /// life of the device from here on.
    pub fn reset(&self) {
        self.regs.net_ctrl.set(0);
        self.regs.net_ctrl.set(ncr::CLEAR_STAT_REGS);
        self.regs.tx_status.set(self.regs.tx_status.get());
        self.regs.rx_status.set(self.regs.rx_status.get());
        self.regs.intr_disable.set(u32::MAX);
        self.regs.rx_qbase.set(0);
        self.regs.tx_qbase.set(0);
        self.regs
            .net_ctrl
            .set(self.regs.net_ctrl.get() | ncr::MGMT_PORT_EN);
    }

    pub fn program_address(&self, addr: [u8; 6]) {
        let (bot, top) = pack_mac_address(addr);
        self.regs.spec_addr1_bot.set(bot);
        self.regs.spec_addr1_top.set(top);
    }

    pub fn program_nwcfg(&self, config: &Config, speed: LinkSpeed) {
        self.regs.net_cfg.set(assemble_nwcfg(
            config.features,
            speed,
            config.amba_bus_width,
            config.hw_rx_offset,
        ));
    }

    /// Programs `dma_cfg` (DMACR) from `config`'s AHB/RX-buffer fields.
    /// Called alongside `program_nwcfg`, both at device init and on every
    /// clock reconfiguration, since neither register is touched by
    /// `start`/`stop`.
    pub fn program_dmacr(&self, config: &Config) {
        self.regs.dma_cfg.set(assemble_dmacr(config));
    }

    pub fn set_ring_bases(&self, rx_base: u32, tx_base: u32) {
        self.regs.rx_qbase.set(rx_base);
        self.regs.tx_qbase.set(tx_base);
    }

    /// Enables RX and TX, disabling interrupts around the transition and
    /// re-enabling the handled set afterward (spec.md section 4.4's
    /// start sequence).
    pub fn start(&self, enabled_interrupts: u32) {
        self.regs.intr_disable.set(u32::MAX);
        self.regs
            .net_ctrl
            .set(self.regs.net_ctrl.get() | ncr::RXEN | ncr::TXEN);
        self.regs.intr_enable.set(enabled_interrupts);
    }

    pub fn stop(&self) {
        self.regs
            .net_ctrl
            .set(self.regs.net_ctrl.get() & !(ncr::RXEN | ncr::TXEN));
        self.regs.intr_disable.set(u32::MAX);
        self.regs.intr_status.set(u32::MAX);
    }

    pub fn kick_tx(&self) {
        self.regs
            .net_ctrl
            .set(self.regs.net_ctrl.get() | ncr::START_TX);
    }
}
