// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! RK3328 clock and reset unit.
//!
//! Register offsets are relative to the CRU base, except for the composites
//! flagged `grf` whose mux sits in the general register file.

use log::{debug, warn};

use crate::clk::{
    self, ArmClkDef, ArmClkRate, AttachError, BitField, Clock, ClockDef, ClockEngine,
    CompositeDef, FixedDef, FractDef, GateBit, GateDef, LinkDef, MuxDef, PllDef, PllRate,
    OSC_NAME,
};

const GRF_SOC_CON4: u32 = 0x410;
const GRF_MAC_CON1: u32 = 0x904;
const GRF_MAC_CON2: u32 = 0x908;

const RESET_OFFSET: u32 = 0x300;
const RESET_COUNT: u32 = 184;

pub static GATES: [GateDef; 54] = [
    // CRU_CLKGATE_CON0
    GateDef::new(0, "core_apll_clk_en", "apll", 0x200, 0),
    GateDef::new(0, "core_dpll_clk_en", "dpll", 0x200, 1),
    GateDef::new(0, "core_gpll_clk_en", "gpll", 0x200, 2),
    GateDef::new(0, "core_npll_clk_en", "npll", 0x200, 12),
    // CRU_CLKGATE_CON1
    GateDef::new(0, "clk_i2s0_src_en", "clk_i2s0_mux", 0x204, 1),
    GateDef::new(0, "clk_i2s0_frac_src_en", "clk_i2s0_mux", 0x204, 2),
    GateDef::new(41, "clk_i2s0_en", "clk_i2s0_mux", 0x204, 3),
    GateDef::new(0, "clk_i2s1_src_en", "clk_i2s1_mux", 0x204, 4),
    GateDef::new(0, "clk_i2s1_frac_src_en", "clk_i2s1_mux", 0x204, 5),
    GateDef::new(42, "clk_i2s1_en", "clk_i2s1_mux", 0x204, 6),
    GateDef::new(0, "clk_i2s1_out_en", "clk_i2s1_mux", 0x204, 7),
    GateDef::new(0, "clk_i2s2_src_en", "clk_i2s2_mux", 0x204, 8),
    GateDef::new(0, "clk_i2s2_frac_src_en", "clk_i2s2_mux", 0x204, 9),
    GateDef::new(43, "clk_i2s2_en", "clk_i2s2_mux", 0x204, 10),
    GateDef::new(0, "clk_i2s2_out_en", "clk_i2s2_mux", 0x204, 11),
    // CRU_CLKGATE_CON4
    GateDef::new(0, "periph_gclk_src_en", "gpll", 0x210, 0),
    GateDef::new(0, "periph_cclk_src_en", "cpll", 0x210, 1),
    GateDef::new(96, "clk_usb3_otg0_ref", OSC_NAME, 0x210, 7),
    // CRU_CLKGATE_CON8
    GateDef::new(0, "pclk_bus_en", "pclk_bus_pre", 0x220, 3),
    GateDef::new(0, "pclk_phy_en", "pclk_bus_pre", 0x220, 4),
    // CRU_CLKGATE_CON9
    GateDef::new(83, "clk_gmac2phy_rx_en", "clk_mac2phy", 0x224, 1),
    GateDef::new(85, "clk_gmac2phy_ref_en", "clk_mac2phy", 0x224, 3),
    GateDef::new(87, "clk_gmac2io_rx_en", "clk_mac2io", 0x224, 4),
    GateDef::new(88, "clk_gmac2io_tx_en", "clk_mac2io", 0x224, 5),
    GateDef::new(89, "clk_gmac2io_refout_en", "clk_mac2io", 0x224, 6),
    GateDef::new(90, "clk_gmac2io_ref_en", "clk_mac2io", 0x224, 7),
    // CRU_CLKGATE_CON10
    GateDef::new(153, "aclk_periph_en", "aclk_peri_pre", 0x228, 0),
    // CRU_CLKGATE_CON15
    GateDef::new(311, "hclk_i2s0_8ch_en", "hclk_bus_pre", 0x23c, 3),
    GateDef::new(312, "hclk_i2s1_8ch_en", "hclk_bus_pre", 0x23c, 4),
    GateDef::new(313, "hclk_i2s2_2ch_en", "hclk_bus_pre", 0x23c, 5),
    GateDef::new(205, "pclk_i2c0_en", "pclk_bus_en", 0x23c, 10),
    // CRU_CLKGATE_CON16
    GateDef::new(206, "pclk_i2c1_en", "pclk_bus_en", 0x240, 0),
    GateDef::new(207, "pclk_i2c2_en", "pclk_bus_en", 0x240, 1),
    GateDef::new(208, "pclk_i2c3_en", "pclk_bus_en", 0x240, 2),
    GateDef::new(200, "pclk_gpio0_en", "pclk_bus_en", 0x240, 7),
    GateDef::new(201, "pclk_gpio1_en", "pclk_bus_en", 0x240, 8),
    GateDef::new(202, "pclk_gpio2_en", "pclk_bus_en", 0x240, 9),
    GateDef::new(203, "pclk_gpio3_en", "pclk_bus_en", 0x240, 10),
    GateDef::new(213, "pclk_tsadc_en", "pclk_bus_en", 0x240, 14),
    // CRU_CLKGATE_CON17
    GateDef::new(226, "pclk_usb3grf_en", "pclk_phy_en", 0x244, 2),
    GateDef::new(235, "pclk_acodecphy_en", "pclk_phy_en", 0x244, 5),
    // CRU_CLKGATE_CON19
    GateDef::new(317, "hclk_sdmmc_en", "hclk_peri", 0x24c, 0),
    GateDef::new(318, "hclk_sdio_en", "hclk_peri", 0x24c, 1),
    GateDef::new(319, "hclk_emmc_en", "hclk_peri", 0x24c, 2),
    GateDef::new(0, "hclk_peri_niu_en", "hclk_peri", 0x24c, 12),
    GateDef::new(0, "pclk_peri_niu_en", "hclk_peri", 0x24c, 13),
    GateDef::new(132, "aclk_usb3otg_en", "aclk_periph_en", 0x24c, 14),
    GateDef::new(320, "hclk_sdmmc_ext_en", "hclk_peri", 0x24c, 15),
    // CRU_CLKGATE_CON26
    GateDef::new(149, "aclk_gmac2phy_en", "aclk_gmac", 0x268, 0),
    GateDef::new(222, "pclk_gmac2phy_en", "pclk_gmac", 0x268, 1),
    GateDef::new(150, "aclk_gmac2io_en", "aclk_gmac", 0x268, 2),
    GateDef::new(223, "pclk_gmac2io_en", "pclk_gmac", 0x268, 3),
    // CRU_CLKGATE_CON28
    GateDef::new(224, "pclk_usb3phy_otg_en", "pclk_phy_en", 0x270, 1),
    GateDef::new(225, "pclk_usb3phy_pipe_en", "pclk_phy_en", 0x270, 2),
];

static PLL_RATES: [PllRate; 42] = [
    PllRate::int(1_608_000_000, 1, 67, 1, 1),
    PllRate::int(1_584_000_000, 1, 66, 1, 1),
    PllRate::int(1_560_000_000, 1, 65, 1, 1),
    PllRate::int(1_536_000_000, 1, 64, 1, 1),
    PllRate::int(1_512_000_000, 1, 63, 1, 1),
    PllRate::int(1_488_000_000, 1, 62, 1, 1),
    PllRate::int(1_464_000_000, 1, 61, 1, 1),
    PllRate::int(1_440_000_000, 1, 60, 1, 1),
    PllRate::int(1_416_000_000, 1, 59, 1, 1),
    PllRate::int(1_392_000_000, 1, 58, 1, 1),
    PllRate::int(1_368_000_000, 1, 57, 1, 1),
    PllRate::int(1_344_000_000, 1, 56, 1, 1),
    PllRate::int(1_320_000_000, 1, 55, 1, 1),
    PllRate::int(1_296_000_000, 1, 54, 1, 1),
    PllRate::int(1_272_000_000, 1, 53, 1, 1),
    PllRate::int(1_248_000_000, 1, 52, 1, 1),
    PllRate::int(1_200_000_000, 1, 50, 1, 1),
    PllRate::int(1_188_000_000, 2, 99, 1, 1),
    PllRate::int(1_104_000_000, 1, 46, 1, 1),
    PllRate::int(1_100_000_000, 12, 550, 1, 1),
    PllRate::int(1_008_000_000, 1, 84, 2, 1),
    PllRate::int(1_000_000_000, 6, 500, 2, 1),
    PllRate::int(984_000_000, 1, 82, 2, 1),
    PllRate::int(960_000_000, 1, 80, 2, 1),
    PllRate::int(936_000_000, 1, 78, 2, 1),
    PllRate::int(912_000_000, 1, 76, 2, 1),
    PllRate::int(900_000_000, 4, 300, 2, 1),
    PllRate::int(888_000_000, 1, 74, 2, 1),
    PllRate::int(864_000_000, 1, 72, 2, 1),
    PllRate::int(840_000_000, 1, 70, 2, 1),
    PllRate::int(816_000_000, 1, 68, 2, 1),
    PllRate::int(800_000_000, 6, 400, 2, 1),
    PllRate::int(700_000_000, 6, 350, 2, 1),
    PllRate::int(696_000_000, 1, 58, 2, 1),
    PllRate::int(600_000_000, 1, 75, 3, 1),
    PllRate::int(594_000_000, 2, 99, 2, 1),
    PllRate::int(504_000_000, 1, 63, 3, 1),
    PllRate::int(500_000_000, 6, 250, 2, 1),
    PllRate::int(408_000_000, 1, 68, 2, 2),
    PllRate::int(312_000_000, 1, 52, 2, 2),
    PllRate::int(216_000_000, 1, 72, 4, 2),
    PllRate::int(96_000_000, 1, 64, 4, 4),
];

static PLL_FRAC_RATES: [PllRate; 6] = [
    PllRate::frac(1_016_064_000, 3, 127, 1, 1, 134217),
    PllRate::frac(983_040_000, 24, 983, 1, 1, 671088),
    PllRate::frac(491_520_000, 24, 983, 2, 1, 671088),
    PllRate::frac(61_440_000, 6, 215, 7, 2, 671088),
    PllRate::frac(56_448_000, 12, 451, 4, 4, 9797894),
    PllRate::frac(40_960_000, 12, 409, 4, 5, 10066329),
];

static ARMCLK_RATES: [ArmClkRate; 12] = [
    ArmClkRate { freq: 1_296_000_000, div: 1 },
    ArmClkRate { freq: 1_200_000_000, div: 1 },
    ArmClkRate { freq: 1_104_000_000, div: 1 },
    ArmClkRate { freq: 1_008_000_000, div: 1 },
    ArmClkRate { freq: 912_000_000, div: 1 },
    ArmClkRate { freq: 816_000_000, div: 1 },
    ArmClkRate { freq: 696_000_000, div: 1 },
    ArmClkRate { freq: 600_000_000, div: 1 },
    ArmClkRate { freq: 408_000_000, div: 1 },
    ArmClkRate { freq: 312_000_000, div: 1 },
    ArmClkRate { freq: 216_000_000, div: 1 },
    ArmClkRate { freq: 96_000_000, div: 1 },
];

const PLL_PARENTS: &[&str] = &[OSC_NAME];
const CPLL_GPLL: &[&str] = &["cpll", "gpll"];
const MMC_PARENTS: &[&str] = &["cpll", "gpll", OSC_NAME];
const PLL_MODE_REG: u32 = 0x80;

const fn pll(
    id: u32,
    name: &'static str,
    base_offset: u32,
    gate: Option<GateBit>,
    mode_shift: u32,
    rates: &'static [PllRate],
    frac_rates: &'static [PllRate],
) -> Clock {
    Clock::Pll(PllDef {
        clkdef: ClockDef::new(id, name, PLL_PARENTS),
        base_offset,
        gate,
        mode_reg: PLL_MODE_REG,
        mode_shift,
        rates,
        frac_rates,
    })
}

/// Composite with a divider and a gate, the building block of most leaves.
const fn composite(
    id: u32,
    name: &'static str,
    parents: &'static [&'static str],
    muxdiv_offset: u32,
    mux: Option<BitField>,
    div: Option<BitField>,
    gate: Option<GateBit>,
) -> Clock {
    Clock::Composite(CompositeDef {
        clkdef: ClockDef::new(id, name, parents),
        muxdiv_offset,
        mux,
        div,
        gate,
        grf: false,
    })
}

/// Clock source select held in the GRF.
const fn grf_mux(
    id: u32,
    name: &'static str,
    parents: &'static [&'static str],
    offset: u32,
    shift: u32,
) -> Clock {
    Clock::Composite(CompositeDef {
        clkdef: ClockDef::new(id, name, parents),
        muxdiv_offset: offset,
        mux: Some(BitField::new(shift, 1)),
        div: None,
        gate: None,
        grf: true,
    })
}

const fn fract(name: &'static str, parents: &'static [&'static str], offset: u32, gate_shift: u32) -> Clock {
    Clock::Fract(FractDef {
        clkdef: ClockDef::new(0, name, parents),
        offset,
        gate: Some(GateBit::new(0x204, gate_shift)),
    })
}

const fn i2s_mux(name: &'static str, parents: &'static [&'static str], offset: u32) -> Clock {
    Clock::Mux(MuxDef {
        clkdef: ClockDef::new(0, name, parents),
        offset,
        field: BitField::new(8, 2),
        reparent: true,
    })
}

const fn fixed(name: &'static str, freq: u64) -> Clock {
    Clock::Fixed(FixedDef {
        clkdef: ClockDef::new(0, name, &[]),
        freq,
    })
}

const fn mux(shift: u32, width: u32) -> Option<BitField> {
    Some(BitField::new(shift, width))
}

const fn div(shift: u32, width: u32) -> Option<BitField> {
    Some(BitField::new(shift, width))
}

const fn gate(offset: u32, shift: u32) -> Option<GateBit> {
    Some(GateBit::new(offset, shift))
}

pub static CLOCKS: [Clock; 46] = [
    pll(1, "apll", 0x00, gate(0x200, 0), 1, &[], &PLL_FRAC_RATES),
    pll(2, "dpll", 0x20, gate(0x200, 1), 4, &[], &[]),
    pll(3, "cpll", 0x40, None, 8, &PLL_RATES, &[]),
    pll(4, "gpll", 0x60, gate(0x200, 2), 12, &[], &PLL_FRAC_RATES),
    pll(5, "npll", 0xa0, gate(0x200, 12), 1, &PLL_RATES, &[]),
    // CRU_CLKSEL_CON0/1
    composite(136, "aclk_bus_pre", CPLL_GPLL, 0x100, mux(13, 2), div(8, 5), gate(0x220, 0)),
    composite(328, "hclk_bus_pre", &["aclk_bus_pre"], 0x104, None, div(8, 2), gate(0x220, 1)),
    composite(216, "pclk_bus_pre", &["aclk_bus_pre"], 0x104, None, div(12, 3), gate(0x220, 2)),
    Clock::ArmClk(ArmClkDef {
        clkdef: ClockDef::new(6, "armclk", &["apll", "gpll", "dpll", "npll"]),
        muxdiv_offset: 0x100,
        mux: BitField::new(6, 2),
        div: BitField::new(0, 5),
        // npll, then apll while npll is retuned
        main_parent: 3,
        alt_parent: 0,
        rates: &ARMCLK_RATES,
    }),
    composite(36, "clk_tsadc", PLL_PARENTS, 0, None, div(0, 9), None),
    composite(137, "aclk_peri_pre", CPLL_GPLL, 0x170, mux(6, 2), div(0, 5), None),
    composite(230, "pclk_peri", &["aclk_peri_pre"], 0, None, div(0, 2), gate(0x228, 2)),
    composite(308, "hclk_peri", &["aclk_peri_pre"], 0, None, div(4, 3), gate(0x228, 1)),
    composite(33, "clk_sdmmc", MMC_PARENTS, 0x178, mux(8, 2), div(0, 8), gate(0x210, 3)),
    composite(34, "clk_sdio", MMC_PARENTS, 0x17c, mux(8, 2), div(0, 8), gate(0x210, 4)),
    composite(35, "clk_emmc", MMC_PARENTS, 0x180, mux(8, 2), div(0, 8), gate(0x210, 5)),
    composite(55, "clk_i2c0", CPLL_GPLL, 0x188, mux(7, 1), div(0, 6), gate(0x208, 9)),
    composite(56, "clk_i2c1", CPLL_GPLL, 0x188, mux(15, 1), div(8, 6), gate(0x208, 10)),
    composite(57, "clk_i2c2", CPLL_GPLL, 0x18c, mux(7, 1), div(0, 6), gate(0x208, 11)),
    composite(58, "clk_i2c3", CPLL_GPLL, 0x18c, mux(15, 1), div(8, 6), gate(0x208, 12)),
    composite(95, "clk_ref_usb3otg", &[OSC_NAME, "clk_usb3_otg0_ref"], 0x1b4, mux(8, 1), None, None),
    composite(98, "clk_ref_usb3otg_src", CPLL_GPLL, 0x1b4, None, div(0, 7), gate(0x210, 9)),
    composite(97, "clk_usb3otg_suspend", PLL_PARENTS, 0x184, None, div(0, 10), gate(0x210, 8)),
    // I2S0, CRU_CLKSEL_CON6/7
    composite(0, "clk_i2s0_div", CPLL_GPLL, 0x118, None, div(0, 7), gate(0x204, 1)),
    fract("clk_i2s0_frac", &["clk_i2s0_div"], 0x11c, 2),
    i2s_mux("clk_i2s0_mux", &["clk_i2s0_div", "clk_i2s0_frac", "xin12m", "xin12m"], 0x118),
    // I2S1, CRU_CLKSEL_CON8/9
    composite(0, "clk_i2s1_div", CPLL_GPLL, 0x120, None, div(0, 7), gate(0x204, 4)),
    fract("clk_i2s1_frac", &["clk_i2s1_div"], 0x124, 5),
    i2s_mux("clk_i2s1_mux", &["clk_i2s1_div", "clk_i2s1_frac", "clkin_i2s1", "xin12m"], 0x120),
    fixed("clkin_i2s1", 0),
    // I2S2, CRU_CLKSEL_CON10/11
    composite(0, "clk_i2s2_div", CPLL_GPLL, 0x128, None, div(0, 7), gate(0x204, 8)),
    fract("clk_i2s2_frac", &["clk_i2s2_div"], 0x12c, 9),
    i2s_mux("clk_i2s2_mux", &["clk_i2s2_div", "clk_i2s2_frac", "clkin_i2s2", "xin12m"], 0x128),
    fixed("clkin_i2s2", 0),
    fixed("xin12m", 12_000_000),
    // GMAC
    composite(99, "clk_mac2io_src", CPLL_GPLL, 0x16c, mux(7, 1), div(0, 5), gate(0x20c, 1)),
    grf_mux(100, "clk_mac2io", &["clk_mac2io_src", "gmac_clkin"], GRF_MAC_CON1, 10),
    composite(91, "clk_mac2io_out", CPLL_GPLL, 0x16c, mux(15, 1), div(8, 5), gate(0x20c, 5)),
    grf_mux(102, "clk_mac2io_ext", &["clk_mac2io", "gmac_clkin"], GRF_SOC_CON4, 14),
    composite(84, "clk_mac2phy_src", CPLL_GPLL, 0x168, mux(7, 1), div(0, 5), gate(0x20c, 0)),
    grf_mux(101, "clk_mac2phy", &["clk_mac2phy_src", "phy_50m_out"], GRF_MAC_CON2, 10),
    composite(86, "clk_mac2phy_out", &["clk_mac2phy"], 0x168, None, div(8, 2), gate(0x224, 2)),
    fixed("phy_50m_out", 50_000_000),
    Clock::Link(LinkDef {
        clkdef: ClockDef::new(0, "gmac_clkin", &[]),
    }),
    composite(146, "aclk_gmac", CPLL_GPLL, 0x18c, mux(6, 2), div(0, 5), gate(0x20c, 2)),
    composite(220, "pclk_gmac", &["aclk_gmac"], 0x164, None, div(8, 3), gate(0x224, 0)),
];

/// Driver for the RK3328 CRU.
pub struct Rk3328Cru;

impl Rk3328Cru {
    pub const COMPATIBLE: &'static str = "rockchip,rk3328-cru";

    pub fn probe(compatible: &str) -> bool {
        compatible == Self::COMPATIBLE
    }

    /// Hand every gate, clock and reset line of the unit to `engine`.
    pub fn attach<E: ClockEngine>(engine: &mut E) -> Result<(), AttachError<E::Error>> {
        clk::register(engine, &GATES, &CLOCKS, RESET_OFFSET, RESET_COUNT).map_err(|e| {
            if let AttachError::Table(t) = e {
                warn!(target: "rk3328::cru", "clock table rejected: {:?}", t);
            }
            e
        })?;
        debug!(
            target: "rk3328::cru",
            "registered {} gates, {} clocks and {} resets",
            GATES.len(),
            CLOCKS.len(),
            RESET_COUNT
        );
        Ok(())
    }
}
