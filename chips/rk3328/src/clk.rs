// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Rockchip clock descriptors.
//!
//! A Rockchip CRU is a set of gates plus a tree of typed clocks (PLLs,
//! composite mux/divider/gate blocks, fractional dividers, plain muxes,
//! fixed rates and links to clocks provided elsewhere). Every clock names
//! its parents as strings, the tree being resolved by the clock framework
//! once everything is registered.
//!
//! CRU registers use the upper half-word as a write mask for the lower one,
//! so every bit field must fit in the low 16 bits of its register.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

/// Oscillator every table is rooted at; it is provided outside the CRU.
pub const OSC_NAME: &str = "xin24m";
pub const OSC_FREQ: u64 = 24_000_000;

/// Tolerance when checking rate tables against the reference.
const RATE_TOLERANCE: u64 = 1_000;

const FRAC_BITS: u32 = 24;

/// Identity shared by every clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDef {
    /// Binding id, 0 for clocks not exported to consumers.
    pub id: u32,
    pub name: &'static str,
    pub parents: &'static [&'static str],
}

impl ClockDef {
    pub const fn new(id: u32, name: &'static str, parents: &'static [&'static str]) -> Self {
        Self { id, name, parents }
    }
}

/// Stand-alone enable bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateDef {
    pub id: u32,
    pub name: &'static str,
    pub parent: &'static str,
    pub offset: u32,
    pub shift: u32,
}

impl GateDef {
    pub const fn new(
        id: u32,
        name: &'static str,
        parent: &'static str,
        offset: u32,
        shift: u32,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            offset,
            shift,
        }
    }
}

/// Enable bit embedded in a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateBit {
    pub offset: u32,
    pub shift: u32,
}

impl GateBit {
    pub const fn new(offset: u32, shift: u32) -> Self {
        Self { offset, shift }
    }
}

/// Contiguous bit field of a hiword-mask register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    pub shift: u32,
    pub width: u32,
}

impl BitField {
    pub const fn new(shift: u32, width: u32) -> Self {
        Self { shift, width }
    }

    pub const fn mask(&self) -> u32 {
        ((1 << self.width) - 1) << self.shift
    }

    /// Register value updating this field to `value` and leaving the other
    /// bits alone.
    pub const fn write(&self, value: u32) -> u32 {
        (self.mask() << 16) | ((value << self.shift) & self.mask())
    }

    fn fits(&self) -> bool {
        self.width > 0 && self.shift.saturating_add(self.width) <= 16
    }
}

/// One PLL setting. `frac` only applies when `dsmpd` is 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllRate {
    pub freq: u64,
    pub refdiv: u32,
    pub fbdiv: u32,
    pub postdiv1: u32,
    pub postdiv2: u32,
    pub dsmpd: u32,
    pub frac: u32,
}

impl PllRate {
    /// Integer mode setting.
    pub const fn int(freq: u64, refdiv: u32, fbdiv: u32, postdiv1: u32, postdiv2: u32) -> Self {
        Self {
            freq,
            refdiv,
            fbdiv,
            postdiv1,
            postdiv2,
            dsmpd: 1,
            frac: 0,
        }
    }

    /// Fractional mode setting, `frac` in 1/2^24 units of the feedback
    /// divider.
    pub const fn frac(
        freq: u64,
        refdiv: u32,
        fbdiv: u32,
        postdiv1: u32,
        postdiv2: u32,
        frac: u32,
    ) -> Self {
        Self {
            freq,
            refdiv,
            fbdiv,
            postdiv1,
            postdiv2,
            dsmpd: 0,
            frac,
        }
    }

    /// Output frequency for an input of `reference` Hz.
    pub fn output(&self, reference: u64) -> Option<u64> {
        if self.frac >> FRAC_BITS != 0 {
            return None;
        }
        let mut feedback = u64::from(self.fbdiv) << FRAC_BITS;
        if self.dsmpd == 0 {
            feedback += u64::from(self.frac);
        }
        let divider = u64::from(self.refdiv)
            .checked_mul(u64::from(self.postdiv1))?
            .checked_mul(u64::from(self.postdiv2))?
            .checked_mul(1 << FRAC_BITS)?;
        reference.checked_mul(feedback)?.checked_div(divider)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllDef {
    pub clkdef: ClockDef,
    pub base_offset: u32,
    pub gate: Option<GateBit>,
    pub mode_reg: u32,
    pub mode_shift: u32,
    pub rates: &'static [PllRate],
    pub frac_rates: &'static [PllRate],
}

/// Mux, divider and gate sharing one clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositeDef {
    pub clkdef: ClockDef,
    pub muxdiv_offset: u32,
    pub mux: Option<BitField>,
    pub div: Option<BitField>,
    pub gate: Option<GateBit>,
    /// The mux register lives in the general register file.
    pub grf: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MuxDef {
    pub clkdef: ClockDef,
    pub offset: u32,
    pub field: BitField,
    /// Follow a rate request by switching parent.
    pub reparent: bool,
}

/// Numerator/denominator divider, one 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FractDef {
    pub clkdef: ClockDef,
    pub offset: u32,
    pub gate: Option<GateBit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDef {
    pub clkdef: ClockDef,
    /// 0 when the rate comes from the board.
    pub freq: u64,
}

/// Placeholder for a clock registered by another provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkDef {
    pub clkdef: ClockDef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArmClkRate {
    pub freq: u64,
    pub div: u32,
}

/// CPU clock: a mux and divider switched between a main and an alternate
/// parent while the main PLL is retuned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArmClkDef {
    pub clkdef: ClockDef,
    pub muxdiv_offset: u32,
    pub mux: BitField,
    pub div: BitField,
    pub main_parent: usize,
    pub alt_parent: usize,
    pub rates: &'static [ArmClkRate],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clock {
    Pll(PllDef),
    Composite(CompositeDef),
    Mux(MuxDef),
    Fract(FractDef),
    Fixed(FixedDef),
    Link(LinkDef),
    ArmClk(ArmClkDef),
}

impl Clock {
    pub fn def(&self) -> &ClockDef {
        match self {
            Clock::Pll(c) => &c.clkdef,
            Clock::Composite(c) => &c.clkdef,
            Clock::Mux(c) => &c.clkdef,
            Clock::Fract(c) => &c.clkdef,
            Clock::Fixed(c) => &c.clkdef,
            Clock::Link(c) => &c.clkdef,
            Clock::ArmClk(c) => &c.clkdef,
        }
    }
}

/// Inconsistency found in a clock table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    DuplicateId(u32),
    DuplicateName(&'static str),
    UnknownParent {
        clock: &'static str,
        parent: &'static str,
    },
    /// The clock is its own ancestor.
    ParentCycle(&'static str),
    Misaligned {
        clock: &'static str,
        offset: u32,
    },
    /// A field or gate bit reaches into the write-mask half.
    FieldOverflow(&'static str),
    /// The mux cannot select every parent, or a parent index is out of range.
    MuxTooNarrow(&'static str),
    PllRate {
        clock: &'static str,
        freq: u64,
    },
    /// The divider of a CPU rate does not fit its field.
    ArmClkRate {
        clock: &'static str,
        freq: u64,
    },
}

/// Receives the contents of a CRU.
pub trait ClockEngine {
    type Error;

    fn register_gate(&mut self, gate: &GateDef) -> Result<(), Self::Error>;
    fn register_clock(&mut self, clock: &Clock) -> Result<(), Self::Error>;
    /// Reset lines are `count` consecutive bits starting at `offset`.
    fn register_reset(&mut self, offset: u32, count: u32) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachError<E> {
    Table(TableError),
    Engine(E),
}

impl<E> From<TableError> for AttachError<E> {
    fn from(e: TableError) -> Self {
        AttachError::Table(e)
    }
}

fn check_offset(clock: &'static str, offset: u32) -> Result<(), TableError> {
    if offset % 4 != 0 {
        return Err(TableError::Misaligned { clock, offset });
    }
    Ok(())
}

fn check_gate_bit(clock: &'static str, gate: Option<GateBit>) -> Result<(), TableError> {
    if let Some(gate) = gate {
        check_offset(clock, gate.offset)?;
        if gate.shift >= 16 {
            return Err(TableError::FieldOverflow(clock));
        }
    }
    Ok(())
}

fn check_field(clock: &'static str, field: BitField) -> Result<(), TableError> {
    if !field.fits() {
        return Err(TableError::FieldOverflow(clock));
    }
    Ok(())
}

fn check_mux(clock: &ClockDef, field: BitField) -> Result<(), TableError> {
    check_field(clock.name, field)?;
    if clock.parents.len() > 1 << field.width {
        return Err(TableError::MuxTooNarrow(clock.name));
    }
    Ok(())
}

fn check_pll_rates(clock: &'static str, rates: &[PllRate]) -> Result<(), TableError> {
    for rate in rates {
        let consistent = rate
            .output(OSC_FREQ)
            .is_some_and(|out| out.abs_diff(rate.freq) <= RATE_TOLERANCE);
        if !consistent {
            return Err(TableError::PllRate {
                clock,
                freq: rate.freq,
            });
        }
    }
    Ok(())
}

/// Register layout checks of a single clock.
fn check_layout(clock: &Clock) -> Result<(), TableError> {
    let name = clock.def().name;
    match clock {
        Clock::Pll(pll) => {
            check_offset(name, pll.base_offset)?;
            check_offset(name, pll.mode_reg)?;
            if pll.mode_shift >= 16 {
                return Err(TableError::FieldOverflow(name));
            }
            check_gate_bit(name, pll.gate)?;
            check_pll_rates(name, pll.rates)?;
            check_pll_rates(name, pll.frac_rates)?;
        }
        Clock::Composite(c) => {
            check_offset(name, c.muxdiv_offset)?;
            if let Some(mux) = c.mux {
                check_mux(&c.clkdef, mux)?;
            }
            if let Some(div) = c.div {
                check_field(name, div)?;
            }
            check_gate_bit(name, c.gate)?;
        }
        Clock::Mux(m) => {
            check_offset(name, m.offset)?;
            check_mux(&m.clkdef, m.field)?;
        }
        Clock::Fract(f) => {
            check_offset(name, f.offset)?;
            check_gate_bit(name, f.gate)?;
        }
        Clock::Fixed(_) | Clock::Link(_) => {}
        Clock::ArmClk(a) => {
            check_offset(name, a.muxdiv_offset)?;
            check_mux(&a.clkdef, a.mux)?;
            check_field(name, a.div)?;
            let parents = a.clkdef.parents.len();
            if a.main_parent >= parents || a.alt_parent >= parents {
                return Err(TableError::MuxTooNarrow(name));
            }
            for rate in a.rates {
                if rate.div == 0 || rate.div > 1 << a.div.width {
                    return Err(TableError::ArmClkRate {
                        clock: name,
                        freq: rate.freq,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Check a CRU description before it is handed to a [`ClockEngine`].
///
/// Gates and clocks share one namespace: a gate may feed a clock and the
/// other way around.
pub fn validate(gates: &[GateDef], clocks: &[Clock]) -> Result<(), TableError> {
    let mut nodes: Vec<(&'static str, u32, &[&'static str])> = Vec::new();
    nodes.extend(
        gates
            .iter()
            .map(|g| (g.name, g.id, core::slice::from_ref(&g.parent))),
    );
    nodes.extend(clocks.iter().map(|c| {
        let def = c.def();
        (def.name, def.id, def.parents)
    }));

    let mut index = BTreeMap::new();
    let mut ids = BTreeSet::new();
    for (i, &(name, id, _)) in nodes.iter().enumerate() {
        if index.insert(name, i).is_some() {
            return Err(TableError::DuplicateName(name));
        }
        if id != 0 && !ids.insert(id) {
            return Err(TableError::DuplicateId(id));
        }
    }

    for &(clock, _, parents) in &nodes {
        for &parent in parents {
            if parent != OSC_NAME && !index.contains_key(parent) {
                return Err(TableError::UnknownParent { clock, parent });
            }
        }
    }

    check_acyclic(&nodes, &index)?;

    for gate in gates {
        check_gate_bit(gate.name, Some(GateBit::new(gate.offset, gate.shift)))?;
    }
    clocks.iter().try_for_each(check_layout)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Open,
    Done,
}

/// Depth-first walk over the parent links.
fn check_acyclic(
    nodes: &[(&'static str, u32, &[&'static str])],
    index: &BTreeMap<&'static str, usize>,
) -> Result<(), TableError> {
    let mut marks = Vec::new();
    marks.resize(nodes.len(), Mark::New);
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..nodes.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Open;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            let parents = nodes[node].2;
            if next == parents.len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            top.1 += 1;

            // The external oscillator has no parents.
            let Some(&parent) = index.get(parents[next]) else {
                continue;
            };
            match marks[parent] {
                Mark::Open => return Err(TableError::ParentCycle(nodes[parent].0)),
                Mark::Done => {}
                Mark::New => {
                    marks[parent] = Mark::Open;
                    stack.push((parent, 0));
                }
            }
        }
    }
    Ok(())
}

/// Validate the tables, then register the gates, the clocks in table order
/// and finally the reset lines.
pub fn register<E: ClockEngine>(
    engine: &mut E,
    gates: &[GateDef],
    clocks: &[Clock],
    reset_offset: u32,
    reset_count: u32,
) -> Result<(), AttachError<E::Error>> {
    validate(gates, clocks)?;

    for gate in gates {
        engine.register_gate(gate).map_err(AttachError::Engine)?;
    }
    for clock in clocks {
        engine.register_clock(clock).map_err(AttachError::Engine)?;
    }
    engine
        .register_reset(reset_offset, reset_count)
        .map_err(AttachError::Engine)
}
