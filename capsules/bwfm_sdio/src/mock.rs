// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Simulated SDIO card used by the unit tests.
//!
//! Function 0 and the function-1 misc registers are plain byte registers.
//! Function-1 word and extended accesses land in a sparse backplane memory
//! addressed through the SBADDR window, exactly like the real chip. Function
//! 2 reads drain a byte FIFO (zeroes once empty, which reads as the
//! end-of-data marker) and function 2 writes are captured frame by frame.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::cell::Cell;

use crate::bus::{CardIds, Delay, ExtendedMode, Function, SdioBus};
use crate::utils::{
    FUNC1_CHIPCLKCSR, FUNC1_SBADDRHIGH, FUNC1_SBADDRLOW, FUNC1_SBADDRMID, SB_ACCESS_2_4B_FLAG,
    SB_OFT_ADDR_MASK,
};
use crate::ErrorCode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BusOp {
    ReadByte(Function, u32),
    WriteByte(Function, u32, u8),
    ReadExtended(Function, u32, usize),
    WriteExtended(Function, u32, usize),
    SetBlockSize(Function, u16),
    EnableFunction(Function),
    DisableFunction(Function),
    EnableInterrupt(Function),
    DisableInterrupt(Function),
}

/// How the simulated CHIPCLKCSR reports clock availability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ClockModel {
    /// ALP and HT report available on every read.
    Available,
    /// Neither clock ever comes up.
    Never,
    /// The clocks come up after this many reads.
    AfterReads(u32),
}

const CLOCK_AVAIL_BITS: u8 = 0xc0;

pub(crate) struct MockBus {
    pub ops: Vec<BusOp>,
    pub regs: BTreeMap<(u8, u32), u8>,
    pub ram: BTreeMap<u32, u8>,
    pub clock: ClockModel,
    pub clock_reads: u32,
    pub rx_fifo: VecDeque<u8>,
    pub tx_frames: Vec<Vec<u8>>,
    /// Backplane words whose writes clear the written bits.
    pub w1c: Vec<u32>,
    pub fail_writes_to: Option<u32>,
    pub fail_frame_reads_after: Option<usize>,
    pub fail_frame_writes: bool,
    pub ids: CardIds,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            regs: BTreeMap::new(),
            ram: BTreeMap::new(),
            clock: ClockModel::Available,
            clock_reads: 0,
            rx_fifo: VecDeque::new(),
            tx_frames: Vec::new(),
            w1c: Vec::new(),
            fail_writes_to: None,
            fail_frame_reads_after: None,
            fail_frame_writes: false,
            ids: CardIds {
                vendor: 0x02d0,
                device: 0xa9a6,
                num_functions: 3,
            },
        }
    }

    pub fn reg(&self, func: Function, addr: u32) -> u8 {
        self.regs.get(&(func as u8, addr)).copied().unwrap_or(0)
    }

    pub fn set_reg(&mut self, func: Function, addr: u32, value: u8) {
        self.regs.insert((func as u8, addr), value);
    }

    pub fn ram_word(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.ram.get(&(addr + i as u32)).copied().unwrap_or(0);
        }
        u32::from_le_bytes(bytes)
    }

    pub fn set_ram_word(&mut self, addr: u32, value: u32) {
        self.load_ram(addr, &value.to_le_bytes());
    }

    pub fn load_ram(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.ram.insert(addr + i as u32, *b);
        }
    }

    pub fn push_rx(&mut self, frame: &[u8]) {
        self.rx_fifo.extend(frame.iter().copied());
    }

    /// Number of byte accesses of `kind` to `addr`.
    pub fn count(&self, matches: impl Fn(&BusOp) -> bool) -> usize {
        self.ops.iter().filter(|op| matches(op)).count()
    }

    fn window(&self) -> u32 {
        let f1 = Function::Backplane;
        (u32::from(self.reg(f1, FUNC1_SBADDRLOW) & 0x80) << 8)
            | (u32::from(self.reg(f1, FUNC1_SBADDRMID)) << 16)
            | (u32::from(self.reg(f1, FUNC1_SBADDRHIGH)) << 24)
    }

    fn backplane_addr(&self, addr: u32) -> u32 {
        debug_assert!(addr & SB_ACCESS_2_4B_FLAG != 0);
        self.window() + (addr & SB_OFT_ADDR_MASK)
    }

    fn frame_reads(&self) -> usize {
        self.count(|op| matches!(op, BusOp::ReadExtended(Function::Wlan, _, _)))
    }
}

impl SdioBus for MockBus {
    fn card_ids(&self) -> CardIds {
        self.ids
    }

    fn read_byte(&mut self, func: Function, addr: u32) -> Result<u8, ErrorCode> {
        self.ops.push(BusOp::ReadByte(func, addr));
        let value = self.reg(func, addr);
        if func == Function::Backplane && addr == FUNC1_CHIPCLKCSR {
            self.clock_reads += 1;
            let up = match self.clock {
                ClockModel::Available => true,
                ClockModel::Never => false,
                ClockModel::AfterReads(n) => self.clock_reads > n,
            };
            return Ok(if up {
                value | CLOCK_AVAIL_BITS
            } else {
                value & !CLOCK_AVAIL_BITS
            });
        }
        Ok(value)
    }

    fn write_byte(&mut self, func: Function, addr: u32, value: u8) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::WriteByte(func, addr, value));
        if self.fail_writes_to == Some(addr) {
            return Err(ErrorCode::FAIL);
        }
        self.set_reg(func, addr, value);
        Ok(())
    }

    fn read_extended(
        &mut self,
        func: Function,
        addr: u32,
        buf: &mut [u8],
        _mode: ExtendedMode,
    ) -> Result<(), ErrorCode> {
        if func == Function::Wlan {
            if let Some(limit) = self.fail_frame_reads_after {
                if self.frame_reads() >= limit {
                    self.ops.push(BusOp::ReadExtended(func, addr, buf.len()));
                    return Err(ErrorCode::FAIL);
                }
            }
            self.ops.push(BusOp::ReadExtended(func, addr, buf.len()));
            for b in buf.iter_mut() {
                *b = self.rx_fifo.pop_front().unwrap_or(0);
            }
            return Ok(());
        }

        self.ops.push(BusOp::ReadExtended(func, addr, buf.len()));
        let base = self.backplane_addr(addr);
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.ram.get(&(base + i as u32)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_extended(
        &mut self,
        func: Function,
        addr: u32,
        buf: &[u8],
        _mode: ExtendedMode,
    ) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::WriteExtended(func, addr, buf.len()));
        if func == Function::Wlan {
            if self.fail_frame_writes {
                return Err(ErrorCode::FAIL);
            }
            self.tx_frames.push(buf.to_vec());
            return Ok(());
        }

        let base = self.backplane_addr(addr);
        if buf.len() == 4 && self.w1c.contains(&base) {
            let old = self.ram_word(base);
            let clear = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            self.set_ram_word(base, old & !clear);
            return Ok(());
        }
        self.load_ram(base, buf);
        Ok(())
    }

    fn set_block_size(&mut self, func: Function, size: u16) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::SetBlockSize(func, size));
        Ok(())
    }

    fn enable_function(&mut self, func: Function) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::EnableFunction(func));
        Ok(())
    }

    fn disable_function(&mut self, func: Function) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::DisableFunction(func));
        Ok(())
    }

    fn enable_interrupt(&mut self, func: Function) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::EnableInterrupt(func));
        Ok(())
    }

    fn disable_interrupt(&mut self, func: Function) -> Result<(), ErrorCode> {
        self.ops.push(BusOp::DisableInterrupt(func));
        Ok(())
    }
}

/// Delay source that only accumulates the requested time.
pub(crate) struct MockDelay {
    pub total_us: Cell<u64>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self {
            total_us: Cell::new(0),
        }
    }
}

impl Delay for MockDelay {
    fn delay_us(&self, us: u32) {
        self.total_us.set(self.total_us.get() + u64::from(us));
    }
}
