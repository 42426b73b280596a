// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Register access to the chip through SDIO functions 0 and 1.
//!
//! Byte registers below 0x800 belong to function 0 (CCCR and FBR). Everything
//! else, including the function-1 misc registers at 0x1xxxx, is reached
//! through function 1. Word accesses target the chip backplane: function 1
//! only exposes a 32 KiB window of it, whose base is programmed through the
//! three SBADDR registers and cached here so consecutive accesses within the
//! same window cost no extra bus traffic.

use log::trace;

use crate::bus::{ExtendedMode, Function, SdioBus};
use crate::utils::{FUNC0_ADDR_MASK, FUNC1_SBADDRHIGH, FUNC1_SBADDRLOW, FUNC1_SBADDRMID};
use crate::ErrorCode;

pub struct Backplane<B: SdioBus> {
    bus: B,
    /// Base of the window function 1 currently maps.
    window: u32,
}

/// Function the register at `addr` lives in.
pub(crate) const fn function_for(addr: u32) -> Function {
    if addr & !FUNC0_ADDR_MASK == 0 {
        Function::Cccr
    } else {
        Function::Backplane
    }
}

impl<B: SdioBus> Backplane<B> {
    pub fn new(bus: B) -> Self {
        Self { bus, window: 0 }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Map the 32 KiB backplane window starting at `base`.
    ///
    /// The cache only moves once all three address bytes were accepted, so a
    /// failed update is retried by the next access.
    pub fn set_window(&mut self, base: u32) -> Result<(), ErrorCode> {
        if self.window == base {
            return Ok(());
        }

        trace!(target: "bwfm_sdio::backplane", "window {:#010x}", base);
        self.write_1(FUNC1_SBADDRLOW, ((base >> 8) & 0x80) as u8)?;
        self.write_1(FUNC1_SBADDRMID, ((base >> 16) & 0xff) as u8)?;
        self.write_1(FUNC1_SBADDRHIGH, ((base >> 24) & 0xff) as u8)?;
        self.window = base;
        Ok(())
    }

    pub fn read_1(&mut self, addr: u32) -> Result<u8, ErrorCode> {
        self.bus.read_byte(function_for(addr), addr)
    }

    pub fn write_1(&mut self, addr: u32, value: u8) -> Result<(), ErrorCode> {
        self.bus.write_byte(function_for(addr), addr, value)
    }

    pub fn read_4(&mut self, addr: u32) -> Result<u32, ErrorCode> {
        self.set_window(backplane_window_base!(addr))?;
        let addr = backplane_word_addr!(addr);

        let mut bytes = [0u8; 4];
        self.bus
            .read_extended(function_for(addr), addr, &mut bytes, ExtendedMode::BYTE)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_4(&mut self, addr: u32, value: u32) -> Result<(), ErrorCode> {
        self.set_window(backplane_window_base!(addr))?;
        let addr = backplane_word_addr!(addr);

        self.bus.write_extended(
            function_for(addr),
            addr,
            &value.to_le_bytes(),
            ExtendedMode::BYTE,
        )
    }

    /// Read-modify-write of a byte register, setting `set` and clearing
    /// `clear`.
    pub fn modify_1(&mut self, addr: u32, set: u8, clear: u8) -> Result<(), ErrorCode> {
        let value = self.read_1(addr)?;
        self.write_1(addr, (value & !clear) | set)
    }
}
