// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Interfaces the transport needs from the SDIO host controller and the
//! platform.

use crate::ErrorCode;

/// SDIO function a transfer is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    /// Function 0: CCCR and FBR
    Cccr = 0,
    /// Function 1: chip backplane
    Backplane = 1,
    /// Function 2: WLAN frame FIFO
    Wlan = 2,
}

/// Identification of the card the host enumerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardIds {
    pub vendor: u16,
    pub device: u16,
    pub num_functions: u8,
}

/// Transfer mode of a CMD53 extended transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedMode {
    /// Block mode rather than byte mode
    pub block: bool,
    /// Incrementing address rather than a fixed FIFO address
    pub incr_addr: bool,
}

impl ExtendedMode {
    /// Block transfer over an incrementing address range.
    pub const BLOCK: ExtendedMode = ExtendedMode {
        block: true,
        incr_addr: true,
    };
    /// Byte transfer from a fixed address, used to drain the frame FIFO.
    pub const BYTE_FIFO: ExtendedMode = ExtendedMode {
        block: false,
        incr_addr: false,
    };
    /// Byte transfer over an incrementing address range.
    pub const BYTE: ExtendedMode = ExtendedMode {
        block: false,
        incr_addr: true,
    };
}

/// SDIO host controller primitives (CMD52 and CMD53).
///
/// Every call is synchronous and either completes the transfer or reports the
/// failure. The transport never retries.
pub trait SdioBus {
    fn card_ids(&self) -> CardIds;

    fn read_byte(&mut self, func: Function, addr: u32) -> Result<u8, ErrorCode>;
    fn write_byte(&mut self, func: Function, addr: u32, value: u8) -> Result<(), ErrorCode>;

    fn read_extended(
        &mut self,
        func: Function,
        addr: u32,
        buf: &mut [u8],
        mode: ExtendedMode,
    ) -> Result<(), ErrorCode>;

    fn write_extended(
        &mut self,
        func: Function,
        addr: u32,
        buf: &[u8],
        mode: ExtendedMode,
    ) -> Result<(), ErrorCode>;

    fn set_block_size(&mut self, func: Function, size: u16) -> Result<(), ErrorCode>;
    fn enable_function(&mut self, func: Function) -> Result<(), ErrorCode>;
    fn disable_function(&mut self, func: Function) -> Result<(), ErrorCode>;

    /// Route the card interrupt of `func` to the host. The host reports it by
    /// calling `BwfmSdio::interrupt`.
    fn enable_interrupt(&mut self, func: Function) -> Result<(), ErrorCode>;
    fn disable_interrupt(&mut self, func: Function) -> Result<(), ErrorCode>;
}

/// Busy-wait delay source.
pub trait Delay {
    fn delay_us(&self, us: u32);
}
