// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! SDIO transport for Broadcom FullMAC wireless chips.
//!
//! The crate bootstraps the chip over SDIO (enumeration, firmware upload,
//! clock and power management) and carries SDPCM framed control, event and
//! data traffic between the firmware and an [`SdpcmClient`]. The SDIO host
//! controller, the chip enumeration layer and the protocol above SDPCM are
//! supplied by the board through the traits in [`bus`], [`chip`] and
//! [`client`].

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

#[macro_use]
mod utils;
pub mod backplane;
pub mod bus;
pub mod chip;
pub mod client;
pub mod clock;
pub mod config;
mod console;
mod deferred;
pub mod driver;
mod errorcode;
mod glom;
mod ram;
pub mod registers;
pub mod rx;
pub mod sdpcm;
pub mod tx;

#[cfg(test)]
mod mock;

pub use bus::{CardIds, Delay, ExtendedMode, Function, SdioBus};
pub use chip::{Buscore, ChipEnumerator, ChipInfo, Firmware};
pub use client::SdpcmClient;
pub use clock::ClockState;
pub use config::Config;
pub use driver::{probe, BwfmSdio, DeviceState};
pub use errorcode::ErrorCode;
