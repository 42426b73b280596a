// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Peripheral descriptions for the Rockchip RK3328 SoC.
//!
//! Only the clock and reset unit is described so far: its clock tree is
//! expressed as static tables which a board hands to a clock framework
//! implementing [`clk::ClockEngine`].

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod clk;
pub mod cru;
