// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Interface to the bus-independent chip layer.
//!
//! Core enumeration and core reset are the same whatever bus the chip hangs
//! off; the chip layer drives them through [`Buscore`], which this transport
//! implements on top of the backplane.

use crate::ErrorCode;

/// What the chip layer learned while enumerating the chip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChipInfo {
    pub chip_id: u32,
    pub chip_rev: u32,
    pub ram_base: u32,
    pub ram_size: u32,
    /// Memory reserved for save/restore at the top of RAM.
    pub sr_size: u32,
    pub sr_capable: bool,
    /// ChipCommon core base; the function-2 frame FIFO is addressed
    /// through it.
    pub cc_base: u32,
    pub sdio_core_base: u32,
    pub sdio_core_rev: u32,
    pub pmu_base: u32,
}

/// Bus operations the chip layer needs during enumeration and reset.
pub trait Buscore {
    fn read(&mut self, addr: u32) -> Result<u32, ErrorCode>;
    fn write(&mut self, addr: u32, value: u32) -> Result<(), ErrorCode>;

    /// Bring the backplane up far enough for enumeration.
    fn prepare(&mut self) -> Result<(), ErrorCode>;

    /// Last step before the ARM core leaves reset.
    fn activate(&mut self, rstvec: u32) -> Result<(), ErrorCode>;
}

/// Bus-independent chip layer.
pub trait ChipEnumerator {
    fn attach(&self, buscore: &mut dyn Buscore) -> Result<ChipInfo, ErrorCode>;

    /// Release the ARM core from reset, starting at `rstvec`.
    fn set_active(&self, buscore: &mut dyn Buscore, rstvec: u32) -> Result<(), ErrorCode>;
}

/// Images handed over by the firmware loader.
#[derive(Clone, Copy, Debug)]
pub struct Firmware<'a> {
    pub code: &'a [u8],
    pub nvram: &'a [u8],
}

impl Firmware<'_> {
    /// Reset vector stored in the first word of the image.
    pub fn reset_vector(&self) -> Option<u32> {
        let word = self.code.get(..4)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }
}

const CHIP_ID_4330: u32 = 0x4330;
const CHIP_ID_4334: u32 = 0x4334;
const CHIP_ID_4335: u32 = 0x4335;
const CHIP_ID_4339: u32 = 0x4339;
const CHIP_ID_4345: u32 = 0x4345;
const CHIP_ID_4356: u32 = 0x4356;
const CHIP_ID_4359: u32 = 0x4359;
const CHIP_ID_43340: u32 = 0xa9a4;
const CHIP_ID_43341: u32 = 0xa9a5;
const CHIP_ID_43430: u32 = 0xa9a6;

/// Base name of the firmware image for a chip, `None` when unsupported.
pub fn firmware_name(chip_id: u32, chip_rev: u32) -> Option<&'static str> {
    let name = match chip_id {
        CHIP_ID_4330 => "4330",
        CHIP_ID_4334 => "4334",
        CHIP_ID_4345 if chip_rev == 9 => "43456",
        CHIP_ID_4345 => "43455",
        CHIP_ID_43340 | CHIP_ID_43341 => "43340",
        CHIP_ID_4335 if chip_rev < 2 => "4335",
        CHIP_ID_4335 | CHIP_ID_4339 => "4339",
        CHIP_ID_43430 if chip_rev == 0 => "43430a0",
        CHIP_ID_43430 => "43430",
        CHIP_ID_4356 => "4356",
        CHIP_ID_4359 => "4359",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_revisions() {
        assert_eq!(firmware_name(0x4345, 9), Some("43456"));
        assert_eq!(firmware_name(0x4345, 6), Some("43455"));
        assert_eq!(firmware_name(0x4335, 1), Some("4335"));
        assert_eq!(firmware_name(0x4335, 2), Some("4339"));
        assert_eq!(firmware_name(0xa9a6, 0), Some("43430a0"));
        assert_eq!(firmware_name(0xa9a6, 1), Some("43430"));
        assert_eq!(firmware_name(0xa9a5, 0), Some("43340"));
        assert_eq!(firmware_name(0x4359, 0), Some("4359"));
        assert_eq!(firmware_name(0x4373, 0), None);
    }

    #[test]
    fn reset_vector_is_first_word() {
        let fw = Firmware {
            code: &[0x78, 0x56, 0x34, 0x12, 0xff],
            nvram: &[],
        };
        assert_eq!(fw.reset_vector(), Some(0x1234_5678));
        let short = Firmware {
            code: &[1, 2],
            nvram: &[],
        };
        assert_eq!(short.reset_vector(), None);
    }
}
