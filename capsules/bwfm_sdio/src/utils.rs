// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

// SDIO card identification
pub(crate) const SDIO_VENDOR_BROADCOM: u16 = 0x02d0;
pub(crate) const SDIO_DEVICE_BCM4359: u16 = 0x4359;
pub(crate) const SDIO_DEVICE_BCM43430: u16 = 0xa9a6;

pub(crate) const F1_BLOCK_SIZE: u16 = 64;
pub(crate) const F2_BLOCK_SIZE: u16 = 512;

// CCCR vendor registers (function 0)
pub(crate) const CCCR_BRCM_CARDCAP: u32 = 0xf0;
pub(crate) const CCCR_BRCM_CARDCAP_CMD14_SUPPORT: u8 = 0x02;
pub(crate) const CCCR_BRCM_CARDCAP_CMD14_EXT: u8 = 0x04;
pub(crate) const CCCR_BRCM_CARDCTRL: u32 = 0xf1;
pub(crate) const CCCR_BRCM_CARDCTRL_WLANRESET: u8 = 0x02;
pub(crate) const CCCR_BRCM_SEPINT: u32 = 0xf2;
pub(crate) const CCCR_BRCM_SEPINT_MASK: u8 = 0x01;
pub(crate) const CCCR_BRCM_SEPINT_OE: u8 = 0x02;
pub(crate) const CCCR_BRCM_SEPINT_ACT_HI: u8 = 0x04;

// Function 1 registers
pub(crate) const FUNC1_WATERMARK: u32 = 0x10008;
pub(crate) const FUNC1_DEVICE_CTL: u32 = 0x10009;
pub(crate) const FUNC1_SBADDRLOW: u32 = 0x1000a;
pub(crate) const FUNC1_SBADDRMID: u32 = 0x1000b;
pub(crate) const FUNC1_SBADDRHIGH: u32 = 0x1000c;
pub(crate) const FUNC1_CHIPCLKCSR: u32 = 0x1000e;
pub(crate) const FUNC1_SDIOPULLUP: u32 = 0x1000f;
pub(crate) const FUNC1_WAKEUPCTRL: u32 = 0x1001e;
pub(crate) const FUNC1_SLEEPCSR: u32 = 0x1001f;

pub(crate) const F2_WATERMARK: u8 = 8;

// Backplane addressing through function 1
pub(crate) const SB_OFT_ADDR_MASK: u32 = 0x7fff;
pub(crate) const SB_OFT_ADDR_PAGE: u32 = 0x8000;
pub(crate) const SB_ACCESS_2_4B_FLAG: u32 = 0x8000;
// Registers below this boundary live in function 0.
pub(crate) const FUNC0_ADDR_MASK: u32 = 0x7ff;

// SDIO device core registers, offsets from the core base
pub(crate) const SDPCMD_INTSTATUS: u32 = 0x20;
pub(crate) const SDPCMD_HOSTINTMASK: u32 = 0x24;
pub(crate) const SDPCMD_TOSBMAILBOX: u32 = 0x40;
pub(crate) const SDPCMD_TOSBMAILBOXDATA: u32 = 0x48;
pub(crate) const SDPCMD_TOHOSTMAILBOXDATA: u32 = 0x4c;

pub(crate) const SDPCMD_TOSBMAILBOX_INT_ACK: u32 = 0x02;
pub(crate) const SDPCM_PROT_VERSION: u32 = 4;
pub(crate) const SDPCM_PROT_VERSION_SHIFT: u32 = 16;

// PMU resource reload, applied once the chip is enumerated
pub(crate) const PMU_CONTROL: u32 = 0x600;
pub(crate) const PMU_CONTROL_RES_RELOAD: u32 = 0x2;
pub(crate) const PMU_CONTROL_RES_SHIFT: u32 = 13;

// The SDIO device core gained the keep-SDIO-on bit in this revision.
pub(crate) const SDIO_CORE_KSO_REV: u32 = 12;

pub(crate) const BUSCORE_PREPARE_POLLS: u32 = 1000;
pub(crate) const BUSCORE_FORCE_ALP_DELAY_US: u32 = 65;

// SDPCM framing
pub(crate) const TX_ROUND_BLOCK: usize = 512;
pub(crate) const TX_ROUND_WORD: usize = 4;
pub(crate) const NEXTLEN_SHIFT: u32 = 4;

pub(crate) const BCDC_PROTO_VER: u8 = 2;
pub(crate) const BCDC_FLAG_VER_SHIFT: u8 = 4;
pub(crate) const BCDC_FLAG_VER_MASK: u8 = 0xf0;

/// Round `len` up to the next multiple of `to`. `to` must be a power of two.
pub(crate) const fn round_up(len: usize, to: usize) -> usize {
    (len + to - 1) & !(to - 1)
}

/// Padded size of an outbound frame of `len` bytes.
///
/// Frames spanning more than one block are padded to whole blocks so the
/// host controller can use block mode; everything else only needs word
/// alignment.
pub(crate) const fn tx_padded_len(len: usize) -> usize {
    if len > TX_ROUND_BLOCK && len % TX_ROUND_BLOCK != 0 {
        round_up(len, TX_ROUND_BLOCK)
    } else {
        round_up(len, TX_ROUND_WORD)
    }
}

/// Base of the 32 KiB backplane window containing `addr`.
#[macro_export]
macro_rules! backplane_window_base {
    ($addr:expr) => {
        ($addr) & !$crate::utils::SB_OFT_ADDR_MASK
    };
}

/// Address of a 32-bit backplane access through function 1.
#[macro_export]
macro_rules! backplane_word_addr {
    ($addr:expr) => {
        (($addr) & $crate::utils::SB_OFT_ADDR_MASK) | $crate::utils::SB_ACCESS_2_4B_FLAG
    };
}
