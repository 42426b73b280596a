// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Bit layouts of the function-1 and SDIO device core registers the
//! transport touches.

use tock_registers::{register_bitfields, LocalRegisterCopy};

register_bitfields![u8,
    /// Function 1 chip clock control and status
    pub CHIPCLKCSR [
        /// Force the ALP clock on
        FORCE_ALP OFFSET(0) NUMBITS(1) [],
        /// Force the HT clock on
        FORCE_HT OFFSET(1) NUMBITS(1) [],
        /// Force the ILP clock on
        FORCE_ILP OFFSET(2) NUMBITS(1) [],
        /// Request the ALP clock
        ALP_AVAIL_REQ OFFSET(3) NUMBITS(1) [],
        /// Request the HT clock
        HT_AVAIL_REQ OFFSET(4) NUMBITS(1) [],
        /// Ignore clock requests from the SDIO core
        FORCE_HW_CLKREQ_OFF OFFSET(5) NUMBITS(1) [],
        /// ALP clock is running
        ALP_AVAIL OFFSET(6) NUMBITS(1) [],
        /// HT clock is running
        HT_AVAIL OFFSET(7) NUMBITS(1) [],
    ],

    /// Function 1 device control
    pub DEVICE_CTL [
        SETBUSY OFFSET(0) NUMBITS(1) [],
        SPI_INTR_SYNC OFFSET(1) NUMBITS(1) [],
        /// Only raise interrupts for clock availability
        CA_INT_ONLY OFFSET(2) NUMBITS(1) [],
        PADS_ISO OFFSET(3) NUMBITS(1) [],
    ],

    /// Function 1 wakeup control
    pub WAKEUPCTRL [
        /// Wait for the HT clock before answering a wakeup
        HTWAIT OFFSET(1) NUMBITS(1) [],
    ],

    /// Function 1 sleep control and status
    pub SLEEPCSR [
        /// Keep SDIO on
        KSO OFFSET(0) NUMBITS(1) [],
        DEVON OFFSET(2) NUMBITS(1) [],
    ]
];

register_bitfields![u32,
    /// SDIO device core interrupt status and host interrupt mask
    pub INTSTATUS [
        /// Mailbox interrupts the firmware raises towards the host
        HMB_SW OFFSET(4) NUMBITS(4) [],
        FC_STATE OFFSET(4) NUMBITS(1) [],
        FC_CHANGE OFFSET(5) NUMBITS(1) [],
        /// A frame is pending in the function 2 FIFO
        FRAME_IND OFFSET(6) NUMBITS(1) [],
        /// Mailbox data is waiting in TOHOSTMAILBOXDATA
        HOST_INT OFFSET(7) NUMBITS(1) [],
        CHIPACTIVE OFFSET(29) NUMBITS(1) [],
    ],

    /// Firmware to host mailbox data
    pub TOHOSTMAILBOXDATA [
        NAKHANDLED OFFSET(0) NUMBITS(1) [],
        DEVREADY OFFSET(1) NUMBITS(1) [],
        FC OFFSET(2) NUMBITS(1) [],
        FWREADY OFFSET(3) NUMBITS(1) [],
        FWHALT OFFSET(4) NUMBITS(1) [],
    ]
];

pub type ChipClkCsr = LocalRegisterCopy<u8, CHIPCLKCSR::Register>;
pub type DeviceCtl = LocalRegisterCopy<u8, DEVICE_CTL::Register>;
pub type IntStatus = LocalRegisterCopy<u32, INTSTATUS::Register>;
pub type HostMailbox = LocalRegisterCopy<u32, TOHOSTMAILBOXDATA::Register>;

/// The clock being waited for is running: ALP always, HT as well unless the
/// driver is in ALP-only mode.
pub fn clock_available(csr: u8, alp_only: bool) -> bool {
    let csr = ChipClkCsr::new(csr);
    csr.is_set(CHIPCLKCSR::ALP_AVAIL) && (alp_only || csr.is_set(CHIPCLKCSR::HT_AVAIL))
}

/// Interrupt sources the host unmasks and acknowledges.
pub fn host_interrupt_mask() -> u32 {
    INTSTATUS::HMB_SW.mask << INTSTATUS::HMB_SW.shift
        | INTSTATUS::CHIPACTIVE.mask << INTSTATUS::CHIPACTIVE.shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alp_only_ignores_ht() {
        assert!(clock_available(0x40, true));
        assert!(!clock_available(0x40, false));
        assert!(clock_available(0xc0, false));
        assert!(!clock_available(0x80, false));
    }

    #[test]
    fn host_mask_matches_hardware_layout() {
        assert_eq!(host_interrupt_mask(), 0x2000_00f0);
    }
}
