// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Configuration options for the SDIO transport.
//!
//! As with the kernel configuration, options are carried by a typed `const`
//! object instead of cargo features: every code path stays type-checked and
//! disabled branches fold away. Boards that need something different copy
//! [`Config::DEFAULT`] and change the relevant fields.

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Size of the bounce buffer every bus transfer is staged through.
    ///
    /// Also bounds the largest frame that can be received or transmitted.
    pub bounce_size: usize,

    /// Capacity of a receive buffer handed to the client.
    ///
    /// Data and event frames (and glom sub-frames) larger than this are
    /// dropped.
    pub rx_buf_size: usize,

    /// Number of data frames that may sit in the transmit queue.
    pub tx_queue_limit: usize,

    /// Upper bound on frames written per drain, regardless of the credit the
    /// firmware grants.
    pub tx_burst: u8,

    /// Number of CHIPCLKCSR reads while waiting for a requested clock.
    pub clock_poll_iterations: u32,

    /// Delay between two clock polls, in microseconds.
    pub clock_poll_delay_us: u32,

    /// Whether the image and nvram are read back and compared after upload.
    pub verify_firmware: bool,

    /// Whether the firmware console ring is relayed to the log on each
    /// service pass.
    pub debug_console: bool,

    /// Largest firmware console ring that is mirrored locally.
    pub max_console_size: usize,

    /// Use the out-of-band interrupt line instead of the in-band SDIO
    /// interrupt.
    pub oob_interrupt: bool,
}

impl Config {
    pub const DEFAULT: Config = Config {
        bounce_size: 64 * 1024,
        rx_buf_size: 2048,
        tx_queue_limit: 64,
        tx_burst: 32,
        clock_poll_iterations: 5000,
        clock_poll_delay_us: 1000,
        verify_firmware: true,
        debug_console: false,
        max_console_size: 16 * 1024,
        oob_interrupt: false,
    };
}

impl Default for Config {
    fn default() -> Self {
        Config::DEFAULT
    }
}
