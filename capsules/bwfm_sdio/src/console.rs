// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Shared area and firmware console.
//!
//! Once running, the firmware publishes a pointer to its SDPCM shared
//! structure in the last word of RAM. Among other things the structure
//! locates the console ring the firmware prints into, which the host can
//! mirror and relay to its own log.

use alloc::string::String;
use alloc::vec::Vec;

use log::warn;

use crate::backplane::Backplane;
use crate::bus::SdioBus;
use crate::chip::ChipInfo;
use crate::sdpcm::{ConsoleInfo, SharedInfo};
use crate::ErrorCode;

/// Address of the word holding the shared area pointer.
pub(crate) fn shared_pointer_addr(chip: &ChipInfo) -> u32 {
    let mut addr = chip.ram_base.wrapping_add(chip.ram_size).wrapping_sub(4);
    if chip.ram_base == 0 && chip.sr_capable {
        addr = addr.wrapping_sub(chip.sr_size);
    }
    addr
}

/// Until the firmware replaces it, the last word of RAM holds the nvram
/// length token: the length in the low half, its complement in the high.
const fn is_nvram_token(ptr: u32) -> bool {
    (!ptr >> 16) & 0xffff == ptr & 0xffff
}

/// Read the shared structure, `None` while the firmware has not published it.
pub(crate) fn read_shared<B: SdioBus>(
    bp: &mut Backplane<B>,
    bounce: &mut [u8],
    chip: &ChipInfo,
) -> Result<Option<SharedInfo>, ErrorCode> {
    let mut word = [0u8; 4];
    bp.ram_read(bounce, shared_pointer_addr(chip), &mut word)?;
    let ptr = u32::from_le_bytes(word);
    if ptr == 0 || is_nvram_token(ptr) {
        return Ok(None);
    }

    let mut raw = [0u8; SharedInfo::SIZE];
    bp.ram_read(bounce, ptr, &mut raw)?;
    Ok(SharedInfo::try_from_bytes(&raw))
}

/// Local mirror of the firmware console ring.
pub(crate) struct Console {
    addr: u32,
    ring: Vec<u8>,
    read_idx: usize,
    /// Characters of a line not terminated yet, at most `max_size`.
    line: Vec<u8>,
    max_size: usize,
}

impl Console {
    pub fn new(max_size: usize) -> Self {
        Self {
            addr: 0,
            ring: Vec::new(),
            read_idx: 0,
            line: Vec::new(),
            max_size,
        }
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn set_addr(&mut self, addr: u32) {
        if addr != self.addr {
            self.reset();
            self.addr = addr;
        }
    }

    pub fn reset(&mut self) {
        self.addr = 0;
        self.ring = Vec::new();
        self.read_idx = 0;
        self.line.clear();
    }

    /// Copy the ring and return the lines completed since the last poll.
    pub fn poll<B: SdioBus>(
        &mut self,
        bp: &mut Backplane<B>,
        bounce: &mut [u8],
    ) -> Result<Vec<String>, ErrorCode> {
        let mut lines = Vec::new();
        if self.addr == 0 {
            return Ok(lines);
        }

        let mut raw = [0u8; ConsoleInfo::SIZE];
        bp.ram_read(bounce, self.addr, &mut raw)?;
        let info = ConsoleInfo::try_from_bytes(&raw).ok_or(ErrorCode::FAIL)?;

        if self.ring.is_empty() {
            let size = info.log_bufsz as usize;
            if size == 0 || size > self.max_size {
                warn!(target: "bwfm_sdio::console", "ignoring console of {} bytes", size);
                self.addr = 0;
                return Ok(lines);
            }
            self.ring
                .try_reserve_exact(size)
                .map_err(|_| ErrorCode::NOMEM)?;
            self.ring.resize(size, 0);
        }

        let new_idx = info.log_idx as usize;
        if new_idx >= self.ring.len() {
            return Ok(lines);
        }
        bp.ram_read(bounce, info.log_buf, &mut self.ring)?;

        while self.read_idx != new_idx {
            let ch = self.ring[self.read_idx];
            self.read_idx = (self.read_idx + 1) % self.ring.len();
            match ch {
                b'\r' => {}
                b'\n' => {
                    lines.push(String::from_utf8_lossy(&self.line).into_owned());
                    self.line.clear();
                }
                ch => {
                    self.line.push(ch);
                    // Unterminated output is flushed once it fills a ring.
                    if self.line.len() >= self.max_size {
                        lines.push(String::from_utf8_lossy(&self.line).into_owned());
                        self.line.clear();
                    }
                }
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::mock::MockBus;

    fn chip() -> ChipInfo {
        ChipInfo {
            ram_base: 0,
            ram_size: 0x8_0000,
            sr_size: 0x1_0000,
            ..Default::default()
        }
    }

    #[test]
    fn pointer_skips_save_restore_area() {
        let mut info = chip();
        assert_eq!(shared_pointer_addr(&info), 0x7_fffc);
        info.sr_capable = true;
        assert_eq!(shared_pointer_addr(&info), 0x6_fffc);
        info.ram_base = 0x18_0000;
        assert_eq!(shared_pointer_addr(&info), 0x1f_fffc);
    }

    #[test]
    fn nvram_token_is_not_a_pointer() {
        let mut bus = MockBus::new();
        bus.set_ram_word(0x7_fffc, 0xffbf_0040);
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];
        assert_eq!(read_shared(&mut bp, &mut bounce, &chip()).map(|s| s.is_some()), Ok(false));

        bp.bus_mut().set_ram_word(0x7_fffc, 0);
        assert_eq!(read_shared(&mut bp, &mut bounce, &chip()).map(|s| s.is_some()), Ok(false));
    }

    #[test]
    fn shared_area_locates_console() {
        let mut bus = MockBus::new();
        bus.set_ram_word(0x7_fffc, 0x7_0000);
        bus.set_ram_word(0x7_0000 + 20, 0x7_1000);
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];

        let shared = read_shared(&mut bp, &mut bounce, &chip()).unwrap().unwrap();
        assert_eq!(shared.console_addr, 0x7_1000);
    }

    #[test]
    fn console_relays_complete_lines() {
        let mut bus = MockBus::new();
        // vcons_in, vcons_out, log_buf, log_bufsz, log_idx
        bus.set_ram_word(0x7_1008, 0x7_2000);
        bus.set_ram_word(0x7_100c, 16);
        bus.set_ram_word(0x7_1010, 9);
        bus.load_ram(0x7_2000, b"ok\r\nboot ");
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];

        let mut console = Console::new(1024);
        console.set_addr(0x7_1000);
        assert_eq!(console.poll(&mut bp, &mut bounce).unwrap(), vec![String::from("ok")]);

        // Wraps around the end of the ring.
        bp.bus_mut().load_ram(0x7_2009, b"done\nxy");
        bp.bus_mut().load_ram(0x7_2000, b"z\n");
        bp.bus_mut().set_ram_word(0x7_1010, 2);
        assert_eq!(
            console.poll(&mut bp, &mut bounce).unwrap(),
            vec![String::from("boot done"), String::from("xyz")]
        );
    }

    #[test]
    fn oversized_console_is_ignored() {
        let mut bus = MockBus::new();
        bus.set_ram_word(0x7_100c, 1 << 20);
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];

        let mut console = Console::new(1024);
        console.set_addr(0x7_1000);
        assert!(console.poll(&mut bp, &mut bounce).unwrap().is_empty());
        assert_eq!(console.addr(), 0);
    }

    #[test]
    fn long_unterminated_output_is_flushed() {
        let mut bus = MockBus::new();
        bus.set_ram_word(0x7_1008, 0x7_2000);
        bus.set_ram_word(0x7_100c, 8);
        bus.set_ram_word(0x7_1010, 7);
        bus.load_ram(0x7_2000, b"abcdefg");
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];

        let mut console = Console::new(8);
        console.set_addr(0x7_1000);
        assert!(console.poll(&mut bp, &mut bounce).unwrap().is_empty());

        bp.bus_mut().load_ram(0x7_2007, b"h");
        bp.bus_mut().load_ram(0x7_2000, b"ij");
        bp.bus_mut().set_ram_word(0x7_1010, 2);
        assert_eq!(
            console.poll(&mut bp, &mut bounce).unwrap(),
            vec![String::from("abcdefgh")]
        );

        bp.bus_mut().load_ram(0x7_2002, b"\n");
        bp.bus_mut().set_ram_word(0x7_1010, 3);
        assert_eq!(console.poll(&mut bp, &mut bounce).unwrap(), vec![String::from("ij")]);
    }
}
