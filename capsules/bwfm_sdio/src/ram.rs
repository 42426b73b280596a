// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Bulk transfers to chip memory and the frame FIFO.
//!
//! Chip RAM is reached through the function-1 backplane window, so a transfer
//! is split at every 32 KiB page boundary and the window moved before each
//! piece. All data is staged through the device's bounce buffer; transfers
//! on the bus are whole words, the tail of an odd-sized piece is zero padded
//! on write and discarded on read. Frame FIFO reads are byte mode and take
//! any length; frame writes must already be padded to a word.

use log::warn;

use crate::backplane::Backplane;
use crate::bus::{ExtendedMode, Function, SdioBus};
use crate::utils::{round_up, SB_OFT_ADDR_MASK, SB_OFT_ADDR_PAGE};
use crate::ErrorCode;

/// One piece of a bulk transfer that stays inside a single backplane page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Backplane address of the first byte.
    pub addr: u32,
    /// Offset of the first byte in the caller's buffer.
    pub offset: usize,
    pub len: usize,
}

/// Splits `[addr, addr + len)` at page boundaries, never yielding more than
/// `max` bytes at once.
pub struct PageChunks {
    addr: u32,
    offset: usize,
    remaining: usize,
    max: usize,
}

impl PageChunks {
    pub fn new(addr: u32, len: usize, max: usize) -> Self {
        Self {
            addr,
            offset: 0,
            remaining: len,
            max,
        }
    }
}

impl Iterator for PageChunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 || self.max == 0 {
            return None;
        }
        let to_page_end = (SB_OFT_ADDR_PAGE - (self.addr & SB_OFT_ADDR_MASK)) as usize;
        let len = self.remaining.min(to_page_end).min(self.max);
        let chunk = Chunk {
            addr: self.addr,
            offset: self.offset,
            len,
        };
        self.addr = self.addr.wrapping_add(len as u32);
        self.offset += len;
        self.remaining -= len;
        Some(chunk)
    }
}

fn check_frame_len(len: usize) -> Result<(), ErrorCode> {
    if len % 4 != 0 {
        warn!(target: "bwfm_sdio::ram", "unpadded frame of {} bytes", len);
        return Err(ErrorCode::INVAL);
    }
    Ok(())
}

impl<B: SdioBus> Backplane<B> {
    /// Copy `data` to chip memory at `addr`.
    ///
    /// The first failing piece aborts the transfer; pieces already written
    /// stay written.
    pub fn ram_write(&mut self, bounce: &mut [u8], addr: u32, data: &[u8]) -> Result<(), ErrorCode> {
        // Padding may need up to three bytes past the chunk.
        let max = bounce.len() & !3;
        for chunk in PageChunks::new(addr, data.len(), max) {
            self.set_window(backplane_window_base!(chunk.addr))?;
            let padded = round_up(chunk.len, 4);
            bounce[..chunk.len].copy_from_slice(&data[chunk.offset..][..chunk.len]);
            bounce[chunk.len..padded].fill(0);
            self.bus_mut().write_extended(
                Function::Backplane,
                backplane_word_addr!(chunk.addr),
                &bounce[..padded],
                ExtendedMode::BLOCK,
            )?;
        }
        Ok(())
    }

    /// Fill `buf` from chip memory at `addr`.
    pub fn ram_read(&mut self, bounce: &mut [u8], addr: u32, buf: &mut [u8]) -> Result<(), ErrorCode> {
        let max = bounce.len() & !3;
        for chunk in PageChunks::new(addr, buf.len(), max) {
            self.set_window(backplane_window_base!(chunk.addr))?;
            let padded = round_up(chunk.len, 4);
            self.bus_mut().read_extended(
                Function::Backplane,
                backplane_word_addr!(chunk.addr),
                &mut bounce[..padded],
                ExtendedMode::BLOCK,
            )?;
            buf[chunk.offset..][..chunk.len].copy_from_slice(&bounce[..chunk.len]);
        }
        Ok(())
    }

    /// Read chip memory back and compare it against `expected`.
    pub fn ram_verify(
        &mut self,
        bounce: &mut [u8],
        addr: u32,
        expected: &[u8],
    ) -> Result<(), ErrorCode> {
        let max = bounce.len() & !3;
        for chunk in PageChunks::new(addr, expected.len(), max) {
            self.set_window(backplane_window_base!(chunk.addr))?;
            let padded = round_up(chunk.len, 4);
            self.bus_mut().read_extended(
                Function::Backplane,
                backplane_word_addr!(chunk.addr),
                &mut bounce[..padded],
                ExtendedMode::BLOCK,
            )?;
            if bounce[..chunk.len] != expected[chunk.offset..][..chunk.len] {
                warn!(target: "bwfm_sdio::ram", "mismatch in {:#010x}+{:#x}", chunk.addr, chunk.len);
                return Err(ErrorCode::FAIL);
            }
        }
        Ok(())
    }

    /// Pull exactly `buf.len()` bytes out of the function-2 frame FIFO.
    pub fn frame_read(&mut self, fifo_base: u32, buf: &mut [u8]) -> Result<(), ErrorCode> {
        self.set_window(backplane_window_base!(fifo_base))?;
        self.bus_mut().read_extended(
            Function::Wlan,
            backplane_word_addr!(fifo_base),
            buf,
            ExtendedMode::BYTE_FIFO,
        )
    }

    /// Push a padded frame into the function-2 frame FIFO.
    pub fn frame_write(&mut self, fifo_base: u32, buf: &[u8]) -> Result<(), ErrorCode> {
        check_frame_len(buf.len())?;
        self.set_window(backplane_window_base!(fifo_base))?;
        self.bus_mut().write_extended(
            Function::Wlan,
            backplane_word_addr!(fifo_base),
            buf,
            ExtendedMode::BLOCK,
        )
    }
}
