// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Aggregated ("glom") receive.
//!
//! A glom descriptor on the receive path lists the lengths of the sub-frames
//! the chip packed into one superframe. The sub-frames are read one by one,
//! the first one carrying an extra superframe header in front of its own.
//! Each sub-frame is then checked on its own: a bad one is dropped without
//! affecting its neighbours.

use alloc::vec::Vec;

use log::warn;

use crate::backplane::Backplane;
use crate::bus::SdioBus;
use crate::rx::RxFrame;
use crate::sdpcm::{Channel, FrameError, FrameHeader, SDPCM_HDR_LEN};
use crate::ErrorCode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlomStats {
    pub delivered: usize,
    pub dropped: usize,
    /// Read-ahead hint carried by the superframe header.
    pub next_len: usize,
}

/// Read the sub-frames listed in `sublens` and queue the valid ones on
/// `frames`.
///
/// A failing read or allocation discards everything read so far.
pub(crate) fn receive<B: SdioBus>(
    bp: &mut Backplane<B>,
    fifo_base: u32,
    sublens: &[u16],
    rx_buf_size: usize,
    frames: &mut Vec<RxFrame>,
) -> Result<GlomStats, ErrorCode> {
    if sublens.is_empty() {
        return Ok(GlomStats::default());
    }

    let mut batch: Vec<Vec<u8>> = Vec::new();
    batch
        .try_reserve_exact(sublens.len())
        .map_err(|_| ErrorCode::NOMEM)?;

    for &len in sublens {
        let len = len as usize;
        if len > rx_buf_size {
            return Err(ErrorCode::SIZE);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| ErrorCode::NOMEM)?;
        buf.resize(len, 0);
        bp.frame_read(fifo_base, &mut buf)?;
        batch.push(buf);
    }

    Ok(decode(batch, frames))
}

/// Split a superframe whose sub-frames were already read.
pub(crate) fn decode(mut batch: Vec<Vec<u8>>, frames: &mut Vec<RxFrame>) -> GlomStats {
    let mut stats = GlomStats::default();
    let total: usize = batch.iter().map(Vec::len).sum();

    match superframe_header(batch.first().map_or(&[][..], |b| b.as_slice()), total) {
        Ok(hdr) => {
            stats.next_len = hdr.next_len();
            batch[0].drain(..SDPCM_HDR_LEN);
        }
        Err(e) => {
            warn!(target: "bwfm_sdio::glom", "bad superframe: {:?}", e);
            stats.dropped = batch.len();
            return stats;
        }
    }

    for buf in batch {
        match subframe(buf) {
            Ok(frame) => {
                frames.push(frame);
                stats.delivered += 1;
            }
            Err(e) => {
                warn!(target: "bwfm_sdio::glom", "sub-frame dropped: {:?}", e);
                stats.dropped += 1;
            }
        }
    }
    stats
}

fn superframe_header(buf: &[u8], total: usize) -> Result<FrameHeader, FrameError> {
    let hdr = FrameHeader::parse(buf)?.ok_or(FrameError::Length(0))?;
    if hdr.channel()? != Channel::Glom {
        return Err(FrameError::Channel(hdr.sw.chanflag));
    }
    if hdr.frame_len() > total {
        return Err(FrameError::Length(hdr.hw.frmlen));
    }
    Ok(hdr)
}

fn subframe(mut buf: Vec<u8>) -> Result<RxFrame, FrameError> {
    let hdr = FrameHeader::parse(&buf)?.ok_or(FrameError::Length(0))?;
    if hdr.payload_len() == 0 || buf.len() < hdr.frame_len() {
        return Err(FrameError::Length(hdr.hw.frmlen));
    }
    let off = hdr.data_offset()?;

    match hdr.channel()? {
        channel @ (Channel::Data | Channel::Event) => {
            buf.truncate(hdr.frame_len());
            buf.drain(..SDPCM_HDR_LEN + off);
            Ok(RxFrame {
                channel,
                payload: buf,
            })
        }
        Channel::Control | Channel::Glom => Err(FrameError::Channel(hdr.sw.chanflag)),
    }
}
