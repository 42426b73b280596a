// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! SDPCM receive loop.
//!
//! Frames are pulled out of the function-2 FIFO until the chip hands back the
//! all-zero end marker. When the previous frame announced the length of the
//! next one the whole frame is fetched in one read, otherwise the header is
//! read first and the payload after it. Every header refreshes the transmit
//! credit. Anything malformed ends the pass; the chip re-raises its interrupt
//! for whatever is left.

use alloc::vec::Vec;

use log::{debug, warn};

use crate::backplane::Backplane;
use crate::bus::SdioBus;
use crate::glom;
use crate::sdpcm::{Channel, FrameError, FrameHeader, SDPCM_HDR_LEN};
use crate::tx::TxWindow;
use crate::utils::round_up;
use crate::ErrorCode;

/// A data or event frame waiting to be handed to the client.
#[derive(Debug, PartialEq, Eq)]
pub struct RxFrame {
    pub channel: Channel,
    pub payload: Vec<u8>,
}

/// Everything one receive pass collected.
#[derive(Debug, Default)]
pub struct RxBatch {
    pub control: Vec<Vec<u8>>,
    pub frames: Vec<RxFrame>,
}

impl RxBatch {
    pub fn is_empty(&self) -> bool {
        self.control.is_empty() && self.frames.is_empty()
    }
}

/// Copy `data` into a freshly allocated receive buffer of at most `capacity`
/// bytes.
pub(crate) fn new_rx_buf(data: &[u8], capacity: usize) -> Result<Vec<u8>, ErrorCode> {
    if data.len() > capacity {
        return Err(ErrorCode::SIZE);
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(data.len())
        .map_err(|_| ErrorCode::NOMEM)?;
    buf.extend_from_slice(data);
    Ok(buf)
}

pub(crate) struct Receiver<'a, B: SdioBus> {
    pub bp: &'a mut Backplane<B>,
    pub bounce: &'a mut [u8],
    /// Backplane address the frame FIFO is reached through.
    pub fifo_base: u32,
    pub rx_buf_size: usize,
}

impl<B: SdioBus> Receiver<'_, B> {
    /// Drain the frame FIFO into `batch`.
    pub fn run(&mut self, window: &mut TxWindow, batch: &mut RxBatch) {
        let mut nextlen = 0;

        loop {
            let want = if nextlen != 0 { nextlen } else { SDPCM_HDR_LEN };
            if want > self.bounce.len() {
                warn!(target: "bwfm_sdio::rx", "read ahead of {} exceeds bounce buffer", want);
                break;
            }
            if let Err(e) = self.bp.frame_read(self.fifo_base, &mut self.bounce[..want]) {
                warn!(target: "bwfm_sdio::rx", "frame read failed: {:?}", e);
                break;
            }

            let hdr = match FrameHeader::parse(&self.bounce[..want]) {
                Ok(Some(hdr)) => hdr,
                Ok(None) => break,
                Err(e) => {
                    warn!(target: "bwfm_sdio::rx", "bad frame header: {:?}", e);
                    break;
                }
            };
            if nextlen != 0 && hdr.frame_len() > nextlen {
                let e = FrameError::ReadAhead {
                    frmlen: hdr.hw.frmlen,
                    hint: nextlen,
                };
                warn!(target: "bwfm_sdio::rx", "bad frame header: {:?}", e);
                break;
            }

            window.set_max_seq(hdr.sw.maxseqnr);

            let flen = hdr.payload_len();
            if flen == 0 {
                nextlen = hdr.next_len();
                continue;
            }

            if nextlen == 0 {
                let padded = round_up(flen, 4);
                if SDPCM_HDR_LEN + padded > self.bounce.len() {
                    warn!(target: "bwfm_sdio::rx", "frame of {} bytes exceeds bounce buffer", flen);
                    break;
                }
                if let Err(e) = self
                    .bp
                    .frame_read(self.fifo_base, &mut self.bounce[SDPCM_HDR_LEN..][..padded])
                {
                    warn!(target: "bwfm_sdio::rx", "payload read failed: {:?}", e);
                    break;
                }
            }

            let off = match hdr.data_offset() {
                Ok(off) => off,
                Err(e) => {
                    warn!(target: "bwfm_sdio::rx", "{:?}", e);
                    break;
                }
            };
            let payload = &self.bounce[SDPCM_HDR_LEN..][..flen];

            nextlen = match hdr.channel() {
                Ok(Channel::Control) => {
                    match new_rx_buf(&payload[off..], usize::MAX) {
                        Ok(buf) => batch.control.push(buf),
                        Err(e) => warn!(target: "bwfm_sdio::rx", "control frame dropped: {:?}", e),
                    }
                    hdr.next_len()
                }
                Ok(channel @ (Channel::Event | Channel::Data)) => {
                    match new_rx_buf(&payload[off..], self.rx_buf_size) {
                        Ok(payload) => batch.frames.push(RxFrame { channel, payload }),
                        Err(ErrorCode::SIZE) => {
                            warn!(target: "bwfm_sdio::rx", "frame bigger than anticipated")
                        }
                        Err(e) => warn!(target: "bwfm_sdio::rx", "frame dropped: {:?}", e),
                    }
                    hdr.next_len()
                }
                Ok(Channel::Glom) => {
                    if flen % 2 != 0 {
                        warn!(target: "bwfm_sdio::rx", "odd glom descriptor length {}", flen);
                        0
                    } else {
                        let sublens: Vec<u16> = payload
                            .chunks_exact(2)
                            .map(|b| u16::from_le_bytes([b[0], b[1]]))
                            .collect();
                        match glom::receive(
                            self.bp,
                            self.fifo_base,
                            &sublens,
                            self.rx_buf_size,
                            &mut batch.frames,
                        ) {
                            Ok(stats) => {
                                debug!(target: "bwfm_sdio::rx", "glom: {:?}", stats);
                                stats.next_len
                            }
                            Err(e) => {
                                warn!(target: "bwfm_sdio::rx", "glom read failed: {:?}", e);
                                0
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(target: "bwfm_sdio::rx", "unknown channel: {:?}", e);
                    0
                }
            };
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::mock::MockBus;
    use crate::sdpcm::{HwHeader, SwHeader};

    pub(crate) const FIFO: u32 = 0x1800_0000;

    /// Frame as the chip would put it in the FIFO, padded to a word.
    pub(crate) fn chip_frame(channel: u8, payload: &[u8], nextlen: u8, maxseq: u8) -> Vec<u8> {
        let sw = SwHeader {
            chanflag: channel,
            nextlen,
            dataoff: SDPCM_HDR_LEN as u8,
            maxseqnr: maxseq,
            ..Default::default()
        };
        let mut buf = raw_frame(sw, payload, (SDPCM_HDR_LEN + payload.len()) as u16);
        buf.resize(round_up(buf.len(), 4), 0);
        buf
    }

    /// Unpadded frame with an arbitrary software header and length field.
    pub(crate) fn raw_frame(sw: SwHeader, payload: &[u8], frmlen: u16) -> Vec<u8> {
        let mut buf = vec![0u8; SDPCM_HDR_LEN + payload.len()];
        HwHeader::for_len(frmlen).write_to(&mut buf).unwrap();
        sw.write_to(&mut buf[HwHeader::SIZE..]).unwrap();
        buf[SDPCM_HDR_LEN..].copy_from_slice(payload);
        buf
    }

    fn run(bus: MockBus) -> (Backplane<MockBus>, TxWindow, RxBatch) {
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 64 * 1024];
        let mut window = TxWindow::new();
        let mut batch = RxBatch::default();
        Receiver {
            bp: &mut bp,
            bounce: &mut bounce,
            fifo_base: FIFO,
            rx_buf_size: 2048,
        }
        .run(&mut window, &mut batch);
        (bp, window, batch)
    }

    #[test]
    fn demultiplexes_channels() {
        let mut bus = MockBus::new();
        bus.push_rx(&chip_frame(0, b"ctl!", 0, 4));
        bus.push_rx(&chip_frame(2, b"data", 0, 5));
        bus.push_rx(&chip_frame(1, b"evnt", 0, 6));

        let (_, window, batch) = run(bus);

        assert_eq!(batch.control, vec![b"ctl!".to_vec()]);
        assert_eq!(
            batch.frames,
            vec![
                RxFrame {
                    channel: Channel::Data,
                    payload: b"data".to_vec()
                },
                RxFrame {
                    channel: Channel::Event,
                    payload: b"evnt".to_vec()
                },
            ]
        );
        assert_eq!(window.max_seq(), 6);
    }

    #[test]
    fn read_ahead_uses_hint() {
        let mut bus = MockBus::new();
        // 12 + 20 = 32 bytes announced as 2 * 16.
        bus.push_rx(&chip_frame(2, b"first", 2, 1));
        bus.push_rx(&chip_frame(2, &[7; 20], 0, 1));

        let (bp, _, batch) = run(bus);
        assert_eq!(batch.frames.len(), 2);
        assert_eq!(batch.frames[1].payload, vec![7; 20]);

        let reads: Vec<usize> = bp
            .bus()
            .ops
            .iter()
            .filter_map(|op| match op {
                crate::mock::BusOp::ReadExtended(crate::bus::Function::Wlan, _, l) => Some(*l),
                _ => None,
            })
            .collect();
        // header + payload, one hinted read, then the end marker
        assert_eq!(reads, vec![12, 8, 32, 12]);
    }

    #[test]
    fn header_only_frame_updates_credit_and_hint() {
        let mut bus = MockBus::new();
        bus.push_rx(&chip_frame(0, &[], 1, 9));
        bus.push_rx(&chip_frame(2, b"ab", 0, 9));

        let (_, window, batch) = run(bus);
        assert_eq!(window.max_seq(), 9);
        assert_eq!(batch.frames[0].payload, b"ab".to_vec());
    }

    #[test]
    fn bad_checksum_ends_pass() {
        let mut bus = MockBus::new();
        let mut bad = chip_frame(2, b"data", 0, 1);
        bad[2] ^= 1;
        bus.push_rx(&bad);
        bus.push_rx(&chip_frame(2, b"more", 0, 1));

        let (_, _, batch) = run(bus);
        assert!(batch.is_empty());
    }

    #[test]
    fn oversized_frames_are_dropped() {
        let mut bus = MockBus::new();
        bus.push_rx(&chip_frame(2, &[1; 3000], 0, 1));
        bus.push_rx(&chip_frame(2, b"ok", 0, 1));

        let (_, _, batch) = run(bus);
        assert_eq!(batch.frames.len(), 1);
        assert_eq!(batch.frames[0].payload, b"ok".to_vec());
    }

    #[test]
    fn unknown_channel_is_skipped() {
        let mut bus = MockBus::new();
        bus.push_rx(&chip_frame(7, b"????", 0, 1));
        bus.push_rx(&chip_frame(2, b"ok", 0, 1));

        let (_, _, batch) = run(bus);
        assert_eq!(batch.frames.len(), 1);
    }

    #[test]
    fn frame_longer_than_hint_ends_pass() {
        let mut bus = MockBus::new();
        // Announces 32 bytes, the next frame is 42.
        bus.push_rx(&chip_frame(2, b"first", 2, 1));
        bus.push_rx(&chip_frame(2, &[7; 30], 0, 1));
        let late = chip_frame(2, b"late", 0, 1);
        bus.push_rx(&late);

        let (bp, _, batch) = run(bus);
        assert_eq!(batch.frames.len(), 1);
        assert_eq!(batch.frames[0].payload, b"first".to_vec());
        // Only the 32 hinted bytes of the long frame were taken.
        assert_eq!(bp.bus().rx_fifo.len(), 44 - 32 + late.len());
    }

    #[test]
    fn bad_data_offset_ends_pass() {
        let mut bus = MockBus::new();
        let sw = SwHeader {
            chanflag: 2,
            dataoff: SDPCM_HDR_LEN as u8 - 1,
            maxseqnr: 3,
            ..Default::default()
        };
        bus.push_rx(&raw_frame(sw, b"data", (SDPCM_HDR_LEN + 4) as u16));
        let next = chip_frame(2, b"next", 0, 3);
        bus.push_rx(&next);

        let (bp, window, batch) = run(bus);
        assert!(batch.is_empty());
        assert_eq!(window.max_seq(), 3);
        assert_eq!(bp.bus().rx_fifo.len(), next.len());
    }
}
