// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! SDPCM transmit path: credit window, packet queue and frame building.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use log::warn;

use crate::backplane::Backplane;
use crate::bus::SdioBus;
use crate::sdpcm::{BcdcHeader, Channel, HwHeader, SwHeader, SDPCM_HDR_LEN};
use crate::utils::tx_padded_len;
use crate::ErrorCode;

/// Sequence numbers the firmware is willing to accept.
///
/// The firmware advertises the highest sequence number it can take in every
/// frame it sends; the host may transmit while its own sequence number is
/// behind that, modulo 256.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxWindow {
    seq: u8,
    max_seq: u8,
}

impl TxWindow {
    pub const fn new() -> Self {
        Self { seq: 0, max_seq: 0 }
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn max_seq(&self) -> u8 {
        self.max_seq
    }

    pub fn set_max_seq(&mut self, max_seq: u8) {
        self.max_seq = max_seq;
    }

    pub fn credit(&self) -> u8 {
        self.max_seq.wrapping_sub(self.seq)
    }

    /// A credit with the top bit set means the firmware's window is behind
    /// us, not 128 frames ahead.
    pub fn can_send(&self) -> bool {
        let credit = self.credit();
        credit != 0 && credit & 0x80 == 0
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = seq.wrapping_add(1);
        seq
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Control,
    Data { priority: u8 },
}

#[derive(Debug)]
pub struct TxPacket {
    pub kind: TxKind,
    pub payload: Vec<u8>,
}

impl TxPacket {
    /// Length of the framed packet before padding.
    pub fn frame_len(&self) -> usize {
        frame_len(self.kind, self.payload.len())
    }
}

fn frame_len(kind: TxKind, payload_len: usize) -> usize {
    match kind {
        TxKind::Control => SDPCM_HDR_LEN + payload_len,
        TxKind::Data { .. } => SDPCM_HDR_LEN + BcdcHeader::SIZE + payload_len,
    }
}

/// Outbound packets in FIFO order. Only data packets count against the
/// limit; control packets are always accepted.
pub struct TxQueue {
    packets: VecDeque<TxPacket>,
    data_count: usize,
    limit: usize,
    /// Largest padded frame the bounce buffer holds.
    max_frame: usize,
}

impl TxQueue {
    pub fn new(limit: usize, max_frame: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            data_count: 0,
            limit,
            max_frame,
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }

    pub fn has_room(&self) -> bool {
        self.data_count < self.limit
    }

    /// Whether another data packet would be accepted.
    pub fn check(&self) -> Result<(), ErrorCode> {
        if self.has_room() {
            Ok(())
        } else {
            Err(ErrorCode::NOMEM)
        }
    }

    fn check_size(&self, kind: TxKind, payload_len: usize) -> Result<(), ErrorCode> {
        let len = frame_len(kind, payload_len);
        if len > u16::MAX as usize || tx_padded_len(len) > self.max_frame {
            return Err(ErrorCode::SIZE);
        }
        Ok(())
    }

    pub fn push_data(&mut self, payload: Vec<u8>, priority: u8) -> Result<(), ErrorCode> {
        self.check()?;
        let kind = TxKind::Data { priority };
        self.check_size(kind, payload.len())?;
        self.packets.try_reserve(1).map_err(|_| ErrorCode::NOMEM)?;
        self.data_count += 1;
        self.packets.push_back(TxPacket { kind, payload });
        Ok(())
    }

    pub fn push_control(&mut self, payload: Vec<u8>) -> Result<(), ErrorCode> {
        self.check_size(TxKind::Control, payload.len())?;
        self.packets.try_reserve(1).map_err(|_| ErrorCode::NOMEM)?;
        self.packets.push_back(TxPacket {
            kind: TxKind::Control,
            payload,
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<TxPacket> {
        let packet = self.packets.pop_front()?;
        if let TxKind::Data { .. } = packet.kind {
            self.data_count -= 1;
        }
        Some(packet)
    }

    /// Drop everything still queued, returning how many packets were lost.
    pub fn clear(&mut self) -> usize {
        let dropped = self.packets.len();
        self.packets.clear();
        self.data_count = 0;
        dropped
    }
}

/// Frame `packet` with sequence number `seq` into `bounce`.
///
/// Returns the padded length to hand to the bus.
pub fn build_frame(bounce: &mut [u8], seq: u8, packet: &TxPacket) -> Result<usize, ErrorCode> {
    let len = packet.frame_len();
    let padded = tx_padded_len(len);
    if padded > bounce.len() || len > u16::MAX as usize {
        return Err(ErrorCode::SIZE);
    }

    let channel = match packet.kind {
        TxKind::Control => Channel::Control,
        TxKind::Data { .. } => Channel::Data,
    };
    HwHeader::for_len(len as u16)
        .write_to(bounce)
        .ok_or(ErrorCode::SIZE)?;
    SwHeader {
        seqnr: seq,
        chanflag: channel as u8,
        dataoff: SDPCM_HDR_LEN as u8,
        ..Default::default()
    }
    .write_to(&mut bounce[HwHeader::SIZE..])
    .ok_or(ErrorCode::SIZE)?;

    let mut off = SDPCM_HDR_LEN;
    if let TxKind::Data { priority } = packet.kind {
        BcdcHeader::for_data(priority)
            .write_to(&mut bounce[off..])
            .ok_or(ErrorCode::SIZE)?;
        off += BcdcHeader::SIZE;
    }
    bounce[off..len].copy_from_slice(&packet.payload);
    bounce[len..padded].fill(0);
    Ok(padded)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: usize,
    pub dropped: usize,
}

pub(crate) struct Transmitter<'a, B: SdioBus> {
    pub bp: &'a mut Backplane<B>,
    pub bounce: &'a mut [u8],
    pub fifo_base: u32,
    pub burst: u8,
}

impl<B: SdioBus> Transmitter<'_, B> {
    /// Send as many queued packets as the firmware has credit for, at most
    /// one burst.
    ///
    /// A packet whose write fails is dropped and ends the burst; the rest
    /// stay queued for the next pass.
    pub fn drain(&mut self, window: &mut TxWindow, queue: &mut TxQueue) -> DrainStats {
        let mut stats = DrainStats::default();
        if !window.can_send() {
            return stats;
        }

        let mut budget = window.credit().min(self.burst);
        while budget > 0 {
            let packet = match queue.pop() {
                Some(packet) => packet,
                None => break,
            };
            budget -= 1;

            let len = match build_frame(self.bounce, window.seq(), &packet) {
                Ok(len) => len,
                Err(e) => {
                    warn!(target: "bwfm_sdio::tx", "cannot frame packet: {:?}", e);
                    stats.dropped += 1;
                    continue;
                }
            };
            window.next_seq();
            if let Err(e) = self.bp.frame_write(self.fifo_base, &self.bounce[..len]) {
                warn!(target: "bwfm_sdio::tx", "frame write failed: {:?}", e);
                stats.dropped += 1;
                break;
            }
            stats.sent += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::mock::MockBus;
    use crate::sdpcm::FrameHeader;

    const FIFO: u32 = 0x1800_0000;

    fn window(seq: u8, max_seq: u8) -> TxWindow {
        TxWindow { seq, max_seq }
    }

    #[test]
    fn admission_window() {
        assert!(window(10, 14).can_send());
        assert!(!window(130, 2).can_send());
        assert!(!window(7, 7).can_send());
        assert!(window(250, 3).can_send());
        assert_eq!(window(250, 3).credit(), 9);
    }

    #[test]
    fn data_limit() {
        let mut queue = TxQueue::new(2, 64 * 1024);
        queue.push_data(vec![1], 0).unwrap();
        queue.push_control(vec![2]).unwrap();
        queue.push_data(vec![3], 0).unwrap();
        assert_eq!(queue.check(), Err(ErrorCode::NOMEM));
        assert_eq!(queue.push_data(vec![4], 0), Err(ErrorCode::NOMEM));
        queue.push_control(vec![5]).unwrap();
        assert_eq!(queue.len(), 4);

        assert!(queue.pop().is_some());
        assert!(queue.has_room());
        assert_eq!(queue.clear(), 3);
        assert_eq!(queue.data_count(), 0);
    }

    #[test]
    fn oversized_packets_are_refused() {
        let mut queue = TxQueue::new(64, 1024);
        assert_eq!(queue.push_control(vec![0; 1013]), Err(ErrorCode::SIZE));
        queue.push_control(vec![0; 1012]).unwrap();
    }

    #[test]
    fn data_frame_layout() {
        let mut bounce = vec![0xffu8; 2048];
        let packet = TxPacket {
            kind: TxKind::Data { priority: 6 },
            payload: vec![0xab; 5],
        };
        let len = build_frame(&mut bounce, 42, &packet).unwrap();
        assert_eq!(len, 24);

        let hdr = FrameHeader::parse(&bounce).unwrap().unwrap();
        assert_eq!(hdr.frame_len(), 21);
        assert_eq!(hdr.sw.seqnr, 42);
        assert_eq!(hdr.channel(), Ok(Channel::Data));
        assert_eq!(hdr.sw.dataoff, 12);
        assert_eq!(&bounce[12..16], &[0x20, 6, 0, 0]);
        assert_eq!(&bounce[16..21], &[0xab; 5]);
        assert_eq!(&bounce[21..24], &[0, 0, 0]);
    }

    #[test]
    fn large_frames_pad_to_blocks() {
        let mut bounce = vec![0u8; 4096];
        let packet = TxPacket {
            kind: TxKind::Control,
            payload: vec![1; 600],
        };
        assert_eq!(build_frame(&mut bounce, 0, &packet), Ok(1024));
    }

    #[test]
    fn drain_respects_credit_and_burst() {
        let mut bp = Backplane::new(MockBus::new());
        let mut bounce = vec![0u8; 4096];
        let mut queue = TxQueue::new(64, 4096);
        for i in 0..5 {
            queue.push_data(vec![i], 0).unwrap();
        }

        let mut win = window(0, 3);
        let stats = Transmitter {
            bp: &mut bp,
            bounce: &mut bounce,
            fifo_base: FIFO,
            burst: 32,
        }
        .drain(&mut win, &mut queue);
        assert_eq!(stats, DrainStats { sent: 3, dropped: 0 });
        assert_eq!(win.seq(), 3);
        assert_eq!(queue.len(), 2);

        let seqs: Vec<u8> = bp.bus().tx_frames.iter().map(|f| f[4]).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        let mut win = window(3, 100);
        let stats = Transmitter {
            bp: &mut bp,
            bounce: &mut bounce,
            fifo_base: FIFO,
            burst: 1,
        }
        .drain(&mut win, &mut queue);
        assert_eq!(stats.sent, 1);
    }

    #[test]
    fn write_failure_stops_burst() {
        let mut bus = MockBus::new();
        bus.fail_frame_writes = true;
        let mut bp = Backplane::new(bus);
        let mut bounce = vec![0u8; 4096];
        let mut queue = TxQueue::new(64, 4096);
        queue.push_control(vec![1]).unwrap();
        queue.push_control(vec![2]).unwrap();

        let mut win = window(0, 8);
        let stats = Transmitter {
            bp: &mut bp,
            bounce: &mut bounce,
            fifo_base: FIFO,
            burst: 32,
        }
        .drain(&mut win, &mut queue);
        assert_eq!(stats, DrainStats { sent: 0, dropped: 1 });
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unframeable_packet_keeps_sequence() {
        let mut bp = Backplane::new(MockBus::new());
        let mut bounce = vec![0u8; 64];
        let mut queue = TxQueue::new(64, 4096);
        queue.push_control(vec![0; 100]).unwrap();
        queue.push_control(vec![1]).unwrap();

        let mut win = window(0, 8);
        let stats = Transmitter {
            bp: &mut bp,
            bounce: &mut bounce,
            fifo_base: FIFO,
            burst: 32,
        }
        .drain(&mut win, &mut queue);
        assert_eq!(stats, DrainStats { sent: 1, dropped: 1 });
        assert_eq!(win.seq(), 1);
        assert_eq!(bp.bus().tx_frames.len(), 1);
        assert_eq!(bp.bus().tx_frames[0][4], 0);
    }
}
