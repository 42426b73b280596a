// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! SDPCM framing: headers, channels and the firmware structures read from
//! chip memory.
//!
//! Every frame on function 2 starts with a 4-byte hardware header (length and
//! its one's complement) followed by an 8-byte software header carrying the
//! sequence number, channel, read-ahead hint and flow control credit. Data
//! frames sent by the host additionally carry a 4-byte BCDC header.

macro_rules! parse {
    (
        $(#[$attr_struct:meta])* $vis_struct:vis struct $name:ident { $($(#[$attr_field:meta])* $vis_field:vis $field:ident : $field_ty:tt),* $(,)? }
        ) => {
        $(#[$attr_struct])*
        $vis_struct struct $name {
            $($(#[$attr_field])* $vis_field $field : $field_ty),*,
        }
        impl $name {
            #![allow(unused)]
            /// Size of the little-endian wire representation.
            pub const SIZE: usize = 0 $(+ parse!(@size $field_ty))*;
            pub const fn into_bytes(self) -> [u8; Self::SIZE] {
                let mut __bytes = [0u8; Self::SIZE];
                let mut __len = 0;
                $(
                    parse!(@f __len, __bytes, self.$field, $field_ty);
                )*
                __bytes
            }
            /// Decode from the start of `__bytes`, or `None` if it is too short.
            pub const fn try_from_bytes(__bytes: &[u8]) -> Option<Self> {
                if __bytes.len() < Self::SIZE {
                    return None;
                }
                let mut __len = 0;
                $(
                    parse!(@from_f __len, __bytes, $field, $field_ty);
                )*
                Some(Self {
                    $($field),*
                })
            }
            /// Encode into the start of `buf`, or `None` if it is too short.
            pub fn write_to(self, buf: &mut [u8]) -> Option<()> {
                buf.get_mut(..Self::SIZE)?.copy_from_slice(&self.into_bytes());
                Some(())
            }
        }
    };

    (@size u8) => { 1 };
    (@size u16) => { 2 };
    (@size u32) => { 4 };
    (@size [u8; $N:literal]) => { $N };

    // Inner macros for copying the bytes from the buffer into a field.
    (@from_f $len: ident, $bytes:ident, $field:ident, u8) => {
        let $field = $bytes[$len];
        $len += 1;
    };
    (@from_f $len: ident, $bytes:ident, $field:ident, u16) => {
        let $field = u16::from_le_bytes([$bytes[$len], $bytes[$len + 1]]);
        $len += 2;
    };
    (@from_f $len: ident, $bytes:ident, $field:ident, u32) => {
        let $field = u32::from_le_bytes([$bytes[$len], $bytes[$len + 1], $bytes[$len + 2], $bytes[$len + 3]]);
        $len += 4;
    };
    (@from_f $len: ident, $bytes:ident, $field:ident, [u8; $N:literal]) => {
        let mut $field = [0u8; $N];
        let mut __idx = 0;
        while __idx < $N {
            $field[__idx] = $bytes[$len];
            __idx += 1;
            $len += 1;
        }
    };

    // Inner macros for copying the field value to the bytes buffer.
    (@f $len:ident, $bytes:ident, $field:expr, u8) => {
        $bytes[$len] = $field;
        $len += 1;
    };
    (@f $len:ident, $bytes: ident, $field: expr, u16) => {
        let __field_le_bytes = $field.to_le_bytes();
        $bytes[$len] = __field_le_bytes[0];
        $bytes[$len + 1] = __field_le_bytes[1];
        $len += 2;
    };
    (@f $len:ident, $bytes: ident, $field: expr, u32) => {
        let __field_le_bytes = $field.to_le_bytes();
        $bytes[$len] = __field_le_bytes[0];
        $bytes[$len + 1] = __field_le_bytes[1];
        $bytes[$len + 2] = __field_le_bytes[2];
        $bytes[$len + 3] = __field_le_bytes[3];
        $len += 4;
    };
    (@f $len:ident, $bytes:ident, $field:expr, [u8; $N:literal]) => {
        let mut __idx = 0;
        while __idx < $N {
            $bytes[$len] = $field[__idx];
            $len += 1;
            __idx += 1;
        }
    };
}

/// Logical stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    Control = 0,
    Event = 1,
    Data = 2,
    Glom = 3,
}

impl Channel {
    pub const MASK: u8 = 0x0f;

    pub const fn from_chanflag(chanflag: u8) -> Option<Channel> {
        match chanflag & Self::MASK {
            0 => Some(Channel::Control),
            1 => Some(Channel::Event),
            2 => Some(Channel::Data),
            3 => Some(Channel::Glom),
            _ => None,
        }
    }
}

parse!(
    /// SDPCM hardware header
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HwHeader {
        pub frmlen: u16,
        pub cksum: u16,
    }
);

parse!(
    /// SDPCM software header
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SwHeader {
        pub seqnr: u8,
        pub chanflag: u8,
        /// Length of the next frame, in units of 16 bytes
        pub nextlen: u8,
        /// Offset of the payload from the start of the frame
        pub dataoff: u8,
        pub flowctl: u8,
        /// Highest sequence number the firmware accepts
        pub maxseqnr: u8,
        pub reserved: u16,
    }
);

parse!(
    /// BCDC (bulk data communication) header
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BcdcHeader {
        pub flags: u8,
        pub priority: u8,
        pub flags2: u8,
        pub data_offset: u8,
    }
);

parse!(
    /// Shared area the firmware publishes at the end of RAM once running
    #[derive(Clone, Copy, Debug)]
    pub struct SharedInfo {
        pub flags: u32,
        pub trap_addr: u32,
        pub assert_exp_addr: u32,
        pub assert_file_addr: u32,
        pub assert_line: u32,
        pub console_addr: u32,
        pub msgtrace_addr: u32,
        pub tag: [u8; 32],
        pub brpt_addr: u32,
    }
);

parse!(
    /// Firmware console descriptor
    #[derive(Clone, Copy, Debug)]
    pub struct ConsoleInfo {
        pub vcons_in: u32,
        pub vcons_out: u32,
        pub log_buf: u32,
        pub log_bufsz: u32,
        pub log_idx: u32,
    }
);

/// Combined hardware and software header length.
pub const SDPCM_HDR_LEN: usize = HwHeader::SIZE + SwHeader::SIZE;

impl HwHeader {
    pub const fn for_len(frmlen: u16) -> Self {
        Self {
            frmlen,
            cksum: !frmlen,
        }
    }

    /// All-zero header the firmware reads as "no more frames".
    pub const fn is_end_marker(&self) -> bool {
        self.frmlen == 0 && self.cksum == 0
    }

    pub const fn checksum_ok(&self) -> bool {
        self.frmlen ^ self.cksum == 0xffff
    }
}

impl BcdcHeader {
    pub const fn for_data(priority: u8) -> Self {
        Self {
            flags: (crate::utils::BCDC_PROTO_VER << crate::utils::BCDC_FLAG_VER_SHIFT)
                & crate::utils::BCDC_FLAG_VER_MASK,
            priority,
            flags2: 0,
            data_offset: 0,
        }
    }
}

/// Why a received frame was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Shorter than the combined header.
    Truncated(usize),
    Checksum { frmlen: u16, cksum: u16 },
    /// Length smaller than the combined header.
    Length(u16),
    /// Longer than the read-ahead hint that was used to fetch it.
    ReadAhead { frmlen: u16, hint: usize },
    DataOffset { dataoff: u8, payload: usize },
    Channel(u8),
}

/// Validated header pair of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub hw: HwHeader,
    pub sw: SwHeader,
}

impl FrameHeader {
    /// Decode and check the headers at the start of `buf`.
    ///
    /// `Ok(None)` is the end-of-data marker.
    pub fn parse(buf: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
        let (hw, sw) = match (
            HwHeader::try_from_bytes(buf),
            buf.get(HwHeader::SIZE..).and_then(SwHeader::try_from_bytes),
        ) {
            (Some(hw), Some(sw)) => (hw, sw),
            _ => return Err(FrameError::Truncated(buf.len())),
        };

        if hw.is_end_marker() {
            return Ok(None);
        }
        if !hw.checksum_ok() {
            return Err(FrameError::Checksum {
                frmlen: hw.frmlen,
                cksum: hw.cksum,
            });
        }
        if (hw.frmlen as usize) < SDPCM_HDR_LEN {
            return Err(FrameError::Length(hw.frmlen));
        }
        Ok(Some(FrameHeader { hw, sw }))
    }

    pub fn frame_len(&self) -> usize {
        self.hw.frmlen as usize
    }

    /// Bytes following the combined header.
    pub fn payload_len(&self) -> usize {
        self.frame_len() - SDPCM_HDR_LEN
    }

    /// Length of the frame following this one, 0 if unknown.
    pub fn next_len(&self) -> usize {
        (self.sw.nextlen as usize) << crate::utils::NEXTLEN_SHIFT
    }

    pub fn channel(&self) -> Result<Channel, FrameError> {
        Channel::from_chanflag(self.sw.chanflag).ok_or(FrameError::Channel(self.sw.chanflag))
    }

    /// Offset of the data from the start of the payload.
    pub fn data_offset(&self) -> Result<usize, FrameError> {
        let payload = self.payload_len();
        let err = FrameError::DataOffset {
            dataoff: self.sw.dataoff,
            payload,
        };
        let off = (self.sw.dataoff as usize)
            .checked_sub(SDPCM_HDR_LEN)
            .ok_or(err)?;
        if off > payload {
            return Err(err);
        }
        Ok(off)
    }
}
