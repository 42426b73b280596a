// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Standard error enum for driver operations

/// Errors reported by the SDIO transport and the collaborators it drives.
///
/// The variants and their numbering follow the kernel-wide error space, so a
/// board can forward them unchanged to whatever consumes the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ErrorCode {
    /// Generic failure condition
    FAIL = 0,
    /// Underlying system is busy; retry
    BUSY = 1,
    /// The state requested is already set
    ALREADY = 2,
    /// The component is powered down
    OFF = 3,
    /// Reservation required before use
    RESERVE = 4,
    /// An invalid parameter was passed
    INVAL = 5,
    /// Parameter passed was too large
    SIZE = 6,
    /// Operation canceled by a call
    CANCEL = 7,
    /// Memory required not available
    NOMEM = 8,
    /// Operation or command is unsupported
    NOSUPPORT = 9,
    /// Device does not exist
    NODEVICE = 10,
    /// Device is not physically installed
    UNINSTALLED = 11,
    /// Packet transmission not acknowledged
    NOACK = 12,
}

impl From<ErrorCode> for usize {
    fn from(err: ErrorCode) -> usize {
        err as usize
    }
}

impl TryFrom<usize> for ErrorCode {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::FAIL),
            1 => Ok(ErrorCode::BUSY),
            2 => Ok(ErrorCode::ALREADY),
            3 => Ok(ErrorCode::OFF),
            4 => Ok(ErrorCode::RESERVE),
            5 => Ok(ErrorCode::INVAL),
            6 => Ok(ErrorCode::SIZE),
            7 => Ok(ErrorCode::CANCEL),
            8 => Ok(ErrorCode::NOMEM),
            9 => Ok(ErrorCode::NOSUPPORT),
            10 => Ok(ErrorCode::NODEVICE),
            11 => Ok(ErrorCode::UNINSTALLED),
            12 => Ok(ErrorCode::NOACK),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;

    #[test]
    fn numbering_is_stable() {
        assert_eq!(usize::from(ErrorCode::BUSY), 1);
        assert_eq!(usize::from(ErrorCode::NOMEM), 8);
        assert_eq!(ErrorCode::try_from(10), Ok(ErrorCode::NODEVICE));
        assert_eq!(ErrorCode::try_from(13), Err(()));
    }
}
