// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use alloc::vec::Vec;

/// Consumer of what the transport receives, usually the BCDC protocol layer.
///
/// All callbacks run from `BwfmSdio::service` after the device lock has been
/// released, so a client may queue new packets from inside a callback.
pub trait SdpcmClient {
    /// Payload of a control channel frame, in arrival order.
    fn control_received(&self, payload: &[u8]);

    /// Data channel frame, starting at the BCDC header.
    fn data_received(&self, frame: Vec<u8>);

    /// Event channel frame, starting at the BCDC header.
    fn event_received(&self, frame: Vec<u8>);

    /// All frames of one receive pass were handed over.
    fn rx_batch_done(&self) {}

    /// The transmit queue has room for data packets again.
    fn transmit_ready(&self) {}
}
