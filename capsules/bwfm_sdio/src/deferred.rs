// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Work recorded from interrupt context and serviced later from the driver
//! task.
//!
//! Raising an event is a single atomic `fetch_or`, so it is safe from the
//! SDIO interrupt handler while the task holds the device lock. The task
//! drains events lowest bit first.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Event {
    /// The card raised its interrupt line.
    Interrupt = 0,
    /// Packets were queued for transmission.
    Transmit = 1,
}

impl Event {
    const fn from_bit(bit: u32) -> Option<Event> {
        match bit {
            0 => Some(Event::Interrupt),
            1 => Some(Event::Transmit),
            _ => None,
        }
    }
}

pub struct PendingEvents {
    bitmask: AtomicU32,
}

impl PendingEvents {
    pub const fn new() -> Self {
        Self {
            bitmask: AtomicU32::new(0),
        }
    }

    pub fn set(&self, event: Event) {
        self.bitmask.fetch_or(1 << event as u32, Ordering::AcqRel);
    }

    pub fn is_pending(&self) -> bool {
        self.bitmask.load(Ordering::Acquire) != 0
    }

    /// Clear and return the lowest pending event.
    pub fn take(&self) -> Option<Event> {
        let val = self.bitmask.load(Ordering::Acquire);
        if val == 0 {
            return None;
        }
        let bit = val.trailing_zeros();
        self.bitmask.fetch_and(!(1 << bit), Ordering::AcqRel);
        Event::from_bit(bit)
    }

    pub fn clear(&self) {
        self.bitmask.store(0, Ordering::Release);
    }
}
