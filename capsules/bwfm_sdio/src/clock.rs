// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Chip clock gating.
//!
//! The backplane is only usable for bulk transfers while the chip's HT clock
//! (or the ALP clock while the firmware is not yet running) is up. The host
//! requests clocks through CHIPCLKCSR and either spins until they report
//! available or, when the caller allows it, parks the request in `Pending`
//! and lets the chip announce availability through its interrupt.
//!
//! ```text
//!  None ──> SdOnly ──> Pending ──> Available
//!             ^                        │
//!             └────────── HT off ──────┘
//! ```

use log::{debug, warn};

use crate::backplane::Backplane;
use crate::bus::{Delay, SdioBus};
use crate::registers::{clock_available, DeviceCtl, CHIPCLKCSR, DEVICE_CTL};
use crate::utils::{FUNC1_CHIPCLKCSR, FUNC1_DEVICE_CTL};
use crate::ErrorCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    /// No clock requested, the chip may sleep.
    None,
    /// Only the SDIO core is clocked; register access works, bulk transfers
    /// do not.
    SdOnly,
    /// A clock request is outstanding and the chip will interrupt once it is
    /// granted.
    Pending,
    /// The requested clock is running.
    Available,
}

pub struct ClockGate {
    state: ClockState,
    /// Firmware not yet running: the ALP clock is all there is.
    alp_only: bool,
    /// Save/restore keeps the clocks managed by the chip itself.
    sr_enabled: bool,
    poll_iterations: u32,
    poll_delay_us: u32,
}

impl ClockGate {
    pub fn new(poll_iterations: u32, poll_delay_us: u32) -> Self {
        Self {
            state: ClockState::None,
            alp_only: false,
            sr_enabled: false,
            poll_iterations,
            poll_delay_us,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Record a state the hardware was put into outside of `request`.
    pub(crate) fn force_state(&mut self, state: ClockState) {
        self.state = state;
    }

    pub fn set_alp_only(&mut self, alp_only: bool) {
        self.alp_only = alp_only;
    }

    pub fn set_sr_enabled(&mut self, sr_enabled: bool) {
        self.sr_enabled = sr_enabled;
    }

    pub fn sr_enabled(&self) -> bool {
        self.sr_enabled
    }

    /// Move towards `target`.
    ///
    /// With `allow_pending` a clock that is not up right away leaves the gate
    /// in `Pending` instead of spinning.
    pub fn request<B: SdioBus, D: Delay>(
        &mut self,
        bp: &mut Backplane<B>,
        delay: &D,
        target: ClockState,
        allow_pending: bool,
    ) -> Result<(), ErrorCode> {
        let from = self.state;
        if from == target {
            return Ok(());
        }

        let res = match target {
            ClockState::Available => {
                if self.state == ClockState::None {
                    self.state = ClockState::SdOnly;
                }
                self.ht_on(bp, delay, allow_pending)
            }
            ClockState::SdOnly => match self.state {
                ClockState::None => {
                    self.state = ClockState::SdOnly;
                    Ok(())
                }
                ClockState::Available => self.ht_off(bp),
                _ => {
                    warn!(target: "bwfm_sdio::clock", "request for {:?} -> {:?}", from, target);
                    Err(ErrorCode::INVAL)
                }
            },
            ClockState::None => {
                if matches!(self.state, ClockState::Available | ClockState::Pending) {
                    self.ht_off(bp)?;
                }
                self.state = ClockState::None;
                Ok(())
            }
            ClockState::Pending => {
                warn!(target: "bwfm_sdio::clock", "request for {:?} -> {:?}", from, target);
                Err(ErrorCode::INVAL)
            }
        };

        debug!(target: "bwfm_sdio::clock", "{:?} -> {:?} = {:?}", from, target, self.state);
        res
    }

    /// Finish a pending request once the chip reports the clock running.
    ///
    /// Returns whether the gate reached `Available`.
    pub fn poll_pending<B: SdioBus>(&mut self, bp: &mut Backplane<B>) -> Result<bool, ErrorCode> {
        if self.sr_enabled || self.state != ClockState::Pending {
            return Ok(false);
        }

        let csr = bp.read_1(FUNC1_CHIPCLKCSR)?;
        if !clock_available(csr, self.alp_only) {
            return Ok(false);
        }
        self.clear_ca_int_only(bp)?;
        self.state = ClockState::Available;
        Ok(true)
    }

    fn ht_on<B: SdioBus, D: Delay>(
        &mut self,
        bp: &mut Backplane<B>,
        delay: &D,
        allow_pending: bool,
    ) -> Result<(), ErrorCode> {
        if self.sr_enabled {
            self.state = ClockState::Available;
            return Ok(());
        }

        let req = if self.alp_only {
            CHIPCLKCSR::ALP_AVAIL_REQ::SET
        } else {
            CHIPCLKCSR::HT_AVAIL_REQ::SET
        };
        bp.write_1(FUNC1_CHIPCLKCSR, req.value)?;

        let mut csr = bp.read_1(FUNC1_CHIPCLKCSR)?;
        if !clock_available(csr, self.alp_only) && allow_pending {
            let mut ctl = DeviceCtl::new(bp.read_1(FUNC1_DEVICE_CTL)?);
            ctl.modify(DEVICE_CTL::CA_INT_ONLY::SET);
            bp.write_1(FUNC1_DEVICE_CTL, ctl.get())?;
            self.state = ClockState::Pending;
            return Ok(());
        } else if self.state == ClockState::Pending {
            self.clear_ca_int_only(bp)?;
        }

        let mut polls = 0;
        while !clock_available(csr, self.alp_only) {
            if polls == self.poll_iterations {
                warn!(target: "bwfm_sdio::clock", "HT avail timeout");
                return Err(ErrorCode::BUSY);
            }
            csr = bp.read_1(FUNC1_CHIPCLKCSR)?;
            delay.delay_us(self.poll_delay_us);
            polls += 1;
        }

        self.state = ClockState::Available;
        Ok(())
    }

    fn ht_off<B: SdioBus>(&mut self, bp: &mut Backplane<B>) -> Result<(), ErrorCode> {
        if self.sr_enabled {
            self.state = ClockState::SdOnly;
            return Ok(());
        }

        if self.state == ClockState::Pending {
            self.clear_ca_int_only(bp)?;
        }
        bp.write_1(FUNC1_CHIPCLKCSR, 0)?;
        self.state = ClockState::SdOnly;
        Ok(())
    }

    fn clear_ca_int_only<B: SdioBus>(&mut self, bp: &mut Backplane<B>) -> Result<(), ErrorCode> {
        let mut ctl = DeviceCtl::new(bp.read_1(FUNC1_DEVICE_CTL)?);
        ctl.modify(DEVICE_CTL::CA_INT_ONLY::CLEAR);
        bp.write_1(FUNC1_DEVICE_CTL, ctl.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Function;
    use crate::mock::{BusOp, ClockModel, MockBus, MockDelay};

    fn gate_in(state: ClockState) -> ClockGate {
        let mut gate = ClockGate::new(5000, 1000);
        gate.force_state(state);
        gate
    }

    #[test]
    fn immediate_clock_costs_one_write_one_read() {
        let mut bp = Backplane::new(MockBus::new());
        let delay = MockDelay::new();
        let mut gate = gate_in(ClockState::SdOnly);

        gate.request(&mut bp, &delay, ClockState::Available, false).unwrap();

        assert_eq!(gate.state(), ClockState::Available);
        assert_eq!(
            bp.bus().ops,
            [
                BusOp::WriteByte(Function::Backplane, FUNC1_CHIPCLKCSR, 0x10),
                BusOp::ReadByte(Function::Backplane, FUNC1_CHIPCLKCSR),
            ]
        );
        assert_eq!(delay.total_us.get(), 0);
    }

    #[test]
    fn unavailable_clock_goes_pending_without_spinning() {
        let mut bus = MockBus::new();
        bus.clock = ClockModel::Never;
        let mut bp = Backplane::new(bus);
        let delay = MockDelay::new();
        let mut gate = gate_in(ClockState::SdOnly);

        gate.request(&mut bp, &delay, ClockState::Available, true).unwrap();

        assert_eq!(gate.state(), ClockState::Pending);
        assert_eq!(bp.bus().clock_reads, 1);
        assert_eq!(delay.total_us.get(), 0);
        assert_eq!(bp.bus().reg(Function::Backplane, FUNC1_DEVICE_CTL), 0x04);
    }

    #[test]
    fn pending_completes_from_service() {
        let mut bus = MockBus::new();
        bus.clock = ClockModel::AfterReads(1);
        let mut bp = Backplane::new(bus);
        let delay = MockDelay::new();
        let mut gate = gate_in(ClockState::SdOnly);

        gate.request(&mut bp, &delay, ClockState::Available, true).unwrap();
        assert_eq!(gate.state(), ClockState::Pending);

        assert_eq!(gate.poll_pending(&mut bp), Ok(true));
        assert_eq!(gate.state(), ClockState::Available);
        assert_eq!(bp.bus().reg(Function::Backplane, FUNC1_DEVICE_CTL), 0);
    }

    #[test]
    fn timeout_is_bounded() {
        let mut bus = MockBus::new();
        bus.clock = ClockModel::Never;
        let mut bp = Backplane::new(bus);
        let delay = MockDelay::new();
        let mut gate = ClockGate::new(10, 1000);

        assert_eq!(
            gate.request(&mut bp, &delay, ClockState::Available, false),
            Err(ErrorCode::BUSY)
        );
        assert_eq!(gate.state(), ClockState::SdOnly);
        assert_eq!(bp.bus().clock_reads, 11);
        assert_eq!(delay.total_us.get(), 10_000);
    }

    #[test]
    fn slow_clock_spins_until_available() {
        let mut bus = MockBus::new();
        bus.clock = ClockModel::AfterReads(3);
        let mut bp = Backplane::new(bus);
        let delay = MockDelay::new();
        let mut gate = gate_in(ClockState::SdOnly);
        gate.set_alp_only(true);

        gate.request(&mut bp, &delay, ClockState::Available, false).unwrap();
        assert_eq!(gate.state(), ClockState::Available);
        assert_eq!(bp.bus().ops[0], BusOp::WriteByte(Function::Backplane, FUNC1_CHIPCLKCSR, 0x08));
        assert_eq!(delay.total_us.get(), 3000);
    }

    #[test]
    fn transitions_down() {
        let mut bp = Backplane::new(MockBus::new());
        let delay = MockDelay::new();

        let mut gate = gate_in(ClockState::Available);
        gate.request(&mut bp, &delay, ClockState::SdOnly, false).unwrap();
        assert_eq!(gate.state(), ClockState::SdOnly);
        assert_eq!(bp.bus().reg(Function::Backplane, FUNC1_CHIPCLKCSR), 0);

        let mut gate = gate_in(ClockState::Pending);
        assert_eq!(
            gate.request(&mut bp, &delay, ClockState::SdOnly, false),
            Err(ErrorCode::INVAL)
        );
        assert_eq!(gate.state(), ClockState::Pending);

        let mut gate = gate_in(ClockState::None);
        let before = bp.bus().ops.len();
        gate.request(&mut bp, &delay, ClockState::SdOnly, false).unwrap();
        assert_eq!(gate.state(), ClockState::SdOnly);
        gate.request(&mut bp, &delay, ClockState::None, false).unwrap();
        assert_eq!(gate.state(), ClockState::None);
        assert_eq!(bp.bus().ops.len(), before);
    }

    #[test]
    fn save_restore_skips_registers() {
        let mut bp = Backplane::new(MockBus::new());
        let delay = MockDelay::new();
        let mut gate = gate_in(ClockState::SdOnly);
        gate.set_sr_enabled(true);

        gate.request(&mut bp, &delay, ClockState::Available, false).unwrap();
        assert_eq!(gate.state(), ClockState::Available);
        gate.request(&mut bp, &delay, ClockState::SdOnly, false).unwrap();
        assert_eq!(gate.state(), ClockState::SdOnly);
        assert!(bp.bus().ops.is_empty());
    }
}
