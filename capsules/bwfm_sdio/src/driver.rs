// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Broadcom FullMAC SDIO device.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! probe(&bus.card_ids())?;
//! let wifi = BwfmSdio::new(bus, delay, Config::DEFAULT);
//! wifi.set_client(&bcdc);
//! wifi.attach(&chip_layer)?;
//! wifi.preinit(&chip_layer, &Firmware { code, nvram })?;
//!
//! // SDIO interrupt handler
//! wifi.interrupt();
//! // driver task
//! wifi.service()?;
//! ```
//!
//! All register I/O, clock transitions and frame transport happen under one
//! device lock. `interrupt` only records an event, the work happens in
//! `service`, which hands received frames to the client once the lock has
//! been released.

use alloc::vec::Vec;

use log::{debug, info, trace, warn};
use spin::{Mutex, Once};

use crate::backplane::Backplane;
use crate::bus::{CardIds, Delay, Function, SdioBus};
use crate::chip::{firmware_name, Buscore, ChipEnumerator, ChipInfo, Firmware};
use crate::client::SdpcmClient;
use crate::clock::{ClockGate, ClockState};
use crate::config::Config;
use crate::console::{read_shared, Console};
use crate::deferred::{Event, PendingEvents};
use crate::registers::{
    host_interrupt_mask, HostMailbox, IntStatus, CHIPCLKCSR, INTSTATUS, SLEEPCSR,
    TOHOSTMAILBOXDATA, WAKEUPCTRL,
};
use crate::rx::{Receiver, RxBatch};
use crate::sdpcm::Channel;
use crate::tx::{Transmitter, TxQueue, TxWindow};
use crate::utils::*;
use crate::ErrorCode;

/// Where a device is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed, nothing touched yet.
    Probed,
    /// Chip enumerated, firmware not running.
    Attached,
    /// Firmware loaded and interrupts enabled.
    Running,
    /// Torn down; every operation fails with `OFF`.
    Detached,
}

/// Check that the card is one this driver handles.
pub fn probe(ids: &CardIds) -> Result<(), ErrorCode> {
    let known = matches!(ids.device, SDIO_DEVICE_BCM4359 | SDIO_DEVICE_BCM43430);
    if ids.vendor != SDIO_VENDOR_BROADCOM || !known || ids.num_functions < 2 {
        return Err(ErrorCode::NODEVICE);
    }
    Ok(())
}

/// Buscore operations on top of the backplane.
struct SdioBuscore<'b, B: SdioBus, D: Delay> {
    bp: &'b mut Backplane<B>,
    bounce: &'b mut [u8],
    delay: &'b D,
    sdio_core_base: u32,
}

impl<B: SdioBus, D: Delay> Buscore for SdioBuscore<'_, B, D> {
    fn read(&mut self, addr: u32) -> Result<u32, ErrorCode> {
        self.bp.read_4(addr)
    }

    fn write(&mut self, addr: u32, value: u32) -> Result<(), ErrorCode> {
        self.bp.write_4(addr, value)
    }

    fn prepare(&mut self) -> Result<(), ErrorCode> {
        let set = (CHIPCLKCSR::ALP_AVAIL_REQ::SET + CHIPCLKCSR::FORCE_HW_CLKREQ_OFF::SET).value;
        let avail = (CHIPCLKCSR::ALP_AVAIL::SET + CHIPCLKCSR::HT_AVAIL::SET).value;
        self.bp.write_1(FUNC1_CHIPCLKCSR, set)?;

        let mut csr = self.bp.read_1(FUNC1_CHIPCLKCSR)?;
        if csr & !avail != set {
            debug!(target: "bwfm_sdio::buscore", "wrote {:#04x} read {:#04x}", set, csr);
        }

        let mut polls = BUSCORE_PREPARE_POLLS;
        loop {
            csr = self.bp.read_1(FUNC1_CHIPCLKCSR)?;
            if csr & avail != 0 {
                break;
            }
            polls -= 1;
            if polls == 0 {
                warn!(target: "bwfm_sdio::buscore", "timeout on ALPAV wait, clkval {:#04x}", csr);
                return Err(ErrorCode::BUSY);
            }
        }

        let force = (CHIPCLKCSR::FORCE_HW_CLKREQ_OFF::SET + CHIPCLKCSR::FORCE_ALP::SET).value;
        self.bp.write_1(FUNC1_CHIPCLKCSR, force)?;
        self.delay.delay_us(BUSCORE_FORCE_ALP_DELAY_US);

        self.bp.write_1(FUNC1_SDIOPULLUP, 0)
    }

    fn activate(&mut self, rstvec: u32) -> Result<(), ErrorCode> {
        self.bp
            .write_4(self.sdio_core_base + SDPCMD_INTSTATUS, 0xffff_ffff)?;
        if rstvec != 0 {
            self.bp.ram_write(self.bounce, 0, &rstvec.to_le_bytes())?;
        }
        Ok(())
    }
}

struct Inner<B: SdioBus> {
    state: DeviceState,
    bp: Backplane<B>,
    /// Empty until attach and after detach.
    bounce: Vec<u8>,
    clock: ClockGate,
    window: TxWindow,
    queue: TxQueue,
    /// A data packet was refused for lack of room.
    tx_blocked: bool,
    chip: ChipInfo,
    console: Console,
}

impl<B: SdioBus> Inner<B> {
    fn check_attached(&self) -> Result<(), ErrorCode> {
        match self.state {
            DeviceState::Attached | DeviceState::Running => Ok(()),
            DeviceState::Probed | DeviceState::Detached => Err(ErrorCode::OFF),
        }
    }

    fn check_running(&self) -> Result<(), ErrorCode> {
        match self.state {
            DeviceState::Running => Ok(()),
            _ => Err(ErrorCode::OFF),
        }
    }

    fn buscore<'b, D: Delay>(&'b mut self, delay: &'b D) -> SdioBuscore<'b, B, D> {
        SdioBuscore {
            bp: &mut self.bp,
            bounce: &mut self.bounce,
            delay,
            sdio_core_base: self.chip.sdio_core_base,
        }
    }

    fn sdio_core_read(&mut self, reg: u32) -> Result<u32, ErrorCode> {
        self.bp.read_4(self.chip.sdio_core_base + reg)
    }

    fn sdio_core_write(&mut self, reg: u32, value: u32) -> Result<(), ErrorCode> {
        self.bp.write_4(self.chip.sdio_core_base + reg, value)
    }

    fn attach<D: Delay>(
        &mut self,
        enumerator: &dyn ChipEnumerator,
        delay: &D,
        config: &Config,
    ) -> Result<ChipInfo, ErrorCode> {
        let bus = self.bp.bus_mut();
        bus.set_block_size(Function::Backplane, F1_BLOCK_SIZE)?;
        bus.set_block_size(Function::Wlan, F2_BLOCK_SIZE)?;
        bus.enable_function(Function::Backplane)?;

        let mut bounce = Vec::new();
        bounce
            .try_reserve_exact(config.bounce_size)
            .map_err(|_| ErrorCode::NOMEM)?;
        bounce.resize(config.bounce_size, 0);
        self.bounce = bounce;

        // Force PLL off until the chip is enumerated.
        self.bp.write_1(
            FUNC1_CHIPCLKCSR,
            (CHIPCLKCSR::FORCE_HW_CLKREQ_OFF::SET + CHIPCLKCSR::ALP_AVAIL_REQ::SET).value,
        )?;

        self.chip = enumerator.attach(&mut self.buscore(delay))?;
        info!(
            target: "bwfm_sdio",
            "chip {:#x} rev {}, {} KiB RAM at {:#x}",
            self.chip.chip_id,
            self.chip.chip_rev,
            self.chip.ram_size / 1024,
            self.chip.ram_base
        );

        if self.chip.sdio_core_rev >= SDIO_CORE_KSO_REV {
            let kso = SLEEPCSR::KSO::SET.value;
            let sleep = self.bp.read_1(FUNC1_SLEEPCSR)?;
            if sleep & kso == 0 {
                self.bp.write_1(FUNC1_SLEEPCSR, sleep | kso)?;
            }
        }

        self.bp
            .modify_1(CCCR_BRCM_CARDCTRL, CCCR_BRCM_CARDCTRL_WLANRESET, 0)?;

        let pmu = self.chip.pmu_base + PMU_CONTROL;
        let reload = PMU_CONTROL_RES_RELOAD << PMU_CONTROL_RES_SHIFT;
        let value = self.bp.read_4(pmu)?;
        self.bp.write_4(pmu, value | reload)?;

        self.bp.bus_mut().disable_function(Function::Wlan)?;
        self.bp.write_1(FUNC1_CHIPCLKCSR, 0)?;
        self.clock.force_state(ClockState::SdOnly);

        self.state = DeviceState::Attached;
        Ok(self.chip)
    }

    fn preinit<D: Delay>(
        &mut self,
        enumerator: &dyn ChipEnumerator,
        delay: &D,
        config: &Config,
        firmware: &Firmware,
    ) -> Result<(), ErrorCode> {
        if self.state == DeviceState::Running {
            return Ok(());
        }
        self.check_attached()?;

        let name = match firmware_name(self.chip.chip_id, self.chip.chip_rev) {
            Some(name) => name,
            None => {
                warn!(target: "bwfm_sdio", "unknown firmware for chip {:#x}", self.chip.chip_id);
                return Err(ErrorCode::NOSUPPORT);
            }
        };
        info!(target: "bwfm_sdio", "loading firmware {}-sdio", name);

        self.clock.set_alp_only(true);
        let loaded = self.load_microcode(enumerator, delay, config, firmware);
        self.clock.set_alp_only(false);
        loaded?;

        self.clock
            .request(&mut self.bp, delay, ClockState::Available, false)?;

        let clk = self.bp.read_1(FUNC1_CHIPCLKCSR)?;
        self.bp
            .write_1(FUNC1_CHIPCLKCSR, clk | CHIPCLKCSR::FORCE_HT::SET.value)?;

        self.sdio_core_write(
            SDPCMD_TOSBMAILBOXDATA,
            SDPCM_PROT_VERSION << SDPCM_PROT_VERSION_SHIFT,
        )?;
        self.bp.bus_mut().enable_function(Function::Wlan)?;

        self.sdio_core_write(SDPCMD_HOSTINTMASK, host_interrupt_mask())?;
        self.bp.write_1(FUNC1_WATERMARK, F2_WATERMARK)?;

        if self.chip.sr_capable {
            self.bp
                .modify_1(FUNC1_WAKEUPCTRL, WAKEUPCTRL::HTWAIT::SET.value, 0)?;
            self.bp.write_1(
                CCCR_BRCM_CARDCAP,
                CCCR_BRCM_CARDCAP_CMD14_SUPPORT | CCCR_BRCM_CARDCAP_CMD14_EXT,
            )?;
            self.bp
                .write_1(FUNC1_CHIPCLKCSR, CHIPCLKCSR::FORCE_HT::SET.value)?;
            self.clock.set_sr_enabled(true);
        } else {
            self.bp.write_1(FUNC1_CHIPCLKCSR, clk)?;
        }

        if let Err(e) = self.enable_interrupts(config) {
            warn!(target: "bwfm_sdio", "can't establish interrupt: {:?}", e);
            if let Err(e) = self.clock.request(&mut self.bp, delay, ClockState::None, false) {
                warn!(target: "bwfm_sdio", "can't release clock: {:?}", e);
            }
            return Err(e);
        }

        self.state = DeviceState::Running;
        Ok(())
    }

    fn enable_interrupts(&mut self, config: &Config) -> Result<(), ErrorCode> {
        if config.oob_interrupt {
            self.bp.write_1(
                CCCR_BRCM_SEPINT,
                CCCR_BRCM_SEPINT_MASK | CCCR_BRCM_SEPINT_OE | CCCR_BRCM_SEPINT_ACT_HI,
            )?;
        }
        self.bp.bus_mut().enable_interrupt(Function::Backplane)
    }

    /// Upload and start the firmware. The clock always drops back to
    /// `SdOnly`, whatever happened.
    fn load_microcode<D: Delay>(
        &mut self,
        enumerator: &dyn ChipEnumerator,
        delay: &D,
        config: &Config,
        firmware: &Firmware,
    ) -> Result<(), ErrorCode> {
        let res = self
            .clock
            .request(&mut self.bp, delay, ClockState::Available, false)
            .and_then(|()| self.upload(enumerator, delay, config, firmware));
        let dropped = self
            .clock
            .request(&mut self.bp, delay, ClockState::SdOnly, false);
        res.and(dropped)
    }

    fn upload<D: Delay>(
        &mut self,
        enumerator: &dyn ChipEnumerator,
        delay: &D,
        config: &Config,
        firmware: &Firmware,
    ) -> Result<(), ErrorCode> {
        let rstvec = firmware.reset_vector().ok_or(ErrorCode::INVAL)?;
        let ram_base = self.chip.ram_base;

        self.bp.ram_write(&mut self.bounce, ram_base, firmware.code)?;
        if config.verify_firmware {
            self.bp
                .ram_verify(&mut self.bounce, ram_base, firmware.code)
                .inspect_err(|_| warn!(target: "bwfm_sdio", "firmware verification failed"))?;
        }

        if !firmware.nvram.is_empty() {
            let nvram_len = u32::try_from(firmware.nvram.len()).map_err(|_| ErrorCode::SIZE)?;
            let addr = self
                .chip
                .ram_size
                .checked_sub(nvram_len)
                .ok_or(ErrorCode::SIZE)?
                + ram_base;
            self.bp.ram_write(&mut self.bounce, addr, firmware.nvram)?;
            if config.verify_firmware {
                self.bp
                    .ram_verify(&mut self.bounce, addr, firmware.nvram)
                    .inspect_err(|_| warn!(target: "bwfm_sdio", "nvram verification failed"))?;
            }
        }

        debug!(target: "bwfm_sdio", "starting core at {:#010x}", rstvec);
        enumerator.set_active(&mut self.buscore(delay), rstvec)
    }

    /// Interrupt half of a service pass: finish a pending clock request,
    /// acknowledge the core interrupts and pull in received frames.
    fn handle_interrupt<D: Delay>(
        &mut self,
        delay: &D,
        config: &Config,
        batch: &mut RxBatch,
    ) -> Result<(), ErrorCode> {
        if self.clock.poll_pending(&mut self.bp)? {
            debug!(target: "bwfm_sdio", "clock available");
        }

        let mut status = IntStatus::new(self.sdio_core_read(SDPCMD_INTSTATUS)? & host_interrupt_mask());
        if status.get() != 0 {
            self.sdio_core_write(SDPCMD_INTSTATUS, status.get())?;
        }

        if status.is_set(INTSTATUS::HOST_INT) {
            let mailbox = HostMailbox::new(self.sdio_core_read(SDPCMD_TOHOSTMAILBOXDATA)?);
            self.sdio_core_write(SDPCMD_TOSBMAILBOX, SDPCMD_TOSBMAILBOX_INT_ACK)?;
            if mailbox.is_set(TOHOSTMAILBOXDATA::NAKHANDLED) {
                status.modify(INTSTATUS::FRAME_IND::SET);
            }
            if mailbox.is_set(TOHOSTMAILBOXDATA::DEVREADY)
                || mailbox.is_set(TOHOSTMAILBOXDATA::FWREADY)
            {
                self.update_shared();
            }
            if mailbox.is_set(TOHOSTMAILBOXDATA::FWHALT) {
                warn!(target: "bwfm_sdio", "firmware halted");
            }
        }
        trace!(target: "bwfm_sdio", "intstatus {:#010x}", status.get());

        // The frame indication is not reliable; the receive loop stops at the
        // end marker anyway.
        if self.ensure_clock(delay)? {
            Receiver {
                bp: &mut self.bp,
                bounce: &mut self.bounce,
                fifo_base: self.chip.cc_base,
                rx_buf_size: config.rx_buf_size,
            }
            .run(&mut self.window, batch);
        }
        Ok(())
    }

    fn update_shared(&mut self) {
        match read_shared(&mut self.bp, &mut self.bounce, &self.chip) {
            Ok(Some(shared)) => {
                debug!(target: "bwfm_sdio", "console at {:#010x}", shared.console_addr);
                self.console.set_addr(shared.console_addr);
            }
            Ok(None) => {}
            Err(e) => warn!(target: "bwfm_sdio", "cannot read shared area: {:?}", e),
        }
    }

    /// Make sure the data path is clocked. `false` means the clock is still
    /// on its way and the chip will interrupt once it is up.
    fn ensure_clock<D: Delay>(&mut self, delay: &D) -> Result<bool, ErrorCode> {
        if self.clock.state() != ClockState::Available {
            self.clock
                .request(&mut self.bp, delay, ClockState::Available, true)?;
        }
        Ok(self.clock.state() == ClockState::Available)
    }

    /// Returns whether the queue has room again after being full.
    fn transmit<D: Delay>(&mut self, delay: &D, config: &Config) -> Result<bool, ErrorCode> {
        if self.queue.is_empty() || !self.window.can_send() {
            return Ok(false);
        }
        if !self.ensure_clock(delay)? {
            return Ok(false);
        }

        let stats = Transmitter {
            bp: &mut self.bp,
            bounce: &mut self.bounce,
            fifo_base: self.chip.cc_base,
            burst: config.tx_burst,
        }
        .drain(&mut self.window, &mut self.queue);
        debug!(target: "bwfm_sdio::tx", "{:?}, {} queued", stats, self.queue.len());

        if self.tx_blocked && self.queue.has_room() {
            self.tx_blocked = false;
            return Ok(true);
        }
        Ok(false)
    }

    fn poll_console(&mut self) {
        match self.console.poll(&mut self.bp, &mut self.bounce) {
            Ok(lines) => {
                for line in lines {
                    info!(target: "bwfm_sdio::console", "{}", line);
                }
            }
            Err(e) => debug!(target: "bwfm_sdio::console", "poll failed: {:?}", e),
        }
    }

    fn detach<D: Delay>(&mut self, delay: &D) -> Result<(), ErrorCode> {
        let mut res = self.bp.bus_mut().disable_interrupt(Function::Backplane);
        let clock = self
            .clock
            .request(&mut self.bp, delay, ClockState::None, false);
        if clock.is_err() {
            self.clock.force_state(ClockState::None);
        }
        res = res.and(clock);
        res = res.and(self.bp.bus_mut().disable_function(Function::Wlan));
        res = res.and(self.bp.bus_mut().disable_function(Function::Backplane));

        let dropped = self.queue.clear();
        if dropped != 0 {
            debug!(target: "bwfm_sdio", "dropped {} queued packets", dropped);
        }
        self.bounce = Vec::new();
        self.console.reset();
        self.state = DeviceState::Detached;
        res
    }
}

pub struct BwfmSdio<'a, B: SdioBus, D: Delay> {
    inner: Mutex<Inner<B>>,
    delay: D,
    events: PendingEvents,
    client: Once<&'a dyn SdpcmClient>,
    config: Config,
}

impl<'a, B: SdioBus, D: Delay> BwfmSdio<'a, B, D> {
    pub fn new(bus: B, delay: D, config: Config) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: DeviceState::Probed,
                bp: Backplane::new(bus),
                bounce: Vec::new(),
                clock: ClockGate::new(config.clock_poll_iterations, config.clock_poll_delay_us),
                window: TxWindow::new(),
                queue: TxQueue::new(config.tx_queue_limit, config.bounce_size),
                tx_blocked: false,
                chip: ChipInfo::default(),
                console: Console::new(config.max_console_size),
            }),
            delay,
            events: PendingEvents::new(),
            client: Once::new(),
            config,
        }
    }

    /// Register the consumer of received frames. Only the first call has
    /// an effect.
    pub fn set_client(&self, client: &'a dyn SdpcmClient) {
        self.client.call_once(|| client);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.inner.lock().state
    }

    pub fn clock_state(&self) -> ClockState {
        self.inner.lock().clock.state()
    }

    pub fn chip(&self) -> Option<ChipInfo> {
        let inner = self.inner.lock();
        inner.check_attached().ok().map(|()| inner.chip)
    }

    /// Bring up function 1, enumerate the chip and leave it with its clock
    /// requests released.
    pub fn attach(&self, enumerator: &dyn ChipEnumerator) -> Result<ChipInfo, ErrorCode> {
        let mut inner = self.inner.lock();
        match inner.state {
            DeviceState::Probed => {}
            DeviceState::Attached | DeviceState::Running => return Err(ErrorCode::ALREADY),
            DeviceState::Detached => return Err(ErrorCode::OFF),
        }
        inner
            .attach(enumerator, &self.delay, &self.config)
            .inspect_err(|e| warn!(target: "bwfm_sdio", "attach failed: {:?}", e))
    }

    /// Load the firmware and enable the frame transport. Does nothing once
    /// the device is running.
    pub fn preinit(
        &self,
        enumerator: &dyn ChipEnumerator,
        firmware: &Firmware,
    ) -> Result<(), ErrorCode> {
        self.inner
            .lock()
            .preinit(enumerator, &self.delay, &self.config, firmware)
    }

    /// Firmware console location, once the shared area announced it.
    pub fn console_addr(&self) -> Option<u32> {
        match self.inner.lock().console.addr() {
            0 => None,
            addr => Some(addr),
        }
    }

    /// Read the firmware's shared area and pick up its console.
    pub fn read_shared(&self) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        inner.check_running()?;
        inner.update_shared();
        Ok(())
    }

    /// Interrupt entry point. Takes no lock.
    pub fn interrupt(&self) {
        self.events.set(Event::Interrupt);
    }

    pub fn has_pending_work(&self) -> bool {
        self.events.is_pending()
    }

    /// Handle everything recorded since the last pass, then deliver what was
    /// received.
    pub fn service(&self) -> Result<(), ErrorCode> {
        let mut batch = RxBatch::default();
        let mut ready = false;

        let res = {
            let mut inner = self.inner.lock();
            self.service_locked(&mut inner, &mut batch, &mut ready)
        };

        if let Some(client) = self.client.get() {
            let delivered = !batch.is_empty();
            for ctl in batch.control {
                client.control_received(&ctl);
            }
            for frame in batch.frames {
                match frame.channel {
                    Channel::Event => client.event_received(frame.payload),
                    _ => client.data_received(frame.payload),
                }
            }
            if delivered {
                client.rx_batch_done();
            }
            if ready {
                client.transmit_ready();
            }
        }
        res
    }

    fn service_locked(
        &self,
        inner: &mut Inner<B>,
        batch: &mut RxBatch,
        ready: &mut bool,
    ) -> Result<(), ErrorCode> {
        inner.check_running()?;

        let mut interrupt = false;
        while let Some(event) = self.events.take() {
            match event {
                Event::Interrupt => interrupt = true,
                Event::Transmit => {}
            }
        }

        if interrupt {
            inner.handle_interrupt(&self.delay, &self.config, batch)?;
        }
        *ready = inner.transmit(&self.delay, &self.config)?;

        if self.config.debug_console {
            inner.poll_console();
        }
        Ok(())
    }

    /// Whether a data packet would be accepted right now.
    pub fn tx_check(&self) -> Result<(), ErrorCode> {
        let inner = self.inner.lock();
        inner.check_running()?;
        inner.queue.check()
    }

    /// Queue a data packet; it is sent on the next service pass the firmware
    /// grants credit for.
    pub fn tx_data(&self, payload: Vec<u8>, priority: u8) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        inner.check_running()?;
        if let Err(e) = inner.queue.push_data(payload, priority) {
            if e == ErrorCode::NOMEM {
                inner.tx_blocked = true;
            }
            return Err(e);
        }
        self.events.set(Event::Transmit);
        Ok(())
    }

    /// Queue a control packet. Control packets are not limited.
    pub fn tx_control(&self, payload: Vec<u8>) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        inner.check_running()?;
        inner.queue.push_control(payload)?;
        self.events.set(Event::Transmit);
        Ok(())
    }

    /// Shut the device down. Reports the first bus failure, but the device
    /// is off afterwards either way.
    pub fn detach(&self) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        if inner.state == DeviceState::Detached {
            return Err(ErrorCode::OFF);
        }
        let res = inner.detach(&self.delay);
        self.events.clear();
        res
    }
}
