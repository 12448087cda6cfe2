#![cfg_attr(not(test), no_std)]

//! CC3000 SPI transport: frame codec, half-duplex transaction engine and the
//! interrupt dispatcher.
//!
//! The chip pulls its IRQ line low whenever it wants service: once after
//! power-up, when a pending write may be clocked out, and when it has a frame
//! for the host. The platform's edge interrupt only feeds an [`IrqLatch`];
//! [`Transport::pump`] runs the dispatcher from the main flow, and every
//! blocking wait inside the transport pumps as well.

mod buffer;
mod irq;
pub mod protocol;

pub use buffer::{BUFFER_MAGIC, FrameBuffer, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
pub use irq::IrqLatch;

use embedded_hal::{
    delay::DelayNs,
    digital::{self, InputPin, OutputPin},
    spi::{self, SpiBus},
};
use log::{debug, error, warn};

use protocol::{READ_FILL, READ_PREFIX_SIZE, SPI_HEADER_SIZE};

/// Bytes clocked before the settle delay of the first transaction.
const FIRST_WRITE_SPLIT: usize = 4;
const DRAIN_CHUNK: usize = 16;

/// Transaction engine state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportState {
    PowerUp,
    Initialized,
    Idle,
    WriteIrq,
    WriteFirstPortion,
    WriteEot,
    ReadIrq,
    ReadFirstPortion,
    ReadEot,
}

impl TransportState {
    pub const fn is_write(self) -> bool {
        matches!(self, Self::WriteIrq | Self::WriteFirstPortion | Self::WriteEot)
    }

    pub const fn is_read(self) -> bool {
        matches!(self, Self::ReadIrq | Self::ReadFirstPortion | Self::ReadEot)
    }

    /// True while a write or a read owns the bus.
    pub const fn in_flight(self) -> bool {
        self.is_write() || self.is_read()
    }
}

/// Transport timing configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Delay between two polls of a blocking wait.
    pub poll_step_us: u32,
    /// Budget for any single blocking wait.
    pub transaction_timeout_us: u32,
    /// Settle delay around the split of the first transaction.
    pub first_write_settle_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_step_us: 10,
            transaction_timeout_us: 1_000_000,
            first_write_settle_ms: 1,
        }
    }
}

impl Config {
    pub const fn with_poll_step_us(mut self, poll_step_us: u32) -> Self {
        self.poll_step_us = poll_step_us;
        self
    }

    pub const fn with_transaction_timeout_us(mut self, transaction_timeout_us: u32) -> Self {
        self.transaction_timeout_us = transaction_timeout_us;
        self
    }

    pub const fn with_first_write_settle_ms(mut self, first_write_settle_ms: u32) -> Self {
        self.first_write_settle_ms = first_write_settle_ms;
        self
    }
}

/// Transport errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportError<SpiErr, CsErr, IrqErr, EnErr> {
    /// SPI transfer failed.
    Spi(SpiErr),
    /// Chip-select pin operation failed.
    Cs(CsErr),
    /// IRQ pin read failed.
    Irq(IrqErr),
    /// Power-enable pin operation failed.
    Power(EnErr),
    /// A blocking wait ran out of budget.
    Timeout,
    /// A frame buffer sentinel was overwritten. The transport is poisoned.
    Overrun,
    /// Frame does not fit the frame buffer.
    FrameTooLarge,
    /// Refused because an earlier overrun halted the transport.
    Poisoned,
}

pub type TransportResult<SPI, CS, IRQ, EN, T = ()> = Result<
    T,
    TransportError<
        <SPI as spi::ErrorType>::Error,
        <CS as digital::ErrorType>::Error,
        <IRQ as digital::ErrorType>::Error,
        <EN as digital::ErrorType>::Error,
    >,
>;

/// Receive-completion callback.
///
/// Called with the HCI packet of every received frame, SPI header stripped.
pub trait RxHandler {
    fn on_frame(&mut self, packet: &[u8]);
}

impl<F> RxHandler for F
where
    F: FnMut(&[u8]),
{
    fn on_frame(&mut self, packet: &[u8]) {
        self(packet)
    }
}

/// Half-duplex SPI transport to one CC3000.
///
/// `cs` is driven manually around each frame; `irq` is the chip's active-low
/// interrupt line and `en` its power-enable pin.
pub struct Transport<'a, SPI, CS, IRQ, EN, D, H> {
    spi: SPI,
    cs: CS,
    irq: IRQ,
    en: EN,
    delay: D,
    latch: &'a IrqLatch,
    handler: Option<H>,
    config: Config,
    state: TransportState,
    tx: FrameBuffer<TX_BUFFER_SIZE>,
    rx: FrameBuffer<RX_BUFFER_SIZE>,
    tx_len: usize,
    irq_enabled: bool,
    in_dispatch: bool,
    poisoned: bool,
}

impl<'a, SPI, CS, IRQ, EN, D, H> Transport<'a, SPI, CS, IRQ, EN, D, H>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    IRQ: InputPin,
    EN: OutputPin,
    D: DelayNs,
    H: RxHandler,
{
    /// Creates a closed transport. Call [`Transport::open`] before use.
    pub fn new(
        spi: SPI,
        cs: CS,
        irq: IRQ,
        en: EN,
        delay: D,
        latch: &'a IrqLatch,
        config: Config,
    ) -> Self {
        Self {
            spi,
            cs,
            irq,
            en,
            delay,
            latch,
            handler: None,
            config,
            state: TransportState::PowerUp,
            tx: FrameBuffer::new(),
            rx: FrameBuffer::new(),
            tx_len: 0,
            irq_enabled: false,
            in_dispatch: false,
            poisoned: false,
        }
    }

    /// Releases owned bus and pins.
    pub fn release(self) -> (SPI, CS, IRQ, EN, D) {
        (self.spi, self.cs, self.irq, self.en, self.delay)
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn handler_mut(&mut self) -> Option<&mut H> {
        self.handler.as_mut()
    }

    /// Largest payload accepted by [`Transport::write`].
    pub fn max_payload(&self) -> usize {
        (self.tx.capacity() - SPI_HEADER_SIZE) & !1
    }

    /// Transmit region after the SPI header, for building a command in place.
    pub fn tx_payload_mut(&mut self) -> &mut [u8] {
        self.tx.payload_mut()
    }

    /// Resets the engine to `PowerUp`, clears both frame buffers, installs the
    /// receive handler and enables the interrupt.
    pub fn open(&mut self, handler: H) -> TransportResult<SPI, CS, IRQ, EN> {
        debug!("cc3000-spi: open");
        self.state = TransportState::PowerUp;
        self.tx.reset();
        self.rx.reset();
        self.tx_len = 0;
        self.poisoned = false;
        self.in_dispatch = false;
        self.handler = Some(handler);

        self.cs.set_high().map_err(TransportError::Cs)?;
        self.set_irq_enabled(true);
        Ok(())
    }

    /// Disables the interrupt and hands back the receive handler.
    pub fn close(&mut self) -> Option<H> {
        debug!("cc3000-spi: close");
        self.set_irq_enabled(false);
        self.handler.take()
    }

    /// Drives the chip's power-enable pin.
    pub fn set_power(&mut self, on: bool) -> TransportResult<SPI, CS, IRQ, EN> {
        debug!("cc3000-spi: power {}", if on { "on" } else { "off" });
        if on {
            self.en.set_high().map_err(TransportError::Power)
        } else {
            self.en.set_low().map_err(TransportError::Power)
        }
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Copies `payload` after the SPI header and writes the frame.
    pub fn send(&mut self, payload: &[u8]) -> TransportResult<SPI, CS, IRQ, EN> {
        if payload.len() > self.max_payload() {
            return Err(TransportError::FrameTooLarge);
        }
        self.tx.payload_mut()[..payload.len()].copy_from_slice(payload);
        self.write(payload.len())
    }

    /// Writes the first `payload_len` bytes of the transmit payload region.
    ///
    /// Blocks until the frame has left the bus, whether it was clocked out
    /// here or by the dispatcher.
    pub fn write(&mut self, payload_len: usize) -> TransportResult<SPI, CS, IRQ, EN> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }

        let frame_len = protocol::frame_len(payload_len);
        if frame_len > self.tx.capacity() {
            return Err(TransportError::FrameTooLarge);
        }
        let header =
            protocol::encode_write_header(payload_len).ok_or(TransportError::FrameTooLarge)?;
        let frame = self.tx.frame_mut();
        frame[..SPI_HEADER_SIZE].copy_from_slice(&header);
        if frame_len > SPI_HEADER_SIZE + payload_len {
            frame[frame_len - 1] = 0;
        }

        if !self.tx.is_intact() {
            return Err(self.halt("tx"));
        }

        if self.state == TransportState::PowerUp {
            debug!("cc3000-spi: waiting for chip ready");
            self.wait_for(TransportState::Initialized)?;
        }

        if self.state == TransportState::Initialized {
            self.write_first(frame_len)?;
        } else {
            if self.state != TransportState::Idle {
                warn!("cc3000-spi: write found state={:?}, resetting", self.state);
                self.abort_transaction();
            }

            // Keep the dispatcher off the bus until the write is staged.
            self.set_irq_enabled(false);
            self.state = TransportState::WriteIrq;
            self.tx_len = frame_len;
            if let Err(err) = self.cs.set_low() {
                return Err(self.abandon(TransportError::Cs(err)));
            }
            self.set_irq_enabled(true);

            // The chip may have answered chip-select while the interrupt was off.
            match self.irq_asserted() {
                Ok(true) => {
                    self.finish_write()?;
                    // The edge that announced this write is spent.
                    self.latch.take();
                }
                Ok(false) => {}
                Err(err) => return Err(self.abandon(err)),
            }
        }

        self.wait_for(TransportState::Idle).map_err(|err| self.abandon(err))
    }

    /// Runs the dispatcher when the chip requests service.
    ///
    /// Safe to call at any rate from the main flow; does nothing while the
    /// interrupt is disabled or a dispatch is already running. Returns whether
    /// the dispatcher ran.
    pub fn pump(&mut self) -> TransportResult<SPI, CS, IRQ, EN, bool> {
        if self.in_dispatch || !self.irq_enabled {
            return Ok(false);
        }

        let edge = self.latch.take();
        let asserted = self.irq_asserted()?;
        let runnable = match self.state {
            TransportState::PowerUp | TransportState::WriteIrq => edge || asserted,
            // A latched edge alone is stale here: only a held line means a frame.
            TransportState::Idle => asserted,
            _ => false,
        };
        if !runnable {
            return Ok(false);
        }

        self.in_dispatch = true;
        let result = self.dispatch();
        self.in_dispatch = false;
        result.map(|()| true)
    }

    fn dispatch(&mut self) -> TransportResult<SPI, CS, IRQ, EN> {
        match self.state {
            TransportState::PowerUp => {
                debug!("cc3000-spi: chip signalled ready");
                self.state = TransportState::Initialized;
                Ok(())
            }
            TransportState::Idle => self.read_frame(),
            TransportState::WriteIrq => self.finish_write(),
            _ => Ok(()),
        }
    }

    /// First transaction after power-up: no handshake has happened yet, so the
    /// frame is clocked out directly with two settle delays.
    fn write_first(&mut self, frame_len: usize) -> TransportResult<SPI, CS, IRQ, EN> {
        debug!("cc3000-spi: first write len={}", frame_len);
        let settle_ms = self.config.first_write_settle_ms;

        self.cs.set_low().map_err(TransportError::Cs)?;
        self.delay.delay_ms(settle_ms);

        self.state = TransportState::WriteFirstPortion;
        let sent = self.clock_out(0, FIRST_WRITE_SPLIT).and_then(|()| {
            self.delay.delay_ms(settle_ms);
            self.clock_out(FIRST_WRITE_SPLIT, frame_len)
        });
        self.state = TransportState::WriteEot;
        self.end_transaction(sent)
    }

    /// Clocks out the staged write once the chip has asserted IRQ.
    fn finish_write(&mut self) -> TransportResult<SPI, CS, IRQ, EN> {
        debug!("cc3000-spi: write len={}", self.tx_len);
        let sent = self.clock_out(0, self.tx_len);
        self.state = TransportState::WriteEot;
        self.end_transaction(sent)
    }

    fn read_frame(&mut self) -> TransportResult<SPI, CS, IRQ, EN> {
        self.state = TransportState::ReadIrq;
        if let Err(err) = self.cs.set_low() {
            self.state = TransportState::Idle;
            return Err(TransportError::Cs(err));
        }

        let prefix = self.clock_in(0, READ_PREFIX_SIZE);
        let remaining = match prefix {
            Ok(()) => {
                self.state = TransportState::ReadFirstPortion;
                let mut prefix = [0u8; READ_PREFIX_SIZE];
                prefix.copy_from_slice(&self.rx.frame()[..READ_PREFIX_SIZE]);
                protocol::remaining_len(&prefix)
            }
            Err(err) => return self.end_transaction(Err(err)),
        };

        let total = READ_PREFIX_SIZE + remaining;
        if total > self.rx.capacity() {
            error!(
                "cc3000-spi: incoming frame len={} exceeds rx capacity={}",
                total,
                self.rx.capacity()
            );
            let drained = self.drain(remaining);
            self.end_transaction(drained)?;
            return Err(TransportError::FrameTooLarge);
        }

        if remaining > 0 {
            let body = self.clock_in(READ_PREFIX_SIZE, total);
            if body.is_err() {
                return self.end_transaction(body);
            }
        }
        self.state = TransportState::ReadEot;

        // Hand-off: the interrupt stays off until the handler returns.
        self.set_irq_enabled(false);
        if let Err(err) = self.cs.set_high() {
            self.state = TransportState::Idle;
            self.set_irq_enabled(true);
            return Err(TransportError::Cs(err));
        }
        if !self.rx.is_intact() {
            return Err(self.halt("rx"));
        }
        self.state = TransportState::Idle;

        debug!("cc3000-spi: read len={}", total);
        if let Some(handler) = self.handler.as_mut() {
            handler.on_frame(&self.rx.frame()[SPI_HEADER_SIZE..total]);
        }
        self.set_irq_enabled(true);
        Ok(())
    }

    fn clock_out(&mut self, start: usize, end: usize) -> TransportResult<SPI, CS, IRQ, EN> {
        self.spi
            .write(&self.tx.frame()[start..end])
            .and_then(|()| self.spi.flush())
            .map_err(TransportError::Spi)
    }

    fn clock_in(&mut self, start: usize, end: usize) -> TransportResult<SPI, CS, IRQ, EN> {
        let window = &mut self.rx.frame_mut()[start..end];
        window.fill(READ_FILL);
        self.spi
            .transfer_in_place(window)
            .and_then(|()| self.spi.flush())
            .map_err(TransportError::Spi)
    }

    /// Clocks in and discards `len` bytes so the link stays frame-aligned.
    fn drain(&mut self, mut len: usize) -> TransportResult<SPI, CS, IRQ, EN> {
        let mut scratch = [READ_FILL; DRAIN_CHUNK];
        while len > 0 {
            let chunk = len.min(DRAIN_CHUNK);
            scratch[..chunk].fill(READ_FILL);
            self.spi
                .transfer_in_place(&mut scratch[..chunk])
                .map_err(TransportError::Spi)?;
            len -= chunk;
        }
        self.spi.flush().map_err(TransportError::Spi)
    }

    /// Deasserts chip-select and returns to `Idle`, keeping the first error.
    fn end_transaction(
        &mut self,
        outcome: TransportResult<SPI, CS, IRQ, EN>,
    ) -> TransportResult<SPI, CS, IRQ, EN> {
        self.state = TransportState::Idle;
        let released = self.cs.set_high().map_err(TransportError::Cs);
        outcome.and(released)
    }

    /// Drops a transaction left in flight: releases chip-select on a
    /// best-effort basis and returns to `Idle`.
    fn abort_transaction(&mut self) {
        if self.state.in_flight() {
            let _ = self.cs.set_high();
            self.state = TransportState::Idle;
        }
    }

    /// Unwinds a staged write that could not complete so the next call starts
    /// from `Idle` with the interrupt live.
    fn abandon(
        &mut self,
        err: TransportError<SPI::Error, CS::Error, IRQ::Error, EN::Error>,
    ) -> TransportError<SPI::Error, CS::Error, IRQ::Error, EN::Error> {
        warn!("cc3000-spi: write abandoned state={:?}: {:?}", self.state, err);
        self.abort_transaction();
        if !self.poisoned {
            self.set_irq_enabled(true);
        }
        err
    }

    /// Busy-waits for `target`, pumping the dispatcher between polls.
    fn wait_for(&mut self, target: TransportState) -> TransportResult<SPI, CS, IRQ, EN> {
        let step_us = self.config.poll_step_us.max(1);
        let mut waited_us = 0u32;

        while self.state != target {
            self.pump()?;
            if self.state == target {
                break;
            }
            if waited_us >= self.config.transaction_timeout_us {
                warn!(
                    "cc3000-spi: timed out waiting for {:?} state={:?}",
                    target, self.state
                );
                return Err(TransportError::Timeout);
            }
            self.delay.delay_us(step_us);
            waited_us = waited_us.saturating_add(step_us);
        }

        Ok(())
    }

    fn irq_asserted(&mut self) -> TransportResult<SPI, CS, IRQ, EN, bool> {
        self.irq.is_low().map_err(TransportError::Irq)
    }

    fn set_irq_enabled(&mut self, enabled: bool) {
        self.irq_enabled = enabled;
        if enabled {
            self.latch.arm();
        } else {
            self.latch.disarm();
        }
    }

    fn halt(
        &mut self,
        which: &str,
    ) -> TransportError<SPI::Error, CS::Error, IRQ::Error, EN::Error> {
        error!(
            "cc3000-spi: {} buffer sentinel overwritten, transport halted",
            which
        );
        self.poisoned = true;
        self.state = TransportState::Idle;
        self.set_irq_enabled(false);
        TransportError::Overrun
    }
}
