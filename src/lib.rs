#![cfg_attr(not(test), no_std)]

//! CC3000 WiFi driver.
//!
//! [`Cc3000`] owns the SPI transport and routes what the chip sends: async
//! events into a shared [`AsyncEvents`] record, everything else into a
//! response slot for the command layer. The connection manager and sockets
//! from `cc3k-core` sit on top through the [`Host`] traits.

mod router;

pub use cc3000_spi;
pub use cc3000_spi::{
    Config as TransportConfig, IrqLatch, TransportError, TransportResult, TransportState,
};
pub use cc3k_core;
pub use cc3k_core::{
    AsyncEvents, ChipStatus, Client, ClientRef, ConnectionManager, Host, IrqMap, ManagerConfig,
    ManagerState, PatchRequest, ScanEntry, Security, Server, SocketError, Sockets, StatusFlags,
    Stream, WifiError, Wlan,
};
pub use router::{EventRouter, MAX_RESPONSE_LEN};

use cc3000_spi::Transport;
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiBus,
};
use log::{info, warn};

/// Driver context for one chip.
///
/// `latch` and `events` are shared with the platform: its IRQ edge vector
/// calls [`IrqLatch::signal`], and anything may read [`AsyncEvents`].
pub struct Cc3000<'a, SPI, CS, IRQ, EN, D> {
    transport: Transport<'a, SPI, CS, IRQ, EN, D, EventRouter<'a>>,
    events: &'a AsyncEvents,
}

impl<'a, SPI, CS, IRQ, EN, D> Cc3000<'a, SPI, CS, IRQ, EN, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    IRQ: InputPin,
    EN: OutputPin,
    D: DelayNs,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spi: SPI,
        cs: CS,
        irq: IRQ,
        en: EN,
        delay: D,
        latch: &'a IrqLatch,
        events: &'a AsyncEvents,
        config: TransportConfig,
    ) -> Self {
        Self {
            transport: Transport::new(spi, cs, irq, en, delay, latch, config),
            events,
        }
    }

    /// Releases owned bus and pins.
    pub fn release(self) -> (SPI, CS, IRQ, EN, D) {
        self.transport.release()
    }

    pub fn transport(&self) -> &Transport<'a, SPI, CS, IRQ, EN, D, EventRouter<'a>> {
        &self.transport
    }

    /// Opens the transport with a fresh router. Any unclaimed response is
    /// discarded.
    pub fn open(&mut self) -> TransportResult<SPI, CS, IRQ, EN> {
        self.transport.open(EventRouter::new(self.events))?;
        info!("cc3k: transport open");
        Ok(())
    }

    /// Disables the interrupt and drops the router.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Writes one HCI packet and waits until it has left the bus.
    pub fn send(&mut self, payload: &[u8]) -> TransportResult<SPI, CS, IRQ, EN> {
        self.transport.send(payload)
    }

    /// Hands the last command completion or data frame to the caller.
    ///
    /// Returns the packet length, which may exceed `buf`.
    pub fn take_response(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.transport.handler_mut()?.take_response(buf)
    }

    /// Responses overwritten before they were taken.
    pub fn dropped_responses(&mut self) -> u32 {
        self.transport
            .handler_mut()
            .map_or(0, |router| router.dropped())
    }

    /// Drives the chip's power-enable pin.
    pub fn set_power(&mut self, on: bool) -> TransportResult<SPI, CS, IRQ, EN> {
        self.transport.set_power(on)
    }
}

impl<SPI, CS, IRQ, EN, D> Host for Cc3000<'_, SPI, CS, IRQ, EN, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    IRQ: InputPin,
    EN: OutputPin,
    D: DelayNs,
{
    fn poll(&mut self) {
        if let Err(err) = self.transport.pump() {
            warn!("cc3k: pump failed: {:?}", err);
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.transport.delay_ms(ms);
    }

    fn events(&self) -> &AsyncEvents {
        self.events
    }
}

#[cfg(test)]
mod tests;
