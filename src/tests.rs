use super::*;

use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

use cc3000_spi::protocol::{self, OP_READ, READ_PREFIX_SIZE, SPI_HEADER_SIZE, opcode};
use embedded_hal::{digital, spi};

#[derive(Default)]
struct Wire {
    irq_low: bool,
    cs_low: bool,
    miso: VecDeque<u8>,
    mosi: Vec<u8>,
    power_log: Vec<bool>,
    delay_ns: u64,
}

type Shared = Rc<RefCell<Wire>>;

struct Bus(Shared);
struct Cs(Shared);
struct Irq(Shared);
struct Enable(Shared);
struct Delay(Shared);

impl spi::ErrorType for Bus {
    type Error = Infallible;
}

impl SpiBus<u8> for Bus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        for word in words {
            *word = wire.miso.pop_front().unwrap_or(0);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().mosi.extend_from_slice(words);
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.write(write)?;
        self.read(read)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.read(words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl digital::ErrorType for Cs {
    type Error = Infallible;
}

impl OutputPin for Cs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().cs_low = true;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        if wire.cs_low {
            wire.irq_low = !wire.miso.is_empty();
        }
        wire.cs_low = false;
        Ok(())
    }
}

impl digital::ErrorType for Irq {
    type Error = Infallible;
}

impl InputPin for Irq {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow().irq_low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().irq_low)
    }
}

impl digital::ErrorType for Enable {
    type Error = Infallible;
}

impl OutputPin for Enable {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().power_log.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().power_log.push(true);
        Ok(())
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().delay_ns += u64::from(ns);
    }
}

type TestDriver = Cc3000<'static, Bus, Cs, Irq, Enable, Delay>;

fn driver(latch: &'static IrqLatch, events: &'static AsyncEvents) -> (TestDriver, Shared) {
    let wire = Rc::new(RefCell::new(Wire::default()));
    let driver = Cc3000::new(
        Bus(wire.clone()),
        Cs(wire.clone()),
        Irq(wire.clone()),
        Enable(wire.clone()),
        Delay(wire.clone()),
        latch,
        events,
        TransportConfig::default(),
    );
    (driver, wire)
}

/// Opens the driver and completes the first write.
fn opened(latch: &'static IrqLatch, events: &'static AsyncEvents) -> (TestDriver, Shared) {
    let (mut driver, wire) = driver(latch, events);
    wire.borrow_mut().irq_low = true;
    driver.open().expect("open should succeed");
    driver
        .send(&[0x01, 0x00, 0x40, 0x00])
        .expect("first write should succeed");
    wire.borrow_mut().mosi.clear();
    (driver, wire)
}

fn event_frame(opcode: u16, args: &[u8]) -> Vec<u8> {
    let [lo, hi] = opcode.to_le_bytes();
    let mut frame = vec![OP_READ, 0, 0, 0, 0, 0x04, lo, hi, (args.len() + 1) as u8, 0];
    frame.extend_from_slice(args);
    let prefix: [u8; READ_PREFIX_SIZE] = frame[..READ_PREFIX_SIZE]
        .try_into()
        .expect("prefix should be complete");
    frame.resize(READ_PREFIX_SIZE + protocol::remaining_len(&prefix), 0);
    frame
}

fn chip_sends(wire: &Shared, frame: &[u8]) {
    let mut wire = wire.borrow_mut();
    wire.miso.extend(frame.iter().copied());
    wire.irq_low = true;
}

#[test]
fn unsolicited_events_reach_the_shared_record() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);

    chip_sends(&wire, &event_frame(opcode::WLAN_UNSOL_CONNECT, &[]));
    driver.poll();
    chip_sends(&wire, &event_frame(opcode::WLAN_UNSOL_DHCP, &[0; 5]));
    driver.poll();

    assert!(EVENTS.is_connected());
    assert!(driver.events().has_dhcp());
    let mut buf = [0u8; 8];
    assert_eq!(driver.take_response(&mut buf), None);
}

#[test]
fn command_completion_is_handed_to_the_command_layer() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);
    let frame = event_frame(0x0010, &[0xAA, 0xBB]);

    chip_sends(&wire, &frame);
    driver.poll();

    let mut buf = [0u8; 32];
    let len = driver.take_response(&mut buf).expect("response pending");
    assert_eq!(&buf[..len], &frame[SPI_HEADER_SIZE..]);
    assert_eq!(driver.dropped_responses(), 0);
    assert!(EVENTS.flags().is_empty());
}

#[test]
fn second_unclaimed_response_is_counted() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);

    chip_sends(&wire, &event_frame(0x0010, &[1]));
    driver.poll();
    chip_sends(&wire, &event_frame(0x0011, &[2]));
    driver.poll();

    assert_eq!(driver.dropped_responses(), 1);
    let mut buf = [0u8; 32];
    assert!(driver.take_response(&mut buf).is_some());
    assert_eq!(buf[1], 0x11);
}

#[test]
fn pump_errors_are_absorbed_by_poll() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);
    let mut oversized = vec![OP_READ, 0, 0, 0, 0, 0x04, 0x01, 0x40, 0xFF, 0x00];
    oversized.resize(READ_PREFIX_SIZE + 254, 0);

    chip_sends(&wire, &oversized);
    chip_sends(&wire, &event_frame(opcode::WLAN_UNSOL_CONNECT, &[]));
    driver.poll();
    assert!(!EVENTS.is_connected());

    driver.poll();
    assert!(EVENTS.is_connected());
}

#[test]
fn writes_carry_spi_header_and_padding() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);
    wire.borrow_mut().irq_low = true;

    driver.send(&[0x01, 0x05, 0x40, 0x01, 0x07]).expect("write");

    assert_eq!(
        wire.borrow().mosi,
        [0x01, 0x00, 0x06, 0x00, 0x00, 0x01, 0x05, 0x40, 0x01, 0x07, 0x00]
    );
    assert_eq!(driver.transport().state(), TransportState::Idle);
}

#[test]
fn closed_driver_ignores_the_line() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = opened(&LATCH, &EVENTS);

    driver.close();
    chip_sends(&wire, &event_frame(opcode::WLAN_UNSOL_CONNECT, &[]));
    driver.poll();

    assert!(!EVENTS.is_connected());
    let mut buf = [0u8; 8];
    assert_eq!(driver.take_response(&mut buf), None);
    assert!(!driver.transport().irq_enabled());
}

#[test]
fn power_and_delay_reach_the_hardware() {
    static LATCH: IrqLatch = IrqLatch::new();
    static EVENTS: AsyncEvents = AsyncEvents::new();
    let (mut driver, wire) = driver(&LATCH, &EVENTS);

    driver.set_power(true).expect("power on");
    driver.set_power(false).expect("power off");
    driver.delay_ms(3);

    assert_eq!(wire.borrow().power_log, [true, false]);
    assert_eq!(wire.borrow().delay_ns, 3_000_000);
}
