//! Chip status shared between the receive path and polling callers.
//!
//! The dispatcher is the only writer. Everything else reads snapshots while it
//! busy-waits, so every field is a single atomic (or a critical-section cell
//! for the multi-word ping record).

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
};

use bitflags::bitflags;
use cc3000_spi::protocol::opcode;
use critical_section::Mutex;
use log::debug;

use crate::host::SocketFd;

/// Sockets tracked by the closed-by-peer table.
pub const MAX_SOCKETS: usize = 4;

/// Bytes in a ping report record (five little-endian `u32`s).
const PING_REPORT_LEN: usize = 20;

bitflags! {
    /// Connectivity flags raised by unsolicited chip events.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct StatusFlags: u8 {
        const SMART_CONFIG_FINISHED = 0x01;
        const CONNECTED = 0x02;
        const HAS_DHCP = 0x04;
        const OK_TO_SHUT_DOWN = 0x08;
    }
}

/// Last ping report delivered by the chip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PingReport {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_round_time: u32,
    pub max_round_time: u32,
    pub avg_round_time: u32,
}

impl PingReport {
    pub const fn empty() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            min_round_time: 0,
            max_round_time: 0,
            avg_round_time: 0,
        }
    }

    /// Decodes the event payload. Fields missing from a short payload read as
    /// zero.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; PING_REPORT_LEN];
        let len = bytes.len().min(PING_REPORT_LEN);
        raw[..len].copy_from_slice(&bytes[..len]);

        let field = |index: usize| {
            let at = index * 4;
            u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
        };

        Self {
            packets_sent: field(0),
            packets_received: field(1),
            min_round_time: field(2),
            max_round_time: field(3),
            avg_round_time: field(4),
        }
    }
}

/// Async event record: status flags, closed-by-peer table and ping report.
///
/// `const`-constructible so the platform can keep it in a `static` next to
/// its interrupt vector.
pub struct AsyncEvents {
    flags: AtomicU8,
    closed: [AtomicBool; MAX_SOCKETS],
    ping_reports: AtomicU32,
    ping_report: Mutex<Cell<PingReport>>,
}

impl AsyncEvents {
    pub const fn new() -> Self {
        Self {
            flags: AtomicU8::new(0),
            closed: [const { AtomicBool::new(false) }; MAX_SOCKETS],
            ping_reports: AtomicU32::new(0),
            ping_report: Mutex::new(Cell::new(PingReport::empty())),
        }
    }

    /// Applies one unsolicited event. Unknown opcodes are ignored.
    pub fn on_event(&self, event: u16, args: &[u8]) {
        match event {
            opcode::WLAN_ASYNC_SIMPLE_CONFIG_DONE => {
                debug!("cc3k: smart config done");
                self.set(StatusFlags::SMART_CONFIG_FINISHED);
            }
            opcode::WLAN_UNSOL_CONNECT => {
                debug!("cc3k: link up");
                self.set(StatusFlags::CONNECTED);
            }
            opcode::WLAN_UNSOL_DISCONNECT => {
                debug!("cc3k: link down");
                self.reset(StatusFlags::CONNECTED | StatusFlags::HAS_DHCP);
            }
            opcode::WLAN_UNSOL_DHCP => {
                debug!("cc3k: dhcp bound");
                self.set(StatusFlags::HAS_DHCP);
            }
            opcode::CC3000_CAN_SHUT_DOWN => {
                self.set(StatusFlags::OK_TO_SHUT_DOWN);
            }
            opcode::WLAN_ASYNC_PING_REPORT => {
                let report = PingReport::from_le_bytes(args);
                critical_section::with(|cs| self.ping_report.borrow(cs).set(report));
                self.ping_reports.fetch_add(1, Ordering::AcqRel);
                debug!(
                    "cc3k: ping report sent={} received={}",
                    report.packets_sent, report.packets_received
                );
            }
            opcode::BSD_TCP_CLOSE_WAIT => {
                if let Some(slot) = args.first().and_then(|&sd| self.closed.get(usize::from(sd))) {
                    slot.store(true, Ordering::Release);
                    debug!("cc3k: peer closed socket={}", args[0]);
                }
            }
            _ => {}
        }
    }

    pub fn flags(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn contains(&self, flags: StatusFlags) -> bool {
        self.flags().contains(flags)
    }

    pub fn is_connected(&self) -> bool {
        self.contains(StatusFlags::CONNECTED)
    }

    pub fn has_dhcp(&self) -> bool {
        self.contains(StatusFlags::HAS_DHCP)
    }

    pub fn smart_config_finished(&self) -> bool {
        self.contains(StatusFlags::SMART_CONFIG_FINISHED)
    }

    pub fn ok_to_shut_down(&self) -> bool {
        self.contains(StatusFlags::OK_TO_SHUT_DOWN)
    }

    /// Clears every status flag.
    pub fn clear(&self) {
        self.flags.store(0, Ordering::Release);
    }

    /// Whether the peer has closed `sd`. Out-of-table descriptors read as open.
    pub fn is_socket_closed(&self, sd: SocketFd) -> bool {
        self.closed
            .get(usize::from(sd))
            .is_some_and(|slot| slot.load(Ordering::Acquire))
    }

    /// Forgets a stale close notification for `sd`.
    pub fn clear_socket_closed(&self, sd: SocketFd) {
        if let Some(slot) = self.closed.get(usize::from(sd)) {
            slot.store(false, Ordering::Release);
        }
    }

    pub fn ping_report(&self) -> PingReport {
        critical_section::with(|cs| self.ping_report.borrow(cs).get())
    }

    /// Reports received since the last [`AsyncEvents::reset_ping_report`].
    pub fn ping_report_count(&self) -> u32 {
        self.ping_reports.load(Ordering::Acquire)
    }

    pub fn reset_ping_report(&self) {
        critical_section::with(|cs| self.ping_report.borrow(cs).set(PingReport::empty()));
        self.ping_reports.store(0, Ordering::Release);
    }

    fn set(&self, flags: StatusFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    fn reset(&self, flags: StatusFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }
}

impl Default for AsyncEvents {
    fn default() -> Self {
        Self::new()
    }
}
