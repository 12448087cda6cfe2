//! Connection manager: driver bring-up, scan/connect with retries, smart
//! config provisioning and network configuration.

mod manager;
mod scan;

pub use manager::ConnectionManager;
pub use scan::ScanEntry;

use cc3000_spi::protocol::opcode;

use crate::{host::HostStatus, irq_map::IrqMap};

/// Events the chip keeps masked after bring-up.
pub const DEFAULT_EVENT_MASK: u32 = (opcode::WLAN_UNSOL_INIT | opcode::WLAN_KEEPALIVE) as u32;

/// Prefix the smart config phone app uses to tag its packets.
pub const SMART_CONFIG_PREFIX: [u8; 3] = *b"TTT";

/// Longest SSID and key the chip accepts.
pub const MAX_SSID_LEN: usize = 32;
pub const MAX_KEY_LEN: usize = 32;

/// Connection manager errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WifiError {
    /// `begin` has not completed.
    NotInitialized,
    /// Rejected before reaching the chip.
    InvalidArgument,
    /// The configured IRQ pin has no interrupt channel.
    IrqPinNotMapped,
    /// Needs a link with a DHCP lease (or an assigned address).
    NotConnected,
    /// A bounded wait ran out.
    Timeout,
    /// A chip command failed.
    Command(HostStatus),
}

impl From<HostStatus> for WifiError {
    fn from(status: HostStatus) -> Self {
        Self::Command(status)
    }
}

/// Manager lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManagerState {
    Uninitialized,
    Initialized,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// Link status as reported by the chip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChipStatus {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

impl ChipStatus {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Scanning,
            2 => Self::Connecting,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Manager timing and wiring.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ManagerConfig {
    /// Host pin wired to the chip's IRQ line.
    pub irq_pin: u8,
    pub irq_map: IrqMap,
    pub connect_timeout_ms: u32,
    pub scan_window_ms: u32,
    /// Wait after starting a scan before results are read.
    pub scan_settle_ms: u32,
    pub smart_config_timeout_ms: u32,
    /// Delay between pump calls inside bounded waits.
    pub poll_interval_ms: u32,
    pub reboot_delay_ms: u32,
    /// Power-cycle delay after changing MAC or IP settings.
    pub apply_delay_ms: u32,
    /// Power-cycle delay during smart config.
    pub restart_delay_ms: u32,
    /// Settle time between setting the connection policy and connecting.
    pub policy_settle_ms: u32,
    /// Wait after the link comes up before checking for a lease.
    pub link_settle_ms: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            irq_pin: 3,
            irq_map: IrqMap::default(),
            connect_timeout_ms: 10_000,
            scan_window_ms: 4_000,
            scan_settle_ms: 4_500,
            smart_config_timeout_ms: 60_000,
            poll_interval_ms: 10,
            reboot_delay_ms: 5_000,
            apply_delay_ms: 200,
            restart_delay_ms: 1_000,
            policy_settle_ms: 500,
            link_settle_ms: 1_000,
        }
    }
}

impl ManagerConfig {
    pub const fn with_irq_pin(mut self, irq_pin: u8, irq_map: IrqMap) -> Self {
        self.irq_pin = irq_pin;
        self.irq_map = irq_map;
        self
    }

    pub const fn with_connect_timeout_ms(mut self, connect_timeout_ms: u32) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub const fn with_scan_timing(mut self, window_ms: u32, settle_ms: u32) -> Self {
        self.scan_window_ms = window_ms;
        self.scan_settle_ms = settle_ms;
        self
    }

    pub const fn with_smart_config_timeout_ms(mut self, smart_config_timeout_ms: u32) -> Self {
        self.smart_config_timeout_ms = smart_config_timeout_ms;
        self
    }

    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u32) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}
