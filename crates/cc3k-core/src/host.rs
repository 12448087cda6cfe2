//! Command-protocol boundary.
//!
//! The HCI command encodings (WLAN ioctls, netapp, nvmem and socket calls)
//! live behind these traits. The connection manager and the socket facade
//! only sequence them.

use core::net::Ipv4Addr;

use heapless::Vec;

use crate::{events::AsyncEvents, net::SockAddr};

/// Chip socket descriptor.
pub type SocketFd = u16;

/// Size of one scan result record.
pub const SCAN_RESULT_LEN: usize = 50;

/// Scan repeat intervals, one per channel slot.
pub const SCAN_INTERVALS_MS: [u32; 16] = [2000; 16];

/// Negative status returned by a chip command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostStatus(pub i16);

impl HostStatus {
    pub const FAILED: Self = Self(-1);
    /// Non-blocking accept found nothing to accept.
    pub const IN_PROGRESS: Self = Self(-2);
    /// Peer forcibly closed the socket.
    pub const SOCKET_INACTIVE: Self = Self(-57);
}

pub type HostResult<T = ()> = Result<T, HostStatus>;

/// Firmware patch source passed to the chip on start.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatchRequest(pub u8);

/// Reconnect behaviour the chip applies on its own.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnectionPolicy {
    pub connect_to_open_ap: bool,
    pub fast_connect: bool,
    pub use_profiles: bool,
}

impl ConnectionPolicy {
    /// Manual connection only.
    pub const MANUAL: Self = Self {
        connect_to_open_ap: false,
        fast_connect: false,
        use_profiles: false,
    };

    /// Reconnect using stored profiles.
    pub const PROFILES: Self = Self {
        connect_to_open_ap: false,
        fast_connect: false,
        use_profiles: true,
    };
}

/// Access point security mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Security {
    Unsecured = 0,
    Wep = 1,
    Wpa = 2,
    Wpa2 = 3,
}

impl Security {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Unsecured),
            1 => Some(Self::Wep),
            2 => Some(Self::Wpa),
            3 => Some(Self::Wpa2),
            _ => None,
        }
    }

    pub const fn raw(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketKind {
    Tcp,
    Udp,
}

/// Network stack timeouts, in seconds. Zero disables a timeout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetTimeouts {
    pub dhcp_s: u32,
    pub arp_s: u32,
    pub keepalive_s: u32,
    pub inactivity_s: u32,
}

impl NetTimeouts {
    /// Listening sockets must not be reaped for inactivity.
    pub const SERVER: Self = Self {
        dhcp_s: 14_400,
        arp_s: 3_600,
        keepalive_s: 30,
        inactivity_s: 0,
    };
}

/// SSID scan configuration. A zero duration stops scanning.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanParams {
    pub duration_ms: u32,
    pub min_dwell_ms: u32,
    pub max_dwell_ms: u32,
    pub probe_requests: u32,
    pub channel_mask: u32,
    pub rssi_threshold: i32,
    pub snr_threshold: u32,
    pub tx_power: u32,
    pub intervals_ms: [u32; 16],
}

impl ScanParams {
    /// Scan all channels, 1 through 13 included.
    pub const fn new(duration_ms: u32) -> Self {
        Self {
            duration_ms,
            min_dwell_ms: 20,
            max_dwell_ms: 100,
            probe_requests: 5,
            channel_mask: 0x1FFF,
            rssi_threshold: -120,
            snr_threshold: 0,
            tx_power: 300,
            intervals_ms: SCAN_INTERVALS_MS,
        }
    }
}

/// Network configuration reported by the chip.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpConfig {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dhcp_server: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    pub mac: [u8; 6],
    pub ssid: Vec<u8, 32>,
}

/// Core services every command layer provides.
pub trait Host {
    /// Runs the transport pump once.
    fn poll(&mut self);

    fn delay_ms(&mut self, ms: u32);

    fn events(&self) -> &AsyncEvents;
}

/// WLAN, netapp and nvmem commands.
pub trait Wlan: Host {
    /// Brings up the transport with the chip interrupt on `irq_channel`.
    fn open(&mut self, irq_channel: u8) -> HostResult;
    fn start(&mut self, patch: PatchRequest) -> HostResult;
    fn stop(&mut self) -> HostResult;

    fn set_event_mask(&mut self, mask: u32) -> HostResult;
    fn set_connection_policy(&mut self, policy: ConnectionPolicy) -> HostResult;
    fn delete_profiles(&mut self) -> HostResult;

    fn set_scan_params(&mut self, params: &ScanParams) -> HostResult;
    fn scan_result(&mut self, record: &mut [u8; SCAN_RESULT_LEN]) -> HostResult;

    fn connect_ap(&mut self, security: Security, ssid: &[u8], key: &[u8]) -> HostResult;
    fn disconnect(&mut self) -> HostResult;
    /// Raw link status: 0 disconnected, 1 scanning, 2 connecting, 3 connected.
    fn status(&mut self) -> HostResult<u32>;

    fn read_mac(&mut self) -> HostResult<[u8; 6]>;
    fn write_mac(&mut self, mac: &[u8; 6]) -> HostResult;
    fn firmware_version(&mut self) -> HostResult<[u8; 2]>;

    fn create_aes_entry(&mut self) -> HostResult;
    fn write_aes_key(&mut self, key: &[u8; 16]) -> HostResult;
    fn set_smart_config_prefix(&mut self, prefix: &[u8; 3]) -> HostResult;
    fn start_smart_config(&mut self, aes: bool) -> HostResult;
    fn process_smart_config(&mut self) -> HostResult;

    /// Addresses are already in the chip's byte order. All zero selects DHCP.
    fn configure_ip(&mut self, ip: u32, netmask: u32, gateway: u32, dns: u32) -> HostResult;
    fn ip_config(&mut self) -> HostResult<IpConfig>;

    /// Address is already in the chip's byte order.
    fn send_ping(&mut self, ip: u32, attempts: u32, size: u32, timeout_ms: u32) -> HostResult;
    fn resolve(&mut self, hostname: &str) -> HostResult<Ipv4Addr>;
    fn advertise_mdns(&mut self, name: &str) -> HostResult;
}

/// BSD socket calls.
pub trait Sockets: Host {
    fn set_timeouts(&mut self, timeouts: &NetTimeouts) -> HostResult;

    fn open_socket(&mut self, kind: SocketKind) -> HostResult<SocketFd>;
    fn connect(&mut self, sd: SocketFd, addr: &SockAddr) -> HostResult;
    fn bind(&mut self, sd: SocketFd, addr: &SockAddr) -> HostResult;
    fn listen(&mut self, sd: SocketFd) -> HostResult;
    fn set_accept_nonblocking(&mut self, sd: SocketFd) -> HostResult;
    /// `Ok(None)` while no connection is pending.
    fn accept(&mut self, sd: SocketFd) -> HostResult<Option<SocketFd>>;

    fn send(&mut self, sd: SocketFd, data: &[u8]) -> HostResult<usize>;
    fn recv(&mut self, sd: SocketFd, buf: &mut [u8]) -> HostResult<usize>;
    fn select_readable(&mut self, sd: SocketFd, timeout_us: u32) -> HostResult<bool>;
    fn close(&mut self, sd: SocketFd) -> HostResult;
}
