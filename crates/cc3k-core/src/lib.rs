#![cfg_attr(not(test), no_std)]

//! Connection manager, async event record and BSD-style socket facade for the
//! CC3000.
//!
//! Everything here talks to the chip through the command boundary in
//! [`host`]; the transport underneath lives in `cc3000-spi`.

pub mod events;
pub mod host;
pub mod irq_map;
pub mod net;
pub mod wlan;

pub use events::{AsyncEvents, MAX_SOCKETS, PingReport, StatusFlags};
pub use host::{
    ConnectionPolicy, Host, HostResult, HostStatus, IpConfig, NetTimeouts, PatchRequest,
    SCAN_RESULT_LEN, ScanParams, Security, SocketFd, SocketKind, Sockets, Wlan,
};
pub use irq_map::IrqMap;
pub use net::{Client, ClientRef, MAX_SERVER_CLIENTS, SockAddr, SocketError, Server, Stream};
pub use wlan::{
    ChipStatus, ConnectionManager, DEFAULT_EVENT_MASK, ManagerConfig, ManagerState, ScanEntry,
    WifiError,
};
