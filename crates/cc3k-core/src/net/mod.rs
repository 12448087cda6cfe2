//! BSD-style socket facade: buffered clients, a small accept/broadcast
//! server and an `embedded-io` stream adapter.

mod client;
mod server;
mod sockaddr;
mod stream;

pub use client::{Client, RX_BUFFER_SIZE};
pub use server::{ClientRef, MAX_SERVER_CLIENTS, Server};
pub use sockaddr::{AF_INET, SockAddr};
pub use stream::Stream;

use crate::host::HostStatus;

/// Socket facade errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketError {
    /// The client holds no descriptor.
    NotOpen,
    /// The peer closed the connection and the descriptor was released.
    Closed,
    /// The chip handed out a descriptor beyond the tracked table.
    Exhausted,
    /// A socket call failed.
    Command(HostStatus),
}

impl From<HostStatus> for SocketError {
    fn from(status: HostStatus) -> Self {
        Self::Command(status)
    }
}

#[cfg(test)]
mod tests;
