use core::net::Ipv4Addr;

use log::{debug, warn};

use super::{SockAddr, SocketError};
use crate::{
    events::MAX_SOCKETS,
    host::{HostStatus, SocketFd, SocketKind, Sockets},
};

/// Per-client receive buffer.
pub const RX_BUFFER_SIZE: usize = 64;

/// Readiness probe budget for [`Client::available`].
const SELECT_TIMEOUT_US: u32 = 5_000;

/// One chip socket plus a small receive buffer.
///
/// Cloning copies the buffer and cursor, not ownership of the descriptor:
/// only clone a client that is not being read from.
#[derive(Clone, Debug)]
pub struct Client {
    socket: Option<SocketFd>,
    rx: [u8; RX_BUFFER_SIZE],
    len: usize,
    cursor: usize,
}

impl Default for Client {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl Client {
    /// Client holding no socket.
    pub const fn disconnected() -> Self {
        Self {
            socket: None,
            rx: [0; RX_BUFFER_SIZE],
            len: 0,
            cursor: 0,
        }
    }

    pub(crate) const fn from_socket(sd: SocketFd) -> Self {
        let mut client = Self::disconnected();
        client.socket = Some(sd);
        client
    }

    /// Opens a socket of `kind` and connects it to `ip:port`.
    ///
    /// The descriptor is closed again on any failure.
    pub fn connect<H: Sockets>(
        host: &mut H,
        kind: SocketKind,
        ip: Ipv4Addr,
        port: u16,
    ) -> Result<Self, SocketError> {
        let sd = host.open_socket(kind).map_err(|status| {
            warn!("cc3k: failed to open {:?} socket status={}", kind, status.0);
            SocketError::Command(status)
        })?;

        if usize::from(sd) >= MAX_SOCKETS {
            warn!("cc3k: socket={} beyond table, releasing", sd);
            let _ = host.close(sd);
            return Err(SocketError::Exhausted);
        }
        host.events().clear_socket_closed(sd);

        debug!("cc3k: connect socket={} to {}:{}", sd, ip, port);
        if let Err(status) = host.connect(sd, &SockAddr::inet(ip, port)) {
            warn!("cc3k: connect to {}:{} failed status={}", ip, port, status.0);
            let _ = host.close(sd);
            return Err(SocketError::Command(status));
        }

        Ok(Self::from_socket(sd))
    }

    pub fn socket(&self) -> Option<SocketFd> {
        self.socket
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Unread bytes already in the receive buffer.
    pub fn buffered(&self) -> usize {
        self.len.saturating_sub(self.cursor)
    }

    /// Reports whether the connection is still usable.
    ///
    /// A peer-closed socket stays connected until its buffered data has been
    /// consumed; after that the descriptor is closed and released here.
    pub fn connected<H: Sockets>(&mut self, host: &mut H) -> bool {
        let Some(sd) = self.socket else {
            return false;
        };

        if self.available(host) == 0 && host.events().is_socket_closed(sd) {
            debug!("cc3k: socket={} drained after peer close", sd);
            let _ = self.close(host);
            return false;
        }
        true
    }

    /// Buffered byte count, or 1/0 from a short readiness probe when the
    /// buffer is empty.
    pub fn available<H: Sockets>(&mut self, host: &mut H) -> usize {
        let Some(sd) = self.socket else {
            return 0;
        };

        let buffered = self.buffered();
        if buffered > 0 {
            return buffered;
        }

        match host.select_readable(sd, SELECT_TIMEOUT_US) {
            Ok(true) => 1,
            _ => 0,
        }
    }

    /// Reads one byte, blocking until one arrives.
    pub fn read_byte<H: Sockets>(&mut self, host: &mut H) -> Result<u8, SocketError> {
        self.fill(host)?;
        let byte = self.rx[self.cursor];
        self.cursor += 1;
        Ok(byte)
    }

    /// Reads buffered bytes into `buf`, blocking until at least one arrives.
    pub fn read<H: Sockets>(&mut self, host: &mut H, buf: &mut [u8]) -> Result<usize, SocketError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill(host)?;

        let count = buf.len().min(self.buffered());
        buf[..count].copy_from_slice(&self.rx[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }

    /// Single receive call straight into `buf`, bypassing the buffer.
    pub fn recv<H: Sockets>(&mut self, host: &mut H, buf: &mut [u8]) -> Result<usize, SocketError> {
        let sd = self.socket.ok_or(SocketError::NotOpen)?;
        match host.recv(sd, buf) {
            Ok(count) => Ok(count),
            Err(HostStatus::SOCKET_INACTIVE) => Err(self.forced_close(host)),
            Err(status) => Err(SocketError::Command(status)),
        }
    }

    pub fn write<H: Sockets>(&mut self, host: &mut H, data: &[u8]) -> Result<usize, SocketError> {
        let sd = self.socket.ok_or(SocketError::NotOpen)?;
        host.send(sd, data).map_err(SocketError::Command)
    }

    pub fn write_byte<H: Sockets>(&mut self, host: &mut H, byte: u8) -> Result<usize, SocketError> {
        self.write(host, &[byte])
    }

    pub fn write_str<H: Sockets>(&mut self, host: &mut H, text: &str) -> Result<usize, SocketError> {
        if text.is_empty() {
            return Ok(0);
        }
        self.write(host, text.as_bytes())
    }

    /// Writes `text` followed by CRLF.
    pub fn write_line<H: Sockets>(&mut self, host: &mut H, text: &str) -> Result<usize, SocketError> {
        let written = self.write_str(host, text)?;
        Ok(written + self.write(host, b"\r\n")?)
    }

    /// Closes the descriptor. The client can be reused afterwards.
    pub fn close<H: Sockets>(&mut self, host: &mut H) -> Result<(), SocketError> {
        let sd = self.socket.take().ok_or(SocketError::NotOpen)?;
        self.len = 0;
        self.cursor = 0;
        host.events().clear_socket_closed(sd);
        host.close(sd).map_err(SocketError::Command)
    }

    /// Refills the receive buffer, polling until data arrives.
    fn fill<H: Sockets>(&mut self, host: &mut H) -> Result<(), SocketError> {
        let sd = self.socket.ok_or(SocketError::NotOpen)?;

        while self.cursor >= self.len {
            host.poll();
            match host.recv(sd, &mut self.rx) {
                Ok(count) => {
                    self.len = count.min(RX_BUFFER_SIZE);
                    self.cursor = 0;
                }
                Err(HostStatus::SOCKET_INACTIVE) => return Err(self.forced_close(host)),
                Err(status) => {
                    debug!("cc3k: recv socket={} status={}", sd, status.0);
                    self.len = 0;
                    self.cursor = 0;
                }
            }
        }
        Ok(())
    }

    fn forced_close<H: Sockets>(&mut self, host: &mut H) -> SocketError {
        debug!("cc3k: socket={:?} reset by peer", self.socket);
        let _ = self.close(host);
        SocketError::Closed
    }
}
