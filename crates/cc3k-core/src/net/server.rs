use log::{debug, info, warn};

use super::{Client, SockAddr, SocketError};
use crate::{
    events::MAX_SOCKETS,
    host::{HostStatus, NetTimeouts, SocketFd, SocketKind, Sockets},
};

/// Client slots; one socket is reserved for the listener.
pub const MAX_SERVER_CLIENTS: usize = MAX_SOCKETS - 1;

/// Handle returned by [`Server::available`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientRef {
    NotConnected,
    Slot(usize),
}

impl ClientRef {
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Slot(_))
    }

    pub const fn slot(self) -> Option<usize> {
        match self {
            Self::Slot(index) => Some(index),
            Self::NotConnected => None,
        }
    }
}

/// TCP listener with a fixed table of accepted clients.
#[derive(Debug)]
pub struct Server {
    port: u16,
    listener: Option<SocketFd>,
    clients: [Client; MAX_SERVER_CLIENTS],
}

impl Server {
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            listener: None,
            clients: [const { Client::disconnected() }; MAX_SERVER_CLIENTS],
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Opens, binds and listens on the configured port with non-blocking
    /// accept. Disables the chip's inactivity timeout first.
    pub fn begin<H: Sockets>(&mut self, host: &mut H) -> Result<(), SocketError> {
        host.poll();
        host.set_timeouts(&NetTimeouts::SERVER).map_err(|status| {
            warn!("cc3k: failed to set server timeouts status={}", status.0);
            SocketError::Command(status)
        })?;

        host.poll();
        let sd = host.open_socket(SocketKind::Tcp).map_err(|status| {
            warn!("cc3k: failed to open listening socket status={}", status.0);
            SocketError::Command(status)
        })?;

        if let Err(status) = Self::listen_on(host, sd, self.port) {
            let _ = host.close(sd);
            return Err(SocketError::Command(status));
        }

        info!("cc3k: listening port={} socket={}", self.port, sd);
        self.listener = Some(sd);
        Ok(())
    }

    fn listen_on<H: Sockets>(
        host: &mut H,
        sd: SocketFd,
        port: u16,
    ) -> Result<(), HostStatus> {
        host.poll();
        host.set_accept_nonblocking(sd).inspect_err(|status| {
            warn!("cc3k: failed to make socket={} non-blocking status={}", sd, status.0)
        })?;

        host.poll();
        host.bind(sd, &SockAddr::any(port)).inspect_err(|status| {
            warn!("cc3k: failed to bind port={} status={}", port, status.0)
        })?;

        host.poll();
        host.listen(sd)
            .inspect_err(|status| warn!("cc3k: listen failed status={}", status.0))
    }

    /// First client that is connected and has data to read.
    ///
    /// Runs one non-blocking accept sweep over the free slots first.
    pub fn available<H: Sockets>(&mut self, host: &mut H) -> ClientRef {
        self.accept_new_connections(host);

        for (index, client) in self.clients.iter_mut().enumerate() {
            if client.connected(host) && client.available(host) > 0 {
                return ClientRef::Slot(index);
            }
        }
        ClientRef::NotConnected
    }

    pub fn client_mut(&mut self, client: ClientRef) -> Option<&mut Client> {
        self.clients.get_mut(client.slot()?)
    }

    /// Sends `data` to every connected client. Returns total bytes accepted.
    pub fn write<H: Sockets>(&mut self, host: &mut H, data: &[u8]) -> usize {
        let mut written = 0;
        for client in &mut self.clients {
            if client.connected(host) {
                written += client.write(host, data).unwrap_or(0);
            }
        }
        written
    }

    pub fn write_byte<H: Sockets>(&mut self, host: &mut H, byte: u8) -> usize {
        self.write(host, &[byte])
    }

    fn accept_new_connections<H: Sockets>(&mut self, host: &mut H) {
        let Some(listener) = self.listener else {
            return;
        };

        for client in &mut self.clients {
            if client.connected(host) {
                continue;
            }

            host.poll();
            match host.accept(listener) {
                Ok(Some(sd)) if usize::from(sd) >= MAX_SOCKETS => {
                    warn!("cc3k: accepted socket={} outside socket table, closing", sd);
                    if let Err(status) = host.close(sd) {
                        debug!("cc3k: close socket={} status={}", sd, status.0);
                    }
                }
                Ok(Some(sd)) => {
                    debug!("cc3k: accepted socket={} on port={}", sd, self.port);
                    host.events().clear_socket_closed(sd);
                    *client = Client::from_socket(sd);
                }
                Ok(None) => {}
                Err(status) => debug!("cc3k: accept status={}", status.0),
            }
        }
    }
}
