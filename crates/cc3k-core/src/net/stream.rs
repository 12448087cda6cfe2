use embedded_io::{ErrorKind, ErrorType, Read, Write};

use super::{Client, SocketError};
use crate::host::Sockets;

impl embedded_io::Error for SocketError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOpen => ErrorKind::NotConnected,
            Self::Closed => ErrorKind::ConnectionReset,
            Self::Exhausted => ErrorKind::OutOfMemory,
            Self::Command(_) => ErrorKind::Other,
        }
    }
}

/// Blocking `embedded-io` view of a client.
///
/// A peer reset reads as end of stream.
pub struct Stream<'a, H> {
    host: &'a mut H,
    client: &'a mut Client,
}

impl<'a, H: Sockets> Stream<'a, H> {
    pub fn new(host: &'a mut H, client: &'a mut Client) -> Self {
        Self { host, client }
    }

    pub fn client(&self) -> &Client {
        self.client
    }
}

impl<H: Sockets> ErrorType for Stream<'_, H> {
    type Error = SocketError;
}

impl<H: Sockets> Read for Stream<'_, H> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.client.read(self.host, buf) {
            Err(SocketError::Closed) => Ok(0),
            other => other,
        }
    }
}

impl<H: Sockets> Write for Stream<'_, H> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.client.write(self.host, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
