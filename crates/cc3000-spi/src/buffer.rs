//! Fixed-capacity frame buffers guarded by a trailing sentinel byte.

use crate::protocol::SPI_HEADER_SIZE;

/// Sentinel stored one past the usable capacity of every frame buffer.
pub const BUFFER_MAGIC: u8 = 0xDE;

/// Receive buffer storage, sentinel included.
pub const RX_BUFFER_SIZE: usize = 130 + 1;
/// Transmit buffer storage, sentinel included.
pub const TX_BUFFER_SIZE: usize = 130 + 1;

/// Frame storage of `N - 1` usable bytes plus the overrun sentinel.
///
/// Safe code only ever sees the usable region; the sentinel is still checked
/// before every transaction so a corrupted buffer halts the transport.
#[derive(Clone)]
pub struct FrameBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameBuffer<N> {
    /// Usable bytes.
    pub const CAPACITY: usize = N - 1;

    /// Creates a zeroed buffer with the sentinel in place.
    pub const fn new() -> Self {
        let mut bytes = [0u8; N];
        bytes[N - 1] = BUFFER_MAGIC;
        Self { bytes }
    }

    /// Zeroes the buffer and rewrites the sentinel.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.bytes[N - 1] = BUFFER_MAGIC;
    }

    pub const fn capacity(&self) -> usize {
        Self::CAPACITY
    }

    /// Returns `false` once the sentinel has been overwritten.
    pub fn is_intact(&self) -> bool {
        self.bytes[N - 1] == BUFFER_MAGIC
    }

    /// Usable region, SPI header included.
    pub fn frame(&self) -> &[u8] {
        &self.bytes[..N - 1]
    }

    pub fn frame_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..N - 1]
    }

    /// Region after the SPI header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[SPI_HEADER_SIZE..N - 1]
    }

    #[cfg(test)]
    pub(crate) fn corrupt_sentinel(&mut self) {
        self.bytes[N - 1] = !BUFFER_MAGIC;
    }
}
