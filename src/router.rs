use cc3000_spi::{
    RX_BUFFER_SIZE, RxHandler,
    protocol::{self, opcode},
};
use cc3k_core::AsyncEvents;
use heapless::Vec;
use log::{debug, warn};

/// Largest packet the response slot holds.
pub const MAX_RESPONSE_LEN: usize = RX_BUFFER_SIZE;

/// Receive-completion handler installed on the transport.
///
/// Unsolicited events update the shared [`AsyncEvents`] record. Command
/// completions and data frames land in a single response slot for the
/// command layer; an unclaimed response is overwritten and counted.
pub struct EventRouter<'a> {
    events: &'a AsyncEvents,
    response: Vec<u8, MAX_RESPONSE_LEN>,
    pending: bool,
    dropped: u32,
}

impl<'a> EventRouter<'a> {
    pub fn new(events: &'a AsyncEvents) -> Self {
        Self {
            events,
            response: Vec::new(),
            pending: false,
            dropped: 0,
        }
    }

    pub fn has_response(&self) -> bool {
        self.pending
    }

    /// Responses overwritten before anyone claimed them.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Copies the pending response into `buf` and clears the slot.
    ///
    /// Returns the full response length, which may exceed `buf`.
    pub fn take_response(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.pending {
            return None;
        }
        self.pending = false;

        let len = self.response.len();
        let copied = len.min(buf.len());
        buf[..copied].copy_from_slice(&self.response[..copied]);
        Some(len)
    }
}

impl RxHandler for EventRouter<'_> {
    fn on_frame(&mut self, packet: &[u8]) {
        if let Some(event) = protocol::parse_event(packet) {
            if opcode::is_unsolicited(event.opcode) {
                self.events.on_event(event.opcode, event.args);
                return;
            }
        }

        if self.pending {
            self.dropped = self.dropped.saturating_add(1);
            warn!("cc3k: unclaimed response overwritten dropped={}", self.dropped);
        }

        let len = packet.len().min(MAX_RESPONSE_LEN);
        self.response.clear();
        // Cannot overflow: the slice is clamped to capacity.
        let _ = self.response.extend_from_slice(&packet[..len]);
        self.pending = true;
        debug!("cc3k: response len={}", len);
    }
}
