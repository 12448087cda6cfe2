//! Wire-level framing for the CC3000 SPI link.
//!
//! Every transaction starts with a 5-byte SPI header:
//! - 1 byte direction (`OP_WRITE` / `OP_READ`)
//! - 2 bytes big-endian payload length, pad byte included
//! - 2 reserved zero bytes
//!
//! The payload is an HCI packet whose first byte is the packet type.

/// SPI header size in bytes.
pub const SPI_HEADER_SIZE: usize = 5;
/// HCI packet header size in bytes (event headers include the status byte).
pub const HCI_HEADER_SIZE: usize = 5;
/// Bytes clocked in before the length of an incoming frame is known.
pub const READ_PREFIX_SIZE: usize = SPI_HEADER_SIZE + HCI_HEADER_SIZE;

/// Direction tag for host-to-chip frames.
pub const OP_WRITE: u8 = 1;
/// Direction tag for chip-to-host frames.
pub const OP_READ: u8 = 3;
/// Byte clocked out on MOSI while reading.
pub const READ_FILL: u8 = OP_READ;

pub const HCI_TYPE_CMND: u8 = 0x01;
pub const HCI_TYPE_DATA: u8 = 0x02;
pub const HCI_TYPE_PATCH: u8 = 0x03;
pub const HCI_TYPE_EVNT: u8 = 0x04;

const HCI_PACKET_TYPE_OFFSET: usize = 0;
const HCI_EVENT_OPCODE_OFFSET: usize = 1;
const HCI_EVENT_LENGTH_OFFSET: usize = 3;
const HCI_EVENT_STATUS_OFFSET: usize = 4;
const HCI_DATA_LENGTH_OFFSET: usize = 3;

/// HCI event opcodes the host reacts to.
pub mod opcode {
    /// Bit shared by all WLAN unsolicited events.
    pub const UNSOL_BASE: u16 = 0x4000;

    pub const WLAN_UNSOL_CONNECT: u16 = 0x0001 + UNSOL_BASE;
    pub const WLAN_UNSOL_DISCONNECT: u16 = 0x0002 + UNSOL_BASE;
    pub const WLAN_UNSOL_INIT: u16 = 0x0004 + UNSOL_BASE;
    pub const WLAN_TX_COMPLETE: u16 = 0x0008 + UNSOL_BASE;
    pub const WLAN_UNSOL_DHCP: u16 = 0x0010 + UNSOL_BASE;
    pub const WLAN_ASYNC_PING_REPORT: u16 = 0x0040 + UNSOL_BASE;
    pub const DATA_UNSOL_FREE_BUFF: u16 = 0x0100 + UNSOL_BASE;
    pub const WLAN_KEEPALIVE: u16 = 0x0200 + UNSOL_BASE;
    pub const BSD_TCP_CLOSE_WAIT: u16 = 0x0800 + UNSOL_BASE;
    pub const WLAN_ASYNC_SIMPLE_CONFIG_DONE: u16 = 0x8080;
    pub const CC3000_CAN_SHUT_DOWN: u16 = 0x0099;

    /// Events delivered without a pending command.
    pub const fn is_unsolicited(opcode: u16) -> bool {
        (opcode & UNSOL_BASE) != 0
            || opcode == WLAN_ASYNC_SIMPLE_CONFIG_DONE
            || opcode == CC3000_CAN_SHUT_DOWN
    }
}

/// Transfer direction carried in byte 0 of the SPI header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Write,
    Read,
}

/// Decoded SPI header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpiHeader {
    pub direction: Direction,
    /// Payload length on the wire, pad byte included.
    pub length: u16,
}

/// HCI packet type, read from the first payload byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketKind {
    Command,
    Data,
    Patch,
    Event,
    Unknown(u8),
}

/// Borrowed view of an HCI event packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Event<'a> {
    pub opcode: u16,
    pub status: u8,
    /// Event arguments following the status byte.
    pub args: &'a [u8],
}

/// Payload length rounded up to even.
#[inline]
pub const fn padded_len(payload_len: usize) -> usize {
    payload_len + (payload_len & 1)
}

/// Total bytes clocked for a write of `payload_len` payload bytes.
#[inline]
pub const fn frame_len(payload_len: usize) -> usize {
    SPI_HEADER_SIZE + padded_len(payload_len)
}

/// Builds the header for a host-to-chip frame.
///
/// Returns `None` when the padded length does not fit the 16-bit field.
#[inline]
pub fn encode_write_header(payload_len: usize) -> Option<[u8; SPI_HEADER_SIZE]> {
    let wire_len = u16::try_from(padded_len(payload_len)).ok()?;
    let [hi, lo] = wire_len.to_be_bytes();
    Some([OP_WRITE, hi, lo, 0, 0])
}

/// Parses an SPI header.
pub fn decode_header(bytes: &[u8]) -> Option<SpiHeader> {
    let header = bytes.get(..SPI_HEADER_SIZE)?;
    let direction = match header[0] {
        OP_WRITE => Direction::Write,
        OP_READ => Direction::Read,
        _ => return None,
    };

    Some(SpiHeader {
        direction,
        length: u16::from_be_bytes([header[1], header[2]]),
    })
}

/// Classifies an HCI packet (SPI header already stripped).
pub fn classify(packet: &[u8]) -> PacketKind {
    match packet.get(HCI_PACKET_TYPE_OFFSET).copied() {
        Some(HCI_TYPE_CMND) => PacketKind::Command,
        Some(HCI_TYPE_DATA) => PacketKind::Data,
        Some(HCI_TYPE_PATCH) => PacketKind::Patch,
        Some(HCI_TYPE_EVNT) => PacketKind::Event,
        Some(other) => PacketKind::Unknown(other),
        None => PacketKind::Unknown(0),
    }
}

/// Bytes still to clock in after the fixed read prefix.
///
/// Event frames carry a 1-byte length that already counts the status byte
/// held in the prefix, and are padded so the whole transfer is even. Data
/// frames carry a 16-bit length and are padded so the part after the SPI
/// header is even.
pub fn remaining_len(prefix: &[u8; READ_PREFIX_SIZE]) -> usize {
    let hci = &prefix[SPI_HEADER_SIZE..];

    match classify(hci) {
        PacketKind::Data => {
            let len = u16::from_le_bytes([
                hci[HCI_DATA_LENGTH_OFFSET],
                hci[HCI_DATA_LENGTH_OFFSET + 1],
            ]) as usize;
            if (READ_PREFIX_SIZE + len) % 2 == 0 {
                len + 1
            } else {
                len
            }
        }
        PacketKind::Event => {
            let len = (hci[HCI_EVENT_LENGTH_OFFSET] as usize).saturating_sub(1);
            if (READ_PREFIX_SIZE + len) % 2 == 1 {
                len + 1
            } else {
                len
            }
        }
        _ => 0,
    }
}

/// Parses an HCI event packet (SPI header already stripped).
pub fn parse_event(packet: &[u8]) -> Option<Event<'_>> {
    if packet.len() < HCI_HEADER_SIZE || classify(packet) != PacketKind::Event {
        return None;
    }

    let opcode = u16::from_le_bytes([
        packet[HCI_EVENT_OPCODE_OFFSET],
        packet[HCI_EVENT_OPCODE_OFFSET + 1],
    ]);
    let param_len = packet[HCI_EVENT_LENGTH_OFFSET] as usize;
    let end = (HCI_EVENT_STATUS_OFFSET + param_len)
        .min(packet.len())
        .max(HCI_HEADER_SIZE);

    Some(Event {
        opcode,
        status: packet[HCI_EVENT_STATUS_OFFSET],
        args: &packet[HCI_HEADER_SIZE..end],
    })
}
