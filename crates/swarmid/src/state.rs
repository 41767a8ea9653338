//! The fixed-layout node-state record shared by disk and wire.
//!
//! The record is 18 bytes, little-endian:
//!
//! - Bytes 0-7: high-water timestamp in milliseconds (u64 LE)
//! - Bytes 8-9: node id (u16 LE)
//! - Bytes 10-11: UDP port of the node's sending socket (u16 LE)
//! - Bytes 12-15: IPv4 address, host byte order (u32 LE)
//! - Bytes 16-17: message mode, two ASCII bytes
//!
//! The same bytes are stored in the per-node state file and sent as the
//! payload of every coordination datagram.

use std::net::{Ipv4Addr, SocketAddrV4};

/// Exact encoded size of a [`NodeState`] record.
pub const STATE_WIRE_SIZE: usize = 18;

/// Coordination message kind, carried as two ASCII bytes in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// "UP": the sender is live and announcing its latest state.
    Up,
    /// "RQ": the sender asks peers for their stored view of a node id.
    Request,
    /// "HW": a high-water timestamp hint for the node id in the record.
    HighWater,
}

impl Mode {
    pub const fn as_wire(self) -> [u8; 2] {
        match self {
            Mode::Up => *b"UP",
            Mode::Request => *b"RQ",
            Mode::HighWater => *b"HW",
        }
    }

    /// Decodes a mode code. Unknown codes (including the all-zero bytes of a
    /// never-written record) yield `None` and are ignored by the handler.
    pub const fn from_wire(bytes: [u8; 2]) -> Option<Self> {
        match &bytes {
            b"UP" => Some(Mode::Up),
            b"RQ" => Some(Mode::Request),
            b"HW" => Some(Mode::HighWater),
            _ => None,
        }
    }
}

/// Last known state of one node, as persisted and as sent to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeState {
    /// High-water timestamp in milliseconds. Zero means never initialized.
    pub timestamp: u64,
    /// Node id (0..1024).
    pub id: u16,
    /// UDP port of the node's sending socket.
    pub port: u16,
    /// IPv4 address in host byte order.
    pub ipaddr: u32,
    mode: [u8; 2],
}

impl NodeState {
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_wire(self.mode)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode.as_wire();
    }

    pub fn set_addr(&mut self, addr: SocketAddrV4) {
        self.ipaddr = u32::from(*addr.ip());
        self.port = addr.port();
    }

    pub fn addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ipaddr), self.port)
    }

    pub fn to_bytes(&self) -> [u8; STATE_WIRE_SIZE] {
        let mut buf = [0u8; STATE_WIRE_SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..10].copy_from_slice(&self.id.to_le_bytes());
        buf[10..12].copy_from_slice(&self.port.to_le_bytes());
        buf[12..16].copy_from_slice(&self.ipaddr.to_le_bytes());
        buf[16..18].copy_from_slice(&self.mode);
        buf
    }

    pub fn from_bytes(buf: &[u8; STATE_WIRE_SIZE]) -> Self {
        Self {
            timestamp: u64::from_le_bytes(buf[0..8].try_into().expect("8-byte slice")),
            id: u16::from_le_bytes(buf[8..10].try_into().expect("2-byte slice")),
            port: u16::from_le_bytes(buf[10..12].try_into().expect("2-byte slice")),
            ipaddr: u32::from_le_bytes(buf[12..16].try_into().expect("4-byte slice")),
            mode: [buf[16], buf[17]],
        }
    }
}
