//! The wire-level segment: header fields plus payload, with no concept of
//! checksums, IP addressing, or options. Framing those bytes onto (or off
//! of) a real datagram is the owner's job, not this crate's.

use bytes::Bytes;

use crate::tcp::wrap::WrappingInt32;

/// TCP header fields relevant to this endpoint. Flags are plain booleans;
/// there is exactly one kind of segment, not a hierarchy of kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub seqno: WrappingInt32,
    pub ackno: WrappingInt32,
    pub win: u16,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl Default for TcpHeader {
    fn default() -> Self {
        Self {
            seqno: WrappingInt32::new(0),
            ackno: WrappingInt32::new(0),
            win: 0,
            syn: false,
            ack: false,
            fin: false,
            rst: false,
        }
    }
}

/// A TCP header plus its payload.
#[derive(Debug, Clone, Default)]
pub struct TcpSegment {
    pub header: TcpHeader,
    pub payload: Bytes,
}

impl TcpSegment {
    pub fn new(header: TcpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// How many sequence numbers this segment consumes: SYN + payload + FIN.
    pub fn length_in_sequence_space(&self) -> usize {
        self.header.syn as usize + self.payload.len() + self.header.fin as usize
    }
}
