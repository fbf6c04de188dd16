//! Readiness flags an owner can poll (or wake a blocked reader/writer on)
//! without reaching into connection internals.

use bitflags::bitflags;

bitflags! {
    /// Which directions of a connection currently have work for the owner.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Available: u8 {
        /// The inbound stream has bytes to read, or has reached EOF.
        const READ = 0b01;
        /// The outbound stream has room to accept more writes.
        const WRITE = 0b10;
    }
}

/// The RFC-793 state names, derived on demand from the sender/receiver
/// flags rather than stored directly (see [`crate::tcp::connection`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listen,
    SynRcvd,
    SynSent,
    Established,
    CloseWait,
    LastAck,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    Closed,
    Reset,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Listen => "LISTEN",
            ConnectionState::SynRcvd => "SYN_RCVD",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::FinWait1 => "FIN_WAIT_1",
            ConnectionState::FinWait2 => "FIN_WAIT_2",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Reset => "RESET",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
