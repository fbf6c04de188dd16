//! A user-space TCP endpoint: reassembly, sliding-window send/retransmit,
//! and the connection state machine, driven by an external segment source.
//!
//! This crate does not open sockets, parse IP headers, or compute
//! checksums — it consumes parsed [`TcpSegment`]s and produces more of
//! them. Framing those onto (or off of) a real datagram is the owner's
//! job; see `demos/loopback.rs` for a minimal example pairing two
//! connections over an in-process channel.
//!
//! The core never panics or returns `Result` on a misbehaving peer:
//! rejection is reported through booleans and the [`tcp::Available`]
//! flags, so a hostile or buggy remote can never unwind the owner's
//! stack. Construction-time misconfiguration (e.g. [`tcp::TcpConfig`]
//! with a zero capacity) is the one place this crate uses
//! [`tcp::ConfigError`].

mod tcp;

pub use tcp::{
    connection::TcpConnection,
    error::ConfigError,
    segment::{TcpHeader, TcpSegment},
    state::{Available, ConnectionState},
    wrap::WrappingInt32,
    TcpConfig,
};
