//! Construction-time configuration for a [`crate::tcp::connection::TcpConnection`].

use rand::RngCore;

use crate::tcp::error::ConfigError;
use crate::tcp::wrap::WrappingInt32;

pub const DEFAULT_CAPACITY: usize = 64 * 1024;
pub const DEFAULT_RT_TIMEOUT: u32 = 1000;
pub const MAX_PAYLOAD_SIZE: usize = 1452;
pub const MAX_RETX_ATTEMPTS: u32 = 8;
pub const LINGER_MULTIPLIER: u32 = 10;

/// Knobs recognized by the endpoint. Anything not listed here (congestion
/// control, SACK, timestamps, options) is out of scope by design.
#[derive(Debug, Clone, Copy)]
pub struct TcpConfig {
    pub recv_capacity: usize,
    pub send_capacity: usize,
    pub rt_timeout: u32,
    pub fixed_isn: Option<WrappingInt32>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            recv_capacity: DEFAULT_CAPACITY,
            send_capacity: DEFAULT_CAPACITY,
            rt_timeout: DEFAULT_RT_TIMEOUT,
            fixed_isn: None,
        }
    }
}

impl TcpConfig {
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.recv_capacity == 0 || self.send_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(self)
    }

    /// The ISN to use: `fixed_isn` if set, otherwise drawn from a
    /// non-reproducible source (mirroring the reference implementation's
    /// `random_device`-seeded ISN).
    pub fn isn(&self) -> WrappingInt32 {
        self.fixed_isn
            .unwrap_or_else(|| WrappingInt32::new(rand::thread_rng().next_u32()))
    }
}
