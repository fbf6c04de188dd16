//! 32-bit wrapping sequence numbers and the absolute 64-bit index they hide.
//!
//! The wire only ever carries a `u32` sequence number, which wraps around
//! every 2^32 bytes. Internally every component reasons in 64-bit absolute
//! indices (bytes of sequence space since the direction's SYN) so that
//! arithmetic never has to worry about wraparound. [`wrap`] and [`unwrap`]
//! are the only two functions that cross that boundary.

use std::fmt;

/// A 32-bit sequence number as carried on the wire, tagged so it can't
/// accidentally be compared or added like a plain `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrappingInt32(u32);

impl WrappingInt32 {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw_value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WrappingInt32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u32> for WrappingInt32 {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl std::ops::Sub<u32> for WrappingInt32 {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self {
        Self(self.0.wrapping_sub(rhs))
    }
}

/// Converts an absolute 64-bit sequence-space index into its wire
/// representation, given the direction's initial sequence number.
pub fn wrap(n: u64, isn: WrappingInt32) -> WrappingInt32 {
    WrappingInt32((n as u32).wrapping_add(isn.raw_value()))
}

/// Converts a wire sequence number back into the absolute 64-bit index
/// closest to `checkpoint`, breaking ties toward the smaller index.
///
/// `checkpoint` should be the most recent absolute index the caller knows
/// about (e.g. the receiver's own `base`, never a value shared across
/// connections) so that the unwrapped result tracks the true position in
/// the stream rather than an arbitrary one of the infinitely many 64-bit
/// values that wrap to the same 32 bits.
pub fn unwrap(n: WrappingInt32, isn: WrappingInt32, checkpoint: u64) -> u64 {
    let offset = n.raw_value().wrapping_sub(isn.raw_value()) as u64;
    let high = checkpoint & 0xFFFF_FFFF_0000_0000;
    let t = high | offset;

    let mut best = t;
    let mut best_dist = abs_diff(t, checkpoint);

    if let Some(candidate) = t.checked_add(1u64 << 32) {
        let dist = abs_diff(candidate, checkpoint);
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }

    if t >= (1u64 << 32) {
        let candidate = t - (1u64 << 32);
        let dist = abs_diff(candidate, checkpoint);
        if dist < best_dist {
            best = candidate;
        }
    }

    best
}

fn abs_diff(a: u64, b: u64) -> u64 {
    a.max(b) - a.min(b)
}
