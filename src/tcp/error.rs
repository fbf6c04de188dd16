//! Construction-time errors. The protocol state machine itself never
//! raises one of these — rejection there is reported through booleans and
//! flags (see the crate-level docs) so that a misbehaving peer can never
//! unwind the owner's stack.

/// Fallible paths introduced by the ambient configuration/CLI surface, not
/// by the core state machine.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be non-zero")]
    ZeroCapacity,
}
