//! Unified error type for the Keyrace server.

use keyrace_protocol::ProtocolError;
use keyrace_room::RoomError;
use keyrace_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum KeyraceError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed envelope. Fatal to the connection that sent it.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room operation was refused (not found, not a member, wrong state).
    #[error(transparent)]
    Room(#[from] RoomError),
}
