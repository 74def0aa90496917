//! Error types for the room layer.

use keyrace_protocol::{PlayerId, RoomId, RoomStatus};

/// Why a room or registry operation had no effect.
///
/// Apart from [`RoomError::NotFound`] on join, none of these reach the
/// client; the connection adapter logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (or was just retired).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The room's status doesn't allow this operation.
    #[error("operation not allowed while room is {0}")]
    InvalidState(RoomStatus),

    /// Only the host may do this.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),
}
