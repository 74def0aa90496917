//! Identity, status, and server-to-client message types.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque player identifier, assigned by the server at connect time.
///
/// Ordered so snapshots can list players by ascending id.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque room identifier, shared out-of-band between players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle of a room.
///
/// ```text
/// Lobby → Countdown → Running → Finished
/// ```
///
/// `Finished` is terminal; a finished room lives until its last member
/// leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomStatus {
    Lobby,
    Countdown,
    Running,
    Finished,
}

impl RoomStatus {
    /// Returns the next state in the lifecycle, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Lobby => Some(Self::Countdown),
            Self::Countdown => Some(Self::Running),
            Self::Running => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` follows the lifecycle order.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::Countdown => write!(f, "COUNTDOWN"),
            Self::Running => write!(f, "RUNNING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// A player's status within the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerStatus {
    #[default]
    Lobby,
    Running,
    Finished,
}

/// Which word list clients draw the prompt from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Short,
    Medium,
    Long,
    Mixed,
}

impl PromptMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One player's entry in a room snapshot.
///
/// `acc` is a percentage (0–100); `wpm` and `acc` are rounded to two
/// decimals by the room before they get here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub pid: PlayerId,
    pub name: String,
    pub ready: bool,
    pub cursor: u64,
    pub mistakes: u64,
    pub wpm: f64,
    pub acc: f64,
    pub status: PlayerStatus,
}

/// Full room state, sent on every membership or status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub rid: RoomId,
    pub status: RoomStatus,
    pub prompt: String,
    /// Scheduled (or actual) start, Unix epoch milliseconds. 0 before the
    /// first countdown.
    pub start_at_ms: i64,
    pub prompt_mode: PromptMode,
    pub seed: u32,
    /// Sorted by ascending player id.
    pub players: Vec<PlayerSnapshot>,
}

/// Incremental update for one player, sent while the race is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    pub pid: PlayerId,
    pub cursor: u64,
    pub mistakes: u64,
    pub wpm: f64,
    pub acc: f64,
    pub status: PlayerStatus,
}

// ---------------------------------------------------------------------------
// Server → client envelope
// ---------------------------------------------------------------------------

/// The `type` tag of a server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    Hello,
    RoomJoined,
    RoomState,
    PlayerProgress,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloData {
    pub pid: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedData {
    pub rid: RoomId,
}

/// Payload carried in a server envelope's `data` field.
///
/// Untagged: the envelope's `type` says which shape to expect. Variant
/// order matters when decoding, widest shapes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerData {
    Room(RoomSnapshot),
    Progress(PlayerProgress),
    Joined(JoinedData),
    Hello(HelloData),
}

/// Everything the server ever sends: `{ type, rid?, data?, err? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    #[serde(rename = "type")]
    pub kind: ServerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ServerData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ServerEnvelope {
    /// Greeting sent once per connection, carrying the assigned player id.
    pub fn hello(pid: PlayerId) -> Self {
        Self {
            kind: ServerKind::Hello,
            rid: None,
            data: Some(ServerData::Hello(HelloData { pid })),
            err: None,
        }
    }

    /// Reply to a successful create or join.
    pub fn room_joined(rid: RoomId) -> Self {
        Self {
            kind: ServerKind::RoomJoined,
            rid: Some(rid.clone()),
            data: Some(ServerData::Joined(JoinedData { rid })),
            err: None,
        }
    }

    pub fn room_state(snapshot: RoomSnapshot) -> Self {
        Self {
            kind: ServerKind::RoomState,
            rid: Some(snapshot.rid.clone()),
            data: Some(ServerData::Room(snapshot)),
            err: None,
        }
    }

    pub fn player_progress(rid: RoomId, progress: PlayerProgress) -> Self {
        Self {
            kind: ServerKind::PlayerProgress,
            rid: Some(rid),
            data: Some(ServerData::Progress(progress)),
            err: None,
        }
    }

    /// A user-facing failure with a human-readable reason.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ServerKind::Error,
            rid: None,
            data: None,
            err: Some(message.into()),
        }
    }

    /// Returns the snapshot if this is a `room_state` message.
    pub fn as_room_state(&self) -> Option<&RoomSnapshot> {
        match &self.data {
            Some(ServerData::Room(snapshot)) => Some(snapshot),
            _ => None,
        }
    }

    /// Returns the update if this is a `player_progress` message.
    pub fn as_player_progress(&self) -> Option<&PlayerProgress> {
        match &self.data {
            Some(ServerData::Progress(progress)) => Some(progress),
            _ => None,
        }
    }
}
