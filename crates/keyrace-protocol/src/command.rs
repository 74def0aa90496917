//! Client → server envelope and lenient command decoding.
//!
//! Only the outer envelope can fail to decode. Every payload field is
//! read on its own: a field that is missing counts as not provided, and
//! so does a field with the wrong shape. The second case is recorded as a
//! [`FieldIssue`] so the server can log it without telling the client.

use std::fmt;

use serde::Deserialize;
use serde::de::IgnoredAny;

use crate::{PromptMode, RoomId};

/// A field value that either parsed as `T` or was something else.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Invalid(IgnoredAny),
}

/// Payload fields. Every one is optional on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    name: Option<Lenient<String>>,
    ready: Option<Lenient<bool>>,
    cursor: Option<Lenient<i64>>,
    mistakes: Option<Lenient<i64>>,
    finished: Option<Lenient<bool>>,
    prompt_mode: Option<Lenient<PromptMode>>,
}

/// The raw inbound frame: `{ type, rid?, data? }`.
///
/// Payload fields may also sit next to `type` instead of inside `data`;
/// they are only consulted when `data` is absent or unusable.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type", default)]
    kind: String,
    rid: Option<Lenient<String>>,
    data: Option<Lenient<RawPayload>>,
    #[serde(flatten)]
    inline: RawPayload,
}

/// The command named by an envelope's `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    SetName,
    SetPromptMode,
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    Ready,
    Progress,
    Finish,
    Unknown(String),
}

impl From<&str> for CommandKind {
    fn from(s: &str) -> Self {
        match s {
            "set_name" => Self::SetName,
            "set_prompt_mode" => Self::SetPromptMode,
            "create_room" => Self::CreateRoom,
            "join_room" => Self::JoinRoom,
            "leave_room" => Self::LeaveRoom,
            "ready" => Self::Ready,
            "progress" => Self::Progress,
            "finish" => Self::Finish,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SetName => "set_name",
            Self::SetPromptMode => "set_prompt_mode",
            Self::CreateRoom => "create_room",
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::Ready => "ready",
            Self::Progress => "progress",
            Self::Finish => "finish",
            Self::Unknown(other) => other,
        };
        f.write_str(s)
    }
}

/// A decoded client command. `None` means "not provided".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    pub kind: CommandKind,
    pub rid: Option<RoomId>,
    pub name: Option<String>,
    pub ready: Option<bool>,
    pub cursor: Option<i64>,
    pub mistakes: Option<i64>,
    pub finished: Option<bool>,
    pub prompt_mode: Option<PromptMode>,
}

/// A payload field that was present but could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: &'static str,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed `{}`", self.field)
    }
}

/// Unwraps one lenient field, noting it in `issues` if it was malformed.
fn take<T>(
    field: &'static str,
    value: Option<Lenient<T>>,
    issues: &mut Vec<FieldIssue>,
) -> Option<T> {
    match value {
        Some(Lenient::Valid(v)) => Some(v),
        Some(Lenient::Invalid(_)) => {
            issues.push(FieldIssue { field });
            None
        }
        None => None,
    }
}

impl ClientEnvelope {
    /// Resolves the envelope into a typed command plus any field issues.
    pub fn into_command(self) -> (ClientCommand, Vec<FieldIssue>) {
        let mut issues = Vec::new();

        let rid = take("rid", self.rid, &mut issues)
            .filter(|s| !s.is_empty())
            .map(RoomId);
        let payload = take("data", self.data, &mut issues).unwrap_or(self.inline);

        let command = ClientCommand {
            kind: CommandKind::from(self.kind.as_str()),
            rid,
            name: take("name", payload.name, &mut issues),
            ready: take("ready", payload.ready, &mut issues),
            cursor: take("cursor", payload.cursor, &mut issues),
            mistakes: take("mistakes", payload.mistakes, &mut issues),
            finished: take("finished", payload.finished, &mut issues),
            prompt_mode: take("promptMode", payload.prompt_mode, &mut issues),
        };
        (command, issues)
    }
}
