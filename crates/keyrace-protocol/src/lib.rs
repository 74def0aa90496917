//! Wire protocol for Keyrace.
//!
//! - **Types** ([`ServerEnvelope`], [`RoomSnapshot`], [`PlayerId`], …) —
//!   what the server sends and the identities it talks about.
//! - **Commands** ([`ClientEnvelope`], [`ClientCommand`]) — what clients
//!   send, decoded field by field.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — bytes in, bytes out.
//! - **Errors** ([`ProtocolError`]) — envelope-level decode failures.
//!
//! ```text
//! Transport (frames) → Protocol (envelopes) → Room (operations)
//! ```

mod codec;
mod command;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use command::{ClientCommand, ClientEnvelope, CommandKind, FieldIssue};
pub use error::ProtocolError;
pub use types::{
    HelloData, JoinedData, PlayerId, PlayerProgress, PlayerSnapshot,
    PlayerStatus, PromptMode, RoomId, RoomSnapshot, RoomStatus, ServerData,
    ServerEnvelope, ServerKind,
};
