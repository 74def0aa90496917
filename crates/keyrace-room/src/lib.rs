//! Room lifecycle for Keyrace typing races.
//!
//! # Key types
//!
//! - [`Room`] — one race: membership, progress, and the
//!   `Lobby → Countdown → Running → Finished` state machine
//! - [`RoomRegistry`] — creates rooms, looks them up, drops empty ones
//! - [`OutboundSender`] — a member's bounded, never-blocking queue
//! - [`RoomConfig`] — countdown timing, thresholds, prompt defaults

mod config;
mod error;
mod ids;
mod queue;
mod registry;
mod room;
pub mod stats;

pub use config::RoomConfig;
pub use error::RoomError;
pub use ids::{new_player_id, new_room_id};
pub use queue::{
    DEFAULT_OUTBOUND_CAPACITY, OutboundReceiver, OutboundSender, outbound_queue,
};
pub use registry::RoomRegistry;
pub use room::Room;
