//! # Keyrace
//!
//! Real-time multiplayer typing-race server.
//!
//! Clients connect over WebSocket, gather in rooms, ready up, and race
//! through a synchronized countdown while the server streams everyone's
//! progress.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyrace::prelude::*;
//!
//! # async fn run() -> Result<(), KeyraceError> {
//! let server = KeyraceServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ConnectionConfig;
pub use error::KeyraceError;
pub use handler::DEFAULT_PLAYER_NAME;
pub use server::{KeyraceServer, KeyraceServerBuilder};

pub use keyrace_protocol as protocol;
pub use keyrace_room as room;
pub use keyrace_transport as transport;

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{
        ConnectionConfig, KeyraceError, KeyraceServer, KeyraceServerBuilder,
    };
    pub use keyrace_protocol::{PromptMode, RoomStatus};
    pub use keyrace_room::RoomConfig;
}
