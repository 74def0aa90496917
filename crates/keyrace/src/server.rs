//! `KeyraceServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → room.

use std::sync::Arc;

use keyrace_protocol::{Codec, JsonCodec};
use keyrace_room::{RoomConfig, RoomRegistry};
use keyrace_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{ConnectionConfig, KeyraceError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) config: ConnectionConfig,
}

/// Builder for configuring and starting a Keyrace server.
///
/// # Example
///
/// ```rust,no_run
/// use keyrace::prelude::*;
///
/// # async fn run() -> Result<(), KeyraceError> {
/// let server = KeyraceServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct KeyraceServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    connection_config: ConnectionConfig,
}

impl KeyraceServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            connection_config: ConnectionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets countdown timing and defaults for every room.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets deadlines and queue size for every connection.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }

    /// Binds the listener. Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build(self) -> Result<KeyraceServer<JsonCodec>, KeyraceError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(RoomRegistry::new(self.room_config)),
            codec: JsonCodec,
            config: self.connection_config,
        });

        Ok(KeyraceServer { transport, state })
    }
}

impl Default for KeyraceServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Keyrace server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct KeyraceServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl KeyraceServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> KeyraceServerBuilder {
        KeyraceServerBuilder::new()
    }
}

impl<C: Codec> KeyraceServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room registry, for inspection.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop, spawning one handler task per connection.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), KeyraceError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "keyrace server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
