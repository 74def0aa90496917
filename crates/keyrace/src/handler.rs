//! Per-connection adapter: two pumps joined by a bounded queue.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Assign a player id and enqueue `hello`
//!   2. Spawn the write pump (queue → socket, plus keepalive pings)
//!   3. Run the read pump (socket → decode → room operations)
//!   4. Clean up exactly once when the read pump ends, for any reason

use std::sync::Arc;

use keyrace_protocol::{
    ClientCommand, ClientEnvelope, Codec, CommandKind, PlayerId, RoomId,
    ServerEnvelope,
};
use keyrace_room::{
    OutboundReceiver, OutboundSender, Room, RoomError, new_player_id,
    outbound_queue,
};
use keyrace_transport::{Connection, Frame, WebSocketConnection};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::KeyraceError;
use crate::server::ServerState;

/// Display name until the client sends `set_name`.
pub const DEFAULT_PLAYER_NAME: &str = "Guest";

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), KeyraceError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let pid = new_player_id();

    let (outbound, rx) = outbound_queue(state.config.outbound_capacity);
    outbound.offer(ServerEnvelope::hello(pid.clone()));
    tracing::info!(%conn_id, %pid, "player connected");

    let mut writer = tokio::spawn(write_pump(Arc::clone(&conn), rx, Arc::clone(&state)));

    let mut adapter = Adapter {
        pid: pid.clone(),
        name: DEFAULT_PLAYER_NAME.to_owned(),
        room: None,
        outbound,
        state,
    };
    let ended = read_pump(&conn, &mut adapter, &mut writer).await;

    // Cleanup. Leaving the room drops the room's handle on our queue;
    // dropping the adapter drops the last one, which stops the writer.
    adapter.leave_room().await;
    drop(adapter);
    if !matches!(ended, Ok(ReadEnd::WriterStopped)) {
        let _ = writer.await;
    }
    let _ = conn.close().await;
    tracing::info!(%conn_id, %pid, "player disconnected");

    ended.map(|_| ())
}

// ---------------------------------------------------------------------------
// Pumps
// ---------------------------------------------------------------------------

enum ReadEnd {
    /// Client closed, deadline expired, or the socket failed.
    Closed,
    /// The write pump gave up first.
    WriterStopped,
}

/// Reads frames until the connection ends.
///
/// Only a pong extends the read deadline. An envelope that fails to
/// decode is returned as an error and ends the connection.
async fn read_pump<C: Codec>(
    conn: &WebSocketConnection,
    adapter: &mut Adapter<C>,
    writer: &mut JoinHandle<()>,
) -> Result<ReadEnd, KeyraceError> {
    let read_deadline = adapter.state.config.read_deadline;
    let mut deadline = Instant::now() + read_deadline;
    let pid = adapter.pid.clone();

    loop {
        let next = tokio::select! {
            next = tokio::time::timeout_at(deadline, conn.recv()) => next,
            _ = &mut *writer => return Ok(ReadEnd::WriterStopped),
        };

        let data = match next {
            Ok(Ok(Some(Frame::Data(data)))) => data,
            Ok(Ok(Some(Frame::Pong))) => {
                deadline = Instant::now() + read_deadline;
                continue;
            }
            Ok(Ok(None)) => {
                tracing::debug!(%pid, "connection closed by client");
                return Ok(ReadEnd::Closed);
            }
            Ok(Err(e)) => {
                tracing::debug!(%pid, error = %e, "recv error");
                return Ok(ReadEnd::Closed);
            }
            Err(_) => {
                tracing::info!(%pid, "read deadline expired");
                return Ok(ReadEnd::Closed);
            }
        };

        let envelope: ClientEnvelope = adapter.state.codec.decode(&data).inspect_err(|e| {
            tracing::debug!(%pid, error = %e, "malformed envelope, closing");
        })?;
        let (command, issues) = envelope.into_command();
        for issue in &issues {
            tracing::debug!(%pid, kind = %command.kind, %issue, "ignoring field");
        }

        let kind = command.kind.clone();
        if let Err(e) = adapter.dispatch(command).await {
            tracing::debug!(%pid, %kind, error = %e, "command had no effect");
        }
    }
}

/// Drains the outbound queue onto the socket and pings on a fixed timer.
///
/// Ends on the first failed or timed-out write. When the queue closes,
/// sends a close frame first.
async fn write_pump<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut rx: OutboundReceiver,
    state: Arc<ServerState<C>>,
) {
    let conn_id = conn.id();
    let write_deadline = state.config.write_deadline;
    let interval = state.config.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    let _ = tokio::time::timeout(write_deadline, conn.close()).await;
                    return;
                };
                let text = match state.codec.encode_text(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(%conn_id, error = %e, "failed to encode message");
                        continue;
                    }
                };
                match tokio::time::timeout(write_deadline, conn.send_text(&text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "write failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!(%conn_id, "write deadline exceeded");
                        return;
                    }
                }
            }
            _ = keepalive.tick() => {
                if !matches!(tokio::time::timeout(write_deadline, conn.ping()).await, Ok(Ok(()))) {
                    tracing::debug!(%conn_id, "keepalive ping failed");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// The player behind one connection, and the room it is in (if any).
///
/// `room` is only set after the room accepted us as a member and only
/// cleared after we were removed, so the two never disagree.
struct Adapter<C: Codec> {
    pid: PlayerId,
    name: String,
    room: Option<Arc<Room>>,
    outbound: OutboundSender,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Adapter<C> {
    /// Routes one command to the current room.
    ///
    /// Commands missing a field they need, or sent outside a room, do
    /// nothing. Room refusals are returned for logging only; the client
    /// never sees them.
    async fn dispatch(&mut self, cmd: ClientCommand) -> Result<(), RoomError> {
        match cmd.kind {
            CommandKind::SetName => {
                let Some(name) = cmd.name.filter(|n| !n.is_empty()) else {
                    return Ok(());
                };
                self.name = name;
                if let Some(room) = &self.room {
                    room.set_name(&self.pid, &self.name).await?;
                }
            }
            CommandKind::SetPromptMode => {
                if let (Some(room), Some(mode)) = (&self.room, cmd.prompt_mode) {
                    room.set_prompt_mode(&self.pid, mode).await?;
                }
            }
            CommandKind::CreateRoom => self.create_room().await,
            CommandKind::JoinRoom => self.join_room(cmd.rid).await,
            CommandKind::LeaveRoom => self.leave_room().await,
            CommandKind::Ready => {
                if let (Some(room), Some(ready)) = (&self.room, cmd.ready) {
                    room.set_ready(&self.pid, ready).await?;
                }
            }
            CommandKind::Progress => {
                if let (Some(room), Some(cursor), Some(mistakes)) =
                    (&self.room, cmd.cursor, cmd.mistakes)
                {
                    room.update_progress(&self.pid, cursor, mistakes).await?;
                    if cmd.finished == Some(true) {
                        room.finish(&self.pid).await?;
                    }
                }
            }
            CommandKind::Finish => {
                if let Some(room) = &self.room {
                    room.finish(&self.pid).await?;
                }
            }
            CommandKind::Unknown(kind) => {
                tracing::debug!(pid = %self.pid, %kind, "ignoring unknown command");
            }
        }
        Ok(())
    }

    async fn create_room(&mut self) {
        self.leave_room().await;
        let room = self
            .state
            .registry
            .create_room(self.pid.clone(), self.name.clone(), self.outbound.clone())
            .await;
        self.outbound.offer(ServerEnvelope::room_joined(room.id().clone()));
        self.room = Some(room);
    }

    /// Joins `rid`, leaving the current room first. Failures are reported
    /// to the client; the current room is kept if the target does not exist.
    async fn join_room(&mut self, rid: Option<RoomId>) {
        let Some(rid) = rid else {
            self.outbound.offer(ServerEnvelope::error("missing rid"));
            return;
        };
        if self.room.as_ref().is_some_and(|room| *room.id() == rid) {
            self.outbound.offer(ServerEnvelope::room_joined(rid));
            return;
        }
        if self.state.registry.get_room(&rid).await.is_none() {
            self.outbound.offer(ServerEnvelope::error("room not found"));
            return;
        }

        self.leave_room().await;
        match self
            .state
            .registry
            .join_room(&rid, self.pid.clone(), self.name.clone(), self.outbound.clone())
            .await
        {
            Ok(room) => {
                self.outbound.offer(ServerEnvelope::room_joined(room.id().clone()));
                self.room = Some(room);
            }
            Err(e) => {
                tracing::debug!(pid = %self.pid, %rid, error = %e, "join failed");
                self.outbound.offer(ServerEnvelope::error("room not found"));
            }
        }
    }

    /// Leaves the current room, if any, and lets the registry drop it
    /// when it is now empty.
    async fn leave_room(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        if let Err(e) = room.remove_member(&self.pid).await {
            tracing::debug!(pid = %self.pid, error = %e, "leave failed");
        }
        self.state.registry.maybe_delete_room(room.id()).await;
    }
}
