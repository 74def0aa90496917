//! Room registry: creates rooms, finds them by id, and drops empty ones.
//!
//! The registry lock covers only the id → room map. Room operations run
//! under each room's own lock, so busy rooms never contend here.

use std::collections::HashMap;
use std::sync::Arc;

use keyrace_protocol::{PlayerId, RoomId};
use tokio::sync::Mutex;

use crate::ids::new_room_id;
use crate::{OutboundSender, Room, RoomConfig, RoomError};

/// Directory of every live room in the process.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    config: Arc<RoomConfig>,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            config: Arc::new(config),
        }
    }

    /// Creates a room in `Lobby` with `owner` as host and first member,
    /// then broadcasts its first snapshot.
    ///
    /// Ids are short; a freshly drawn id that is already taken is redrawn.
    pub async fn create_room(
        &self,
        owner: PlayerId,
        owner_name: String,
        outbound: OutboundSender,
    ) -> Arc<Room> {
        let room = {
            let mut rooms = self.rooms.lock().await;
            let mut rid = new_room_id();
            while rooms.contains_key(&rid) {
                tracing::debug!(%rid, "room id collision, redrawing");
                rid = new_room_id();
            }
            let room = Arc::new(Room::new(
                rid.clone(),
                Arc::clone(&self.config),
                owner.clone(),
                owner_name,
                outbound,
            ));
            rooms.insert(rid, Arc::clone(&room));
            room
        };

        tracing::info!(rid = %room.id(), host = %owner, "room created");
        room.broadcast_state().await;
        room
    }

    pub async fn get_room(&self, rid: &RoomId) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(rid).cloned()
    }

    /// Adds a player to an existing room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no such room is registered (or it was
    /// retired between lookup and join).
    pub async fn join_room(
        &self,
        rid: &RoomId,
        pid: PlayerId,
        name: String,
        outbound: OutboundSender,
    ) -> Result<Arc<Room>, RoomError> {
        let room = self
            .get_room(rid)
            .await
            .ok_or_else(|| RoomError::NotFound(rid.clone()))?;
        room.add_member(pid, name, outbound).await?;
        Ok(room)
    }

    /// Drops the room if it has no members. A no-op for unknown or
    /// non-empty rooms.
    pub async fn maybe_delete_room(&self, rid: &RoomId) {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(rid).cloned() else {
            return;
        };
        if room.retire_if_empty().await {
            rooms.remove(rid);
            drop(rooms);
            tracing::info!(%rid, "room deleted");
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
