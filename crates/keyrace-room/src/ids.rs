//! Random identifiers for rooms and players.

use keyrace_protocol::{PlayerId, RoomId};
use rand::Rng;

/// Bytes of randomness in a room id (8 hex chars, easy to share).
const ROOM_ID_BYTES: usize = 4;

/// Bytes of randomness in a player id.
const PLAYER_ID_BYTES: usize = 8;

fn random_hex<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn new_room_id() -> RoomId {
    RoomId(random_hex::<ROOM_ID_BYTES>())
}

pub fn new_player_id() -> PlayerId {
    PlayerId(random_hex::<PLAYER_ID_BYTES>())
}
