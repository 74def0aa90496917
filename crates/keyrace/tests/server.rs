//! End-to-end tests: a real server on a random port, driven by
//! WebSocket clients speaking the JSON wire protocol.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use keyrace::prelude::*;
use keyrace::room::RoomRegistry;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port; returns its address and registry.
async fn start_server_with(room_config: RoomConfig) -> (String, Arc<RoomRegistry>) {
    start_server_full(room_config, ConnectionConfig::default()).await
}

async fn start_server_full(
    room_config: RoomConfig,
    connection_config: ConnectionConfig,
) -> (String, Arc<RoomRegistry>) {
    let server = KeyraceServer::builder()
        .bind("127.0.0.1:0")
        .room_config(room_config)
        .connection_config(connection_config)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let registry = server.registry();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, registry)
}

async fn start_server() -> (String, Arc<RoomRegistry>) {
    start_server_with(RoomConfig::default()).await
}

/// A room config with a countdown short enough for quick races.
fn quick_rooms() -> RoomConfig {
    RoomConfig {
        countdown: Duration::from_millis(200),
        ..RoomConfig::default()
    }
}

/// Connection timing short enough to watch the read deadline expire.
fn quick_deadlines() -> ConnectionConfig {
    ConnectionConfig {
        read_deadline: Duration::from_millis(300),
        keepalive_interval: Duration::from_millis(100),
        ..ConnectionConfig::default()
    }
}

/// Reads (answering pings) for `duration`. Panics if the server closes
/// the connection or sends a text message.
async fn keep_reading(ws: &mut ClientWs, duration: Duration) {
    let until = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < until {
        match tokio::time::timeout(Duration::from_millis(20), ws.next()).await {
            Err(_) | Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("connection should stay open, got {other:?}"),
        }
        // Pongs are queued by the read side; push them out.
        ws.flush().await.expect("flush");
    }
}

/// Connects and consumes the greeting. Returns the socket and player id.
async fn connect(addr: &str) -> (ClientWs, String) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    let hello = recv(&mut ws).await;
    assert_eq!(hello["type"], "hello", "first message must be hello");
    let pid = hello["data"]["pid"].as_str().expect("pid").to_owned();
    (ws, pid)
}

async fn send(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Next server message as JSON. Panics after 5 s of silence.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("recv error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

/// Skips messages until one satisfies `pred`.
async fn recv_until(ws: &mut ClientWs, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let msg = recv(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
}

async fn recv_type(ws: &mut ClientWs, kind: &str) -> Value {
    recv_until(ws, |m| m["type"] == kind).await
}

async fn recv_status(ws: &mut ClientWs, status: &str) -> Value {
    recv_until(ws, |m| m["type"] == "room_state" && m["data"]["status"] == status).await
}

/// Creates a room from `ws` and returns its id.
async fn create_room(ws: &mut ClientWs) -> String {
    send(ws, json!({"type": "create_room"})).await;
    let joined = recv_type(ws, "room_joined").await;
    joined["rid"].as_str().expect("rid").to_owned()
}

async fn join_room(ws: &mut ClientWs, rid: &str) {
    send(ws, json!({"type": "join_room", "rid": rid})).await;
    let joined = recv_type(ws, "room_joined").await;
    assert_eq!(joined["data"]["rid"], rid);
}

fn player<'a>(state: &'a Value, pid: &str) -> &'a Value {
    state["data"]["players"]
        .as_array()
        .expect("players")
        .iter()
        .find(|p| p["pid"] == pid)
        .expect("player in snapshot")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_millis() as i64
}

fn has_two_decimals(x: f64) -> bool {
    ((x * 100.0) - (x * 100.0).round()).abs() < 1e-6
}

/// Polls until the registry holds `n` rooms, or panics after 2 s.
async fn wait_for_room_count(registry: &RoomRegistry, n: usize) {
    for _ in 0..200 {
        if registry.room_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {n} rooms");
}

// =========================================================================
// Connection
// =========================================================================

#[tokio::test]
async fn test_hello_carries_player_id() {
    let (addr, _) = start_server().await;
    let (_ws1, pid1) = connect(&addr).await;
    let (_ws2, pid2) = connect(&addr).await;

    assert_eq!(pid1.len(), 16);
    assert!(pid1.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(pid1, pid2);
}

#[tokio::test]
async fn test_malformed_envelope_closes_connection() {
    let (addr, _) = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    ws.send(Message::Text("not json".into())).await.expect("send");

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(Message::Text(text))) => panic!("unexpected reply: {text}"),
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("server should close the connection");
    assert!(closed);
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let (addr, _) = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, json!({"type": "restart_round"})).await;
    send(&mut ws, json!({"type": "ready", "data": {"ready": true}})).await;
    let rid = create_room(&mut ws).await;
    assert_eq!(rid.len(), 8);
}

#[tokio::test]
async fn test_malformed_field_is_ignored() {
    let (addr, _) = start_server().await;
    let (mut ws, pid) = connect(&addr).await;
    create_room(&mut ws).await;

    send(&mut ws, json!({"type": "set_name", "data": {"name": 42}})).await;
    send(&mut ws, json!({"type": "set_name", "data": {"name": "Ada"}})).await;
    let state = recv_until(&mut ws, |m| {
        m["type"] == "room_state" && m["data"]["players"][0]["name"] != "Guest"
    })
    .await;
    assert_eq!(player(&state, &pid)["name"], "Ada");
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_create_room_registers_room() {
    let (addr, registry) = start_server().await;
    let (mut ws, pid) = connect(&addr).await;

    send(&mut ws, json!({"type": "create_room"})).await;
    let state = recv_type(&mut ws, "room_state").await;
    assert_eq!(state["data"]["status"], "LOBBY");
    assert_eq!(state["data"]["promptMode"], "short");
    assert_eq!(player(&state, &pid)["name"], "Guest");
    assert_eq!(player(&state, &pid)["acc"], 100.0);

    let joined = recv_type(&mut ws, "room_joined").await;
    assert_eq!(joined["rid"], state["rid"]);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_join_room_missing_rid() {
    let (addr, _) = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, json!({"type": "join_room"})).await;
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["err"], "missing rid");
}

#[tokio::test]
async fn test_join_room_numeric_rid_is_missing() {
    let (addr, _) = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, json!({"type": "join_room", "rid": 5})).await;
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["err"], "missing rid");

    // A malformed field is not fatal.
    create_room(&mut ws).await;
}

#[tokio::test]
async fn test_join_room_unknown_rid() {
    let (addr, _) = start_server().await;
    let (mut ws, _) = connect(&addr).await;

    send(&mut ws, json!({"type": "join_room", "rid": "deadbeef"})).await;
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["err"], "room not found");

    // The connection survives a user-facing failure.
    create_room(&mut ws).await;
}

#[tokio::test]
async fn test_join_room_broadcasts_membership() {
    let (addr, _) = start_server().await;
    let (mut a, pid_a) = connect(&addr).await;
    let (mut b, pid_b) = connect(&addr).await;

    send(&mut b, json!({"type": "set_name", "data": {"name": "Bea"}})).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;

    let state = recv_until(&mut a, |m| {
        m["type"] == "room_state" && m["data"]["players"].as_array().is_some_and(|p| p.len() == 2)
    })
    .await;
    assert_eq!(player(&state, &pid_b)["name"], "Bea");

    let pids: Vec<&str> = state["data"]["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["pid"].as_str().unwrap())
        .collect();
    let mut sorted = vec![pid_a.as_str(), pid_b.as_str()];
    sorted.sort();
    assert_eq!(pids, sorted);
}

#[tokio::test]
async fn test_leave_room_updates_remaining_members() {
    let (addr, registry) = start_server().await;
    let (mut a, _) = connect(&addr).await;
    let (mut b, pid_b) = connect(&addr).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;

    send(&mut b, json!({"type": "leave_room"})).await;
    let state = recv_until(&mut a, |m| {
        m["type"] == "room_state" && m["data"]["players"].as_array().is_some_and(|p| p.len() == 1)
    })
    .await;
    assert!(state["data"]["players"][0]["pid"] != pid_b);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_create_while_in_room_leaves_old_room() {
    let (addr, registry) = start_server().await;
    let (mut a, _) = connect(&addr).await;
    let (mut b, pid_b) = connect(&addr).await;
    let first = create_room(&mut a).await;
    join_room(&mut b, &first).await;

    let second = create_room(&mut a).await;
    assert_ne!(first, second);

    let state = recv_until(&mut b, |m| {
        m["type"] == "room_state" && m["data"]["players"].as_array().is_some_and(|p| p.len() == 1)
    })
    .await;
    assert_eq!(state["data"]["players"][0]["pid"], pid_b);
    assert_eq!(registry.room_count().await, 2);
}

#[tokio::test]
async fn test_disconnect_deletes_empty_room() {
    let (addr, registry) = start_server().await;
    let (mut ws, _) = connect(&addr).await;
    create_room(&mut ws).await;
    assert_eq!(registry.room_count().await, 1);

    ws.close(None).await.expect("close");
    wait_for_room_count(&registry, 0).await;
}

#[tokio::test]
async fn test_set_prompt_mode_host_only() {
    let (addr, _) = start_server().await;
    let (mut host, _) = connect(&addr).await;
    let (mut guest, _) = connect(&addr).await;
    let rid = create_room(&mut host).await;
    join_room(&mut guest, &rid).await;

    send(&mut guest, json!({"type": "set_prompt_mode", "data": {"promptMode": "mixed"}})).await;
    send(&mut host, json!({"type": "set_prompt_mode", "data": {"promptMode": "long"}})).await;

    let state = recv_until(&mut guest, |m| {
        m["type"] == "room_state" && m["data"]["promptMode"] != "short"
    })
    .await;
    assert_eq!(state["data"]["promptMode"], "long");
}

// =========================================================================
// Races
// =========================================================================

#[tokio::test]
async fn test_single_ready_player_stays_in_lobby() {
    let (addr, _) = start_server_with(quick_rooms()).await;
    let (mut ws, _) = connect(&addr).await;
    create_room(&mut ws).await;

    send(&mut ws, json!({"type": "ready", "data": {"ready": true}})).await;
    let state = recv_type(&mut ws, "room_state").await;
    assert_eq!(state["data"]["status"], "LOBBY");

    // Nothing else should arrive: no countdown for one player.
    let quiet = tokio::time::timeout(Duration::from_millis(400), ws.next()).await;
    assert!(quiet.is_err() || !matches!(quiet, Ok(Some(Ok(Message::Text(_))))));
}

#[tokio::test]
async fn test_full_race() {
    let (addr, _) = start_server().await;
    let (mut a, pid_a) = connect(&addr).await;
    let (mut b, pid_b) = connect(&addr).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;

    send(&mut a, json!({"type": "ready", "data": {"ready": true}})).await;
    let before = now_ms();
    send(&mut b, json!({"type": "ready", "data": {"ready": true}})).await;

    let countdown = recv_status(&mut a, "COUNTDOWN").await;
    let ahead = countdown["data"]["startAtMs"].as_i64().unwrap() - before;
    assert!((2500..=3500).contains(&ahead), "start should be ≈3000 ms ahead, got {ahead}");
    assert_eq!(countdown["data"]["prompt"], "");
    assert!(countdown["data"]["seed"].is_u64());
    assert_eq!(player(&countdown, &pid_a)["ready"], false);

    recv_status(&mut a, "RUNNING").await;
    let running = recv_status(&mut b, "RUNNING").await;
    assert_eq!(player(&running, &pid_a)["status"], "RUNNING");
    assert!(now_ms() >= countdown["data"]["startAtMs"].as_i64().unwrap() - 50);

    tokio::time::sleep(Duration::from_millis(300)).await;
    send(&mut a, json!({"type": "progress", "data": {"cursor": 20, "mistakes": 2}})).await;
    let progress = recv_type(&mut b, "player_progress").await;
    assert_eq!(progress["rid"], rid);
    assert_eq!(progress["data"]["pid"], pid_a);
    assert_eq!(progress["data"]["cursor"], 20);
    assert_eq!(progress["data"]["acc"], 90.91);

    send(&mut b, json!({"type": "progress", "data": {"cursor": 30, "mistakes": 0}})).await;
    send(&mut a, json!({"type": "finish"})).await;
    send(&mut b, json!({"type": "finish"})).await;

    let finished = recv_status(&mut a, "FINISHED").await;
    let pa = player(&finished, &pid_a);
    let pb = player(&finished, &pid_b);
    assert_eq!(pa["status"], "FINISHED");
    assert_eq!(pb["status"], "FINISHED");
    assert_eq!((pa["cursor"].as_u64(), pa["mistakes"].as_u64()), (Some(20), Some(2)));
    assert_eq!((pb["cursor"].as_u64(), pb["mistakes"].as_u64()), (Some(30), Some(0)));
    assert_eq!(pa["acc"], 90.91);
    assert_eq!(pb["acc"], 100.0);
    for p in [pa, pb] {
        let wpm = p["wpm"].as_f64().unwrap();
        assert!(wpm > 0.0);
        assert!(has_two_decimals(wpm), "wpm not rounded: {wpm}");
    }
}

#[tokio::test]
async fn test_progress_with_finished_flag_finishes_player() {
    let (addr, _) = start_server_with(quick_rooms()).await;
    let (mut a, pid_a) = connect(&addr).await;
    let (mut b, _) = connect(&addr).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;
    send(&mut a, json!({"type": "ready", "data": {"ready": true}})).await;
    send(&mut b, json!({"type": "ready", "data": {"ready": true}})).await;
    recv_status(&mut a, "RUNNING").await;

    send(
        &mut a,
        json!({"type": "progress", "data": {"cursor": 44, "mistakes": 0, "finished": true}}),
    )
    .await;
    let state = recv_until(&mut b, |m| {
        m["type"] == "room_state" && m["data"]["players"].as_array().is_some_and(|ps| {
            ps.iter().any(|p| p["pid"] == pid_a.as_str() && p["status"] == "FINISHED")
        })
    })
    .await;
    assert_eq!(player(&state, &pid_a)["cursor"], 44);
    assert_eq!(state["data"]["status"], "RUNNING");
}

#[tokio::test]
async fn test_progress_missing_mistakes_is_ignored() {
    let (addr, _) = start_server_with(quick_rooms()).await;
    let (mut a, pid_a) = connect(&addr).await;
    let (mut b, _) = connect(&addr).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;
    send(&mut a, json!({"type": "ready", "data": {"ready": true}})).await;
    send(&mut b, json!({"type": "ready", "data": {"ready": true}})).await;
    recv_status(&mut b, "RUNNING").await;

    send(&mut a, json!({"type": "progress", "data": {"cursor": 5}})).await;
    send(&mut a, json!({"type": "progress", "data": {"cursor": 7, "mistakes": 1}})).await;
    let progress = recv_type(&mut b, "player_progress").await;
    assert_eq!(progress["data"]["pid"], pid_a);
    assert_eq!(progress["data"]["cursor"], 7);
}

#[tokio::test]
async fn test_disconnect_mid_race_finishes_for_remaining() {
    let (addr, _) = start_server_with(quick_rooms()).await;
    let (mut a, _) = connect(&addr).await;
    let (mut b, _) = connect(&addr).await;
    let rid = create_room(&mut a).await;
    join_room(&mut b, &rid).await;
    send(&mut a, json!({"type": "ready", "data": {"ready": true}})).await;
    send(&mut b, json!({"type": "ready", "data": {"ready": true}})).await;
    recv_status(&mut a, "RUNNING").await;

    send(&mut a, json!({"type": "finish"})).await;
    recv_until(&mut a, |m| m["type"] == "room_state").await;
    b.close(None).await.expect("close");

    let state = recv_status(&mut a, "FINISHED").await;
    assert_eq!(state["data"]["players"].as_array().unwrap().len(), 1);
}

// =========================================================================
// Keepalive
// =========================================================================

#[tokio::test]
async fn test_read_deadline_extended_by_pongs() {
    let (addr, registry) = start_server_full(RoomConfig::default(), quick_deadlines()).await;
    let (mut ws, _) = connect(&addr).await;
    create_room(&mut ws).await;

    keep_reading(&mut ws, Duration::from_millis(900)).await;

    assert_eq!(registry.room_count().await, 1);
    send(&mut ws, json!({"type": "set_name", "data": {"name": "Still here"}})).await;
    let state = recv_type(&mut ws, "room_state").await;
    assert_eq!(state["data"]["players"][0]["name"], "Still here");
}

#[tokio::test]
async fn test_silent_connection_hits_read_deadline() {
    let (addr, registry) = start_server_full(RoomConfig::default(), quick_deadlines()).await;
    let (mut ws, _) = connect(&addr).await;
    create_room(&mut ws).await;
    assert_eq!(registry.room_count().await, 1);

    // Never read, so no pong goes back: the deadline is never extended.
    wait_for_room_count(&registry, 0).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("server should close the connection");
    assert!(closed);
}
