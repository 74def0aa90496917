//! Room: the authoritative state of one race.
//!
//! Every field lives behind a single `tokio::sync::Mutex`. Each operation
//! takes the lock, applies its mutation, and broadcasts the result before
//! releasing it, so a broadcast always reflects a fully-applied change.
//! Broadcasting only ever offers to bounded queues, so nothing under the
//! lock waits on a client.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keyrace_protocol::{
    PlayerId, PlayerProgress, PlayerSnapshot, PlayerStatus, PromptMode,
    RoomId, RoomSnapshot, RoomStatus, ServerEnvelope,
};
use rand::Rng;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::stats::{accuracy, round2, words_per_minute};
use crate::{OutboundSender, RoomConfig, RoomError};

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// One player's per-round state plus the queue that reaches them.
#[derive(Debug)]
struct Member {
    name: String,
    ready: bool,
    cursor: u64,
    mistakes: u64,
    wpm: f64,
    /// Percentage, 0–100.
    acc: f64,
    status: PlayerStatus,
    outbound: OutboundSender,
}

impl Member {
    fn new(name: String, outbound: OutboundSender) -> Self {
        Self {
            name,
            ready: false,
            cursor: 0,
            mistakes: 0,
            wpm: 0.0,
            acc: 100.0,
            status: PlayerStatus::Lobby,
            outbound,
        }
    }

    fn reset_round(&mut self) {
        self.ready = false;
        self.cursor = 0;
        self.mistakes = 0;
        self.wpm = 0.0;
        self.acc = 100.0;
        self.status = PlayerStatus::Lobby;
    }

    fn recompute(&mut self, elapsed_ms: u64) {
        self.wpm = round2(words_per_minute(self.cursor, elapsed_ms));
        self.acc = round2(100.0 * accuracy(self.cursor, self.mistakes));
    }

    fn snapshot(&self, pid: &PlayerId) -> PlayerSnapshot {
        PlayerSnapshot {
            pid: pid.clone(),
            name: self.name.clone(),
            ready: self.ready,
            cursor: self.cursor,
            mistakes: self.mistakes,
            wpm: self.wpm,
            acc: self.acc,
            status: self.status,
        }
    }

    fn progress(&self, pid: &PlayerId) -> PlayerProgress {
        PlayerProgress {
            pid: pid.clone(),
            cursor: self.cursor,
            mistakes: self.mistakes,
            wpm: self.wpm,
            acc: self.acc,
            status: self.status,
        }
    }
}

// ---------------------------------------------------------------------------
// Guarded state
// ---------------------------------------------------------------------------

struct RoomInner {
    host: PlayerId,
    status: RoomStatus,
    prompt: String,
    /// Monotonic start instant; drives the countdown and the stats clock.
    start_at: Option<Instant>,
    /// The same instant as Unix epoch ms, for clients.
    start_at_ms: i64,
    seed: u32,
    prompt_mode: PromptMode,
    /// Bumped on every countdown start. A monitor only acts while this
    /// still equals the value it was spawned with.
    generation: u64,
    /// Set by the registry when it drops the room; no one may join after.
    retired: bool,
    members: HashMap<PlayerId, Member>,
}

impl RoomInner {
    /// Moves to `target`. Status only ever steps forward one state.
    fn advance(&mut self, target: RoomStatus) {
        debug_assert!(
            self.status.can_transition_to(target),
            "illegal room transition {} -> {target}",
            self.status
        );
        self.status = target;
    }

    fn all_ready(&self) -> bool {
        self.members.values().all(|m| m.ready)
    }

    fn all_finished(&self) -> bool {
        !self.members.is_empty()
            && self
                .members
                .values()
                .all(|m| m.status == PlayerStatus::Finished)
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_at
            .map(|at| Instant::now().saturating_duration_since(at).as_millis() as u64)
            .unwrap_or(0)
    }

    fn snapshot(&self, rid: &RoomId) -> RoomSnapshot {
        let mut players: Vec<PlayerSnapshot> = self
            .members
            .iter()
            .map(|(pid, m)| m.snapshot(pid))
            .collect();
        players.sort_by(|a, b| a.pid.cmp(&b.pid));

        RoomSnapshot {
            rid: rid.clone(),
            status: self.status,
            prompt: self.prompt.clone(),
            start_at_ms: self.start_at_ms,
            prompt_mode: self.prompt_mode,
            seed: self.seed,
            players,
        }
    }

    fn broadcast(&self, msg: &ServerEnvelope) {
        for member in self.members.values() {
            member.outbound.offer(msg.clone());
        }
    }

    fn broadcast_state(&self, rid: &RoomId) {
        self.broadcast(&ServerEnvelope::room_state(self.snapshot(rid)));
    }
}

fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One race session: membership, per-player progress, and status.
///
/// Shared as `Arc<Room>` between the registry and the connection adapters
/// of its members.
pub struct Room {
    id: RoomId,
    config: Arc<RoomConfig>,
    inner: Mutex<RoomInner>,
    generation_tx: watch::Sender<u64>,
}

impl Room {
    /// Creates a room in `Lobby` whose host is already its first member.
    pub(crate) fn new(
        id: RoomId,
        config: Arc<RoomConfig>,
        host: PlayerId,
        host_name: String,
        outbound: OutboundSender,
    ) -> Self {
        let mut members = HashMap::new();
        members.insert(host.clone(), Member::new(host_name, outbound));
        let (generation_tx, _) = watch::channel(0);

        Self {
            id,
            inner: Mutex::new(RoomInner {
                host,
                status: RoomStatus::Lobby,
                prompt: String::new(),
                start_at: None,
                start_at_ms: 0,
                seed: 0,
                prompt_mode: config.default_prompt_mode,
                generation: 0,
                retired: false,
                members,
            }),
            config,
            generation_tx,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// The immutable list of candidate prompt texts.
    pub fn prompts(&self) -> &[String] {
        &self.config.prompts
    }

    pub async fn host(&self) -> PlayerId {
        self.inner.lock().await.host.clone()
    }

    pub async fn status(&self) -> RoomStatus {
        self.inner.lock().await.status
    }

    pub async fn member_count(&self) -> usize {
        self.inner.lock().await.members.len()
    }

    pub async fn is_member(&self, pid: &PlayerId) -> bool {
        self.inner.lock().await.members.contains_key(pid)
    }

    /// Current countdown generation (0 before the first countdown).
    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Full state, players sorted by id.
    pub async fn snapshot(&self) -> RoomSnapshot {
        self.inner.lock().await.snapshot(&self.id)
    }

    /// Sends the current snapshot to every member.
    pub async fn broadcast_state(&self) {
        self.inner.lock().await.broadcast_state(&self.id);
    }

    /// Adds (or replaces) a member and broadcasts the new snapshot.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the registry has already retired the room.
    pub async fn add_member(
        &self,
        pid: PlayerId,
        name: String,
        outbound: OutboundSender,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.retired {
            return Err(RoomError::NotFound(self.id.clone()));
        }

        inner.members.insert(pid.clone(), Member::new(name, outbound));
        tracing::info!(
            rid = %self.id,
            %pid,
            players = inner.members.len(),
            "player joined"
        );
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Removes a member and broadcasts the new snapshot to the rest.
    ///
    /// If the race is running and everyone left has finished, the room
    /// finishes now.
    pub async fn remove_member(&self, pid: &PlayerId) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.members.remove(pid).is_none() {
            return Err(RoomError::NotInRoom(pid.clone(), self.id.clone()));
        }
        tracing::info!(
            rid = %self.id,
            %pid,
            players = inner.members.len(),
            "player left"
        );

        if inner.status == RoomStatus::Running && inner.all_finished() {
            inner.advance(RoomStatus::Finished);
            tracing::info!(rid = %self.id, "race finished");
        }
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Renames a member. An empty name is ignored, but the snapshot is
    /// broadcast either way.
    pub async fn set_name(&self, pid: &PlayerId, name: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        let member = inner
            .members
            .get_mut(pid)
            .ok_or_else(|| RoomError::NotInRoom(pid.clone(), self.id.clone()))?;
        if !name.is_empty() {
            member.name = name.to_owned();
        }
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Updates a member's readiness.
    ///
    /// In `Lobby`, if this leaves at least `min_players` members all
    /// ready, the countdown starts.
    pub async fn set_ready(
        self: &Arc<Self>,
        pid: &PlayerId,
        ready: bool,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        let member = inner
            .members
            .get_mut(pid)
            .ok_or_else(|| RoomError::NotInRoom(pid.clone(), self.id.clone()))?;
        member.ready = ready;

        if inner.status == RoomStatus::Lobby
            && inner.members.len() >= self.config.min_players
            && inner.all_ready()
        {
            self.begin_countdown(&mut inner);
        }
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Changes the prompt mode. Host only, `Lobby` only.
    pub async fn set_prompt_mode(
        &self,
        pid: &PlayerId,
        mode: PromptMode,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.host != *pid {
            return Err(RoomError::NotHost(pid.clone()));
        }
        if inner.status != RoomStatus::Lobby {
            return Err(RoomError::InvalidState(inner.status));
        }
        inner.prompt_mode = mode;
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Records a member's progress and broadcasts a `player_progress`.
    ///
    /// Negative counts are clamped to zero.
    pub async fn update_progress(
        &self,
        pid: &PlayerId,
        cursor: i64,
        mistakes: i64,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.status != RoomStatus::Running {
            return Err(RoomError::InvalidState(inner.status));
        }
        let elapsed_ms = inner.elapsed_ms();
        let member = inner
            .members
            .get_mut(pid)
            .ok_or_else(|| RoomError::NotInRoom(pid.clone(), self.id.clone()))?;

        member.cursor = cursor.max(0) as u64;
        member.mistakes = mistakes.max(0) as u64;
        member.recompute(elapsed_ms);

        let msg = ServerEnvelope::player_progress(self.id.clone(), member.progress(pid));
        inner.broadcast(&msg);
        Ok(())
    }

    /// Marks a member finished. Idempotent within a round.
    ///
    /// When every current member has finished, the room finishes.
    pub async fn finish(&self, pid: &PlayerId) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.status != RoomStatus::Running {
            return Err(RoomError::InvalidState(inner.status));
        }
        let elapsed_ms = inner.elapsed_ms();
        let member = inner
            .members
            .get_mut(pid)
            .ok_or_else(|| RoomError::NotInRoom(pid.clone(), self.id.clone()))?;
        if member.status == PlayerStatus::Finished {
            return Ok(());
        }
        member.status = PlayerStatus::Finished;
        member.recompute(elapsed_ms);

        if inner.all_finished() {
            inner.advance(RoomStatus::Finished);
            tracing::info!(rid = %self.id, "race finished");
        }
        inner.broadcast_state(&self.id);
        Ok(())
    }

    /// Marks the room retired if it has no members. Called by the
    /// registry, under its own lock, right before dropping the room.
    pub(crate) async fn retire_if_empty(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.members.is_empty() {
            inner.retired = true;
        }
        inner.retired
    }

    /// Enters `Countdown`: resets every member's round, picks a seed,
    /// schedules the start, and spawns the monitor for this generation.
    fn begin_countdown(self: &Arc<Self>, inner: &mut RoomInner) {
        let countdown = self.config.countdown;

        // A restart stays in Countdown; only the generation moves.
        if inner.status != RoomStatus::Countdown {
            inner.advance(RoomStatus::Countdown);
        }
        inner.generation += 1;
        inner.seed = rand::rng().random();
        inner.prompt.clear();
        inner.start_at = Some(Instant::now() + countdown);
        inner.start_at_ms = unix_ms() + countdown.as_millis() as i64;
        for member in inner.members.values_mut() {
            member.reset_round();
        }

        self.generation_tx.send_replace(inner.generation);
        tracing::debug!(
            rid = %self.id,
            generation = inner.generation,
            start_at_ms = inner.start_at_ms,
            "countdown started"
        );

        let monitor = CountdownMonitor {
            room: Arc::downgrade(self),
            generation: inner.generation,
            poll: self.config.countdown_poll,
            generation_rx: self.generation_tx.subscribe(),
        };
        tokio::spawn(monitor.run());
    }

    /// Starts the race if `generation` is still current and its start
    /// time has come.
    async fn try_start_race(&self, generation: u64) -> CountdownTick {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.status != RoomStatus::Countdown {
            return CountdownTick::Stale;
        }
        match inner.start_at {
            Some(at) if Instant::now() >= at => {}
            _ => return CountdownTick::Waiting,
        }

        inner.advance(RoomStatus::Running);
        for member in inner.members.values_mut() {
            member.status = PlayerStatus::Running;
        }
        tracing::info!(
            rid = %self.id,
            players = inner.members.len(),
            "race started"
        );
        inner.broadcast_state(&self.id);
        CountdownTick::Started
    }
}

// ---------------------------------------------------------------------------
// Countdown monitor
// ---------------------------------------------------------------------------

enum CountdownTick {
    Waiting,
    Started,
    Stale,
}

/// Background task owned by one countdown generation.
///
/// Holds only a weak reference so a deleted room is not kept alive.
struct CountdownMonitor {
    room: Weak<Room>,
    generation: u64,
    poll: Duration,
    generation_rx: watch::Receiver<u64>,
}

impl CountdownMonitor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.generation_rx.changed() => {
                    // Sender gone means the room is gone.
                    if changed.is_err()
                        || *self.generation_rx.borrow_and_update() != self.generation
                    {
                        tracing::debug!(generation = self.generation, "countdown superseded");
                        return;
                    }
                }
            }

            let Some(room) = self.room.upgrade() else {
                return;
            };
            match room.try_start_race(self.generation).await {
                CountdownTick::Waiting => {}
                CountdownTick::Started => return,
                CountdownTick::Stale => {
                    tracing::debug!(
                        rid = %room.id,
                        generation = self.generation,
                        "countdown monitor exiting without effect"
                    );
                    return;
                }
            }
        }
    }
}
