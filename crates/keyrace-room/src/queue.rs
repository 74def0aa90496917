//! Bounded per-connection outbound queue.
//!
//! Rooms broadcast by offering a message to every member's queue. An offer
//! never waits: if the queue is full (slow consumer) or closed (consumer
//! gone) the message is dropped for that member only. A dropped
//! `player_progress` is superseded by the next one; a dropped `room_state`
//! is corrected by the next state change.

use keyrace_protocol::ServerEnvelope;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default queue depth per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Receiving end, drained by the connection's outbound pump.
pub type OutboundReceiver = mpsc::Receiver<ServerEnvelope>;

/// Sending end of a connection's outbound queue. Cheap to clone.
///
/// The queue closes once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    inner: mpsc::Sender<ServerEnvelope>,
}

/// Creates a bounded outbound queue holding at most `capacity` messages.
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundSender { inner: tx }, rx)
}

impl OutboundSender {
    /// Enqueues `msg` without waiting. Returns `false` if it was dropped.
    pub fn offer(&self, msg: ServerEnvelope) -> bool {
        match self.inner.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                tracing::trace!(kind = ?msg.kind, "outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("outbound queue closed, dropping message");
                false
            }
        }
    }
}
