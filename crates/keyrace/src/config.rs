//! Per-connection timing and buffering.

use std::time::Duration;

use keyrace_room::DEFAULT_OUTBOUND_CAPACITY;

/// Settings applied to every accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long the inbound pump waits without a keepalive acknowledgment
    /// before dropping the connection. Extended on every pong.
    pub read_deadline: Duration,

    /// Upper bound on a single outbound write.
    pub write_deadline: Duration,

    /// Interval between server-initiated pings.
    pub keepalive_interval: Duration,

    /// Messages buffered per connection before broadcasts start dropping.
    pub outbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(25),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}
