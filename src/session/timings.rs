//! Timer and limit settings shared by every session.

use std::time::Duration;

/// Poll the file for changes with this period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Time allowed to read the next pong from the client.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Send pings with this period. Must be less than the pong wait.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Time allowed to write one frame to the client.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Largest frame accepted from the client, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Timers and limits driving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Period of the change detector poll.
    pub poll_interval: Duration,
    /// Period of the heartbeat ping.
    pub ping_interval: Duration,
    /// Read deadline, extended on every pong.
    pub pong_wait: Duration,
    /// Deadline for each outbound frame.
    pub write_wait: Duration,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
