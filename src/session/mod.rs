//! Client sessions: one per streaming connection.

mod error;
mod runner;
mod text;
mod timings;

pub use error::{EndReason, TransportError};
pub use runner::{ErrorMemory, Session, SessionEnd};
pub use text::Utf8Carry;
pub use timings::{
    SessionTimings, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL, DEFAULT_POLL_INTERVAL,
    DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT,
};
