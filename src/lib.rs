//! Frontail - stream the tail of a file to the browser over WebSockets.

pub mod config;
pub mod server;
pub mod session;
pub mod tail;
