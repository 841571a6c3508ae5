//! Relay side of duet: room membership, the per-session state machine, and
//! the WebSocket connection loop that feeds it.

pub mod connection;
pub mod coordinator;
pub mod dispatcher;
pub mod registry;
