//! Client side of duet: key exchange, the encrypt/decrypt pipeline, the
//! crypto worker bridge, and the session state machine that ties them to
//! the relay's events.

pub mod input;
pub mod key_exchange;
pub mod offload;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod transcript;
pub mod transport;
