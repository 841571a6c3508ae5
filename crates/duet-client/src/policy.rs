use rand::Rng;
use tracing::info;

use duet_types::models::RoomName;

pub const DEFAULT_MAX_FALLBACK_ATTEMPTS: u32 = 5;

/// A random six-digit room, used when no room is given and as the fallback
/// after a rejection.
pub fn random_room() -> RoomName {
    RoomName::from(rand::rng().random_range(100_000..1_000_000u32))
}

/// Bounded fallback after `RoomFull`: up to `max_attempts` random rooms, then
/// give up and leave the choice to the user. A successful join resets it.
#[derive(Debug, Clone)]
pub struct JoinPolicy {
    max_attempts: u32,
    attempts: u32,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FALLBACK_ATTEMPTS)
    }
}

impl JoinPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    /// The last join was rejected. Returns the next room to try, if any
    /// attempts remain.
    pub fn on_rejected(&mut self) -> Option<RoomName> {
        if self.attempts >= self.max_attempts {
            info!("giving up after {} fallback rooms", self.attempts);
            return None;
        }
        self.attempts += 1;
        Some(random_room())
    }

    pub fn on_joined(&mut self) {
        self.attempts = 0;
    }
}
