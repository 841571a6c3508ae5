use std::collections::HashMap;

use tracing::debug;

use duet_types::models::{RoomName, SessionId};

/// A room never holds more than this many sessions.
pub const ROOM_CAPACITY: usize = 2;

/// Result of asking the registry to admit a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The session is now a member. `created` is true when this admission
    /// brought the room into existence; `peer` is the other member, if any.
    Accepted {
        created: bool,
        peer: Option<SessionId>,
    },
    /// The room is at capacity. Membership was not touched.
    Rejected { occupants: Vec<SessionId> },
}

/// Result of removing a session from a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Removal {
    /// Member still in the room afterwards.
    pub remaining: Option<SessionId>,
    /// The room became empty and was dropped.
    pub reclaimed: bool,
}

/// Room name -> ordered members (join order).
///
/// Rooms exist only while they have members: `admit` creates on first entry
/// and `remove` reclaims on last exit.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomName, Vec<SessionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `session` to `room` if it has a free seat.
    pub fn admit(&mut self, room: &RoomName, session: SessionId) -> Admission {
        let created = !self.rooms.contains_key(room);
        let members = self.rooms.entry(room.clone()).or_default();

        if members.contains(&session) {
            let peer = members.iter().copied().find(|m| *m != session);
            return Admission::Accepted {
                created: false,
                peer,
            };
        }

        if members.len() >= ROOM_CAPACITY {
            return Admission::Rejected {
                occupants: members.clone(),
            };
        }

        let peer = members.first().copied();
        members.push(session);
        if created {
            debug!("room {} created", room);
        }
        Admission::Accepted { created, peer }
    }

    /// Remove `session` from `room`. Not being a member is not an error.
    pub fn remove(&mut self, room: &RoomName, session: SessionId) -> Removal {
        let Some(members) = self.rooms.get_mut(room) else {
            return Removal::default();
        };

        let before = members.len();
        members.retain(|m| *m != session);
        if members.len() == before {
            return Removal::default();
        }
        if members.is_empty() {
            self.rooms.remove(room);
            debug!("room {} reclaimed", room);
            return Removal {
                remaining: None,
                reclaimed: true,
            };
        }

        Removal {
            remaining: members.first().copied(),
            reclaimed: false,
        }
    }

    /// Members of `room` in join order. Empty if the room does not exist.
    pub fn members(&self, room: &RoomName) -> &[SessionId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    /// The other member of `room`, from `session`'s point of view.
    pub fn peer_of(&self, room: &RoomName, session: SessionId) -> Option<SessionId> {
        self.members(room).iter().copied().find(|m| *m != session)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn room(name: &str) -> RoomName {
        RoomName::new(name).unwrap()
    }

    #[test]
    fn first_admission_creates_room() {
        let mut registry = RoomRegistry::new();
        let x = Uuid::new_v4();

        assert_eq!(
            registry.admit(&room("42"), x),
            Admission::Accepted {
                created: true,
                peer: None
            }
        );
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.members(&room("42")), &[x]);
    }

    #[test]
    fn second_admission_reports_peer() {
        let mut registry = RoomRegistry::new();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        registry.admit(&room("42"), x);

        assert_eq!(
            registry.admit(&room("42"), y),
            Admission::Accepted {
                created: false,
                peer: Some(x)
            }
        );
        assert_eq!(registry.members(&room("42")), &[x, y]);
    }

    #[test]
    fn third_admission_is_rejected_without_mutation() {
        let mut registry = RoomRegistry::new();
        let (x, y, z) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.admit(&room("42"), x);
        registry.admit(&room("42"), y);

        assert_eq!(
            registry.admit(&room("42"), z),
            Admission::Rejected {
                occupants: vec![x, y]
            }
        );
        assert_eq!(registry.members(&room("42")), &[x, y]);
    }

    #[test]
    fn readmitting_a_member_does_not_duplicate() {
        let mut registry = RoomRegistry::new();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        registry.admit(&room("42"), x);
        registry.admit(&room("42"), y);

        assert_eq!(
            registry.admit(&room("42"), x),
            Admission::Accepted {
                created: false,
                peer: Some(y)
            }
        );
        assert_eq!(registry.members(&room("42")).len(), 2);
    }

    #[test]
    fn last_removal_reclaims_room() {
        let mut registry = RoomRegistry::new();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        registry.admit(&room("42"), x);
        registry.admit(&room("42"), y);

        assert_eq!(
            registry.remove(&room("42"), x),
            Removal {
                remaining: Some(y),
                reclaimed: false
            }
        );
        assert_eq!(
            registry.remove(&room("42"), y),
            Removal {
                remaining: None,
                reclaimed: true
            }
        );
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn freed_seat_can_be_taken() {
        let mut registry = RoomRegistry::new();
        let (x, y, z) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.admit(&room("42"), x);
        registry.admit(&room("42"), y);
        registry.remove(&room("42"), x);

        assert_eq!(
            registry.admit(&room("42"), z),
            Admission::Accepted {
                created: false,
                peer: Some(y)
            }
        );
    }

    #[test]
    fn removing_unknown_session_is_harmless() {
        let mut registry = RoomRegistry::new();
        let x = Uuid::new_v4();
        assert_eq!(registry.remove(&room("nowhere"), x), Removal::default());

        // A non-member leaving an occupied room reports nobody left behind,
        // so nobody is told their peer went away.
        registry.admit(&room("42"), x);
        assert_eq!(registry.remove(&room("42"), Uuid::new_v4()), Removal::default());
        assert_eq!(registry.members(&room("42")), &[x]);
    }
}
