//! End-to-end pairing scenarios: real client sessions talking to real relay
//! coordinators in-process, with the socket replaced by direct delivery.

use tokio::sync::mpsc::UnboundedReceiver;

use duet_client::offload::OffloadChannel;
use duet_client::policy::JoinPolicy;
use duet_client::session::{ClientSession, ConnectionState};
use duet_client::transcript::{Author, MessageStatus};
use duet_crypto::SealedBoxEngine;
use duet_gateway::coordinator::SessionCoordinator;
use duet_gateway::dispatcher::Dispatcher;
use duet_types::events::{ClientCommand, ServerEvent};
use duet_types::models::RoomName;

struct Party {
    coordinator: SessionCoordinator,
    events: UnboundedReceiver<ServerEvent>,
    session: ClientSession,
    /// Every event this party's client has received, in order.
    seen: Vec<ServerEvent>,
}

impl Party {
    async fn new(dispatcher: &Dispatcher, room: &str) -> Self {
        let (id, events) = dispatcher.register_session().await;
        let offload = OffloadChannel::spawn(SealedBoxEngine::new()).unwrap();
        let session = ClientSession::start(offload, JoinPolicy::default(), room_name(room))
            .await
            .unwrap();
        Self {
            coordinator: SessionCoordinator::new(id, dispatcher.clone()),
            events,
            session,
            seen: Vec::new(),
        }
    }

    async fn connect(&mut self) {
        let join = self.session.connected();
        self.submit(vec![join]).await;
    }

    async fn submit(&mut self, commands: Vec<ClientCommand>) {
        for cmd in commands {
            self.coordinator.handle_command(cmd).await;
        }
    }

    async fn say(&mut self, text: &str) {
        let cmd = self.session.send(text).await;
        self.submit(cmd.into_iter().collect()).await;
    }

    /// Deliver queued events to the client. Returns whether any were queued.
    async fn pump(&mut self) -> bool {
        let mut delivered = false;
        while let Ok(event) = self.events.try_recv() {
            delivered = true;
            self.seen.push(event.clone());
            let replies = self.session.handle_event(event).await;
            self.submit(replies).await;
        }
        delivered
    }

    fn saw(&self, event: &ServerEvent) -> bool {
        self.seen.contains(event)
    }

    fn current_room(&self) -> Option<&RoomName> {
        self.session.room()
    }
}

fn room_name(name: &str) -> RoomName {
    RoomName::new(name).unwrap()
}

/// Keep delivering until no party has anything in flight.
async fn settle(parties: &mut [&mut Party]) {
    loop {
        let mut progressed = false;
        for party in parties.iter_mut() {
            progressed |= party.pump().await;
        }
        if !progressed {
            break;
        }
    }
}

#[tokio::test]
async fn scenario_a_pair_exchange_and_chat() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "42").await;
    let mut y = Party::new(&dispatcher, "42").await;

    x.connect().await;
    settle(&mut [&mut x]).await;
    assert_eq!(x.seen, vec![ServerEvent::RoomJoined { room: room_name("42") }]);
    assert!(!x.saw(&ServerEvent::NewConnection));

    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;

    assert!(y.saw(&ServerEvent::RoomJoined { room: room_name("42") }));
    assert!(x.saw(&ServerEvent::NewConnection));
    assert_eq!(x.session.peer_key(), Some(y.session.public_key()));
    assert_eq!(y.session.peer_key(), Some(x.session.public_key()));

    x.say("hi").await;
    settle(&mut [&mut x, &mut y]).await;

    let x_key = x.session.public_key().to_string();
    assert_eq!(
        y.session.transcript().messages().last(),
        Some((&Author::Peer(x_key), "hi", MessageStatus::Received))
    );
    assert_eq!(
        x.session.transcript().messages().last(),
        Some((&Author::Me, "hi", MessageStatus::Sent))
    );
}

#[tokio::test]
async fn relay_only_ever_carries_ciphertext() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "42").await;
    let mut y = Party::new(&dispatcher, "42").await;
    x.connect().await;
    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;

    x.say("the plaintext").await;
    settle(&mut [&mut x, &mut y]).await;

    let relayed: Vec<_> = y
        .seen
        .iter()
        .filter_map(|event| match event {
            ServerEvent::Message(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(relayed.len(), 1);
    assert!(!relayed[0].text.contains("the plaintext"));
    assert_eq!(relayed[0].recipient, y.session.public_key());
}

#[tokio::test]
async fn scenario_b_third_party_is_turned_away() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "42").await;
    let mut y = Party::new(&dispatcher, "42").await;
    let mut z = Party::new(&dispatcher, "42").await;

    x.connect().await;
    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;
    let members = dispatcher.room_members(&room_name("42")).await;

    z.connect().await;
    settle(&mut [&mut x, &mut y, &mut z]).await;

    assert_eq!(z.seen.first(), Some(&ServerEvent::RoomFull));
    assert!(x.saw(&ServerEvent::IntrusionAttempt));
    assert!(y.saw(&ServerEvent::IntrusionAttempt));
    assert_eq!(dispatcher.room_members(&room_name("42")).await, members);

    // Z is redirected to a fallback room and is not paired with anyone.
    let fallback = z.current_room().cloned().unwrap();
    assert_ne!(fallback, room_name("42"));
    assert_eq!(z.session.peer_key(), None);

    // X and Y keep talking undisturbed.
    y.say("still private").await;
    settle(&mut [&mut x, &mut y, &mut z]).await;
    assert_eq!(
        x.session.transcript().messages().last().map(|(_, text, _)| text),
        Some("still private")
    );
}

#[tokio::test]
async fn scenario_c_peer_leaves_and_sends_degrade() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "42").await;
    let mut y = Party::new(&dispatcher, "42").await;
    x.connect().await;
    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;

    // Sealed before X leaves, delivered after: must not be accepted.
    let Some(ClientCommand::Message(late)) = x.session.send("late").await else {
        panic!("expected X to be paired");
    };

    x.coordinator.disconnect().await;
    settle(&mut [&mut y]).await;

    assert_eq!(y.seen.last(), Some(&ServerEvent::UserDisconnected));
    assert_eq!(y.session.peer_key(), None);
    assert_eq!(
        dispatcher.room_members(&room_name("42")).await,
        vec![y.coordinator.session_id()]
    );

    y.session.handle_event(ServerEvent::Message(late)).await;
    assert!(y.session.transcript().messages().all(|(_, text, _)| text != "late"));

    assert_eq!(y.session.send("anyone?").await, None);
    assert_eq!(
        y.session.transcript().messages().last(),
        Some((&Author::Me, "anyone?", MessageStatus::LocalOnly))
    );

    // A new peer restores the encrypted path.
    let mut w = Party::new(&dispatcher, "42").await;
    w.connect().await;
    settle(&mut [&mut y, &mut w]).await;
    assert_eq!(y.session.peer_key(), Some(w.session.public_key()));

    y.say("welcome").await;
    settle(&mut [&mut y, &mut w]).await;
    assert_eq!(
        w.session.transcript().messages().last().map(|(_, text, status)| (text, status)),
        Some(("welcome", MessageStatus::Received))
    );
}

#[tokio::test]
async fn switching_rooms_resets_both_pairings() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "a").await;
    let mut y = Party::new(&dispatcher, "a").await;
    x.connect().await;
    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;

    let join = x.session.join(room_name("b"));
    x.submit(vec![join]).await;
    settle(&mut [&mut x, &mut y]).await;

    assert_eq!(x.session.state(), &ConnectionState::Joined(room_name("b")));
    assert_eq!(x.session.peer_key(), None);
    assert_eq!(y.seen.last(), Some(&ServerEvent::UserDisconnected));
    assert_eq!(y.session.peer_key(), None);
}

#[tokio::test]
async fn reconnect_keeps_keypair_and_rejoins() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "42").await;
    let mut y = Party::new(&dispatcher, "42").await;
    x.connect().await;
    y.connect().await;
    settle(&mut [&mut x, &mut y]).await;
    let x_key = x.session.public_key().to_string();

    // Transport drop: relay cleans up, client resets, then a fresh connection.
    x.coordinator.disconnect().await;
    x.session.transport_lost();
    let (id, events) = dispatcher.register_session().await;
    x.coordinator = SessionCoordinator::new(id, dispatcher.clone());
    x.events = events;
    x.connect().await;
    settle(&mut [&mut x, &mut y]).await;

    assert_eq!(x.session.public_key(), x_key);
    assert_eq!(y.session.peer_key(), Some(x_key.as_str()));
    assert_eq!(x.session.peer_key(), Some(y.session.public_key()));
    assert_eq!(dispatcher.room_members(&room_name("42")).await.len(), 2);
}

#[tokio::test]
async fn peer_leaving_just_before_a_switch_does_not_unpair_the_new_room() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "a").await;
    let mut y = Party::new(&dispatcher, "a").await;
    let mut w = Party::new(&dispatcher, "b").await;
    x.connect().await;
    y.connect().await;
    w.connect().await;
    settle(&mut [&mut x, &mut y, &mut w]).await;

    // Y drops and X moves to W's room before X reads anything.
    y.coordinator.disconnect().await;
    let join = x.session.join(room_name("b"));
    x.submit(vec![join]).await;
    settle(&mut [&mut x, &mut w]).await;

    assert_eq!(x.current_room(), Some(&room_name("b")));
    assert_eq!(x.session.peer_key(), Some(w.session.public_key()));
    assert_eq!(w.session.peer_key(), Some(x.session.public_key()));

    x.say("made it").await;
    settle(&mut [&mut x, &mut w]).await;
    assert_eq!(
        w.session.transcript().messages().last().map(|(_, text, status)| (text, status)),
        Some(("made it", MessageStatus::Received))
    );
}

#[tokio::test]
async fn announcements_from_the_old_room_never_reach_the_new_one() {
    let dispatcher = Dispatcher::new();
    let mut x = Party::new(&dispatcher, "a").await;
    let mut y = Party::new(&dispatcher, "a").await;
    let mut w = Party::new(&dispatcher, "b").await;
    x.connect().await;
    y.connect().await;
    w.connect().await;
    settle(&mut [&mut x, &mut y, &mut w]).await;
    let y_key = ServerEvent::PublicKey {
        key: y.session.public_key().to_string(),
    };

    let join = x.session.join(room_name("b"));
    x.submit(vec![join]).await;
    // Y, not yet aware X left, announces again.
    let announce = ClientCommand::PublicKey {
        key: y.session.public_key().to_string(),
    };
    y.submit(vec![announce]).await;
    settle(&mut [&mut x, &mut y, &mut w]).await;

    assert_eq!(x.seen.iter().filter(|event| **event == y_key).count(), 1);
    assert_eq!(x.session.peer_key(), Some(w.session.public_key()));
    assert_eq!(y.session.peer_key(), None);
}
