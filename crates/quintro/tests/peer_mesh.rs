//! End-to-end tests: real peer tasks on an in-process mesh.
//!
//! Every test runs under paused Tokio time (`start_paused`), so grace
//! windows and turn deadlines elapse deterministically: virtual time
//! jumps ahead only when every task is idle.

use std::time::Duration;

use tokio::sync::mpsc;

use quintro::{
    ConnectionStatus, GameSession, MemoryHub, PeerBuilder, PeerConfig,
    PeerEvent, PeerHandle, PlayerId, RoomId, SessionStatus,
};

// =========================================================================
// Helpers
// =========================================================================

type Events = mpsc::UnboundedReceiver<PeerEvent>;

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

/// Deterministic timing for tests: no heartbeats, quick sweeps, a
/// 5-second grace window, and a turn deadline long enough to never
/// fire unless a test waits for it on purpose.
fn test_config() -> PeerConfig {
    PeerConfig {
        turn_timeout: Duration::from_secs(3600),
        reconnect_grace: Duration::from_secs(5),
        heartbeat_interval: None,
        sweep_interval: Duration::from_millis(200),
    }
}

/// Waits for the first event matching `pred`, skipping others.
async fn wait_for(
    events: &mut Events,
    pred: impl Fn(&PeerEvent) -> bool,
) -> PeerEvent {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event =
                events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching event")
}

/// Waits until the peer reports a session matching `pred`.
async fn wait_for_session(
    events: &mut Events,
    pred: impl Fn(&GameSession) -> bool,
) -> GameSession {
    let event = wait_for(events, |e| {
        matches!(e, PeerEvent::SessionChanged(s) if pred(s))
    })
    .await;
    match event {
        PeerEvent::SessionChanged(session) => session,
        _ => unreachable!(),
    }
}

struct Table {
    hub: MemoryHub,
    room: RoomId,
    host: (PeerHandle, Events),
    guests: Vec<(PeerHandle, Events)>,
}

/// Spins up a host (id 1, "ada") plus `guest_count` guests (ids 2..,
/// "brin", "cora", …), fully joined and synced.
async fn table(guest_count: usize) -> Table {
    let hub = MemoryHub::new();
    let room = RoomId::parse("QUIN7");
    let names = ["brin", "cora", "dara", "elin"];

    let (host, mut host_events) = PeerBuilder::new("ada")
        .with_player_id(pid(1))
        .config(test_config())
        .host(hub.join(pid(1)), room.clone())
        .await
        .unwrap();

    let mut guests = Vec::new();
    for (i, name) in names.iter().take(guest_count).enumerate() {
        let id = pid(2 + i as u64);
        let (handle, mut events) = PeerBuilder::new(*name)
            .with_player_id(id)
            .config(test_config())
            .join(hub.join(id), room.clone())
            .await
            .unwrap();
        // The guest is in once its mirror shows itself on the roster.
        wait_for_session(&mut events, |s| {
            s.player(id).is_some()
        })
        .await;
        guests.push((handle, events));
    }

    // The host has seen every join.
    wait_for_session(&mut host_events, |s| {
        s.players.len() == guest_count + 1
    })
    .await;

    Table {
        hub,
        room,
        host: (host, host_events),
        guests,
    }
}

// =========================================================================
// Lobby and turn flow
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_start_and_alternate_turns() {
    let mut t = table(1).await;
    let (host, host_events) = &mut t.host;
    let (guest, guest_events) = &mut t.guests[0];

    // Both copies agree on the lobby roster.
    let host_view = host.session().await.unwrap().unwrap();
    let guest_view = guest.session().await.unwrap().unwrap();
    assert_eq!(host_view, guest_view);
    assert_eq!(host_view.status, SessionStatus::Lobby);
    assert!(host_view.can_start());

    // Start with ada first.
    host.start(Some(0)).await.unwrap();
    wait_for_session(guest_events, |s| {
        s.status == SessionStatus::Playing
    })
    .await;

    // ada calls, then brin calls; both peers observe both deltas.
    host.call_number(4).await.unwrap();
    wait_for(guest_events, |e| {
        matches!(e, PeerEvent::NumberCalled { number: 4, .. })
    })
    .await;

    guest.call_number(9).await.unwrap();
    wait_for(host_events, |e| {
        matches!(e, PeerEvent::NumberCalled { number: 9, .. })
    })
    .await;
    wait_for(guest_events, |e| {
        matches!(e, PeerEvent::NumberCalled { number: 9, .. })
    })
    .await;

    let host_view = host.session().await.unwrap().unwrap();
    let guest_view = guest.session().await.unwrap().unwrap();
    assert_eq!(host_view.called_numbers, vec![4, 9]);
    assert_eq!(host_view, guest_view);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_turn_call_is_rejected_and_harmless() {
    let mut t = table(1).await;
    let (host, _) = &mut t.host;
    let (guest, guest_events) = &mut t.guests[0];

    host.start(Some(0)).await.unwrap(); // ada's turn
    wait_for_session(guest_events, |s| {
        s.status == SessionStatus::Playing
    })
    .await;

    // brin calls out of turn: a private rejection, no state change.
    guest.call_number(9).await.unwrap();
    let event = wait_for(guest_events, |e| {
        matches!(e, PeerEvent::ActionRejected { .. })
    })
    .await;
    let PeerEvent::ActionRejected { reason } = event else {
        unreachable!()
    };
    assert!(reason.contains("turn"), "reason was: {reason}");

    let host_view = host.session().await.unwrap().unwrap();
    assert!(host_view.called_numbers.is_empty());
    assert_eq!(host_view.current_turn_index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_guest_cannot_start_the_game() {
    let mut t = table(1).await;
    let (guest, guest_events) = &mut t.guests[0];

    guest.start(None).await.unwrap();

    wait_for(guest_events, |e| {
        matches!(e, PeerEvent::ActionRejected { .. })
    })
    .await;
    let view = guest.session().await.unwrap().unwrap();
    assert_eq!(view.status, SessionStatus::Lobby);
}

// =========================================================================
// Turn timeout
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_turn_holder_is_skipped_once() {
    // Built directly rather than via `table`: this test needs a short
    // turn deadline, and the host's config is what governs it.
    let hub = MemoryHub::new();
    let room = RoomId::parse("SKIPS");
    let config = PeerConfig {
        turn_timeout: Duration::from_secs(30),
        ..test_config()
    };
    let (host, _host_events) = PeerBuilder::new("ada")
        .with_player_id(pid(1))
        .config(config.clone())
        .host(hub.join(pid(1)), room.clone())
        .await
        .unwrap();
    let (guest, mut guest_events) = PeerBuilder::new("brin")
        .with_player_id(pid(2))
        .config(config)
        .join(hub.join(pid(2)), room)
        .await
        .unwrap();
    wait_for_session(&mut guest_events, |s| s.players.len() == 2).await;

    host.start(Some(0)).await.unwrap(); // ada's turn, and she stalls
    wait_for_session(&mut guest_events, |s| {
        s.status == SessionStatus::Playing
    })
    .await;

    // The host-side deadline fires after 30 virtual seconds and hands
    // the turn to brin.
    wait_for_session(&mut guest_events, |s| s.current_turn_index == 1)
        .await;

    // Exactly one advance: brin can act immediately, proving the turn
    // is at index 1 and not further.
    guest.call_number(9).await.unwrap();
    wait_for(&mut guest_events, |e| {
        matches!(e, PeerEvent::NumberCalled { number: 9, .. })
    })
    .await;
}

// =========================================================================
// Desync repair
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_missed_delta_triggers_resync_and_repair() {
    let mut t = table(2).await;

    t.host.0.start(Some(0)).await.unwrap();
    for (_, events) in t.guests.iter_mut() {
        wait_for_session(events, |s| s.status == SessionStatus::Playing)
            .await;
    }

    // cora's next payload vanishes in transit: she misses ada's delta.
    t.hub.drop_next_to(pid(3));
    t.host.0.call_number(4).await.unwrap();
    wait_for(&mut t.guests[0].1, |e| {
        matches!(e, PeerEvent::NumberCalled { number: 4, .. })
    })
    .await;

    // brin (turn 1) calls next; cora's mirror spots the gap, requests
    // a snapshot, and self-heals without user action.
    t.guests[0].0.call_number(9).await.unwrap();

    wait_for(&mut t.guests[1].1, |e| {
        matches!(e, PeerEvent::ResyncRequested)
    })
    .await;
    wait_for_session(&mut t.guests[1].1, |s| {
        s.called_numbers == vec![4, 9]
    })
    .await;

    let host_view = t.host.0.session().await.unwrap().unwrap();
    let cora_view = t.guests[1].0.session().await.unwrap().unwrap();
    assert_eq!(host_view, cora_view);
}

// =========================================================================
// Host failover
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_host_crash_promotes_earliest_joined_survivor() {
    let mut t = table(2).await;

    // ada's channel is severed with no goodbye.
    t.hub.kick(pid(1));

    // brin (earliest joined survivor) independently promotes herself…
    let (_brin, brin_events) = &mut t.guests[0];
    wait_for(brin_events, |e| matches!(e, PeerEvent::BecameHost)).await;

    // …and cora independently lands on the same answer.
    let (_cora, cora_events) = &mut t.guests[1];
    wait_for(cora_events, |e| {
        matches!(e, PeerEvent::HostChanged { new_host } if *new_host == pid(2))
    })
    .await;

    let brin_view = t.guests[0].0.session().await.unwrap().unwrap();
    let cora_view = t.guests[1].0.session().await.unwrap().unwrap();
    assert_eq!(brin_view.host_id, pid(2));
    assert_eq!(cora_view.host_id, pid(2));
    assert!(brin_view.player(pid(1)).is_none(), "old host dropped");
    assert_eq!(brin_view.players.len(), 2);

    // The promoted host is live: cora can play against it.
    t.guests[0].0.start(Some(0)).await.unwrap();
    let (_cora, cora_events) = &mut t.guests[1];
    wait_for_session(cora_events, |s| {
        s.status == SessionStatus::Playing
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_graceful_host_leave_hands_over_immediately() {
    let mut t = table(2).await;

    // ada leaves deliberately — no grace window involved.
    t.host.0.leave().await.unwrap();

    let (_brin, brin_events) = &mut t.guests[0];
    wait_for(brin_events, |e| matches!(e, PeerEvent::BecameHost)).await;

    let (_cora, cora_events) = &mut t.guests[1];
    wait_for(cora_events, |e| {
        matches!(e, PeerEvent::HostChanged { new_host } if *new_host == pid(2))
    })
    .await;

    let brin_view = t.guests[0].0.session().await.unwrap().unwrap();
    assert_eq!(brin_view.host_id, pid(2));
    assert_eq!(brin_view.players.len(), 2);
}

// =========================================================================
// Reload recovery
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_resumed_peer_keeps_roster_slot_and_turn_order() {
    let mut t = table(1).await;

    // brin saves a recovery record, then her tab dies.
    let record = t.guests[0].0.recovery_record().await.unwrap();
    assert!(!record.was_host);
    assert_eq!(record.player_id, pid(2));
    t.hub.kick(pid(2));

    // Back within the grace window, same identity.
    let (brin, mut brin_events) = PeerBuilder::new("ignored")
        .config(test_config())
        .resume(record)
        .join(t.hub.join(pid(2)), t.room.clone())
        .await
        .unwrap();

    // The first snapshot may still show the reconnect in progress;
    // wait for the settled one.
    let view = wait_for_session(&mut brin_events, |s| {
        s.player(pid(2))
            .is_some_and(|p| p.connection == ConnectionStatus::Connected)
    })
    .await;
    let host_view = t.host.0.session().await.unwrap().unwrap();

    assert_eq!(view, host_view);
    assert_eq!(
        host_view.players.len(),
        2,
        "no duplicate roster slot on resume"
    );
    // Turn order (roster position) is untouched by the reload.
    assert_eq!(host_view.players[1].id, brin.player_id());
}

// =========================================================================
// Recovery record contents
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_recovery_record_reflects_role_and_room() {
    let t = table(1).await;

    let record = t.host.0.recovery_record().await.unwrap();

    assert!(record.was_host);
    assert_eq!(record.player_id, pid(1));
    assert_eq!(record.room_code, t.room);
    assert_eq!(record.player_name, "ada");
}
