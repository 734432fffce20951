//! Three peers, one mesh, one full game.
//!
//! Runs the whole engine end to end in a single process: a host and two
//! guests join an in-memory mesh, the game starts, every peer calls
//! numbers on its turn, and the first card to complete five lines wins.
//! Run with `RUST_LOG=quintro=debug` to watch the protocol at work.

use std::time::Duration;

use quintro::{
    GameSession, MemoryHub, PeerBuilder, PeerEvent, PeerHandle, PlayerId,
    SeededCards, SessionStatus, WIN_LINES, WinCheck,
};
use tokio::sync::mpsc;

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<PeerEvent>,
    pred: impl Fn(&PeerEvent) -> bool,
) -> PeerEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("peer stopped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env(),
        )
        .init();

    let hub = MemoryHub::new();
    let room = quintro::generate_room_code();
    eprintln!("room {room}");

    // ada hosts; brin and cora join.
    let ids: Vec<PlayerId> =
        (1..=3).map(|_| PlayerId(rand::random())).collect();
    let (ada, mut ada_events) = PeerBuilder::new("ada")
        .with_player_id(ids[0])
        .host(hub.join(ids[0]), room.clone())
        .await?;
    let (brin, mut brin_events) = PeerBuilder::new("brin")
        .with_player_id(ids[1])
        .join(hub.join(ids[1]), room.clone())
        .await?;
    let (cora, mut cora_events) = PeerBuilder::new("cora")
        .with_player_id(ids[2])
        .join(hub.join(ids[2]), room.clone())
        .await?;

    // Wait until everyone's copy shows the full lobby.
    for events in [&mut brin_events, &mut cora_events] {
        next_event(events, |e| {
            matches!(e, PeerEvent::SessionChanged(s) if s.players.len() == 3)
        })
        .await;
    }

    ada.start(Some(0)).await?;
    next_event(&mut ada_events, |e| {
        matches!(e, PeerEvent::SessionChanged(s) if s.status == SessionStatus::Playing)
    })
    .await;
    eprintln!("game on — ada calls first");

    let handles: Vec<&PeerHandle> = vec![&ada, &brin, &cora];
    let by_id = |id: PlayerId| {
        handles
            .iter()
            .find(|h| h.player_id() == id)
            .copied()
            .expect("known player")
    };
    let cards = SeededCards::new(room);

    // Each turn holder calls the lowest uncalled number until a card
    // completes five lines.
    let winner = loop {
        let session: GameSession = ada
            .session()
            .await?
            .expect("host always has a session");
        if session.status == SessionStatus::Completed {
            break session.winner_id.expect("completed has a winner");
        }

        let holder = session.turn_holder().expect("playing").id;
        let number = (1..=25)
            .find(|n| !session.called_numbers.contains(n))
            .expect("someone wins before the domain runs out");
        by_id(holder).call_number(number).await?;

        let event = next_event(&mut ada_events, |e| {
            matches!(
                e,
                PeerEvent::NumberCalled { .. } | PeerEvent::GameOver { .. }
            )
        })
        .await;
        if let PeerEvent::NumberCalled { number, by, .. } = event {
            eprintln!("  {by} called {number}");
        }

        // Every peer checks its own card after each call.
        let session =
            ada.session().await?.expect("host always has a session");
        for player in &session.players {
            let lines =
                cards.completed_lines(player.id, &session.called_numbers);
            if lines >= WIN_LINES {
                eprintln!(
                    "  {} has {lines} lines — declaring!",
                    player.name
                );
                by_id(player.id).declare_win(lines).await?;
                next_event(&mut ada_events, |e| {
                    matches!(e, PeerEvent::GameOver { .. })
                })
                .await;
                break;
            }
        }
    };

    let session = ada.session().await?.expect("session");
    let name = session
        .player(winner)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| winner.to_string());
    eprintln!("winner: {name}");

    // Everyone observed the same ending.
    for events in [&mut brin_events, &mut cora_events] {
        next_event(events, |e| matches!(e, PeerEvent::GameOver { .. }))
            .await;
    }

    ada.leave().await?;
    brin.leave().await.ok();
    cora.leave().await.ok();
    Ok(())
}
