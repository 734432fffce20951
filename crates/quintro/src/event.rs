//! Events surfaced to the embedding application.

use quintro_protocol::{ConnectionStatus, PlayerId};
use quintro_state::GameSession;

/// What happened, from the local peer's point of view.
///
/// The UI renders from these; none of them require a response. Failure
/// is always "no visible change plus maybe a toast" — there is no event
/// that demands recovery action from the user, because the engine
/// self-heals through snapshots.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The local copy of the session changed (snapshot applied, roster
    /// changed, game started or reset). Carries the full new value.
    SessionChanged(GameSession),

    /// A number was accepted — the low-latency delta, already applied
    /// to the local copy.
    NumberCalled {
        number: u8,
        by: PlayerId,
        next_turn_index: usize,
    },

    /// The game ended with a confirmed winner.
    GameOver { winner: PlayerId },

    /// Authority moved to a different peer.
    HostChanged { new_host: PlayerId },

    /// This peer is now the host.
    BecameHost,

    /// The host declined one of our actions. Informational; the intent
    /// was already discarded and must not be retried.
    ActionRejected { reason: String },

    /// Our mirror noticed a gap and asked the host for a snapshot.
    ResyncRequested,

    /// A snapshot arrived from a peer that isn't our current host.
    /// Possible split-brain after a partition; flagged, never merged.
    SplitBrainSuspected { claimed_host: PlayerId },

    /// A player's liveness changed.
    PresenceChanged {
        player: PlayerId,
        status: ConnectionStatus,
    },
}
