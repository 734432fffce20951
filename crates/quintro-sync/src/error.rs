//! Error types for the synchronization layer.

use quintro_protocol::PlayerId;
use quintro_state::StateError;

/// Why the authority refused an action, or why a snapshot was unusable.
///
/// These are gameplay-race rejections, not failures: the authoritative
/// session is guaranteed untouched, and the losing peer is expected to
/// discard the intent silently (the next broadcast shows the truth).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The acting player does not hold the current turn.
    #[error("not your turn")]
    NotYourTurn,

    /// A peer tried to act on behalf of a different player.
    #[error("peer {0} cannot act for player {1}")]
    NotYourAction(PlayerId, PlayerId),

    /// The claimed completed lines are not supported by the called
    /// numbers.
    #[error("win claim of {0} lines is not supported by the called numbers")]
    WinClaimRejected(u8),

    /// The underlying state transition was rejected.
    #[error(transparent)]
    State(#[from] StateError),
}
