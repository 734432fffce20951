//! Error type for session transitions.
//!
//! A `StateError` is a *rejection*, not a failure: the transition
//! returned no new session and the caller still holds the old one,
//! untouched. Ordinary gameplay races (two peers calling at once, a
//! late join) all land here; nothing in this crate panics for them.

use quintro_protocol::PlayerId;

/// Why a session transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Joins are only accepted while the session is in the lobby.
    #[error("the game has already started")]
    GameAlreadyStarted,

    /// The player roster is at its cap.
    #[error("the game is full ({0} players)")]
    GameFull(usize),

    /// The joining id is already on the roster.
    #[error("player {0} already joined")]
    AlreadyJoined(PlayerId),

    /// Starting needs a minimum roster.
    #[error("need at least {0} players to start")]
    NotEnoughPlayers(usize),

    /// The chosen first-turn index doesn't point at a player.
    #[error("turn index {0} is out of range")]
    TurnIndexOutOfRange(usize),

    /// The number is outside the callable domain.
    #[error("number {0} is out of range")]
    NumberOutOfRange(u8),

    /// The number has been called before in this session.
    #[error("number {0} was already called")]
    AlreadyCalled(u8),

    /// The operation only makes sense while the game is in progress.
    #[error("the game is not in progress")]
    NotPlaying,

    /// The referenced player is not on the roster.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// A snapshot from the wire describes a session this state machine
    /// considers unreachable.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
