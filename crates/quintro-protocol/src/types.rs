//! Identity and status types shared by every layer.
//!
//! Everything in this module travels on the wire, so each type derives
//! `Serialize`/`Deserialize` and pins down its exact JSON shape — a peer
//! running an older build must still be able to parse what we send.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a player id can never be confused with a called
/// number or an index. There is no server to hand out ids, so each peer
/// mints its own at startup; 64 random bits make a collision between five
/// peers vanishingly unlikely.
///
/// `#[serde(transparent)]` keeps the wire shape a plain number: a
/// `PlayerId(42)` serializes as `42`, not `{"0":42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{:x}", self.0)
    }
}

/// The room code identifying one shared session.
///
/// Opaque short string — room codes get read out loud between friends,
/// so they stay short and uppercase. Same newtype pattern as
/// [`PlayerId`], but string-backed and therefore not `Copy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Normalizes a user-entered code (trims, uppercases).
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle of a session. Forward-only: `Lobby → Playing → Completed`.
/// A rematch produces a brand-new session rather than rewinding this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Gathering players; the only phase that accepts joins.
    Lobby,
    /// Numbers are being called. Turn order is live.
    Playing,
    /// A winner was confirmed. Terminal.
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Playing => write!(f, "playing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// How reachable a player currently looks from this peer's perspective.
///
/// ```text
///   Connected ──(channel drops)──→ Reconnecting ──(grace elapses)──→ Disconnected
///       ↑                               │
///       └──────(channel restored)───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    Disconnected,
}

// ---------------------------------------------------------------------------
// Recipient — who should receive an outbound message?
// ---------------------------------------------------------------------------

/// Routing instruction attached to each outbound message.
///
/// The host's handlers return `(Recipient, GameMessage)` pairs; the peer
/// loop turns these into broadcast or targeted sends. Rejections go back
/// to the offender only, snapshots and deltas go to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected peer.
    All,
    /// One specific peer.
    Peer(PlayerId),
    /// Everyone except the named peer.
    AllExcept(PlayerId),
}
