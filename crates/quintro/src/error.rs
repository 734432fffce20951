//! Error type for the peer facade.

/// Errors surfaced to the embedding application.
///
/// Gameplay rejections are *not* errors — they arrive as
/// [`PeerEvent::ActionRejected`](crate::PeerEvent::ActionRejected) and
/// the UI shows a toast or nothing at all. This enum is for the peer
/// itself breaking.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The peer's event loop has stopped (we left the room, or the
    /// transport went away); commands can no longer be delivered.
    #[error("peer has stopped")]
    Stopped,

    /// The transport failed while setting the peer up.
    #[error("transport failed: {0}")]
    Transport(String),
}
