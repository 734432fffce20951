//! # Quintro
//!
//! Peer-to-peer session synchronization for a 2–5 player number-calling
//! game. No central server: one peer — the host — holds the
//! authoritative session, every state-changing action funnels through
//! it, and the other peers hold self-healing mirrors. When the host
//! vanishes, every survivor independently computes the same successor
//! from already-shared state, so failover needs no election round.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use quintro::{MemoryHub, PeerBuilder, PlayerId};
//!
//! # async fn demo() -> Result<(), quintro::PeerError> {
//! let hub = MemoryHub::new();
//! let room = quintro::generate_room_code();
//!
//! let ada = PlayerId(rand::random());
//! let (host, mut host_events) = PeerBuilder::new("ada")
//!     .with_player_id(ada)
//!     .host(hub.join(ada), room.clone())
//!     .await?;
//!
//! let brin = PlayerId(rand::random());
//! let (guest, mut guest_events) = PeerBuilder::new("brin")
//!     .with_player_id(brin)
//!     .join(hub.join(brin), room)
//!     .await?;
//!
//! host.start(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The layers underneath are reusable on their own:
//! `quintro-state` (the pure session state machine), `quintro-protocol`
//! (wire messages and validation), `quintro-sync` (host authority and
//! client mirror), `quintro-transport` (the mesh contract),
//! `quintro-presence` and `quintro-timer` (liveness and deadlines).

mod config;
mod error;
mod event;
mod peer;
mod recovery;

pub use config::PeerConfig;
pub use error::PeerError;
pub use event::PeerEvent;
pub use peer::{PeerBuilder, PeerHandle};
pub use recovery::RecoveryRecord;

// The vocabulary the embedding application needs, re-exported so a
// simple integration depends on this crate alone.
pub use quintro_protocol::{
    ConnectionStatus, GameMessage, PlayerId, RoomId, SessionStatus,
};
pub use quintro_state::{GameSession, Player};
pub use quintro_sync::{SeededCards, WIN_LINES, WinCheck};
pub use quintro_transport::{
    MemoryHub, MemoryMesh, RoomTransport, TransportEvent,
};

use rand::Rng;

/// Mints a short room code: five characters, uppercase, with the
/// easily-confused letters (I/O vs 1/0) left out so it survives being
/// read aloud.
pub fn generate_room_code() -> RoomId {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();
    let code: String = (0..5)
        .map(|_| {
            let i = rng.random_range(0..ALPHABET.len());
            ALPHABET[i] as char
        })
        .collect();
    RoomId(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_room_code_shape() {
        let code = generate_room_code();
        assert_eq!(code.0.len(), 5);
        assert!(code.0.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!code.0.contains(['I', 'O', '0', '1']));
    }

    #[test]
    fn test_generate_room_code_varies() {
        // 32^5 codes; two draws colliding means the generator is broken.
        assert_ne!(generate_room_code(), generate_room_code());
    }
}
