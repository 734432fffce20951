//! Transport contract for Quintro.
//!
//! The real product runs in browsers where some WebRTC library provides
//! the room: join, leave, broadcast, and peer-presence callbacks. This
//! crate pins that external contract down as the [`RoomTransport`]
//! trait, so the synchronization engine can be driven by anything that
//! moves bytes between named peers.
//!
//! The contract is deliberately weak — matching what a real mesh
//! actually guarantees:
//!
//! - delivery is best-effort, **at most once** per send;
//! - there is no ordering across different peers;
//! - peer-joined / peer-left events say something about the *channel*,
//!   not about the game roster (that distinction belongs to the layers
//!   above).
//!
//! # Feature flags
//!
//! - `memory` (default) — [`MemoryHub`]/[`MemoryMesh`]: an in-process
//!   mesh over channels; what the tests and the demo run on. Can drop
//!   messages on demand to exercise desync repair.
//! - `websocket` — [`WsRelay`]/[`WsMesh`]: a hub-relay mesh over
//!   `tokio-tungstenite`, for running native peers across processes.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryHub, MemoryMesh};
#[cfg(feature = "websocket")]
pub use websocket::{WsMesh, WsRelay};

use quintro_protocol::PlayerId;

/// Something the mesh reported: a payload or a presence change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload arrived from another peer.
    Message { from: PlayerId, data: Vec<u8> },
    /// A peer's channel came up.
    PeerJoined(PlayerId),
    /// A peer's channel dropped. Says nothing about whether they will
    /// be back — that judgement is the presence layer's.
    PeerLeft(PlayerId),
}

/// One peer's handle onto the room mesh.
pub trait RoomTransport: Send + 'static {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Best-effort broadcast to every connected peer.
    fn broadcast(
        &self,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Best-effort send to one peer. Sending to an unknown peer is a
    /// silent no-op, like a packet into the void.
    fn send_to(
        &self,
        peer: PlayerId,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Waits for the next event. `Ok(None)` means the transport is
    /// finished (we left, or the mesh is gone).
    fn recv(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<TransportEvent>, Self::Error>>
           + Send;

    /// Peers whose channels are currently up, from this peer's view.
    fn peers(&self) -> Vec<PlayerId>;

    /// Leaves the room, telling the mesh to notify the others.
    fn leave(
        &self,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}
