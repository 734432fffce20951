//! Wire protocol for Quintro.
//!
//! This crate defines the "language" the peers speak:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`SessionStatus`], …) — the
//!   identity and status vocabulary shared by every layer.
//! - **Messages** ([`GameMessage`], [`SessionSnapshot`]) — the closed,
//!   tagged set of payloads that travel between peers, plus the boundary
//!   validation that keeps malformed data out of the session logic.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong on the way in.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes from some
//! P2P mesh) and the session logic (the host's authority and the
//! clients' mirrors). It knows nothing about who is host or whose turn
//! it is — it only knows whether a payload is a well-formed message.
//!
//! ```text
//! Transport (bytes) → Protocol (GameMessage) → Host authority / Mirror
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    GameMessage, MAX_NAME_LEN, MAX_PLAYERS, NUMBER_MAX, NUMBER_MIN,
    PlayerRecord, SessionSnapshot,
};
pub use types::{
    ConnectionStatus, PlayerId, Recipient, RoomId, SessionStatus,
};
