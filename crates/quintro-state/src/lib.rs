//! Pure session state machine for Quintro.
//!
//! This crate is the single source of truth for what a legal session
//! transition is. The host authority, the client mirrors, and the
//! failover logic all call [`GameSession`]'s transition methods rather
//! than touching fields — which is what makes every accepted transition
//! independently replayable and testable without a network.
//!
//! Nothing here does I/O. Timestamps come in as arguments, randomness is
//! confined to the optional first-turn pick, and every transition
//! returns a fresh value instead of mutating in place.

mod error;
mod session;

pub use error::StateError;
pub use session::{GameSession, MIN_PLAYERS, Player};
