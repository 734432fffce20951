//! Host authority and client reconciliation for Quintro.
//!
//! Authority flows one way (peer → host → everyone) and information
//! flows one way (host → everyone); this crate is both ends of that
//! star:
//!
//! - [`HostAuthority`] runs on the one peer flagged as host. It owns
//!   the authoritative session, validates every action through the
//!   state machine, and emits recipient-routed broadcasts — full
//!   snapshots where a peer might lack prior state, small deltas where
//!   latency matters.
//! - [`ClientMirror`] runs on everyone else: wholesale snapshot
//!   replacement, checked delta application with desync detection, and
//!   pending-intent bookkeeping (send, observe, never retry).
//! - [`WinCheck`] is the seam to the card logic that deliberately
//!   lives outside this engine; [`SeededCards`] is the bundled
//!   deterministic implementation.
//!
//! Neither half does I/O. The peer event loop owns the transport and
//! the timers; this crate owns the rules.

mod error;
mod host;
mod mirror;
mod wincheck;

pub use error::SyncError;
pub use host::{HostAuthority, Outgoing};
pub use mirror::{ClientMirror, DeltaOutcome, PendingIntent};
pub use wincheck::{SeededCards, TOTAL_LINES, WIN_LINES, WinCheck};
