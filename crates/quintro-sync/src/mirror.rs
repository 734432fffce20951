//! The client-side mirror.
//!
//! Every non-host peer holds a [`ClientMirror`]: a read-mostly copy of
//! the session, overwritten wholesale by snapshots and nudged forward
//! by deltas. Two rules define it:
//!
//! - **Snapshots always win.** [`ClientMirror::apply_snapshot`] replaces
//!   the entire mirror and is idempotent — applying the same snapshot
//!   twice is a no-op. This is the universal desync repair.
//! - **Deltas are checked, never trusted.** A delta whose implied
//!   previous state doesn't match the mirror means a message was
//!   missed; the mirror reports [`DeltaOutcome::Desynced`] and the peer
//!   loop requests a fresh snapshot instead of guessing at incremental
//!   repair.
//!
//! The mirror also remembers the one local intent in flight. An intent
//! is never retried: it's confirmed by observing its own broadcast,
//! or abandoned when any snapshot arrives or the host rejects it.

use tracing::{debug, info, warn};

use quintro_protocol::{PlayerId, SessionSnapshot, SessionStatus};
use quintro_state::GameSession;

use crate::SyncError;

/// Result of applying a delta to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The delta fit the mirror's state and was applied.
    Applied,
    /// The delta's implied previous state doesn't match — a message was
    /// missed. The caller should request a fresh snapshot.
    Desynced,
}

/// A local intent sent toward the host and not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingIntent {
    Call(u8),
    DeclareWin(u8),
}

/// The non-host peer's copy of the session.
pub struct ClientMirror {
    /// Whose mirror this is — used to recognize our own confirmations.
    me: PlayerId,
    /// `None` until the first snapshot lands.
    session: Option<GameSession>,
    pending: Option<PendingIntent>,
}

impl ClientMirror {
    /// An empty mirror for the local player; populated by the first
    /// snapshot.
    pub fn new(me: PlayerId) -> Self {
        Self {
            me,
            session: None,
            pending: None,
        }
    }

    /// The mirrored session, if any snapshot has landed yet.
    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    /// The host this mirror currently believes in.
    pub fn expected_host(&self) -> Option<PlayerId> {
        self.session.as_ref().map(|s| s.host_id)
    }

    /// The unconfirmed local intent, if one is in flight.
    pub fn pending(&self) -> Option<PendingIntent> {
        self.pending
    }

    /// Remembers a just-sent local intent.
    pub fn set_pending(&mut self, intent: PendingIntent) {
        self.pending = Some(intent);
    }

    /// Drops the in-flight intent (host rejected it, or the caller is
    /// giving up). Never resend — the authoritative broadcast is the
    /// only truth about whether it landed.
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    // -- Snapshot ----------------------------------------------------------

    /// Replaces the whole mirror with a snapshot. Returns `true` if the
    /// mirror changed (`false` = duplicate snapshot, nothing to do).
    ///
    /// Any pending intent is abandoned: it was formed against a state
    /// that no longer exists, and replaying it against the new snapshot
    /// could double-apply.
    ///
    /// # Errors
    /// [`SyncError::State`] if the snapshot fails invariant validation;
    /// the mirror keeps its previous state.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &SessionSnapshot,
    ) -> Result<bool, SyncError> {
        let incoming = GameSession::from_snapshot(snapshot)?;

        if self.pending.take().is_some() {
            debug!("pending intent abandoned by snapshot");
        }

        if self.session.as_ref() == Some(&incoming) {
            return Ok(false);
        }

        debug!(
            status = %incoming.status,
            players = incoming.players.len(),
            calls = incoming.called_numbers.len(),
            "mirror replaced by snapshot"
        );
        self.session = Some(incoming);
        Ok(true)
    }

    // -- Deltas ------------------------------------------------------------

    /// Applies a `start-game` delta.
    pub fn apply_start(&mut self, first_turn_index: usize) -> DeltaOutcome {
        let Some(session) = &self.session else {
            return DeltaOutcome::Desynced;
        };
        match session.start(Some(first_turn_index)) {
            Ok(next) => {
                self.session = Some(next);
                DeltaOutcome::Applied
            }
            Err(e) => {
                debug!(%e, "start delta does not fit the mirror");
                DeltaOutcome::Desynced
            }
        }
    }

    /// Applies a `number-called` delta: append the number, move the
    /// turn. The delta encodes its expected successor index, which is
    /// checked against what the mirror would compute — any mismatch
    /// means a gap.
    pub fn apply_number_called(
        &mut self,
        number: u8,
        called_by: PlayerId,
        next_turn_index: usize,
    ) -> DeltaOutcome {
        let Some(session) = &self.session else {
            return DeltaOutcome::Desynced;
        };
        if session.status != SessionStatus::Playing {
            return DeltaOutcome::Desynced;
        }
        // The caller must have held the turn in the state this delta
        // was produced from; if our mirror disagrees, we missed one.
        if !session.is_turn_holder(called_by) {
            debug!(
                %called_by,
                turn = session.current_turn_index,
                "delta caller is not the mirror's turn holder"
            );
            return DeltaOutcome::Desynced;
        }

        let advanced = match session.call_number(number) {
            Ok(next) => next.advance_turn(),
            Err(e) => {
                debug!(number, %e, "number delta does not fit the mirror");
                return DeltaOutcome::Desynced;
            }
        };
        if advanced.current_turn_index != next_turn_index {
            debug!(
                expected = next_turn_index,
                computed = advanced.current_turn_index,
                "delta turn index disagrees with the mirror"
            );
            return DeltaOutcome::Desynced;
        }

        // Our own call coming back is its confirmation.
        if called_by == self.me
            && self.pending == Some(PendingIntent::Call(number))
        {
            self.pending = None;
        }

        self.session = Some(advanced);
        DeltaOutcome::Applied
    }

    /// Applies a `game-over` delta. Re-announcing the same winner is
    /// idempotent.
    pub fn apply_game_over(&mut self, winner: PlayerId) -> DeltaOutcome {
        let Some(session) = &self.session else {
            return DeltaOutcome::Desynced;
        };
        if session.status == SessionStatus::Completed {
            return if session.winner_id == Some(winner) {
                DeltaOutcome::Applied
            } else {
                DeltaOutcome::Desynced
            };
        }
        match session.end(winner) {
            Ok(next) => {
                info!(%winner, "game over");
                self.pending = None;
                self.session = Some(next);
                DeltaOutcome::Applied
            }
            Err(e) => {
                debug!(%e, "game-over delta does not fit the mirror");
                DeltaOutcome::Desynced
            }
        }
    }

    // -- Failover ----------------------------------------------------------

    /// The host is gone for good. Applies the deterministic promotion
    /// to the mirror (drop the old host, the earliest-joined survivor
    /// inherits) and returns the new host id.
    ///
    /// Every peer runs this same pure computation over the same
    /// synchronized roster, so every peer lands on the same answer —
    /// including the successor itself, which is how it knows to start
    /// acting as host.
    pub fn host_lost(&mut self) -> Option<PlayerId> {
        let session = self.session.as_ref()?;
        let old_host = session.host_id;
        let next = session.remove_player(old_host);
        if next.players.is_empty() {
            warn!("host lost with no survivors");
            self.session = None;
            return None;
        }
        let new_host = next.host_id;
        info!(%old_host, %new_host, "host lost, successor promoted");
        self.pending = None;
        self.session = Some(next);
        Some(new_host)
    }
}

// =========================================================================
// Tests
// =========================================================================
