//! The host authority.
//!
//! Exactly one peer runs a [`HostAuthority`] at a time. It owns the
//! authoritative [`GameSession`], funnels every inbound action through
//! the state machine (never touching fields directly), and answers with
//! recipient-routed messages for the peer loop to dispatch.
//!
//! Rejections are quiet by design: the session is left untouched, a
//! private [`GameMessage::ActionRejected`] goes back to the sender, and
//! nothing is broadcast. The losing peer's mirror simply catches up on
//! the next broadcast. Because the peer loop processes one message at a
//! time, "first received, first applied" is well-defined even when two
//! peers race to call different numbers.

use tracing::{debug, info};

use quintro_protocol::{GameMessage, PlayerId, Recipient, SessionStatus};
use quintro_state::GameSession;

use crate::{SyncError, WIN_LINES, WinCheck};

/// Messages the peer loop should deliver, paired with their audience.
pub type Outgoing = Vec<(Recipient, GameMessage)>;

/// The single writer for one session.
pub struct HostAuthority<W: WinCheck> {
    session: GameSession,
    win_check: W,
}

impl<W: WinCheck> HostAuthority<W> {
    /// Takes authority over an existing session value — fresh from
    /// [`GameSession::create`], or a mirror's copy after failover.
    pub fn new(session: GameSession, win_check: W) -> Self {
        Self { session, win_check }
    }

    /// The authoritative session.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Releases the session value (e.g. when this peer stops hosting).
    pub fn into_session(self) -> GameSession {
        self.session
    }

    // -- Inbound wire actions ---------------------------------------------
    //
    // `from` is always the transport-level sender, which may differ from
    // the player id inside the message; a mismatch is rejected before
    // anything else is looked at.

    /// A peer asks to join the lobby. Success broadcasts a full
    /// snapshot — the newcomer has no prior state a delta could build on.
    pub fn on_player_join(
        &mut self,
        from: PlayerId,
        name: &str,
        now: u64,
    ) -> Outgoing {
        match self.session.add_player(from, name, now) {
            Ok(next) => {
                info!(player = %from, players = next.players.len(), "player joined");
                self.session = next;
                vec![(Recipient::All, self.snapshot_message())]
            }
            Err(e) => self.reject(from, e.into()),
        }
    }

    /// A peer wants to call a number on their turn.
    ///
    /// Accepted only when the sender is the claimed player *and* holds
    /// the current turn *and* the number passes the state machine. On
    /// success the turn advances and a delta — not a snapshot — goes
    /// out.
    pub fn on_call_number(
        &mut self,
        from: PlayerId,
        claimed: PlayerId,
        number: u8,
    ) -> Outgoing {
        if from != claimed {
            return self.reject(
                from,
                SyncError::NotYourAction(from, claimed),
            );
        }
        if !self.session.is_turn_holder(claimed) {
            return self.reject(from, SyncError::NotYourTurn);
        }

        match self.session.call_number(number) {
            Ok(next) => {
                let next = next.advance_turn();
                let delta = GameMessage::NumberCalled {
                    number,
                    called_by: claimed,
                    next_turn_index: next.current_turn_index,
                };
                info!(
                    number,
                    by = %claimed,
                    next_turn = next.current_turn_index,
                    "number called"
                );
                self.session = next;
                vec![(Recipient::All, delta)]
            }
            Err(e) => self.reject(from, e.into()),
        }
    }

    /// A peer claims a winning card.
    ///
    /// Cards never travel, so the claim is re-validated here: the
    /// [`WinCheck`] recomputes the player's completed lines from the
    /// public call history, and only a confirmed claim ends the game.
    pub fn on_declare_winner(
        &mut self,
        from: PlayerId,
        claimed: PlayerId,
        lines: u8,
    ) -> Outgoing {
        if from != claimed {
            return self.reject(
                from,
                SyncError::NotYourAction(from, claimed),
            );
        }
        if lines < WIN_LINES {
            return self.reject(from, SyncError::WinClaimRejected(lines));
        }
        let verified = self
            .win_check
            .completed_lines(claimed, &self.session.called_numbers);
        if verified < WIN_LINES {
            return self.reject(from, SyncError::WinClaimRejected(lines));
        }

        match self.session.end(claimed) {
            Ok(next) => {
                info!(winner = %claimed, lines = verified, "game over");
                self.session = next;
                vec![(
                    Recipient::All,
                    GameMessage::GameOver { winner_id: claimed },
                )]
            }
            Err(e) => self.reject(from, e.into()),
        }
    }

    /// A peer's mirror went stale; answer with a private snapshot.
    /// Sending the same snapshot any number of times is harmless —
    /// applying it is idempotent on the mirror side.
    pub fn on_request_sync(&self, player: PlayerId) -> Outgoing {
        debug!(%player, "resync requested");
        vec![(Recipient::Peer(player), self.snapshot_message())]
    }

    /// A player is gone for good — explicit leave, or the grace window
    /// expired. Removing the turn holder hands the turn to the next
    /// player in order; everyone gets a snapshot since roster changes
    /// ripple into turn order.
    pub fn on_player_gone(&mut self, player: PlayerId) -> Outgoing {
        if self.session.player(player).is_none() {
            return Vec::new();
        }

        let next = self.session.remove_player(player);
        info!(%player, players = next.players.len(), "player removed");
        self.session = next;

        if self.session.players.is_empty() {
            return Vec::new();
        }
        vec![(Recipient::All, self.snapshot_message())]
    }

    /// A player's liveness changed (channel dropped, or came back
    /// within the grace window). The roster keeps their slot; only the
    /// status field moves, and everyone hears about it through a
    /// snapshot so lobby UIs stay truthful.
    pub fn on_presence_change(
        &mut self,
        player: PlayerId,
        status: quintro_protocol::ConnectionStatus,
    ) -> Outgoing {
        match self.session.player(player) {
            Some(p) if p.connection != status => {}
            _ => return Vec::new(),
        }
        self.session = self.session.set_connection(player, status);
        debug!(%player, ?status, "presence updated");
        vec![(Recipient::All, self.snapshot_message())]
    }

    /// The turn deadline fired. `expected_turn` is the index the timer
    /// was armed for — if the session has moved on since, the expiry is
    /// stale and ignored (no double advance).
    pub fn on_turn_timeout(&mut self, expected_turn: usize) -> Outgoing {
        if self.session.status != SessionStatus::Playing {
            return Vec::new();
        }
        if self.session.current_turn_index != expected_turn {
            debug!(
                expected_turn,
                actual = self.session.current_turn_index,
                "stale turn deadline ignored"
            );
            return Vec::new();
        }

        let next = self.session.advance_turn();
        info!(
            skipped = expected_turn,
            next_turn = next.current_turn_index,
            "turn skipped on timeout"
        );
        self.session = next;
        vec![(Recipient::All, self.snapshot_message())]
    }

    // -- Local intents (the host's own UI) --------------------------------

    /// Starts the game. Host-only by construction — only the peer
    /// running the authority can reach this.
    pub fn start(
        &mut self,
        first_turn: Option<usize>,
    ) -> Result<Outgoing, SyncError> {
        let next = self.session.start(first_turn)?;
        let first_turn_index = next.current_turn_index;
        info!(first_turn_index, "game started");
        self.session = next;
        Ok(vec![
            (Recipient::All, GameMessage::StartGame { first_turn_index }),
            (Recipient::All, self.snapshot_message()),
        ])
    }

    /// Replaces the finished session with a fresh lobby for the same
    /// roster.
    pub fn play_again(&mut self, now: u64) -> Outgoing {
        self.session = self.session.play_again(now);
        info!("rematch lobby opened");
        vec![(Recipient::All, self.snapshot_message())]
    }

    // -- Helpers ----------------------------------------------------------

    fn snapshot_message(&self) -> GameMessage {
        GameMessage::SyncState {
            session: self.session.to_snapshot(),
        }
    }

    fn reject(&self, to: PlayerId, why: SyncError) -> Outgoing {
        debug!(peer = %to, %why, "action rejected");
        vec![(
            Recipient::Peer(to),
            GameMessage::ActionRejected {
                reason: why.to_string(),
            },
        )]
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quintro_protocol::RoomId;
    use quintro_state::StateError;

    /// A win checker with a fixed answer, for driving the authority
    /// without real cards.
    struct FixedLines(u8);

    impl WinCheck for FixedLines {
        fn completed_lines(&self, _: PlayerId, _: &[u8]) -> u8 {
            self.0
        }
    }

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn lobby_host(lines: u8) -> HostAuthority<FixedLines> {
        let session = GameSession::create(
            RoomId("QUIN7".into()),
            pid(1),
            "ada",
            100,
        );
        HostAuthority::new(session, FixedLines(lines))
    }

    /// Host + two joined players, game started, turn at index 0 (ada).
    fn playing_host(lines: u8) -> HostAuthority<FixedLines> {
        let mut host = lobby_host(lines);
        host.on_player_join(pid(2), "brin", 200);
        host.on_player_join(pid(3), "cora", 300);
        host.start(Some(0)).unwrap();
        host
    }

    fn is_snapshot(msg: &GameMessage) -> bool {
        matches!(msg, GameMessage::SyncState { .. })
    }

    fn is_private_rejection(
        out: &Outgoing,
        to: PlayerId,
    ) -> bool {
        matches!(
            out.as_slice(),
            [(Recipient::Peer(p), GameMessage::ActionRejected { .. })]
                if *p == to
        )
    }

    // =====================================================================
    // on_player_join
    // =====================================================================

    #[test]
    fn test_on_player_join_broadcasts_full_snapshot() {
        let mut host = lobby_host(0);

        let out = host.on_player_join(pid(2), "brin", 200);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, Recipient::All);
        assert!(is_snapshot(&out[0].1));
        assert_eq!(host.session().players.len(), 2);
    }

    #[test]
    fn test_on_player_join_after_start_rejected_privately() {
        let mut host = playing_host(0);
        let before = host.session().clone();

        let out = host.on_player_join(pid(9), "late", 900);

        assert!(is_private_rejection(&out, pid(9)));
        assert_eq!(host.session(), &before, "session unchanged");
    }

    // =====================================================================
    // on_call_number
    // =====================================================================

    #[test]
    fn test_on_call_number_by_holder_broadcasts_delta() {
        let mut host = playing_host(0);

        let out = host.on_call_number(pid(1), pid(1), 17);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, Recipient::All);
        assert_eq!(
            out[0].1,
            GameMessage::NumberCalled {
                number: 17,
                called_by: pid(1),
                next_turn_index: 1,
            }
        );
        assert_eq!(host.session().called_numbers, vec![17]);
        assert_eq!(host.session().current_turn_index, 1);
    }

    #[test]
    fn test_on_call_number_by_non_holder_leaves_session_unchanged() {
        let mut host = playing_host(0);
        let before = host.session().clone();

        // brin (index 1) tries to call while it's ada's turn.
        let out = host.on_call_number(pid(2), pid(2), 17);

        assert!(is_private_rejection(&out, pid(2)));
        assert_eq!(host.session(), &before);
    }

    #[test]
    fn test_on_call_number_impersonation_rejected() {
        let mut host = playing_host(0);
        let before = host.session().clone();

        // brin claims to be ada (the holder).
        let out = host.on_call_number(pid(2), pid(1), 17);

        assert!(is_private_rejection(&out, pid(2)));
        assert_eq!(host.session(), &before);
    }

    #[test]
    fn test_on_call_number_repeat_rejected() {
        let mut host = playing_host(0);
        host.on_call_number(pid(1), pid(1), 17);
        // Turn moved to brin; brin repeats the number.
        let before = host.session().clone();

        let out = host.on_call_number(pid(2), pid(2), 17);

        assert!(is_private_rejection(&out, pid(2)));
        assert_eq!(host.session(), &before);
    }

    #[test]
    fn test_on_call_number_race_first_processed_wins() {
        // Two peers race; the authority serializes them. ada's call is
        // processed first and wins; brin's (now out of turn) loses and
        // nothing about ada's accepted call changes.
        let mut host = playing_host(0);

        let first = host.on_call_number(pid(1), pid(1), 17);
        let second = host.on_call_number(pid(3), pid(3), 21);

        assert!(matches!(
            first[0].1,
            GameMessage::NumberCalled { number: 17, .. }
        ));
        assert!(is_private_rejection(&second, pid(3)));
        assert_eq!(host.session().called_numbers, vec![17]);
    }

    // =====================================================================
    // on_declare_winner
    // =====================================================================

    #[test]
    fn test_on_declare_winner_verified_ends_game() {
        let mut host = playing_host(5);

        let out = host.on_declare_winner(pid(1), pid(1), 5);

        assert_eq!(
            out,
            vec![(
                Recipient::All,
                GameMessage::GameOver { winner_id: pid(1) }
            )]
        );
        assert_eq!(host.session().winner_id, Some(pid(1)));
        assert_eq!(host.session().status, SessionStatus::Completed);
    }

    #[test]
    fn test_on_declare_winner_unverified_claim_rejected() {
        // The peer claims 5 lines but the public call history only
        // supports 4 — the claim dies here.
        let mut host = playing_host(4);
        let before = host.session().clone();

        let out = host.on_declare_winner(pid(1), pid(1), 5);

        assert!(is_private_rejection(&out, pid(1)));
        assert_eq!(host.session(), &before);
    }

    #[test]
    fn test_on_declare_winner_low_claim_rejected_without_checking() {
        let mut host = playing_host(12);
        let out = host.on_declare_winner(pid(1), pid(1), 4);
        assert!(is_private_rejection(&out, pid(1)));
    }

    #[test]
    fn test_on_declare_winner_works_for_non_holder() {
        // Any player may win at any time — completing a line doesn't
        // require holding the turn.
        let mut host = playing_host(5);

        let out = host.on_declare_winner(pid(3), pid(3), 5);

        assert!(matches!(
            out[0].1,
            GameMessage::GameOver { winner_id } if winner_id == pid(3)
        ));
    }

    // =====================================================================
    // on_player_gone
    // =====================================================================

    #[test]
    fn test_on_player_gone_removes_and_broadcasts_snapshot() {
        let mut host = playing_host(0);

        let out = host.on_player_gone(pid(3));

        assert_eq!(out.len(), 1);
        assert!(is_snapshot(&out[0].1));
        assert!(host.session().player(pid(3)).is_none());
    }

    #[test]
    fn test_on_player_gone_turn_holder_hands_turn_on() {
        let mut host = playing_host(0);
        assert!(host.session().is_turn_holder(pid(1)));

        host.on_player_gone(pid(1));

        // ada held the turn; with her gone the turn belongs to brin.
        assert!(host.session().is_turn_holder(pid(2)));
    }

    #[test]
    fn test_on_player_gone_unknown_is_silent() {
        let mut host = playing_host(0);
        let out = host.on_player_gone(pid(42));
        assert!(out.is_empty());
    }

    // =====================================================================
    // on_turn_timeout
    // =====================================================================

    #[test]
    fn test_on_turn_timeout_advances_exactly_one_position() {
        let mut host = playing_host(0);

        let out = host.on_turn_timeout(0);

        assert!(is_snapshot(&out[0].1));
        assert_eq!(host.session().current_turn_index, 1);
    }

    #[test]
    fn test_on_turn_timeout_stale_index_ignored() {
        let mut host = playing_host(0);
        host.on_call_number(pid(1), pid(1), 17); // turn is now 1

        // A deadline armed for turn 0 fires late.
        let out = host.on_turn_timeout(0);

        assert!(out.is_empty());
        assert_eq!(
            host.session().current_turn_index,
            1,
            "no double advance"
        );
    }

    #[test]
    fn test_on_turn_timeout_outside_playing_ignored() {
        let mut host = lobby_host(0);
        assert!(host.on_turn_timeout(0).is_empty());
    }

    // =====================================================================
    // start / play_again
    // =====================================================================

    #[test]
    fn test_start_broadcasts_delta_then_snapshot() {
        let mut host = lobby_host(0);
        host.on_player_join(pid(2), "brin", 200);

        let out = host.start(Some(1)).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].1,
            GameMessage::StartGame { first_turn_index: 1 }
        );
        assert!(is_snapshot(&out[1].1));
        assert_eq!(host.session().status, SessionStatus::Playing);
    }

    #[test]
    fn test_start_single_player_errors() {
        let mut host = lobby_host(0);
        let result = host.start(None);
        assert!(matches!(
            result,
            Err(SyncError::State(StateError::NotEnoughPlayers(_)))
        ));
    }

    #[test]
    fn test_play_again_opens_fresh_lobby() {
        let mut host = playing_host(5);
        host.on_call_number(pid(1), pid(1), 17);
        host.on_declare_winner(pid(2), pid(2), 5);

        let out = host.play_again(9_000);

        assert!(is_snapshot(&out[0].1));
        assert_eq!(host.session().status, SessionStatus::Lobby);
        assert!(host.session().called_numbers.is_empty());
        assert_eq!(host.session().players.len(), 3);
    }
}
