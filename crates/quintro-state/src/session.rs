//! The session state machine.
//!
//! Everything here is pure and synchronous: a transition takes `&self`
//! plus its inputs and returns a **new** [`GameSession`] (or a
//! [`StateError`] rejection, leaving the original untouched). No I/O, no
//! clocks, no randomness except the optional first-turn pick in
//! [`GameSession::start`]. That makes every rule independently
//! replayable: the host authority, the client mirrors, and the tests all
//! call these same functions instead of poking at fields.
//!
//! The returned-value style is what keeps concurrent reads safe on a
//! peer: whoever holds an old session value holds a consistent (if
//! stale) snapshot, because nothing is ever mutated in place.

use rand::Rng;
use serde::{Deserialize, Serialize};

use quintro_protocol::{
    ConnectionStatus, MAX_PLAYERS, NUMBER_MAX, NUMBER_MIN, PlayerId,
    PlayerRecord, RoomId, SessionSnapshot, SessionStatus,
};

use crate::StateError;

/// Minimum roster size before a game can start.
pub const MIN_PLAYERS: usize = 2;

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One roster entry — only the synced subset. A player's card and
/// progress live on their own peer and are never part of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub connection: ConnectionStatus,
    pub is_host: bool,
    /// Unix millis at join time; doubles as the failover priority.
    pub joined_at: u64,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// The authoritative shared value.
///
/// Exactly one peer (the host) holds the copy that matters; everyone
/// else mirrors it. Invariants that hold after every accepted
/// transition:
///
/// - exactly one player has `is_host == true`, and it equals `host_id`;
/// - `1 <= players.len() <= 5`, and no joins once the lobby closes;
/// - `called_numbers` is duplicate-free with every value in 1..=25;
/// - `current_turn_index` indexes `players` whenever status is playing;
/// - `winner_id` names a roster member;
/// - status only ever moves `Lobby → Playing → Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: RoomId,
    pub status: SessionStatus,
    pub host_id: PlayerId,
    /// Join order. Position in this list IS the turn sequence.
    pub players: Vec<Player>,
    pub current_turn_index: usize,
    /// Append-only history of accepted calls.
    pub called_numbers: Vec<u8>,
    pub winner_id: Option<PlayerId>,
    pub created_at: u64,
}

impl GameSession {
    /// Creates a fresh lobby session with the creator as host and sole
    /// player at turn position 0.
    pub fn create(
        room: RoomId,
        host_id: PlayerId,
        host_name: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            id: room,
            status: SessionStatus::Lobby,
            host_id,
            players: vec![Player {
                id: host_id,
                name: host_name.into(),
                connection: ConnectionStatus::Connected,
                is_host: true,
                joined_at: now,
            }],
            current_turn_index: 0,
            called_numbers: Vec::new(),
            winner_id: None,
            created_at: now,
        }
    }

    // -- Roster -----------------------------------------------------------

    /// Appends a player to the roster, preserving join order.
    ///
    /// # Errors
    /// - [`StateError::GameAlreadyStarted`] outside the lobby
    /// - [`StateError::GameFull`] at the roster cap
    /// - [`StateError::AlreadyJoined`] for a duplicate id
    pub fn add_player(
        &self,
        id: PlayerId,
        name: impl Into<String>,
        now: u64,
    ) -> Result<Self, StateError> {
        if self.status != SessionStatus::Lobby {
            return Err(StateError::GameAlreadyStarted);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(StateError::GameFull(MAX_PLAYERS));
        }
        if self.players.iter().any(|p| p.id == id) {
            return Err(StateError::AlreadyJoined(id));
        }

        let mut next = self.clone();
        next.players.push(Player {
            id,
            name: name.into(),
            connection: ConnectionStatus::Connected,
            is_host: false,
            joined_at: now,
        });
        Ok(next)
    }

    /// Removes a player by id. A no-op (unchanged copy) if the id is
    /// absent. If the removed player was host, the earliest-joined
    /// survivor is promoted so the one-host invariant keeps holding.
    ///
    /// Removing the last player yields an empty roster — the caller
    /// treats that session as abandoned rather than keeping it.
    pub fn remove_player(&self, id: PlayerId) -> Self {
        let Some(pos) = self.players.iter().position(|p| p.id == id)
        else {
            return self.clone();
        };

        let mut next = self.clone();
        let removed = next.players.remove(pos);

        if removed.is_host {
            if let Some(heir) = next
                .players
                .iter_mut()
                .min_by_key(|p| p.joined_at)
            {
                heir.is_host = true;
                next.host_id = heir.id;
            }
        }

        // Keep the turn index pointing at the same player where
        // possible; it only shifts when someone earlier in the order
        // left.
        if !next.players.is_empty() {
            if pos < next.current_turn_index {
                next.current_turn_index -= 1;
            }
            if next.current_turn_index >= next.players.len() {
                next.current_turn_index = 0;
            }
        } else {
            next.current_turn_index = 0;
        }

        next
    }

    // -- Lifecycle --------------------------------------------------------

    /// Whether the session may leave the lobby.
    pub fn can_start(&self) -> bool {
        self.status == SessionStatus::Lobby
            && self.players.len() >= MIN_PLAYERS
    }

    /// Starts the game. The first turn goes to `first_turn` when given,
    /// otherwise to a uniformly random player.
    ///
    /// # Errors
    /// - [`StateError::GameAlreadyStarted`] outside the lobby
    /// - [`StateError::NotEnoughPlayers`] below the roster minimum
    /// - [`StateError::TurnIndexOutOfRange`] for a bad explicit index
    pub fn start(
        &self,
        first_turn: Option<usize>,
    ) -> Result<Self, StateError> {
        if self.status != SessionStatus::Lobby {
            return Err(StateError::GameAlreadyStarted);
        }
        if self.players.len() < MIN_PLAYERS {
            return Err(StateError::NotEnoughPlayers(MIN_PLAYERS));
        }
        let first = match first_turn {
            Some(index) if index < self.players.len() => index,
            Some(index) => {
                return Err(StateError::TurnIndexOutOfRange(index));
            }
            None => rand::rng().random_range(0..self.players.len()),
        };

        let mut next = self.clone();
        next.status = SessionStatus::Playing;
        next.current_turn_index = first;
        Ok(next)
    }

    /// Appends an accepted number to the call history.
    ///
    /// # Errors
    /// - [`StateError::NotPlaying`] outside the playing phase
    /// - [`StateError::NumberOutOfRange`] outside 1..=25
    /// - [`StateError::AlreadyCalled`] for a repeat
    pub fn call_number(&self, number: u8) -> Result<Self, StateError> {
        if self.status != SessionStatus::Playing {
            return Err(StateError::NotPlaying);
        }
        if !(NUMBER_MIN..=NUMBER_MAX).contains(&number) {
            return Err(StateError::NumberOutOfRange(number));
        }
        if self.called_numbers.contains(&number) {
            return Err(StateError::AlreadyCalled(number));
        }

        let mut next = self.clone();
        next.called_numbers.push(number);
        Ok(next)
    }

    /// Hands the turn to the next player in join order, wrapping around.
    /// Unchanged outside the playing phase.
    pub fn advance_turn(&self) -> Self {
        let mut next = self.clone();
        if next.status == SessionStatus::Playing && !next.players.is_empty()
        {
            next.current_turn_index =
                (next.current_turn_index + 1) % next.players.len();
        }
        next
    }

    /// Completes the session with the given winner.
    ///
    /// # Errors
    /// - [`StateError::NotPlaying`] outside the playing phase
    /// - [`StateError::UnknownPlayer`] if the winner isn't on the roster
    pub fn end(&self, winner: PlayerId) -> Result<Self, StateError> {
        if self.status != SessionStatus::Playing {
            return Err(StateError::NotPlaying);
        }
        if !self.players.iter().any(|p| p.id == winner) {
            return Err(StateError::UnknownPlayer(winner));
        }

        let mut next = self.clone();
        next.status = SessionStatus::Completed;
        next.winner_id = Some(winner);
        Ok(next)
    }

    /// The "play again" reset: a brand-new lobby session with the same
    /// room and roster. The old session value is simply replaced, never
    /// rewound — status stays forward-only.
    pub fn play_again(&self, now: u64) -> Self {
        let mut next = self.clone();
        next.status = SessionStatus::Lobby;
        next.current_turn_index = 0;
        next.called_numbers = Vec::new();
        next.winner_id = None;
        next.created_at = now;
        next
    }

    /// Updates a player's connection status. A no-op (unchanged copy)
    /// if the id is absent. Liveness bookkeeping only — it cannot break
    /// any invariant, so it has no failure case.
    pub fn set_connection(
        &self,
        id: PlayerId,
        status: ConnectionStatus,
    ) -> Self {
        let mut next = self.clone();
        if let Some(player) =
            next.players.iter_mut().find(|p| p.id == id)
        {
            player.connection = status;
        }
        next
    }

    // -- Queries ----------------------------------------------------------

    /// The roster entry for `id`, if present.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// The player currently authorized to call, while playing.
    pub fn turn_holder(&self) -> Option<&Player> {
        if self.status != SessionStatus::Playing {
            return None;
        }
        self.players.get(self.current_turn_index)
    }

    /// Whether `id` holds the current turn.
    pub fn is_turn_holder(&self, id: PlayerId) -> bool {
        self.turn_holder().is_some_and(|p| p.id == id)
    }

    /// The deterministic failover choice: the earliest-joined player
    /// other than the current host.
    ///
    /// Every peer evaluates this over the same synchronized roster, so
    /// every peer names the same successor without any election round.
    /// Returns `None` when the host is the only player left.
    pub fn successor(&self) -> Option<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.id != self.host_id)
            .min_by_key(|p| p.joined_at)
            .map(|p| p.id)
    }

    // -- Snapshot conversion ----------------------------------------------

    /// The wire form of this session.
    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room: self.id.clone(),
            status: self.status,
            host_id: self.host_id,
            players: self
                .players
                .iter()
                .map(|p| PlayerRecord {
                    id: p.id,
                    name: p.name.clone(),
                    connection: p.connection,
                    is_host: p.is_host,
                    joined_at: p.joined_at,
                })
                .collect(),
            current_turn_index: self.current_turn_index,
            called_numbers: self.called_numbers.clone(),
            winner_id: self.winner_id,
            created_at: self.created_at,
        }
    }

    /// Rebuilds a session from a wire snapshot, re-checking the
    /// invariants. The protocol layer validates snapshot shape on
    /// receipt; this is the second gate that keeps an unreachable
    /// session value from ever existing in memory.
    ///
    /// # Errors
    /// [`StateError::InvalidSnapshot`] when the snapshot describes a
    /// state this machine could not have produced.
    pub fn from_snapshot(
        snapshot: &SessionSnapshot,
    ) -> Result<Self, StateError> {
        if snapshot.players.is_empty()
            || snapshot.players.len() > MAX_PLAYERS
        {
            return Err(StateError::InvalidSnapshot(format!(
                "{} players",
                snapshot.players.len()
            )));
        }
        let hosts: Vec<_> =
            snapshot.players.iter().filter(|p| p.is_host).collect();
        if hosts.len() != 1 || hosts[0].id != snapshot.host_id {
            return Err(StateError::InvalidSnapshot(
                "host flags disagree with host_id".into(),
            ));
        }
        if snapshot.status == SessionStatus::Playing
            && snapshot.current_turn_index >= snapshot.players.len()
        {
            return Err(StateError::InvalidSnapshot(format!(
                "turn index {}",
                snapshot.current_turn_index
            )));
        }
        let mut seen = [false; NUMBER_MAX as usize + 1];
        for &n in &snapshot.called_numbers {
            if !(NUMBER_MIN..=NUMBER_MAX).contains(&n)
                || seen[n as usize]
            {
                return Err(StateError::InvalidSnapshot(format!(
                    "called number {n}"
                )));
            }
            seen[n as usize] = true;
        }
        if let Some(winner) = snapshot.winner_id {
            if !snapshot.players.iter().any(|p| p.id == winner) {
                return Err(StateError::InvalidSnapshot(
                    "winner not on roster".into(),
                ));
            }
        }

        Ok(Self {
            id: snapshot.room.clone(),
            status: snapshot.status,
            host_id: snapshot.host_id,
            players: snapshot
                .players
                .iter()
                .map(|p| Player {
                    id: p.id,
                    name: p.name.clone(),
                    connection: p.connection,
                    is_host: p.is_host,
                    joined_at: p.joined_at,
                })
                .collect(),
            current_turn_index: snapshot.current_turn_index,
            called_numbers: snapshot.called_numbers.clone(),
            winner_id: snapshot.winner_id,
            created_at: snapshot.created_at,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
