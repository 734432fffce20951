//! The closed set of messages peers exchange.
//!
//! Every message is one variant of [`GameMessage`]: a tagged union with a
//! kebab-case `type` discriminant (`{"type":"call-number",...}` on the
//! wire) and flat primitive/array fields. Nothing nested or opaque — the
//! payloads stay small, inspectable in DevTools on the browser side, and
//! cheap to validate.
//!
//! Two rules hold at this boundary:
//!
//! 1. Inbound messages that fail [`GameMessage::validate`] are dropped
//!    and logged by the caller; they never reach the session logic.
//! 2. Outbound snapshots carry only the synced subset of player data —
//!    a player's private card and derived progress are never serialized.

use serde::{Deserialize, Serialize};

use crate::{ConnectionStatus, PlayerId, ProtocolError, RoomId, SessionStatus};

/// Smallest callable number.
pub const NUMBER_MIN: u8 = 1;
/// Largest callable number.
pub const NUMBER_MAX: u8 = 25;
/// Upper bound on player display names, in characters.
pub const MAX_NAME_LEN: usize = 32;
/// Hard cap on players per session.
pub const MAX_PLAYERS: usize = 5;

// ---------------------------------------------------------------------------
// Snapshot records
// ---------------------------------------------------------------------------

/// The synced subset of one player, as it appears inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub connection: ConnectionStatus,
    pub is_host: bool,
    /// Unix millis at join time. Doubles as the failover priority.
    pub joined_at: u64,
}

/// A full session snapshot — the universal desync-repair payload.
///
/// Applying the same snapshot twice must be a no-op, so it carries the
/// complete shared state and nothing derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub room: RoomId,
    pub status: SessionStatus,
    pub host_id: PlayerId,
    /// Join order. Position is the turn sequence.
    pub players: Vec<PlayerRecord>,
    pub current_turn_index: usize,
    pub called_numbers: Vec<u8>,
    pub winner_id: Option<PlayerId>,
    pub created_at: u64,
}

impl SessionSnapshot {
    /// Internal-consistency check, applied before the snapshot is allowed
    /// to replace a local mirror.
    fn check(&self) -> Result<(), ProtocolError> {
        if self.players.is_empty() || self.players.len() > MAX_PLAYERS {
            return Err(ProtocolError::InvalidMessage(format!(
                "snapshot has {} players",
                self.players.len()
            )));
        }
        let hosts: Vec<_> =
            self.players.iter().filter(|p| p.is_host).collect();
        if hosts.len() != 1 || hosts[0].id != self.host_id {
            return Err(ProtocolError::InvalidMessage(
                "snapshot host flags disagree with host_id".into(),
            ));
        }
        if self.status == SessionStatus::Playing
            && self.current_turn_index >= self.players.len()
        {
            return Err(ProtocolError::InvalidMessage(format!(
                "turn index {} out of range",
                self.current_turn_index
            )));
        }
        let mut seen = [false; NUMBER_MAX as usize + 1];
        for &n in &self.called_numbers {
            if !(NUMBER_MIN..=NUMBER_MAX).contains(&n) {
                return Err(ProtocolError::InvalidMessage(format!(
                    "called number {n} out of range"
                )));
            }
            if seen[n as usize] {
                return Err(ProtocolError::InvalidMessage(format!(
                    "called number {n} duplicated"
                )));
            }
            seen[n as usize] = true;
        }
        if let Some(winner) = self.winner_id {
            if !self.players.iter().any(|p| p.id == winner) {
                return Err(ProtocolError::InvalidMessage(
                    "winner is not in the player list".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GameMessage — the wire union
// ---------------------------------------------------------------------------

/// Every message that travels between peers.
///
/// `#[serde(tag = "type", rename_all = "kebab-case")]` produces
/// internally tagged JSON with the discriminants the wire format uses:
/// `{"type":"number-called","number":17,...}`. An unknown `type` fails
/// deserialization, which is exactly the drop-at-the-boundary behavior
/// we want.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GameMessage {
    /// Peer → host: "let me into the lobby."
    PlayerJoin { player_id: PlayerId, name: String },

    /// Any direction: "this player is gone for good."
    PlayerLeave { player_id: PlayerId },

    /// Host → all: the game left the lobby.
    StartGame { first_turn_index: usize },

    /// Peer → host: the sender wants to call a number on their turn.
    CallNumber { player_id: PlayerId, number: u8 },

    /// Host → all: a number was accepted. This is a delta, not a
    /// snapshot — mirrors apply it in place for low latency.
    NumberCalled {
        number: u8,
        called_by: PlayerId,
        next_turn_index: usize,
    },

    /// Host → all (or host → one peer on request): full resync.
    SyncState { session: SessionSnapshot },

    /// Peer → host: "my card has this many completed lines."
    /// The host re-validates the claim against the called numbers;
    /// cards themselves never travel.
    DeclareWinner { player_id: PlayerId, lines: u8 },

    /// Host → all: the game is over.
    GameOver { winner_id: PlayerId },

    /// Peer → host: "my mirror is stale, send me a snapshot."
    RequestSync { player_id: PlayerId },

    /// Host → one peer: a private echo of why an action was ignored.
    /// Informational only — the sender must not retry.
    ActionRejected { reason: String },

    /// Any → all: liveness beacon. `sent_at` is the sender's clock in
    /// unix millis, for logging only — peers never compare clocks.
    Heartbeat { player_id: PlayerId, sent_at: u64 },
}

impl GameMessage {
    /// The wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoin { .. } => "player-join",
            Self::PlayerLeave { .. } => "player-leave",
            Self::StartGame { .. } => "start-game",
            Self::CallNumber { .. } => "call-number",
            Self::NumberCalled { .. } => "number-called",
            Self::SyncState { .. } => "sync-state",
            Self::DeclareWinner { .. } => "declare-winner",
            Self::GameOver { .. } => "game-over",
            Self::RequestSync { .. } => "request-sync",
            Self::ActionRejected { .. } => "action-rejected",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Domain validation, run on every inbound message after it decodes.
    ///
    /// Deserialization already guarantees the field *types*; this checks
    /// the field *values* (number ranges, name shape, snapshot
    /// consistency). Anything that fails here is dropped by the caller —
    /// it must never reach the session state machine.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::PlayerJoin { name, .. } => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(ProtocolError::InvalidMessage(
                        "player name is empty".into(),
                    ));
                }
                if trimmed.chars().count() > MAX_NAME_LEN {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "player name longer than {MAX_NAME_LEN} chars"
                    )));
                }
                Ok(())
            }
            Self::CallNumber { number, .. }
            | Self::NumberCalled { number, .. } => {
                if !(NUMBER_MIN..=NUMBER_MAX).contains(number) {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "number {number} outside {NUMBER_MIN}..={NUMBER_MAX}"
                    )));
                }
                Ok(())
            }
            Self::DeclareWinner { lines, .. } => {
                // 5 rows + 5 columns + 2 diagonals is every line a card has.
                if *lines > 12 {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "a card cannot complete {lines} lines"
                    )));
                }
                Ok(())
            }
            Self::SyncState { session } => session.check(),
            Self::StartGame { first_turn_index } => {
                if *first_turn_index >= MAX_PLAYERS {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "first turn index {first_turn_index} out of range"
                    )));
                }
                Ok(())
            }
            Self::PlayerLeave { .. }
            | Self::GameOver { .. }
            | Self::RequestSync { .. }
            | Self::ActionRejected { .. }
            | Self::Heartbeat { .. } => Ok(()),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is a contract with peers running other builds, so
    //! these tests pin the exact JSON shapes alongside the validation
    //! rules.

    use super::*;

    fn record(id: u64, is_host: bool) -> PlayerRecord {
        PlayerRecord {
            id: PlayerId(id),
            name: format!("player-{id}"),
            connection: ConnectionStatus::Connected,
            is_host,
            joined_at: 1_000 + id,
        }
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            room: RoomId("QUIN7".into()),
            status: SessionStatus::Playing,
            host_id: PlayerId(1),
            players: vec![record(1, true), record(2, false)],
            current_turn_index: 0,
            called_numbers: vec![3, 17],
            winner_id: None,
            created_at: 1_000,
        }
    }

    // =====================================================================
    // JSON shapes
    // =====================================================================

    #[test]
    fn test_call_number_json_uses_kebab_tag() {
        let msg = GameMessage::CallNumber {
            player_id: PlayerId(7),
            number: 17,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "call-number");
        assert_eq!(json["player_id"], 7);
        assert_eq!(json["number"], 17);
    }

    #[test]
    fn test_number_called_json_shape() {
        let msg = GameMessage::NumberCalled {
            number: 17,
            called_by: PlayerId(7),
            next_turn_index: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "number-called");
        assert_eq!(json["number"], 17);
        assert_eq!(json["called_by"], 7);
        assert_eq!(json["next_turn_index"], 1);
    }

    #[test]
    fn test_sync_state_round_trip() {
        let msg = GameMessage::SyncState {
            session: snapshot(),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: GameMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_every_variant_round_trips() {
        let messages = [
            GameMessage::PlayerJoin {
                player_id: PlayerId(1),
                name: "ada".into(),
            },
            GameMessage::PlayerLeave {
                player_id: PlayerId(1),
            },
            GameMessage::StartGame {
                first_turn_index: 2,
            },
            GameMessage::CallNumber {
                player_id: PlayerId(1),
                number: 25,
            },
            GameMessage::NumberCalled {
                number: 25,
                called_by: PlayerId(1),
                next_turn_index: 0,
            },
            GameMessage::SyncState {
                session: snapshot(),
            },
            GameMessage::DeclareWinner {
                player_id: PlayerId(1),
                lines: 5,
            },
            GameMessage::GameOver {
                winner_id: PlayerId(1),
            },
            GameMessage::RequestSync {
                player_id: PlayerId(1),
            },
            GameMessage::ActionRejected {
                reason: "not your turn".into(),
            },
            GameMessage::Heartbeat {
                player_id: PlayerId(1),
                sent_at: 12,
            },
        ];
        for msg in messages {
            let bytes = serde_json::to_vec(&msg).unwrap();
            let decoded: GameMessage =
                serde_json::from_slice(&bytes).unwrap();
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn test_unknown_tag_fails_to_decode() {
        let raw = r#"{"type":"fly-to-moon","speed":9000}"#;
        let result: Result<GameMessage, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_field_type_fails_to_decode() {
        let raw = r#"{"type":"call-number","player_id":"x","number":3}"#;
        let result: Result<GameMessage, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    // =====================================================================
    // validate()
    // =====================================================================

    #[test]
    fn test_validate_call_number_accepts_domain_bounds() {
        for number in [NUMBER_MIN, 13, NUMBER_MAX] {
            let msg = GameMessage::CallNumber {
                player_id: PlayerId(1),
                number,
            };
            assert!(msg.validate().is_ok(), "number {number}");
        }
    }

    #[test]
    fn test_validate_call_number_rejects_out_of_domain() {
        for number in [0, 26, 255] {
            let msg = GameMessage::CallNumber {
                player_id: PlayerId(1),
                number,
            };
            assert!(msg.validate().is_err(), "number {number}");
        }
    }

    #[test]
    fn test_validate_player_join_rejects_blank_name() {
        let msg = GameMessage::PlayerJoin {
            player_id: PlayerId(1),
            name: "   ".into(),
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_player_join_rejects_overlong_name() {
        let msg = GameMessage::PlayerJoin {
            player_id: PlayerId(1),
            name: "x".repeat(MAX_NAME_LEN + 1),
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_declare_winner_rejects_impossible_lines() {
        let msg = GameMessage::DeclareWinner {
            player_id: PlayerId(1),
            lines: 13,
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_snapshot_rejects_duplicate_numbers() {
        let mut snap = snapshot();
        snap.called_numbers = vec![3, 3];
        let msg = GameMessage::SyncState { session: snap };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_snapshot_rejects_two_hosts() {
        let mut snap = snapshot();
        snap.players[1].is_host = true;
        let msg = GameMessage::SyncState { session: snap };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_snapshot_rejects_bad_turn_index() {
        let mut snap = snapshot();
        snap.current_turn_index = 2;
        let msg = GameMessage::SyncState { session: snap };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_snapshot_rejects_foreign_winner() {
        let mut snap = snapshot();
        snap.status = SessionStatus::Completed;
        snap.winner_id = Some(PlayerId(99));
        let msg = GameMessage::SyncState { session: snap };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_snapshot_ignores_turn_index_in_lobby() {
        // The turn index is only meaningful while playing; a lobby
        // snapshot may carry any value without being rejected.
        let mut snap = snapshot();
        snap.status = SessionStatus::Lobby;
        snap.current_turn_index = 4;
        snap.called_numbers.clear();
        let msg = GameMessage::SyncState { session: snap };
        assert!(msg.validate().is_ok());
    }
}
