//! The local recovery record.
//!
//! When a browser tab reloads mid-game, the peer process dies with it.
//! This record is the only thing persisted locally — enough to come
//! back as the *same player*: identity, room, and the card seed (so the
//! re-derived card matches the one everyone validated against). It is
//! never transmitted; on resume, the truth about the session always
//! comes from the next snapshot, not from this record.
//!
//! How the record is stored (localStorage, a file, …) is the embedding
//! application's business; this crate only defines the shape.

use serde::{Deserialize, Serialize};

use quintro_protocol::{PlayerId, RoomId};

/// Everything needed to resume a session after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub player_id: PlayerId,
    pub player_name: String,
    pub room_code: RoomId,
    /// Whether this peer was hosting when the record was written. A
    /// hint for the resume UI only — actual authority is re-derived
    /// from the session on return.
    pub was_host: bool,
    /// Seed for the locally-derived card.
    pub card_seed: u64,
    /// Unix millis when the record was written.
    pub saved_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_record_round_trips_as_json() {
        let record = RecoveryRecord {
            player_id: PlayerId(7),
            player_name: "ada".into(),
            room_code: RoomId("QUIN7".into()),
            was_host: true,
            card_seed: 0xdead_beef,
            saved_at: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&record).unwrap();
        let decoded: RecoveryRecord =
            serde_json::from_str(&json).unwrap();

        assert_eq!(record, decoded);
    }
}
