//! The win-validation seam.
//!
//! Cards never travel between peers, so when a player declares a win
//! the host must re-derive their progress from nothing but the player's
//! identity and the public call history. [`WinCheck`] is that seam; the
//! engine only ever asks "how many completed lines does this player
//! have, given these called numbers?".
//!
//! [`SeededCards`] is the bundled implementation: every card is derived
//! deterministically from `(room code, player id)`, so any peer can
//! recompute any card without ever being sent one.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use quintro_protocol::{PlayerId, RoomId};

/// Completed lines required to win.
pub const WIN_LINES: u8 = 5;

/// Lines on a 5×5 card: 5 rows, 5 columns, 2 diagonals.
pub const TOTAL_LINES: u8 = 12;

/// Re-derives a player's line progress from public information.
pub trait WinCheck: Send + 'static {
    /// How many of the player's card lines are fully covered by
    /// `called`.
    fn completed_lines(&self, player: PlayerId, called: &[u8]) -> u8;
}

/// Deterministic per-player cards seeded from the room code.
///
/// The card is a 5×5 arrangement of the numbers 1..=25, shuffled by an
/// RNG seeded from `(room, player)`. Same inputs, same card — on every
/// peer, after every reload.
#[derive(Debug, Clone)]
pub struct SeededCards {
    room: RoomId,
}

impl SeededCards {
    pub fn new(room: RoomId) -> Self {
        Self { room }
    }

    /// The player's card, row-major.
    pub fn card(&self, player: PlayerId) -> [[u8; 5]; 5] {
        let mut numbers: Vec<u8> = (1..=25).collect();
        let mut rng = StdRng::seed_from_u64(self.seed(player));
        numbers.shuffle(&mut rng);

        let mut card = [[0u8; 5]; 5];
        for (i, n) in numbers.into_iter().enumerate() {
            card[i / 5][i % 5] = n;
        }
        card
    }

    /// FNV-1a over the room code, folded with the player id.
    fn seed(&self, player: PlayerId) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.room.0.bytes().chain(player.0.to_le_bytes()) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

impl WinCheck for SeededCards {
    fn completed_lines(&self, player: PlayerId, called: &[u8]) -> u8 {
        let card = self.card(player);
        let mut marked = [false; 26];
        for &n in called {
            if let Some(slot) = marked.get_mut(n as usize) {
                *slot = true;
            }
        }
        let hit = |r: usize, c: usize| marked[card[r][c] as usize];

        let mut lines = 0u8;
        for i in 0..5 {
            if (0..5).all(|j| hit(i, j)) {
                lines += 1; // row
            }
            if (0..5).all(|j| hit(j, i)) {
                lines += 1; // column
            }
        }
        if (0..5).all(|i| hit(i, i)) {
            lines += 1; // diagonal
        }
        if (0..5).all(|i| hit(i, 4 - i)) {
            lines += 1; // anti-diagonal
        }
        lines
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cards() -> SeededCards {
        SeededCards::new(RoomId("QUIN7".into()))
    }

    #[test]
    fn test_card_is_a_permutation_of_the_domain() {
        let card = cards().card(PlayerId(1));

        let mut seen: Vec<u8> =
            card.iter().flatten().copied().collect();
        seen.sort_unstable();
        let expected: Vec<u8> = (1..=25).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_card_deterministic_for_same_inputs() {
        let a = cards().card(PlayerId(7));
        let b = cards().card(PlayerId(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_card_differs_between_players() {
        let a = cards().card(PlayerId(1));
        let b = cards().card(PlayerId(2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_card_differs_between_rooms() {
        let a = SeededCards::new(RoomId("AAAAA".into())).card(PlayerId(1));
        let b = SeededCards::new(RoomId("BBBBB".into())).card(PlayerId(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_completed_lines_zero_when_nothing_called() {
        assert_eq!(cards().completed_lines(PlayerId(1), &[]), 0);
    }

    #[test]
    fn test_completed_lines_all_when_everything_called() {
        let called: Vec<u8> = (1..=25).collect();
        assert_eq!(
            cards().completed_lines(PlayerId(1), &called),
            TOTAL_LINES
        );
    }

    #[test]
    fn test_completed_lines_counts_a_single_row() {
        let checker = cards();
        let card = checker.card(PlayerId(1));

        // Call exactly the first row of the card.
        let called: Vec<u8> = card[0].to_vec();
        let lines = checker.completed_lines(PlayerId(1), &called);

        // At least the row; a diagonal can't complete off 5 numbers
        // from one row, so exactly 1.
        assert_eq!(lines, 1);
    }
}
