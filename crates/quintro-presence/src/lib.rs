//! Liveness tracking for the players of one session.
//!
//! Every peer runs its own [`PresenceTracker`] — host included — fed by
//! transport-level join/leave signals and heartbeats. The tracker owns
//! the three-state lifecycle per player:
//!
//! ```text
//!   Connected ──(channel drops / goes silent)──→ Reconnecting
//!       ↑                                             │
//!       └────────(channel restored)───────────────────┘
//!                                                     │ (grace elapses)
//!                                                     ▼
//!                                               Disconnected
//! ```
//!
//! A channel drop is *not* a removal: the player keeps their roster slot
//! and turn position for the whole grace window, and a peer that comes
//! back inside it resumes with no renegotiation. Only the
//! `Reconnecting → Disconnected` edge — reported by [`PresenceTracker::
//! sweep`] — makes the layers above act: the host drops the player from
//! the roster, and non-hosts start failover if the lost peer was the
//! host.
//!
//! The tracker itself never touches the session; it reports, the peer
//! loop decides.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use quintro_protocol::{ConnectionStatus, PlayerId};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Timing knobs for liveness decisions.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// How long a `Reconnecting` player has before they are declared
    /// `Disconnected`. Default: 30 seconds.
    pub reconnect_grace: Duration,

    /// How long a `Connected` player may stay silent (no heartbeat, no
    /// message) before being demoted to `Reconnecting`. `None` disables
    /// silence detection — only transport-level leave signals demote.
    pub heartbeat_window: Option<Duration>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            heartbeat_window: Some(Duration::from_secs(15)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Internal per-player state. `Instant` (monotonic) rather than wall
/// clock, so a system clock jump can't expire anyone.
#[derive(Debug, Clone)]
enum Liveness {
    Connected { last_seen: Instant },
    Reconnecting { since: Instant },
    Disconnected,
}

/// What a [`PresenceTracker::sweep`] pass found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Went silent past the heartbeat window this pass.
    pub newly_reconnecting: Vec<PlayerId>,
    /// Exhausted the reconnect grace this pass. These are the players
    /// the layers above must now act on.
    pub newly_disconnected: Vec<PlayerId>,
}

impl SweepOutcome {
    /// Whether the pass changed anything.
    pub fn is_empty(&self) -> bool {
        self.newly_reconnecting.is_empty()
            && self.newly_disconnected.is_empty()
    }
}

/// Tracks the liveness of every other player in the session.
pub struct PresenceTracker {
    entries: HashMap<PlayerId, Liveness>,
    config: PresenceConfig,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    /// Starts (or refreshes) tracking a player as connected.
    pub fn track(&mut self, player: PlayerId) {
        self.entries.insert(
            player,
            Liveness::Connected {
                last_seen: Instant::now(),
            },
        );
    }

    /// Stops tracking a player entirely (they left the roster).
    pub fn forget(&mut self, player: PlayerId) {
        self.entries.remove(&player);
    }

    /// The player's channel dropped. Starts the grace window unless the
    /// player is already past it.
    pub fn mark_reconnecting(&mut self, player: PlayerId) {
        match self.entries.get_mut(&player) {
            Some(state @ Liveness::Connected { .. }) => {
                *state = Liveness::Reconnecting {
                    since: Instant::now(),
                };
                tracing::info!(%player, "channel dropped, grace window started");
            }
            Some(_) => {} // already reconnecting or gone
            None => {
                // First we hear of them is their departure — track it
                // anyway so the grace window still applies.
                self.entries.insert(
                    player,
                    Liveness::Reconnecting {
                        since: Instant::now(),
                    },
                );
            }
        }
    }

    /// Evidence of life (channel up, heartbeat, any message). Returns
    /// `true` if this restored a player from `Reconnecting`.
    pub fn mark_connected(&mut self, player: PlayerId) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(&player) {
            Some(state @ Liveness::Reconnecting { .. }) => {
                *state = Liveness::Connected { last_seen: now };
                tracing::info!(%player, "player back within grace window");
                true
            }
            Some(Liveness::Connected { last_seen }) => {
                *last_seen = now;
                false
            }
            // Disconnected players don't silently resurrect — they
            // rejoin through the roster, which calls `track`.
            Some(Liveness::Disconnected) => false,
            None => {
                self.entries
                    .insert(player, Liveness::Connected { last_seen: now });
                false
            }
        }
    }

    /// Applies the timeout rules once. Call periodically (the peer loop
    /// runs this on its sweep interval).
    pub fn sweep(&mut self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        for (player, state) in self.entries.iter_mut() {
            match state {
                Liveness::Connected { last_seen } => {
                    if let Some(window) = self.config.heartbeat_window {
                        if last_seen.elapsed() > window {
                            *state = Liveness::Reconnecting {
                                since: Instant::now(),
                            };
                            outcome.newly_reconnecting.push(*player);
                            tracing::info!(
                                %player,
                                "player went silent, grace window started"
                            );
                        }
                    }
                }
                Liveness::Reconnecting { since } => {
                    if since.elapsed() > self.config.reconnect_grace {
                        *state = Liveness::Disconnected;
                        outcome.newly_disconnected.push(*player);
                        tracing::info!(
                            %player,
                            "grace window elapsed, player disconnected"
                        );
                    }
                }
                Liveness::Disconnected => {}
            }
        }

        outcome
    }

    /// Current status of a tracked player.
    pub fn status(&self, player: PlayerId) -> Option<ConnectionStatus> {
        self.entries.get(&player).map(|state| match state {
            Liveness::Connected { .. } => ConnectionStatus::Connected,
            Liveness::Reconnecting { .. } => {
                ConnectionStatus::Reconnecting
            }
            Liveness::Disconnected => ConnectionStatus::Disconnected,
        })
    }

    /// Every tracked player id.
    pub fn tracked(&self) -> Vec<PlayerId> {
        self.entries.keys().copied().collect()
    }

    /// Number of tracked players.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
