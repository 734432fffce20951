//! Cancellable timers for the peer event loop.
//!
//! Two pieces, both designed to live inside a `tokio::select!`:
//!
//! - [`TurnTimer`] — a one-shot deadline armed when a turn begins and
//!   cancelled the instant any valid action is accepted for that turn.
//!   While disarmed its future pends forever, so the select! simply
//!   never takes that branch.
//! - [`HeartbeatTicker`] — a fixed-interval beacon trigger; a `None`
//!   interval pends forever (heartbeats disabled).
//!
//! The turn timer remembers *which* turn it was armed for. A timer that
//! fires always disarms itself and hands back that index, and the
//! caller compares it against the live session before acting — an
//! expiry raced by an accepted action is detected and ignored instead
//! of forcing a duplicate turn advance.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         event = transport.recv() => { /* may arm or cancel the timer */ }
//!         turn = turn_timer.expired() => host.on_turn_timeout(turn),
//!         _ = heartbeat.tick() => transport.broadcast(&beacon).await?,
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// TurnTimer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ArmedTurn {
    turn_index: usize,
    deadline: Instant,
}

/// A one-shot, cancellable deadline for the current turn.
///
/// At most one deadline is armed at a time; re-arming replaces the
/// previous one, so there is never a stale deadline left ticking for a
/// turn that already moved on.
#[derive(Debug, Default)]
pub struct TurnTimer {
    armed: Option<ArmedTurn>,
}

impl TurnTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the deadline for `turn_index`, `timeout` from
    /// now.
    pub fn arm(&mut self, turn_index: usize, timeout: Duration) {
        self.armed = Some(ArmedTurn {
            turn_index,
            deadline: Instant::now() + timeout,
        });
        debug!(turn_index, timeout_ms = timeout.as_millis() as u64, "turn timer armed");
    }

    /// Disarms the timer. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!(turn_index = armed.turn_index, "turn timer cancelled");
        }
    }

    /// Whether a deadline is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The turn index the timer is armed for, if any.
    pub fn armed_turn(&self) -> Option<usize> {
        self.armed.map(|a| a.turn_index)
    }

    /// Resolves when the armed deadline passes, returning the turn index
    /// it was armed for, and disarms. Pends forever while disarmed —
    /// `tokio::select!` keeps servicing its other branches.
    pub async fn expired(&mut self) -> usize {
        let Some(armed) = self.armed else {
            // Never resolves on its own; cancellation-safe inside select!.
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(armed.deadline).await;
        self.armed = None;
        trace!(turn_index = armed.turn_index, "turn timer fired");
        armed.turn_index
    }
}

// ---------------------------------------------------------------------------
// HeartbeatTicker
// ---------------------------------------------------------------------------

/// Triggers at a fixed interval; disabled (`None`) pends forever.
#[derive(Debug)]
pub struct HeartbeatTicker {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl HeartbeatTicker {
    /// Creates a ticker. `None` disables it.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            next: interval.map(|i| Instant::now() + i),
        }
    }

    /// Whether the ticker is enabled.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves when the next beacon is due; reschedules itself.
    pub async fn tick(&mut self) {
        let (Some(interval), Some(next)) = (self.interval, self.next)
        else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;
        // Schedule from now, not from the missed deadline — a slow
        // handler must not cause a burst of catch-up beacons.
        self.next = Some(Instant::now() + interval);
    }
}
