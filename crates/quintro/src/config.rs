//! Peer timing configuration.

use std::time::Duration;

use tracing::warn;

/// Timing knobs for one peer. The defaults suit a casual turn-based
/// game; [`PeerConfig::validated`] clamps anything unusable.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// How long the turn holder has before the host force-advances the
    /// turn. Default: 30 seconds.
    pub turn_timeout: Duration,

    /// How long a dropped peer may stay away before being treated as
    /// gone for good. Default: 30 seconds.
    pub reconnect_grace: Duration,

    /// How often this peer broadcasts a liveness beacon. `None`
    /// disables heartbeats (transport join/leave signals still drive
    /// presence). Default: every 5 seconds.
    pub heartbeat_interval: Option<Duration>,

    /// How often the presence timeouts are evaluated. Default: 1 second.
    pub sweep_interval: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(30),
            reconnect_grace: Duration::from_secs(30),
            heartbeat_interval: Some(Duration::from_secs(5)),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl PeerConfig {
    /// Clamps out-of-range values so the config is safe to run with.
    ///
    /// - a zero `turn_timeout` would skip every turn instantly — reset
    ///   to the default;
    /// - a zero `sweep_interval` would busy-loop — clamped to 100 ms;
    /// - a zero heartbeat interval likewise — clamped to 1 s.
    pub fn validated(mut self) -> Self {
        if self.turn_timeout.is_zero() {
            warn!("turn_timeout of zero — using default");
            self.turn_timeout = Duration::from_secs(30);
        }
        if self.sweep_interval < Duration::from_millis(100) {
            self.sweep_interval = Duration::from_millis(100);
        }
        if let Some(hb) = self.heartbeat_interval {
            if hb.is_zero() {
                self.heartbeat_interval = Some(Duration::from_secs(1));
            }
        }
        self
    }

    /// The silence window after which a peer is considered dropped:
    /// three missed beacons. `None` when heartbeats are disabled.
    pub fn heartbeat_window(&self) -> Option<Duration> {
        self.heartbeat_interval.map(|hb| hb * 3)
    }
}
