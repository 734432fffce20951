//! In-process mesh over channels.
//!
//! Every peer in one [`MemoryHub`] can reach every other; delivery is a
//! channel send, so it is at-most-once and unordered across peers —
//! the same contract the real mesh gives. The hub can also be told to
//! drop a specific delivery ([`MemoryHub::drop_next_to`]) or to sever a
//! peer without warning ([`MemoryHub::kick`]), which is how the tests
//! exercise desync repair and host failover.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use quintro_protocol::PlayerId;

use crate::{RoomTransport, TransportError, TransportEvent};

#[derive(Default)]
struct HubInner {
    /// Event inbox per connected peer.
    peers: HashMap<PlayerId, mpsc::UnboundedSender<TransportEvent>>,
    /// Peers whose next inbound payload gets silently discarded.
    lossy_once: HashSet<PlayerId>,
}

/// The shared side of an in-process mesh. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a peer to the mesh and returns its endpoint.
    ///
    /// Existing peers observe a [`TransportEvent::PeerJoined`].
    pub fn join(&self, peer: PlayerId) -> MemoryMesh {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("hub lock");

        for sender in inner.peers.values() {
            let _ = sender.send(TransportEvent::PeerJoined(peer));
        }
        inner.peers.insert(peer, tx);
        tracing::debug!(%peer, peers = inner.peers.len(), "peer joined mesh");

        MemoryMesh {
            id: peer,
            hub: self.clone(),
            rx,
        }
    }

    /// Severs a peer's channel without any goodbye — simulates a crash
    /// or a dropped connection. Remaining peers observe
    /// [`TransportEvent::PeerLeft`]; the victim's `recv` returns `None`.
    pub fn kick(&self, peer: PlayerId) {
        self.remove(peer);
    }

    /// Arranges for the next payload destined to `victim` to vanish in
    /// transit. One payload only; presence events still arrive.
    pub fn drop_next_to(&self, victim: PlayerId) {
        self.inner
            .lock()
            .expect("hub lock")
            .lossy_once
            .insert(victim);
    }

    /// Peers currently on the mesh.
    pub fn connected(&self) -> Vec<PlayerId> {
        self.inner
            .lock()
            .expect("hub lock")
            .peers
            .keys()
            .copied()
            .collect()
    }

    fn deliver(&self, from: PlayerId, to: Option<PlayerId>, data: &[u8]) {
        let mut inner = self.inner.lock().expect("hub lock");
        let targets: Vec<PlayerId> = inner
            .peers
            .keys()
            .copied()
            .filter(|id| *id != from)
            .filter(|id| to.is_none_or(|t| t == *id))
            .collect();

        for target in targets {
            if inner.lossy_once.remove(&target) {
                tracing::debug!(%from, %target, "dropping payload in transit");
                continue;
            }
            if let Some(sender) = inner.peers.get(&target) {
                let _ = sender.send(TransportEvent::Message {
                    from,
                    data: data.to_vec(),
                });
            }
        }
    }

    fn remove(&self, peer: PlayerId) {
        let mut inner = self.inner.lock().expect("hub lock");
        if inner.peers.remove(&peer).is_none() {
            return;
        }
        for sender in inner.peers.values() {
            let _ = sender.send(TransportEvent::PeerLeft(peer));
        }
        tracing::debug!(%peer, peers = inner.peers.len(), "peer left mesh");
    }
}

/// One peer's endpoint on a [`MemoryHub`].
pub struct MemoryMesh {
    id: PlayerId,
    hub: MemoryHub,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl MemoryMesh {
    /// This endpoint's peer id.
    pub fn id(&self) -> PlayerId {
        self.id
    }
}

impl RoomTransport for MemoryMesh {
    type Error = TransportError;

    async fn broadcast(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.hub.deliver(self.id, None, data);
        Ok(())
    }

    async fn send_to(
        &self,
        peer: PlayerId,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.hub.deliver(self.id, Some(peer), data);
        Ok(())
    }

    async fn recv(
        &mut self,
    ) -> Result<Option<TransportEvent>, Self::Error> {
        Ok(self.rx.recv().await)
    }

    fn peers(&self) -> Vec<PlayerId> {
        self.hub
            .connected()
            .into_iter()
            .filter(|id| *id != self.id)
            .collect()
    }

    async fn leave(&self) -> Result<(), Self::Error> {
        self.hub.remove(self.id);
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
