//! WebSocket hub-relay mesh using `tokio-tungstenite`.
//!
//! Native peers cannot speak the browser's WebRTC, so this
//! implementation reproduces the room contract over sockets: every peer
//! dials one relay, the relay fans broadcasts out and announces joins
//! and leaves. The relay never looks inside payloads — authority stays
//! with the host peer, exactly as on the real mesh.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use quintro_protocol::PlayerId;

use crate::{RoomTransport, TransportError, TransportEvent};

/// Frames exchanged between a peer and the relay. Distinct from the
/// game protocol on purpose: the relay routes, it does not play.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum RelayFrame {
    /// Client → relay, first frame: who am I.
    Hello { peer_id: PlayerId },
    /// Relay → client: who was already here.
    Welcome { peers: Vec<PlayerId> },
    /// Client → relay: deliver `data`, to one peer or to everyone.
    Send {
        to: Option<PlayerId>,
        data: Vec<u8>,
    },
    /// Relay → client: a payload from another peer.
    Data { from: PlayerId, data: Vec<u8> },
    /// Relay → client: a peer's channel came up.
    Joined { peer_id: PlayerId },
    /// Relay → client: a peer's channel dropped.
    Left { peer_id: PlayerId },
}

fn encode(frame: &RelayFrame) -> Message {
    // RelayFrame has no unserializable values; an encode failure would
    // be a bug in this file, so the expect stays local to it.
    Message::Binary(
        serde_json::to_vec(frame).expect("relay frame encodes").into(),
    )
}

fn io_err(
    kind: std::io::ErrorKind,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> std::io::Error {
    std::io::Error::new(kind, e)
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

type RelayTable =
    Arc<Mutex<HashMap<PlayerId, mpsc::UnboundedSender<RelayFrame>>>>;

/// The rendezvous point of a WebSocket mesh. Pure plumbing: routes
/// frames between registered peers and announces presence changes.
pub struct WsRelay {
    local_addr: std::net::SocketAddr,
}

impl WsRelay {
    /// Binds the relay and starts accepting peers in the background.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let local_addr = listener
            .local_addr()
            .map_err(TransportError::ConnectFailed)?;
        tracing::info!(%local_addr, "relay listening");

        let table: RelayTable = Arc::default();
        tokio::spawn(accept_loop(listener, table));

        Ok(Self { local_addr })
    }

    /// The address peers should dial (useful after binding port 0).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, table: RelayTable) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!(%addr, "relay accepted connection");
                tokio::spawn(serve_peer(stream, table.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay accept failed, stopping");
                break;
            }
        }
    }
}

/// Serves one peer: handshake, register, pump frames both ways, clean up.
async fn serve_peer(stream: tokio::net::TcpStream, table: RelayTable) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    // First frame must identify the peer.
    let peer_id = loop {
        match source.next().await {
            Some(Ok(msg)) => match decode_frame(msg) {
                Some(RelayFrame::Hello { peer_id }) => break peer_id,
                Some(_) | None => continue,
            },
            _ => return,
        }
    };

    // Register and announce.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let already_here: Vec<PlayerId> = {
        let mut table = table.lock().expect("relay table lock");
        let peers: Vec<PlayerId> = table.keys().copied().collect();
        for sender in table.values() {
            let _ = sender.send(RelayFrame::Joined { peer_id });
        }
        table.insert(peer_id, tx);
        peers
    };
    if sink
        .send(encode(&RelayFrame::Welcome { peers: already_here }))
        .await
        .is_err()
    {
        unregister(&table, peer_id);
        return;
    }
    tracing::info!(%peer_id, "peer joined relay");

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(frame) => {
                    if sink.send(encode(&frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(msg)) => {
                    if let Some(RelayFrame::Send { to, data }) =
                        decode_frame(msg)
                    {
                        route(&table, peer_id, to, data);
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(%peer_id, error = %e, "peer read error");
                    break;
                }
                None => break,
            },
        }
    }

    unregister(&table, peer_id);
    tracing::info!(%peer_id, "peer left relay");
}

fn decode_frame(msg: Message) -> Option<RelayFrame> {
    match msg {
        Message::Binary(data) => serde_json::from_slice(&data).ok(),
        Message::Text(text) => {
            serde_json::from_slice(text.as_bytes()).ok()
        }
        _ => None,
    }
}

fn route(
    table: &RelayTable,
    from: PlayerId,
    to: Option<PlayerId>,
    data: Vec<u8>,
) {
    let table = table.lock().expect("relay table lock");
    for (id, sender) in table.iter() {
        if *id == from {
            continue;
        }
        if to.is_none_or(|target| target == *id) {
            let _ = sender.send(RelayFrame::Data {
                from,
                data: data.clone(),
            });
        }
    }
}

fn unregister(table: &RelayTable, peer_id: PlayerId) {
    let mut table = table.lock().expect("relay table lock");
    if table.remove(&peer_id).is_some() {
        for sender in table.values() {
            let _ = sender.send(RelayFrame::Left { peer_id });
        }
    }
}

// ---------------------------------------------------------------------------
// Client endpoint
// ---------------------------------------------------------------------------

enum Outbound {
    Frame(RelayFrame),
    Close,
}

/// One peer's endpoint on a [`WsRelay`] mesh.
pub struct WsMesh {
    id: PlayerId,
    peers: Arc<Mutex<HashSet<PlayerId>>>,
    out: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl WsMesh {
    /// Dials the relay and identifies as `id`.
    pub async fn connect(
        url: &str,
        id: PlayerId,
    ) -> Result<Self, TransportError> {
        let (ws, _) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| {
                TransportError::ConnectFailed(io_err(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        let (mut sink, source) = ws.split();

        sink.send(encode(&RelayFrame::Hello { peer_id: id }))
            .await
            .map_err(|e| {
                TransportError::SendFailed(io_err(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })?;

        let peers: Arc<Mutex<HashSet<PlayerId>>> = Arc::default();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(client_io(
            sink,
            source,
            out_rx,
            event_tx,
            Arc::clone(&peers),
        ));

        Ok(Self {
            id,
            peers,
            out: out_tx,
            events: event_rx,
        })
    }

    /// This endpoint's peer id.
    pub fn id(&self) -> PlayerId {
        self.id
    }

    fn push(&self, frame: RelayFrame) -> Result<(), TransportError> {
        self.out.send(Outbound::Frame(frame)).map_err(|_| {
            TransportError::ConnectionClosed("relay link is down".into())
        })
    }
}

type ClientSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;
type ClientSource = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;

async fn client_io(
    mut sink: ClientSink,
    mut source: ClientSource,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    peers: Arc<Mutex<HashSet<PlayerId>>>,
) {
    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Frame(frame)) => {
                    if sink.send(encode(&frame)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(msg)) => {
                    if let Some(frame) = decode_frame(msg) {
                        handle_relay_frame(frame, &event_tx, &peers);
                    }
                }
                Some(Err(_)) | None => break,
            },
        }
    }
    // event_tx drops here; the endpoint's recv() then returns None.
}

fn handle_relay_frame(
    frame: RelayFrame,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    peers: &Arc<Mutex<HashSet<PlayerId>>>,
) {
    match frame {
        RelayFrame::Welcome { peers: existing } => {
            peers.lock().expect("peer set lock").extend(existing);
        }
        RelayFrame::Joined { peer_id } => {
            peers.lock().expect("peer set lock").insert(peer_id);
            let _ = event_tx.send(TransportEvent::PeerJoined(peer_id));
        }
        RelayFrame::Left { peer_id } => {
            peers.lock().expect("peer set lock").remove(&peer_id);
            let _ = event_tx.send(TransportEvent::PeerLeft(peer_id));
        }
        RelayFrame::Data { from, data } => {
            let _ = event_tx.send(TransportEvent::Message { from, data });
        }
        // Client-bound only; a relay never sends these.
        RelayFrame::Hello { .. } | RelayFrame::Send { .. } => {}
    }
}

impl RoomTransport for WsMesh {
    type Error = TransportError;

    async fn broadcast(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.push(RelayFrame::Send {
            to: None,
            data: data.to_vec(),
        })
    }

    async fn send_to(
        &self,
        peer: PlayerId,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.push(RelayFrame::Send {
            to: Some(peer),
            data: data.to_vec(),
        })
    }

    async fn recv(
        &mut self,
    ) -> Result<Option<TransportEvent>, Self::Error> {
        Ok(self.events.recv().await)
    }

    fn peers(&self) -> Vec<PlayerId> {
        self.peers
            .lock()
            .expect("peer set lock")
            .iter()
            .copied()
            .collect()
    }

    async fn leave(&self) -> Result<(), Self::Error> {
        let _ = self.out.send(Outbound::Close);
        Ok(())
    }
}
